//! Credential Encryption
//!
//! The engine treats encryption as an injected capability: `SecretCipher`
//! is the seam, `AesGcmCipher` the default AES-256-GCM implementation.
//! Plaintext credentials exist only transiently as `SecretString`; the
//! cipher never logs them. Key rotation policy is owned by the caller,
//! which can rebuild the engine with a new key and re-run setup.

use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, OsRng};
use aes_gcm::{Aes256Gcm, KeyInit};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use secrecy::{ExposeSecret, SecretString};

use crate::types::{EngineError, Result};

const NONCE_LEN: usize = 12;

/// Two-way credential cipher. Implementations must never log plaintext.
pub trait SecretCipher: Send + Sync {
    /// Encrypt a plaintext credential into an opaque storable string.
    fn encrypt(&self, plaintext: &SecretString) -> Result<String>;

    /// Decrypt a stored credential back into a guarded string.
    fn decrypt(&self, ciphertext: &str) -> Result<SecretString>;
}

/// AES-256-GCM cipher with a random nonce prepended to each ciphertext,
/// base64-encoded for storage.
pub struct AesGcmCipher {
    key: [u8; 32],
}

impl std::fmt::Debug for AesGcmCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AesGcmCipher")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl AesGcmCipher {
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Generate a fresh random key.
    pub fn generate() -> Self {
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut key);
        Self { key }
    }

    /// Load the key from a base64-encoded string (e.g. an env var).
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = BASE64
            .decode(encoded)
            .map_err(|e| EngineError::Config(format!("Invalid cipher key encoding: {}", e)))?;
        let key: [u8; 32] = bytes
            .try_into()
            .map_err(|_| EngineError::Config("Cipher key must be 32 bytes".to_string()))?;
        Ok(Self { key })
    }
}

impl SecretCipher for AesGcmCipher {
    fn encrypt(&self, plaintext: &SecretString) -> Result<String> {
        let cipher = Aes256Gcm::new(GenericArray::from_slice(&self.key));

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = GenericArray::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.expose_secret().as_bytes())
            .map_err(|_| EngineError::Config("Credential encryption failed".to_string()))?;

        // Nonce prepended so decryption is self-contained
        let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);

        Ok(BASE64.encode(combined))
    }

    fn decrypt(&self, stored: &str) -> Result<SecretString> {
        let combined = BASE64
            .decode(stored)
            .map_err(|e| EngineError::Config(format!("Corrupted credential encoding: {}", e)))?;

        if combined.len() < NONCE_LEN {
            return Err(EngineError::Config(
                "Corrupted credential: too short".to_string(),
            ));
        }

        let cipher = Aes256Gcm::new(GenericArray::from_slice(&self.key));
        let nonce = GenericArray::from_slice(&combined[..NONCE_LEN]);

        let plaintext = cipher
            .decrypt(nonce, &combined[NONCE_LEN..])
            .map_err(|_| EngineError::Config("Credential decryption failed".to_string()))?;

        let plaintext = String::from_utf8(plaintext)
            .map_err(|_| EngineError::Config("Decrypted credential is not UTF-8".to_string()))?;

        Ok(SecretString::from(plaintext))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let cipher = AesGcmCipher::generate();
        let credential = SecretString::from("sk-test-credential".to_string());

        let stored = cipher.encrypt(&credential).unwrap();
        assert!(!stored.contains("sk-test-credential"));

        let recovered = cipher.decrypt(&stored).unwrap();
        assert_eq!(recovered.expose_secret(), "sk-test-credential");
    }

    #[test]
    fn test_distinct_nonces() {
        let cipher = AesGcmCipher::generate();
        let credential = SecretString::from("same-input".to_string());

        let a = cipher.encrypt(&credential).unwrap();
        let b = cipher.encrypt(&credential).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_key_fails() {
        let cipher = AesGcmCipher::generate();
        let other = AesGcmCipher::generate();

        let stored = cipher
            .encrypt(&SecretString::from("secret".to_string()))
            .unwrap();
        assert!(other.decrypt(&stored).is_err());
    }

    #[test]
    fn test_corrupted_ciphertext_fails() {
        let cipher = AesGcmCipher::generate();
        assert!(cipher.decrypt("not-base64!!!").is_err());
        assert!(cipher.decrypt("c2hvcnQ=").is_err());
    }

    #[test]
    fn test_key_base64_roundtrip() {
        let cipher = AesGcmCipher::generate();
        let encoded = BASE64.encode(cipher.key);
        let reloaded = AesGcmCipher::from_base64(&encoded).unwrap();

        let stored = cipher
            .encrypt(&SecretString::from("credential".to_string()))
            .unwrap();
        assert_eq!(reloaded.decrypt(&stored).unwrap().expose_secret(), "credential");
    }

    proptest! {
        #[test]
        fn prop_roundtrip_any_credential(credential in "[ -~]{1,256}") {
            let cipher = AesGcmCipher::new([7u8; 32]);
            let stored = cipher
                .encrypt(&SecretString::from(credential.clone()))
                .unwrap();
            let recovered = cipher.decrypt(&stored).unwrap();
            prop_assert_eq!(recovered.expose_secret(), credential.as_str());
        }
    }
}
