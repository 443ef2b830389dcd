//! Tracing Setup
//!
//! The engine itself only emits `tracing` events; installing a subscriber
//! is the embedding application's job. This helper gives binaries the
//! standard setup: `RUST_LOG` wins, otherwise the supplied default filter.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global tracing subscriber.
///
/// Call once at startup; a second call returns an error from the registry
/// rather than panicking.
pub fn init_tracing(default_filter: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;
    Ok(())
}
