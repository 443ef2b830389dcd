//! Conversation Manager
//!
//! Multi-turn chat with a bounded context window. A conversation only ever
//! accumulates messages in creation order; the provider request is always
//! `[system prompt, last N stored messages]` where the newly persisted user
//! message is the most recent of the N.

use std::sync::Arc;

use tracing::{debug, info};

use crate::constants::{chat, pricing};
use crate::provider::{ChatMessage, CompletionRequest, with_timeout};
use crate::storage::{self, SharedDatabase};
use crate::types::{
    Conversation, ConversationMessage, EngineError, MessageRole, OwnerId, Result, UsageCategory,
};
use crate::vault::CredentialVault;

const CHAT_INSTRUCTION: &str =
    "You are a helpful assistant for sales and marketing work. Be concise and concrete.";

/// A conversation with its messages in creation order.
#[derive(Debug, Clone)]
pub struct ConversationView {
    pub conversation: Conversation,
    pub messages: Vec<ConversationMessage>,
}

/// The caller-facing result of one chat turn.
#[derive(Debug, Clone)]
pub struct ChatReply {
    pub reply: String,
    pub tokens_used: u32,
    pub cost: f64,
}

pub struct ConversationManager {
    db: SharedDatabase,
    vault: Arc<CredentialVault>,
    window: usize,
}

impl ConversationManager {
    pub fn new(db: SharedDatabase, vault: Arc<CredentialVault>) -> Self {
        Self {
            db,
            vault,
            window: chat::CONTEXT_WINDOW_MESSAGES,
        }
    }

    /// Override the context window size (configuration hook).
    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window;
        self
    }

    pub fn create(
        &self,
        owner: &OwnerId,
        title: &str,
        context: Option<String>,
    ) -> Result<Conversation> {
        let conversation = Conversation {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner.clone(),
            title: title.to_string(),
            context,
            created_at: chrono::Utc::now(),
        };
        self.db.insert_conversation(&conversation)?;
        debug!(owner = %owner, conversation = %conversation.id, "Conversation created");
        Ok(conversation)
    }

    /// The conversation and all its messages, in creation order.
    pub fn get(&self, owner: &OwnerId, conversation_id: &str) -> Result<ConversationView> {
        let conversation = self.owned_conversation(owner, conversation_id)?;
        let messages = self.db.list_messages(conversation_id)?;
        Ok(ConversationView {
            conversation,
            messages,
        })
    }

    /// Run one chat turn: persist the user message, assemble the bounded
    /// context window, invoke the provider, then persist the reply and its
    /// usage increment in one transaction.
    pub async fn send_message(
        &self,
        owner: &OwnerId,
        conversation_id: &str,
        text: &str,
    ) -> Result<ChatReply> {
        let conversation = self.owned_conversation(owner, conversation_id)?;

        self.db
            .insert_message(conversation_id, MessageRole::User, text, None)?;

        let window = self.db.recent_messages(conversation_id, self.window)?;

        let mut messages = Vec::with_capacity(window.len() + 1);
        messages.push(ChatMessage::system(system_prompt(&conversation)));
        for message in &window {
            messages.push(ChatMessage {
                role: message.role.as_str().to_string(),
                content: message.content.clone(),
            });
        }

        let client = self.vault.get_client(owner).await?;
        let settings = self
            .db
            .get_provider_settings(owner)?
            .filter(|s| s.active)
            .ok_or_else(|| {
                EngineError::Configuration(format!(
                    "No active provider settings for owner {}",
                    owner
                ))
            })?;

        let request = CompletionRequest {
            messages,
            temperature: settings.temperature,
            max_tokens: settings.max_output_tokens,
            json_mode: false,
        };

        let completion = with_timeout(
            self.vault.request_timeout(),
            client.complete(request),
            "chat request",
        )
        .await?;

        let tokens_used = completion.usage.total();
        let cost = f64::from(tokens_used) * pricing::rate_per_token(&completion.model);

        let day = chrono::Utc::now().date_naive();
        self.db.transaction(|conn| {
            storage::insert_message(
                conn,
                conversation_id,
                MessageRole::Assistant,
                &completion.text,
                Some(tokens_used),
            )?;
            storage::record_usage(
                conn,
                owner,
                day,
                UsageCategory::Chat,
                u64::from(tokens_used),
                cost,
            )
        })?;

        info!(
            owner = %owner,
            conversation = conversation_id,
            tokens = tokens_used,
            "Chat turn completed"
        );

        Ok(ChatReply {
            reply: completion.text,
            tokens_used,
            cost,
        })
    }

    /// Absent conversations read as not-found; foreign ones as permission
    /// errors.
    fn owned_conversation(&self, owner: &OwnerId, conversation_id: &str) -> Result<Conversation> {
        let conversation = self
            .db
            .get_conversation(conversation_id)?
            .ok_or_else(|| EngineError::not_found("conversation", conversation_id))?;

        if conversation.owner_id != *owner {
            return Err(EngineError::Permission(format!(
                "conversation {} is not owned by {}",
                conversation_id, owner
            )));
        }
        Ok(conversation)
    }
}

/// Base assistant instruction plus the conversation's free-text context.
fn system_prompt(conversation: &Conversation) -> String {
    match &conversation.context {
        Some(context) => format!("{}\nContext: {}", CHAT_INSTRUCTION, context),
        None => CHAT_INSTRUCTION.to_string(),
    }
}
