use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use super::Message;
use super::Role;

#[async_trait]
pub trait ConversationStore {
    /// Best-effort append of one exchanged message. Idempotency is neither
    /// guaranteed nor required.
    async fn append(&self, conversation_id: &str, role: Role, content: &str) -> Result<()>;

    /// Returns the stored messages of a conversation oldest-first, or an
    /// empty list when the conversation does not exist yet.
    async fn list(&self, conversation_id: &str) -> Result<Vec<Message>>;
}

pub type SharedStore = Arc<dyn ConversationStore + Send + Sync>;
