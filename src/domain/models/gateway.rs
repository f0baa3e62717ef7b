use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_derive::Deserialize;
use serde_derive::Serialize;
use tokio::sync::mpsc;

use super::GatewayError;
use super::Message;
use super::Outfit;
use super::Role;
use super::WardrobeItem;

/// One role/content pair of forwarded conversation history. Nothing else
/// about a message crosses the wire.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
}

impl HistoryEntry {
    pub fn from_message(message: &Message) -> HistoryEntry {
        return HistoryEntry {
            role: message.role,
            content: message.content.to_string(),
        };
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatPrompt {
    pub user_id: String,
    pub text: String,
    pub history: Vec<HistoryEntry>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamEvent {
    Opened(),
    Delta(String),
    Completed(),
}

#[async_trait]
pub trait ChatGateway {
    /// Used at startup to verify the gateway is reachable before the first
    /// prompt is sent.
    async fn health_check(&self) -> Result<()>;

    /// Requests a completion for the prompt. Stream events are pushed through
    /// the channel in arrival order: `Opened` once the gateway accepts the
    /// request, one `Delta` per decoded text fragment, and a final
    /// `Completed` when the stream terminates.
    async fn stream_reply<'a>(
        &self,
        prompt: ChatPrompt,
        tx: &'a mpsc::UnboundedSender<StreamEvent>,
    ) -> Result<(), GatewayError>;

    /// Requests outfit combinations for a wardrobe. Single request/response
    /// with the same status-code semantics as `stream_reply`.
    async fn suggest_outfits(&self, items: &[WardrobeItem]) -> Result<Vec<Outfit>, GatewayError>;
}

pub type SharedGateway = Arc<dyn ChatGateway + Send + Sync>;
