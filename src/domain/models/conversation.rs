use serde_derive::Deserialize;
use serde_derive::Serialize;

use super::Message;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub version: String,
    pub timestamp: String,
    pub messages: Vec<Message>,
}
