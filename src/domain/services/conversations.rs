#[cfg(test)]
#[path = "conversations_test.rs"]
mod tests;

use std::path;

use anyhow::bail;
use anyhow::Result;
use async_trait::async_trait;
use chrono::DateTime;
use chrono::Local;
use chrono::SecondsFormat;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::domain::models::Conversation;
use crate::domain::models::ConversationStore;
use crate::domain::models::Message;
use crate::domain::models::Role;

pub struct Conversations {
    pub cache_dir: path::PathBuf,
}

impl Default for Conversations {
    fn default() -> Conversations {
        let cache_dir = dirs::cache_dir().unwrap().join("concierge/conversations");

        return Conversations::new(cache_dir);
    }
}

impl Conversations {
    pub fn new(cache_dir: path::PathBuf) -> Conversations {
        return Conversations { cache_dir };
    }

    pub fn create_id() -> String {
        return Uuid::new_v4()
            .to_string()
            .split('-')
            .enumerate()
            .filter_map(|(idx, str)| {
                if idx > 1 {
                    return None;
                }
                return Some(str);
            })
            .collect::<Vec<&str>>()
            .join("-");
    }

    fn get_file_path(&self, id: &str) -> path::PathBuf {
        return self.cache_dir.join(format!("{id}.yaml"));
    }

    /// Returns all conversations, each trimmed down to its first user
    /// message to save on memory.
    pub async fn list_all(&self) -> Result<Vec<Conversation>> {
        let mut conversations: Vec<Conversation> = vec![];
        if !self.cache_dir.exists() {
            return Ok(conversations);
        }

        let mut dir = fs::read_dir(&self.cache_dir).await?;
        while let Some(file) = dir.next_entry().await? {
            let payload = fs::read_to_string(file.path()).await?;
            let mut conversation: Conversation = serde_yaml::from_str(&payload)?;
            let user_messages = conversation
                .messages
                .iter()
                .filter(|e| return e.role == Role::User)
                .collect::<Vec<&Message>>();
            if !user_messages.is_empty() {
                conversation.messages = vec![user_messages[0].clone()];
            } else {
                conversation.messages = vec![];
            }

            conversations.push(conversation);
        }

        conversations.sort_by_cached_key(|conversation| {
            return DateTime::parse_from_rfc3339(&conversation.timestamp).unwrap();
        });

        return Ok(conversations);
    }

    pub async fn load(&self, id: &str) -> Result<Conversation> {
        let file_path = self.get_file_path(id);
        if !file_path.exists() {
            bail!(format!("No conversation found for id {id}"));
        }

        let payload = fs::read_to_string(file_path).await?;
        let conversation: Conversation = serde_yaml::from_str(&payload)?;

        return Ok(conversation);
    }

    pub async fn save(&self, id: &str, messages: &[Message]) -> Result<()> {
        let conversation = Conversation {
            id: id.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Local::now().to_rfc3339_opts(SecondsFormat::Secs, false),
            messages: messages.to_vec(),
        };

        let payload = serde_yaml::to_string(&conversation)?;

        if !self.cache_dir.exists() {
            fs::create_dir_all(&self.cache_dir).await?;
        }

        let mut file = fs::File::create(self.get_file_path(id)).await?;
        file.write_all(payload.as_bytes()).await?;

        return Ok(());
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        let file_path = self.get_file_path(id);
        if !file_path.exists() {
            return Ok(());
        }

        fs::remove_file(file_path).await?;
        return Ok(());
    }

    pub async fn delete_all(&self) -> Result<()> {
        if !self.cache_dir.exists() {
            return Ok(());
        }

        fs::remove_dir_all(&self.cache_dir).await?;
        return Ok(());
    }
}

#[async_trait]
impl ConversationStore for Conversations {
    async fn append(&self, conversation_id: &str, role: Role, content: &str) -> Result<()> {
        let mut messages = match self.load(conversation_id).await {
            Ok(conversation) => conversation.messages,
            Err(_) => vec![],
        };

        messages.push(Message::new(role, content));
        return self.save(conversation_id, &messages).await;
    }

    async fn list(&self, conversation_id: &str) -> Result<Vec<Message>> {
        if !self.get_file_path(conversation_id).exists() {
            return Ok(vec![]);
        }

        let conversation = self.load(conversation_id).await?;
        return Ok(conversation.messages);
    }
}
