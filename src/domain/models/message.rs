#[cfg(test)]
#[path = "message_test.rs"]
mod tests;

use chrono::Local;
use chrono::SecondsFormat;
use serde_derive::Deserialize;
use serde_derive::Serialize;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Sending,
    Sent,
    Delivered,
    Failed,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_status: Option<DeliveryStatus>,
}

impl Message {
    pub fn new(role: Role, content: &str) -> Message {
        return Message {
            role,
            content: content.to_string(),
            timestamp: timestamp(),
            delivery_status: None,
        };
    }

    /// A freshly submitted user message. Delivery starts at `Sending` and
    /// only ever advances through `advance_delivery`.
    pub fn user(content: &str) -> Message {
        return Message {
            role: Role::User,
            content: content.to_string(),
            timestamp: timestamp(),
            delivery_status: Some(DeliveryStatus::Sending),
        };
    }

    pub fn append(&mut self, text: &str) {
        self.content += text;
    }

    /// Applies a delivery transition. Legal transitions are
    /// sending -> sent -> delivered, with failed reachable from sending and
    /// sent. Anything else is ignored and logged.
    pub fn advance_delivery(&mut self, next: DeliveryStatus) {
        let legal = matches!(
            (self.delivery_status, next),
            (Some(DeliveryStatus::Sending), DeliveryStatus::Sent)
                | (Some(DeliveryStatus::Sent), DeliveryStatus::Delivered)
                | (Some(DeliveryStatus::Sending), DeliveryStatus::Failed)
                | (Some(DeliveryStatus::Sent), DeliveryStatus::Failed)
        );

        if !legal {
            tracing::warn!(
                current = ?self.delivery_status,
                requested = ?next,
                "ignoring illegal delivery transition"
            );
            return;
        }

        self.delivery_status = Some(next);
    }
}

fn timestamp() -> String {
    return Local::now().to_rfc3339_opts(SecondsFormat::Secs, false);
}
