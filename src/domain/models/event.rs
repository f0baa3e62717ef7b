#[cfg(test)]
#[path = "event_test.rs"]
mod tests;

use std::fmt;

use super::GatewayError;
use super::Message;
use super::Outfit;

/// User-facing wording for a failed exchange. Only gateway-cycle failures
/// surface here; persistence problems never reach the display layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notice {
    RateLimited,
    OutOfCredits,
    Failed(String),
}

impl Notice {
    pub fn from_gateway(err: &GatewayError) -> Notice {
        match err {
            GatewayError::RateLimited => return Notice::RateLimited,
            GatewayError::PaymentRequired => return Notice::OutOfCredits,
            GatewayError::Transport(msg) => return Notice::Failed(msg.to_string()),
        }
    }

    pub fn is_retryable(&self) -> bool {
        return !matches!(self, Notice::OutOfCredits);
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::RateLimited => {
                return write!(f, "Too many requests. Please wait a moment and try again.");
            }
            Notice::OutOfCredits => {
                return write!(f, "The concierge service requires credits. Please contact support.");
            }
            Notice::Failed(msg) => {
                return write!(f, "Failed to get a response from the concierge: {msg}");
            }
        }
    }
}

/// Everything the display layer can observe about a session.
#[derive(Debug)]
pub enum Event {
    ConversationLoaded(Vec<Message>),
    ReplyTyping(),
    ReplyDelta(String),
    ReplyCompleted(),
    ReplyFailed(Notice),
    ReplyAborted(),
    OutfitsSuggested(Vec<Outfit>),
    Notice(Notice),
}
