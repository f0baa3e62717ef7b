#[cfg(test)]
#[path = "actions_test.rs"]
mod tests;

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;

use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::Action;
use crate::domain::models::ChatGateway;
use crate::domain::models::Event;
use crate::domain::models::Notice;
use crate::domain::models::SharedGateway;
use crate::domain::models::SharedStore;
use crate::domain::models::SubmitError;
use crate::domain::services::ChatSession;
use crate::domain::services::Conversations;

pub fn help_text() -> String {
    let text = r#"
COMMANDS:
- /outfits (/o) [WARDROBE_FILE] - Ask the stylist for outfit combinations built from a wardrobe YAML file.
- /abort - Cancel the reply currently being streamed.
- /quit /exit (/q) - Exit the concierge.
- /help (/h) - Provides this help menu.
        "#;

    return text.trim().to_string();
}

pub struct ActionsService {}

impl ActionsService {
    pub async fn start(
        gateway: SharedGateway,
        store: SharedStore,
        tx: mpsc::UnboundedSender<Event>,
        mut rx: mpsc::UnboundedReceiver<Action>,
    ) -> Result<()> {
        let mut conversation_id = Config::get(ConfigKey::ConversationID);
        if conversation_id.is_empty() {
            conversation_id = Conversations::create_id();
            Config::set(ConfigKey::ConversationID, &conversation_id);
        }

        let mut user_id = Config::get(ConfigKey::UserID);
        if user_id.is_empty() {
            user_id = Config::get(ConfigKey::Username);
        }

        if let Err(err) = gateway.health_check().await {
            tracing::warn!(error = ?err, "gateway health check failed");
            tx.send(Event::Notice(Notice::Failed(err.to_string())))?;
        }

        let mut session =
            ChatSession::new(&conversation_id, &user_id, Arc::clone(&gateway), store);
        session.start(&tx).await;
        tracing::debug!(
            conversation_id = session.conversation_id(),
            "conversation ready"
        );

        loop {
            let action = rx.recv().await;
            if action.is_none() {
                // The display layer hung up.
                return Ok(());
            }

            match action.unwrap() {
                Action::SubmitPrompt(text) => {
                    Self::run_reply_cycle(&mut session, &text, &tx, &mut rx).await;
                }
                Action::SuggestOutfits(items) => {
                    match gateway.suggest_outfits(&items).await {
                        Ok(outfits) => tx.send(Event::OutfitsSuggested(outfits))?,
                        Err(err) => {
                            tracing::error!(error = %err, "outfit suggestion request failed");
                            tx.send(Event::Notice(Notice::from_gateway(&err)))?;
                        }
                    };
                }
                Action::AbortReply() => {
                    // No reply in flight, nothing to abort.
                }
            }
        }
    }

    /// Drives one reply cycle while keeping the action channel responsive so
    /// an abort can land mid-stream. Prompts submitted during the cycle are
    /// dropped; the display layer gates its input while waiting.
    async fn run_reply_cycle(
        session: &mut ChatSession,
        text: &str,
        tx: &mpsc::UnboundedSender<Event>,
        rx: &mut mpsc::UnboundedReceiver<Action>,
    ) {
        let cancel = session.cancellation_token();
        let send = session.send(text, tx);
        tokio::pin!(send);

        let result = loop {
            tokio::select! {
                res = &mut send => {
                    break res;
                }
                action = rx.recv() => {
                    match action {
                        Some(Action::AbortReply()) => cancel.cancel(),
                        Some(_) => {}
                        // The display layer hung up; let the cycle finish.
                        None => break (&mut send).await,
                    }
                }
            }
        };

        match result {
            Err(SubmitError::EmptyPrompt) => tracing::debug!("ignored empty prompt"),
            Err(SubmitError::Busy) => tracing::debug!("prompt rejected while a reply is in progress"),
            Ok(()) => {}
        }
    }
}
