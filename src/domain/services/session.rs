#[cfg(test)]
#[path = "session_test.rs"]
mod tests;

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::domain::models::ChatGateway;
use crate::domain::models::ChatPrompt;
use crate::domain::models::ConversationStore;
use crate::domain::models::DeliveryStatus;
use crate::domain::models::Event;
use crate::domain::models::HistoryEntry;
use crate::domain::models::Message;
use crate::domain::models::Notice;
use crate::domain::models::Role;
use crate::domain::models::SharedGateway;
use crate::domain::models::SharedStore;
use crate::domain::models::StreamEvent;
use crate::domain::models::SubmitError;

/// Most recent messages forwarded to the gateway with each prompt. Bounds
/// request size; stored history is never truncated.
pub const HISTORY_WINDOW: usize = 10;

pub const GREETING: &str = "Hello! I'm your AI retail concierge. I can help you with styling advice, product recommendations, order tracking, and more. How can I assist you today?";

/// One conversation's worth of chat state. All mutation funnels through
/// `start` and `send`; the display layer only ever observes events and the
/// message list.
pub struct ChatSession {
    conversation_id: String,
    user_id: String,
    messages: Vec<Message>,
    busy: bool,
    cancel: CancellationToken,
    gateway: SharedGateway,
    store: SharedStore,
}

impl ChatSession {
    pub fn new(
        conversation_id: &str,
        user_id: &str,
        gateway: SharedGateway,
        store: SharedStore,
    ) -> ChatSession {
        return ChatSession {
            conversation_id: conversation_id.to_string(),
            user_id: user_id.to_string(),
            messages: vec![],
            busy: false,
            cancel: CancellationToken::new(),
            gateway,
            store,
        };
    }

    pub fn conversation_id(&self) -> &str {
        return &self.conversation_id;
    }

    pub fn messages(&self) -> &[Message] {
        return &self.messages;
    }

    pub fn is_busy(&self) -> bool {
        return self.busy;
    }

    /// Token tied to the in-flight reply cycle, if any. Cancelling rolls the
    /// cycle back like a transport failure, minus the error notice.
    pub fn cancellation_token(&self) -> CancellationToken {
        return self.cancel.clone();
    }

    /// Loads stored history for the conversation, oldest first. A missing or
    /// unreadable conversation degrades to a fresh one seeded with a greeting
    /// that is never persisted.
    pub async fn start(&mut self, tx: &mpsc::UnboundedSender<Event>) {
        let history = match self.store.list(&self.conversation_id).await {
            Ok(messages) => messages,
            Err(err) => {
                tracing::warn!(
                    error = ?err,
                    conversation_id = %self.conversation_id,
                    "failed to read stored conversation"
                );
                vec![]
            }
        };

        if history.is_empty() {
            self.messages = vec![Message::new(Role::Assistant, GREETING)];
        } else {
            self.messages = history;
        }

        emit(tx, Event::ConversationLoaded(self.messages.clone()));
    }

    /// Runs one full prompt/reply cycle. Preconditions are checked before any
    /// state is touched; afterwards the outcome is only observable through
    /// the message list, the busy flag, and the emitted events.
    pub async fn send(
        &mut self,
        text: &str,
        tx: &mpsc::UnboundedSender<Event>,
    ) -> Result<(), SubmitError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(SubmitError::EmptyPrompt);
        }
        if self.busy {
            return Err(SubmitError::Busy);
        }

        let user_idx = self.messages.len();
        self.messages.push(Message::user(trimmed));
        self.busy = true;
        self.messages[user_idx].advance_delivery(DeliveryStatus::Sent);

        // Best effort. The reply cycle proceeds whether or not the store
        // accepted the message, but the attempt completes before any further
        // delivery transition.
        if let Err(err) = self
            .store
            .append(&self.conversation_id, Role::User, trimmed)
            .await
        {
            tracing::warn!(error = ?err, "failed to persist user message");
        }

        let prompt = ChatPrompt {
            user_id: self.user_id.to_string(),
            text: trimmed.to_string(),
            history: self.history_window(user_idx),
        };

        emit(tx, Event::ReplyTyping());

        let (stream_tx, mut stream_rx) = mpsc::unbounded_channel::<StreamEvent>();
        let gateway = Arc::clone(&self.gateway);
        let cancel = self.cancel.clone();
        let request = async move {
            return gateway.stream_reply(prompt, &stream_tx).await;
        };
        tokio::pin!(request);

        let mut placeholder: Option<usize> = None;

        // Stream events are applied one at a time, in arrival order, while
        // the request future runs.
        let result = loop {
            tokio::select! {
                res = &mut request => {
                    break res;
                }
                event = stream_rx.recv() => {
                    if let Some(event) = event {
                        placeholder = self.apply_stream_event(event, placeholder, tx);
                    }
                }
                _ = cancel.cancelled() => {
                    self.rollback(user_idx, placeholder);
                    self.cancel = CancellationToken::new();
                    self.busy = false;
                    emit(tx, Event::ReplyAborted());
                    return Ok(());
                }
            }
        };

        if let Err(err) = result {
            tracing::error!(error = %err, "reply cycle failed");
            self.rollback(user_idx, placeholder);
            self.busy = false;
            emit(tx, Event::ReplyFailed(Notice::from_gateway(&err)));
            return Ok(());
        }

        // The request resolved; whatever it pushed before finishing is still
        // queued in order.
        while let Ok(event) = stream_rx.try_recv() {
            placeholder = self.apply_stream_event(event, placeholder, tx);
        }

        if placeholder.is_none() {
            self.rollback(user_idx, None);
            self.busy = false;
            emit(
                tx,
                Event::ReplyFailed(Notice::Failed("the gateway returned an empty reply".to_string())),
            );
            return Ok(());
        }

        let reply = self.messages[placeholder.unwrap()].content.to_string();
        if let Err(err) = self
            .store
            .append(&self.conversation_id, Role::Assistant, &reply)
            .await
        {
            tracing::warn!(error = ?err, "failed to persist assistant reply");
        }

        self.messages[user_idx].advance_delivery(DeliveryStatus::Delivered);
        self.busy = false;
        emit(tx, Event::ReplyCompleted());

        return Ok(());
    }

    fn apply_stream_event(
        &mut self,
        event: StreamEvent,
        placeholder: Option<usize>,
        tx: &mpsc::UnboundedSender<Event>,
    ) -> Option<usize> {
        match event {
            StreamEvent::Opened() => {
                if placeholder.is_some() {
                    return placeholder;
                }

                self.messages.push(Message::new(Role::Assistant, ""));
                return Some(self.messages.len() - 1);
            }
            StreamEvent::Delta(text) => {
                let idx = match placeholder {
                    Some(idx) => idx,
                    None => {
                        self.messages.push(Message::new(Role::Assistant, ""));
                        self.messages.len() - 1
                    }
                };

                self.messages[idx].append(&text);
                emit(tx, Event::ReplyDelta(text));
                return Some(idx);
            }
            StreamEvent::Completed() => {
                return placeholder;
            }
        }
    }

    /// Drops the assistant placeholder of a failed cycle and marks the
    /// triggering user message failed. The message list never keeps an
    /// assistant entry that will receive no further deltas.
    fn rollback(&mut self, user_idx: usize, placeholder: Option<usize>) {
        if let Some(idx) = placeholder {
            self.messages.remove(idx);
        }
        self.messages[user_idx].advance_delivery(DeliveryStatus::Failed);
    }

    fn history_window(&self, end: usize) -> Vec<HistoryEntry> {
        let start = end.saturating_sub(HISTORY_WINDOW);
        return self.messages[start..end]
            .iter()
            .map(|message| return HistoryEntry::from_message(message))
            .collect();
    }
}

fn emit(tx: &mpsc::UnboundedSender<Event>, event: Event) {
    if tx.send(event).is_err() {
        tracing::warn!("display layer dropped its event channel");
    }
}
