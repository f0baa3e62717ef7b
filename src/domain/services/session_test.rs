use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::bail;
use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time;

use super::ChatSession;
use super::GREETING;
use crate::domain::models::ChatGateway;
use crate::domain::models::ChatPrompt;
use crate::domain::models::ConversationStore;
use crate::domain::models::DeliveryStatus;
use crate::domain::models::Event;
use crate::domain::models::GatewayError;
use crate::domain::models::Message;
use crate::domain::models::Notice;
use crate::domain::models::Outfit;
use crate::domain::models::Role;
use crate::domain::models::StreamEvent;
use crate::domain::models::SubmitError;
use crate::domain::models::WardrobeItem;

enum MockOutcome {
    Succeed,
    RateLimited,
    PaymentRequired,
    Transport,
    Hang,
}

struct MockGateway {
    script: Vec<StreamEvent>,
    outcome: MockOutcome,
    seen: Mutex<Vec<ChatPrompt>>,
}

impl MockGateway {
    fn new(script: Vec<StreamEvent>, outcome: MockOutcome) -> Arc<MockGateway> {
        return Arc::new(MockGateway {
            script,
            outcome,
            seen: Mutex::new(vec![]),
        });
    }

    fn replying(fragments: &[&str]) -> Arc<MockGateway> {
        let mut script = vec![StreamEvent::Opened()];
        for fragment in fragments {
            script.push(StreamEvent::Delta(fragment.to_string()));
        }
        script.push(StreamEvent::Completed());

        return MockGateway::new(script, MockOutcome::Succeed);
    }
}

#[async_trait]
impl ChatGateway for MockGateway {
    async fn health_check(&self) -> Result<()> {
        return Ok(());
    }

    async fn stream_reply<'a>(
        &self,
        prompt: ChatPrompt,
        tx: &'a mpsc::UnboundedSender<StreamEvent>,
    ) -> Result<(), GatewayError> {
        self.seen.lock().unwrap().push(prompt);

        for event in &self.script {
            tx.send(event.clone()).unwrap();
        }

        match self.outcome {
            MockOutcome::Succeed => return Ok(()),
            MockOutcome::RateLimited => return Err(GatewayError::RateLimited),
            MockOutcome::PaymentRequired => return Err(GatewayError::PaymentRequired),
            MockOutcome::Transport => {
                return Err(GatewayError::Transport("connection reset".to_string()))
            }
            MockOutcome::Hang => {
                futures::future::pending::<()>().await;
                return Ok(());
            }
        }
    }

    async fn suggest_outfits(&self, _items: &[WardrobeItem]) -> Result<Vec<Outfit>, GatewayError> {
        return Ok(vec![]);
    }
}

#[derive(Default)]
struct MockStore {
    seed: Vec<Message>,
    appended: Mutex<Vec<(Role, String)>>,
    fail_reads: bool,
    fail_writes: bool,
}

impl MockStore {
    fn empty() -> Arc<MockStore> {
        return Arc::new(MockStore::default());
    }

    fn seeded(messages: Vec<Message>) -> Arc<MockStore> {
        return Arc::new(MockStore {
            seed: messages,
            ..MockStore::default()
        });
    }
}

#[async_trait]
impl ConversationStore for MockStore {
    async fn append(&self, _conversation_id: &str, role: Role, content: &str) -> Result<()> {
        if self.fail_writes {
            bail!("store offline");
        }

        self.appended.lock().unwrap().push((role, content.to_string()));
        return Ok(());
    }

    async fn list(&self, _conversation_id: &str) -> Result<Vec<Message>> {
        if self.fail_reads {
            bail!("store offline");
        }

        return Ok(self.seed.clone());
    }
}

fn session_with(gateway: Arc<MockGateway>, store: Arc<MockStore>) -> ChatSession {
    return ChatSession::new("convo-1", "shopper-1", gateway, store);
}

fn drain(rx: &mut mpsc::UnboundedReceiver<Event>) -> Vec<Event> {
    let mut events: Vec<Event> = vec![];
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }

    return events;
}

#[tokio::test]
async fn it_seeds_a_greeting_for_new_conversations() {
    let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
    let mut session = session_with(MockGateway::replying(&[]), MockStore::empty());
    session.start(&tx).await;

    assert_eq!(session.messages().len(), 1);
    assert_eq!(session.messages()[0].role, Role::Assistant);
    assert_eq!(session.messages()[0].content, GREETING);

    let events = drain(&mut rx);
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], Event::ConversationLoaded(messages) if messages.len() == 1));
}

#[tokio::test]
async fn it_replays_stored_history() {
    let seed = vec![
        Message::new(Role::User, "Any kurta sets?"),
        Message::new(Role::Assistant, "Plenty! Cotton or silk?"),
    ];

    let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
    let mut session = session_with(MockGateway::replying(&[]), MockStore::seeded(seed));
    session.start(&tx).await;

    assert_eq!(session.messages().len(), 2);
    assert_eq!(session.messages()[0].content, "Any kurta sets?");
    assert_eq!(session.messages()[1].content, "Plenty! Cotton or silk?");

    drain(&mut rx);
}

#[tokio::test]
async fn it_degrades_to_a_greeting_when_the_store_is_unreadable() {
    let store = Arc::new(MockStore {
        fail_reads: true,
        ..MockStore::default()
    });

    let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
    let mut session = session_with(MockGateway::replying(&[]), store);
    session.start(&tx).await;

    assert_eq!(session.messages().len(), 1);
    assert_eq!(session.messages()[0].content, GREETING);

    drain(&mut rx);
}

#[tokio::test]
async fn it_sends_and_assembles_a_reply() {
    let gateway = MockGateway::replying(&["Linen ", "shirts ", "and chinos."]);
    let store = MockStore::empty();

    let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
    let mut session = session_with(gateway.clone(), store.clone());
    session.start(&tx).await;
    drain(&mut rx);

    session.send("Suggest a summer outfit", &tx).await.unwrap();

    // Exactly one user and one assistant message appended after the greeting.
    assert_eq!(session.messages().len(), 3);

    let user = &session.messages()[1];
    assert_eq!(user.role, Role::User);
    assert_eq!(user.content, "Suggest a summer outfit");
    assert_eq!(user.delivery_status, Some(DeliveryStatus::Delivered));

    let assistant = &session.messages()[2];
    assert_eq!(assistant.role, Role::Assistant);
    assert_eq!(assistant.content, "Linen shirts and chinos.");

    assert!(!session.is_busy());

    let appended = store.appended.lock().unwrap();
    assert_eq!(appended.len(), 2);
    assert_eq!(appended[0], (Role::User, "Suggest a summer outfit".to_string()));
    assert_eq!(appended[1], (Role::Assistant, "Linen shirts and chinos.".to_string()));

    let events = drain(&mut rx);
    assert!(matches!(events[0], Event::ReplyTyping()));
    assert!(matches!(&events[1], Event::ReplyDelta(text) if text == "Linen "));
    assert!(matches!(&events[2], Event::ReplyDelta(text) if text == "shirts "));
    assert!(matches!(&events[3], Event::ReplyDelta(text) if text == "and chinos."));
    assert!(matches!(events[4], Event::ReplyCompleted()));
    assert_eq!(events.len(), 5);
}

#[tokio::test]
async fn it_trims_prompt_whitespace() {
    let gateway = MockGateway::replying(&["Sure."]);

    let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
    let mut session = session_with(gateway.clone(), MockStore::empty());
    session.start(&tx).await;
    drain(&mut rx);

    session.send("  Show me sneakers  ", &tx).await.unwrap();

    assert_eq!(session.messages()[1].content, "Show me sneakers");
    assert_eq!(gateway.seen.lock().unwrap()[0].text, "Show me sneakers");
}

#[tokio::test]
async fn it_rolls_back_on_rate_limits() {
    let gateway = MockGateway::new(vec![], MockOutcome::RateLimited);

    let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
    let mut session = session_with(gateway, MockStore::empty());
    session.start(&tx).await;
    drain(&mut rx);

    session.send("Suggest a summer outfit", &tx).await.unwrap();

    // No assistant message survives a failed cycle.
    assert_eq!(session.messages().len(), 2);
    assert_eq!(
        session.messages()[1].delivery_status,
        Some(DeliveryStatus::Failed)
    );
    assert!(!session.is_busy());

    let events = drain(&mut rx);
    assert!(matches!(events[0], Event::ReplyTyping()));
    assert!(matches!(&events[1], Event::ReplyFailed(Notice::RateLimited)));
    assert_eq!(events.len(), 2);
}

#[tokio::test]
async fn it_rolls_back_discarding_partial_replies() {
    let gateway = MockGateway::new(
        vec![
            StreamEvent::Opened(),
            StreamEvent::Delta("Linen ".to_string()),
        ],
        MockOutcome::Transport,
    );

    let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
    let mut session = session_with(gateway, MockStore::empty());
    session.start(&tx).await;
    drain(&mut rx);

    session.send("Suggest a summer outfit", &tx).await.unwrap();

    assert_eq!(session.messages().len(), 2);
    assert_eq!(session.messages()[1].role, Role::User);
    assert_eq!(
        session.messages()[1].delivery_status,
        Some(DeliveryStatus::Failed)
    );
    assert!(!session.is_busy());

    let events = drain(&mut rx);
    assert!(matches!(
        events.last(),
        Some(Event::ReplyFailed(Notice::Failed(_)))
    ));
}

#[tokio::test]
async fn it_surfaces_credit_exhaustion_as_nonretryable() {
    let gateway = MockGateway::new(vec![], MockOutcome::PaymentRequired);

    let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
    let mut session = session_with(gateway, MockStore::empty());
    session.start(&tx).await;
    drain(&mut rx);

    session.send("Suggest a summer outfit", &tx).await.unwrap();

    let events = drain(&mut rx);
    let failed = events.iter().find_map(|event| {
        if let Event::ReplyFailed(notice) = event {
            return Some(notice.clone());
        }
        return None;
    });

    assert_eq!(failed, Some(Notice::OutOfCredits));
    assert!(!failed.unwrap().is_retryable());
}

#[tokio::test]
async fn it_rejects_empty_prompts_before_any_side_effect() {
    let store = MockStore::empty();

    let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
    let mut session = session_with(MockGateway::replying(&[]), store.clone());
    session.start(&tx).await;
    drain(&mut rx);

    let res = session.send("   ", &tx).await;

    assert_eq!(res, Err(SubmitError::EmptyPrompt));
    assert_eq!(session.messages().len(), 1);
    assert!(!session.is_busy());
    assert!(store.appended.lock().unwrap().is_empty());
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn it_rejects_prompts_while_busy() {
    let gateway = MockGateway::replying(&[]);
    let store = MockStore::empty();

    let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
    let mut session = session_with(gateway.clone(), store.clone());
    session.start(&tx).await;
    drain(&mut rx);

    session.busy = true;
    let res = session.send("Suggest a summer outfit", &tx).await;

    assert_eq!(res, Err(SubmitError::Busy));
    assert_eq!(session.messages().len(), 1);
    assert!(store.appended.lock().unwrap().is_empty());
    assert!(gateway.seen.lock().unwrap().is_empty());
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn it_truncates_forwarded_history() {
    let mut seed: Vec<Message> = vec![];
    for n in 1..=12 {
        seed.push(Message::new(Role::User, &format!("message {n}")));
    }

    let gateway = MockGateway::replying(&["Noted."]);

    let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
    let mut session = session_with(gateway.clone(), MockStore::seeded(seed));
    session.start(&tx).await;
    drain(&mut rx);

    session.send("Do you have matching shoes?", &tx).await.unwrap();

    let seen = gateway.seen.lock().unwrap();
    let history = &seen[0].history;

    // Only the ten most recent prior messages go out, oldest first, and the
    // new prompt is never part of them.
    assert_eq!(history.len(), 10);
    assert_eq!(history[0].content, "message 3");
    assert_eq!(history[9].content, "message 12");
    assert!(history
        .iter()
        .all(|entry| return entry.content != "Do you have matching shoes?"));

    // The stored conversation itself is untouched by the window.
    assert_eq!(session.messages().len(), 14);
}

#[tokio::test]
async fn it_keeps_streaming_when_persistence_fails() {
    let store = Arc::new(MockStore {
        fail_writes: true,
        ..MockStore::default()
    });

    let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
    let mut session = session_with(MockGateway::replying(&["Linen."]), store);
    session.start(&tx).await;
    drain(&mut rx);

    session.send("Suggest a summer outfit", &tx).await.unwrap();

    assert_eq!(session.messages().len(), 3);
    assert_eq!(
        session.messages()[1].delivery_status,
        Some(DeliveryStatus::Delivered)
    );
    assert_eq!(session.messages()[2].content, "Linen.");
    assert!(!session.is_busy());

    let events = drain(&mut rx);
    assert!(matches!(events.last(), Some(Event::ReplyCompleted())));
}

#[tokio::test]
async fn it_rolls_back_an_empty_reply_stream() {
    let gateway = MockGateway::new(vec![], MockOutcome::Succeed);

    let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
    let mut session = session_with(gateway, MockStore::empty());
    session.start(&tx).await;
    drain(&mut rx);

    session.send("Suggest a summer outfit", &tx).await.unwrap();

    assert_eq!(session.messages().len(), 2);
    assert_eq!(
        session.messages()[1].delivery_status,
        Some(DeliveryStatus::Failed)
    );

    let events = drain(&mut rx);
    assert!(matches!(
        events.last(),
        Some(Event::ReplyFailed(Notice::Failed(_)))
    ));
}

#[tokio::test]
async fn it_rolls_back_when_cancelled() {
    let gateway = MockGateway::new(
        vec![
            StreamEvent::Opened(),
            StreamEvent::Delta("Linen ".to_string()),
        ],
        MockOutcome::Hang,
    );

    let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
    let mut session = session_with(gateway, MockStore::empty());
    session.start(&tx).await;
    drain(&mut rx);

    let token = session.cancellation_token();
    tokio::spawn(async move {
        time::sleep(Duration::from_millis(50)).await;
        token.cancel();
    });

    session.send("Suggest a summer outfit", &tx).await.unwrap();

    assert_eq!(session.messages().len(), 2);
    assert_eq!(
        session.messages()[1].delivery_status,
        Some(DeliveryStatus::Failed)
    );
    assert!(!session.is_busy());

    let events = drain(&mut rx);
    assert!(matches!(events.last(), Some(Event::ReplyAborted())));

    // The next cycle gets a fresh token.
    assert!(!session.cancellation_token().is_cancelled());
}
