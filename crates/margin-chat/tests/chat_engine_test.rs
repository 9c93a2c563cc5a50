//! ChatEngine against the in-memory chat store and the mock assistant.

use std::sync::Arc;

use async_trait::async_trait;
use margin_chat::{ChatEngine, ChatState};
use margin_core::{
    Ack, AppContext, AssistantBackend, ChatGateway, ChatId, ClientConfig, ClientEvent, ContextId,
    Error, Message, Result, SendStage, Sender, UserId,
};
use margin_gateway::{MemoryGateway, Operation};
use margin_inference::MockAssistant;

fn context_with(gateway: &MemoryGateway, assistant: Arc<dyn AssistantBackend>) -> AppContext {
    let shared = Arc::new(gateway.clone());
    AppContext::new(
        shared.clone(),
        shared.clone(),
        assistant,
        shared,
        ClientConfig::default(),
    )
}

fn engine(ctx: &AppContext) -> ChatEngine {
    ChatEngine::new(ctx.clone(), UserId::from("u1"), ContextId::from("v1"))
}

/// Chat store whose assistant-reply appends fail.
struct RejectReplies(MemoryGateway);

#[async_trait]
impl ChatGateway for RejectReplies {
    async fn initialize_chat(&self, user: &UserId, context: &ContextId) -> Result<ChatId> {
        self.0.initialize_chat(user, context).await
    }

    async fn get_chat_history(
        &self,
        chat: &ChatId,
        user: &UserId,
        context: &ContextId,
    ) -> Result<Vec<Message>> {
        self.0.get_chat_history(chat, user, context).await
    }

    async fn append_message(&self, chat: &ChatId, user: &UserId, message: &Message) -> Result<Ack> {
        if message.sender.is_assistant() {
            return Err(Error::Network("transcript store unavailable".into()));
        }
        self.0.append_message(chat, user, message).await
    }
}

#[tokio::test]
async fn test_mount_fresh_chat_is_ready_and_empty() {
    let gateway = MemoryGateway::new();
    let ctx = context_with(&gateway, Arc::new(MockAssistant::new()));
    let mut events = ctx.events.subscribe();
    let mut chat = engine(&ctx);
    assert_eq!(chat.state(), ChatState::Uninitialized);

    chat.mount().await.unwrap();

    assert_eq!(chat.state(), ChatState::Ready);
    assert_eq!(chat.chat_id(), Some(&ChatId::from("c1")));
    assert!(chat.transcript().is_empty());
    let envelope = events.try_recv().unwrap();
    assert!(matches!(
        envelope.payload,
        ClientEvent::ChatReady { message_count: 0, .. }
    ));
}

#[tokio::test]
async fn test_chat_id_is_memoised_per_context() {
    let gateway = MemoryGateway::new();
    let ctx = context_with(&gateway, Arc::new(MockAssistant::new()));

    let mut first = engine(&ctx);
    first.mount().await.unwrap();
    let mut second = engine(&ctx);
    second.mount().await.unwrap();

    assert_eq!(first.chat_id(), second.chat_id());
    assert_eq!(gateway.call_count(Operation::InitializeChat), 1);
    assert_eq!(gateway.call_count(Operation::GetChatHistory), 2);

    // Remounting a ready engine is a no-op.
    second.mount().await.unwrap();
    assert_eq!(gateway.call_count(Operation::GetChatHistory), 2);
}

#[tokio::test]
async fn test_initialize_is_idempotent_across_contexts() {
    let gateway = MemoryGateway::new();
    let mut a = engine(&context_with(&gateway, Arc::new(MockAssistant::new())));
    let mut b = engine(&context_with(&gateway, Arc::new(MockAssistant::new())));
    a.mount().await.unwrap();
    b.mount().await.unwrap();

    assert_eq!(gateway.call_count(Operation::InitializeChat), 2);
    assert_eq!(a.chat_id(), b.chat_id());
}

#[tokio::test]
async fn test_send_rejected_before_ready_or_blank() {
    let gateway = MemoryGateway::new();
    let ctx = context_with(&gateway, Arc::new(MockAssistant::new()));
    let mut chat = engine(&ctx);

    assert!(matches!(chat.send("hi").await, Err(Error::NotReady(_))));
    chat.mount().await.unwrap();
    assert!(matches!(chat.send("   ").await, Err(Error::InvalidInput(_))));
    assert!(chat.transcript().is_empty());
    assert_eq!(gateway.call_count(Operation::AppendMessage), 0);
}

#[tokio::test]
async fn test_successful_send_appends_user_then_assistant() {
    let gateway = MemoryGateway::new();
    let assistant = MockAssistant::new().with_response_mapping("What is ATP?", "Energy currency.");
    let ctx = context_with(&gateway, Arc::new(assistant.clone()));
    let mut chat = engine(&ctx);
    chat.mount().await.unwrap();

    let report = chat.send("What is ATP?").await.unwrap();
    assert!(report.is_complete());
    assert_eq!(chat.state(), ChatState::Ready);

    let transcript = chat.transcript();
    assert_eq!(transcript.len(), 2);
    assert_eq!(transcript[0].id, report.user_entry);
    assert_eq!(transcript[0].message.sender, Sender::User(UserId::from("u1")));
    assert_eq!(Some(transcript[1].id), report.assistant_entry);
    assert!(transcript[1].message.sender.is_assistant());
    assert_eq!(transcript[1].message.text, "Energy currency.");
    assert!(transcript.iter().all(|e| e.confirmed));

    let stored = gateway.transcript(&ChatId::from("c1"));
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[1].sender.label(), "assistant");
    assert_eq!(assistant.get_calls()[0].context, ContextId::from("v1"));
}

#[tokio::test]
async fn test_failed_query_keeps_only_user_entry() {
    let gateway = MemoryGateway::new();
    let ctx = context_with(&gateway, Arc::new(MockAssistant::new().with_failure_rate(1.0)));
    let mut events = ctx.events.subscribe();
    let mut chat = engine(&ctx);
    chat.mount().await.unwrap();

    let report = chat.send("Why?").await.unwrap();

    let failure = report.failure.expect("query should fail");
    assert_eq!(failure.stage, SendStage::Query);
    assert_eq!(report.assistant_entry, None);
    let transcript = chat.transcript();
    assert_eq!(transcript.len(), 1);
    assert!(transcript[0].confirmed);
    assert_eq!(chat.state(), ChatState::Ready);

    let failed: Vec<_> = std::iter::from_fn(|| events.try_recv().ok())
        .filter(|e| matches!(e.payload, ClientEvent::MessageFailed { .. }))
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].event_type, "chat.message_failed");
}

#[tokio::test]
async fn test_failed_persist_keeps_unconfirmed_entry() {
    let gateway = MemoryGateway::new();
    let assistant = MockAssistant::new();
    let ctx = context_with(&gateway, Arc::new(assistant.clone()));
    let mut chat = engine(&ctx);
    chat.mount().await.unwrap();
    gateway.fail(Operation::AppendMessage);

    let report = chat.send("typed offline").await.unwrap();

    assert_eq!(report.failure.unwrap().stage, SendStage::PersistUser);
    let transcript = chat.transcript();
    assert_eq!(transcript.len(), 1);
    assert!(!transcript[0].confirmed);
    assert_eq!(transcript[0].message.text, "typed offline");
    assert_eq!(assistant.query_count(), 0);

    // The next send goes through; nothing was rolled back.
    gateway.recover(Operation::AppendMessage);
    assert!(chat.send("again").await.unwrap().is_complete());
    assert_eq!(chat.transcript().len(), 3);
}

#[tokio::test]
async fn test_failed_reply_persist_keeps_reply_visible() {
    let gateway = MemoryGateway::new();
    let shared = Arc::new(gateway.clone());
    let ctx = AppContext::new(
        shared.clone(),
        Arc::new(RejectReplies(gateway.clone())),
        Arc::new(MockAssistant::new()),
        shared,
        ClientConfig::default(),
    );
    let mut chat = engine(&ctx);
    chat.mount().await.unwrap();

    let report = chat.send("q").await.unwrap();

    assert_eq!(report.failure.unwrap().stage, SendStage::PersistReply);
    let transcript = chat.transcript();
    assert_eq!(transcript.len(), 2);
    assert!(transcript[0].confirmed);
    assert!(!transcript[1].confirmed);
    assert_eq!(transcript[1].message.text, "Mock answer: q");
}

#[tokio::test]
async fn test_init_failure_leaves_engine_uninitialized() {
    let gateway = MemoryGateway::new();
    let ctx = context_with(&gateway, Arc::new(MockAssistant::new()));
    let mut events = ctx.events.subscribe();
    let mut chat = engine(&ctx);
    gateway.fail(Operation::InitializeChat);

    assert!(matches!(chat.mount().await, Err(Error::Network(_))));
    assert_eq!(chat.state(), ChatState::Uninitialized);
    assert!(matches!(chat.send("hi").await, Err(Error::NotReady(_))));
    assert!(matches!(
        events.try_recv().unwrap().payload,
        ClientEvent::ChatUnavailable { .. }
    ));

    gateway.recover(Operation::InitializeChat);
    chat.mount().await.unwrap();
    assert_eq!(chat.state(), ChatState::Ready);
}

#[tokio::test]
async fn test_history_failure_still_ready() {
    let gateway = MemoryGateway::new();
    let ctx = context_with(&gateway, Arc::new(MockAssistant::new()));
    let mut events = ctx.events.subscribe();
    gateway.fail(Operation::GetChatHistory);
    let mut chat = engine(&ctx);

    chat.mount().await.unwrap();

    assert_eq!(chat.state(), ChatState::Ready);
    assert!(chat.transcript().is_empty());
    assert!(matches!(
        events.try_recv().unwrap().payload,
        ClientEvent::ChatUnavailable { .. }
    ));
    assert!(chat.send("still works").await.unwrap().is_complete());
}

#[tokio::test]
async fn test_history_is_loaded_confirmed_in_order() {
    let gateway = MemoryGateway::new();
    let mut first = engine(&context_with(&gateway, Arc::new(MockAssistant::new())));
    first.mount().await.unwrap();
    first.send("one").await.unwrap();
    first.send("two").await.unwrap();

    let mut later = engine(&context_with(&gateway, Arc::new(MockAssistant::new())));
    later.mount().await.unwrap();

    let texts: Vec<String> = later
        .transcript()
        .into_iter()
        .map(|e| e.message.text)
        .collect();
    assert_eq!(
        texts,
        vec!["one", "Mock answer: one", "two", "Mock answer: two"]
    );
    assert!(later.transcript().iter().all(|e| e.confirmed));
}

#[tokio::test(start_paused = true)]
async fn test_user_entry_visible_while_assistant_thinks() {
    let gateway = MemoryGateway::new();
    let ctx = context_with(&gateway, Arc::new(MockAssistant::new().with_latency_ms(5_000)));
    let mut chat = engine(&ctx);
    chat.mount().await.unwrap();
    let mut watcher = chat.subscribe();

    let (report, seen) = tokio::join!(chat.send("slow question"), async {
        watcher.changed().await.unwrap();
        let seen = watcher.borrow_and_update().clone();
        seen
    });

    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].message.text, "slow question");
    assert!(report.unwrap().is_complete());
    assert_eq!(chat.transcript().len(), 2);
}
