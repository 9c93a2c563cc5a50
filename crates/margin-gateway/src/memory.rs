//! In-memory gateway for deterministic testing and offline use.
//!
//! Implements every collaborator contract over process memory, with a call
//! log, per-operation failure injection and optional latency (a
//! `tokio::time::sleep`, so it runs on virtual time under a paused clock).
//!
//! ## Usage
//!
//! ```rust
//! use margin_core::{DocumentGateway, DocumentId, UserId};
//! use margin_gateway::memory::MemoryGateway;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let gateway = MemoryGateway::new();
//!     let user = UserId::from("u1");
//!     gateway.insert_document(&user, "d1", "Notes", "<p>hi</p>");
//!
//!     let content = gateway
//!         .get_document(&DocumentId::from("d1"), &user)
//!         .await
//!         .unwrap();
//!     assert_eq!(content, "<p>hi</p>");
//! }
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use margin_core::{
    Ack, Asset, AssetUploader, AssetUrl, AssistantBackend, ChatGateway, ChatId, ContextId,
    DocumentGateway, DocumentId, DocumentSummary, Error, Message, Result, UserId,
};

/// Collaborator operation, for call logs and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    GetDocument,
    SaveDocument,
    AppendToDocument,
    ListDocuments,
    CreateDocument,
    UploadAsset,
    InitializeChat,
    GetChatHistory,
    AppendMessage,
    QueryAssistant,
}

/// A recorded call with its main textual input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayCall {
    pub operation: Operation,
    pub input: String,
}

#[derive(Debug, Clone)]
struct StoredDocument {
    owner: UserId,
    title: String,
    content: String,
    revision: u64,
}

#[derive(Default)]
struct State {
    documents: HashMap<DocumentId, StoredDocument>,
    document_order: Vec<DocumentId>,
    chats: HashMap<(UserId, ContextId), ChatId>,
    transcripts: HashMap<ChatId, Vec<Message>>,
    failing: HashSet<Operation>,
    calls: Vec<GatewayCall>,
    next_id: u64,
}

/// In-memory document store, chat store, assistant and asset host.
#[derive(Clone, Default)]
pub struct MemoryGateway {
    state: Arc<Mutex<State>>,
    latency: Duration,
    reply_prefix: Option<String>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every operation by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Assistant replies become `"{prefix}{query}"` (default: `"Answer: "`).
    pub fn with_reply_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.reply_prefix = Some(prefix.into());
        self
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // A panic while holding the lock only happens in a failing test.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Store a document owned by `owner`.
    pub fn insert_document(&self, owner: &UserId, id: &str, title: &str, content: &str) {
        let mut state = self.state();
        let id = DocumentId::from(id);
        if !state.documents.contains_key(&id) {
            state.document_order.push(id.clone());
        }
        state.documents.insert(
            id,
            StoredDocument {
                owner: owner.clone(),
                title: title.to_string(),
                content: content.to_string(),
                revision: 0,
            },
        );
    }

    /// Current stored content of a document.
    pub fn document_content(&self, id: &str) -> Option<String> {
        self.state()
            .documents
            .get(&DocumentId::from(id))
            .map(|d| d.content.clone())
    }

    /// Make `operation` fail until [`recover`](Self::recover) is called.
    pub fn fail(&self, operation: Operation) {
        self.state().failing.insert(operation);
    }

    pub fn recover(&self, operation: Operation) {
        self.state().failing.remove(&operation);
    }

    /// All recorded calls, in order.
    pub fn calls(&self) -> Vec<GatewayCall> {
        self.state().calls.clone()
    }

    /// Inputs of the recorded calls to `operation`.
    pub fn calls_to(&self, operation: Operation) -> Vec<String> {
        self.state()
            .calls
            .iter()
            .filter(|c| c.operation == operation)
            .map(|c| c.input.clone())
            .collect()
    }

    pub fn call_count(&self, operation: Operation) -> usize {
        self.calls_to(operation).len()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Stored transcript of a chat.
    pub fn transcript(&self, chat: &ChatId) -> Vec<Message> {
        self.state()
            .transcripts
            .get(chat)
            .cloned()
            .unwrap_or_default()
    }

    /// Record the call, wait out the latency and apply failure injection.
    async fn enter(&self, operation: Operation, input: impl Into<String>) -> Result<()> {
        let failing = {
            let mut state = self.state();
            state.calls.push(GatewayCall {
                operation,
                input: input.into(),
            });
            state.failing.contains(&operation)
        };
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if failing {
            return Err(injected(operation));
        }
        Ok(())
    }

    fn next_id(&self, prefix: &str) -> String {
        let mut state = self.state();
        state.next_id += 1;
        format!("{}{}", prefix, state.next_id)
    }
}

fn injected(operation: Operation) -> Error {
    let message = format!("injected failure in {:?}", operation);
    match operation {
        Operation::UploadAsset => Error::Upload(message),
        Operation::QueryAssistant => Error::Assistant(message),
        _ => Error::Network(message),
    }
}

fn not_found(id: &DocumentId) -> Error {
    Error::NotFound(format!("document {}", id))
}

#[async_trait]
impl DocumentGateway for MemoryGateway {
    async fn get_document(&self, id: &DocumentId, user: &UserId) -> Result<String> {
        self.enter(Operation::GetDocument, id.as_str()).await?;
        let state = self.state();
        match state.documents.get(id) {
            Some(doc) if &doc.owner == user => Ok(doc.content.clone()),
            _ => Err(not_found(id)),
        }
    }

    async fn save_document(&self, id: &DocumentId, user: &UserId, content: &str) -> Result<Ack> {
        self.enter(Operation::SaveDocument, content).await?;
        let mut state = self.state();
        match state.documents.get_mut(id) {
            Some(doc) if &doc.owner == user => {
                doc.content = content.to_string();
                doc.revision += 1;
                Ok(Ack::with_revision(doc.revision))
            }
            _ => Err(not_found(id)),
        }
    }

    async fn append_to_document(
        &self,
        id: &DocumentId,
        user: &UserId,
        fragment: &str,
    ) -> Result<Ack> {
        self.enter(Operation::AppendToDocument, fragment).await?;
        let mut state = self.state();
        match state.documents.get_mut(id) {
            Some(doc) if &doc.owner == user => {
                doc.content.push_str(fragment);
                doc.revision += 1;
                Ok(Ack::with_revision(doc.revision))
            }
            _ => Err(not_found(id)),
        }
    }

    async fn list_documents(&self, user: &UserId) -> Result<Vec<DocumentSummary>> {
        self.enter(Operation::ListDocuments, user.as_str()).await?;
        let state = self.state();
        Ok(state
            .document_order
            .iter()
            .filter_map(|id| {
                state
                    .documents
                    .get(id)
                    .filter(|doc| &doc.owner == user)
                    .map(|doc| DocumentSummary {
                        id: id.clone(),
                        title: doc.title.clone(),
                    })
            })
            .collect())
    }

    async fn create_document(&self, user: &UserId, title: &str) -> Result<DocumentSummary> {
        self.enter(Operation::CreateDocument, title).await?;
        let id = self.next_id("doc-");
        self.insert_document(user, &id, title, "");
        Ok(DocumentSummary {
            id: DocumentId::from(id),
            title: title.to_string(),
        })
    }
}

#[async_trait]
impl ChatGateway for MemoryGateway {
    async fn initialize_chat(&self, user: &UserId, context: &ContextId) -> Result<ChatId> {
        self.enter(Operation::InitializeChat, context.as_str())
            .await?;
        let key = (user.clone(), context.clone());
        if let Some(existing) = self.state().chats.get(&key) {
            return Ok(existing.clone());
        }
        let chat = ChatId::from(self.next_id("c"));
        let mut state = self.state();
        let chat = state.chats.entry(key).or_insert(chat).clone();
        state.transcripts.entry(chat.clone()).or_default();
        Ok(chat)
    }

    async fn get_chat_history(
        &self,
        chat: &ChatId,
        _user: &UserId,
        _context: &ContextId,
    ) -> Result<Vec<Message>> {
        self.enter(Operation::GetChatHistory, chat.as_str()).await?;
        self.state()
            .transcripts
            .get(chat)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("chat {}", chat)))
    }

    async fn append_message(
        &self,
        chat: &ChatId,
        _user: &UserId,
        message: &Message,
    ) -> Result<Ack> {
        self.enter(Operation::AppendMessage, message.text.as_str())
            .await?;
        let mut state = self.state();
        let transcript = state
            .transcripts
            .get_mut(chat)
            .ok_or_else(|| Error::NotFound(format!("chat {}", chat)))?;
        transcript.push(message.clone());
        Ok(Ack::default())
    }
}

#[async_trait]
impl AssistantBackend for MemoryGateway {
    async fn query_assistant(&self, _context: &ContextId, query: &str) -> Result<String> {
        self.enter(Operation::QueryAssistant, query).await?;
        let prefix = self.reply_prefix.as_deref().unwrap_or("Answer: ");
        Ok(format!("{}{}", prefix, query))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[async_trait]
impl AssetUploader for MemoryGateway {
    async fn upload_asset(&self, asset: Asset) -> Result<AssetUrl> {
        self.enter(Operation::UploadAsset, asset.filename.as_str())
            .await?;
        Ok(AssetUrl::from(format!(
            "https://assets.invalid/{}",
            asset.filename
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> UserId {
        UserId::from("u1")
    }

    #[tokio::test]
    async fn test_get_document_checks_owner() {
        let gateway = MemoryGateway::new();
        gateway.insert_document(&user(), "d1", "Notes", "<p>x</p>");

        let id = DocumentId::from("d1");
        assert_eq!(gateway.get_document(&id, &user()).await.unwrap(), "<p>x</p>");
        assert!(matches!(
            gateway.get_document(&id, &UserId::from("u2")).await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            gateway
                .get_document(&DocumentId::from("missing"), &user())
                .await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_save_replaces_append_concatenates() {
        let gateway = MemoryGateway::new();
        gateway.insert_document(&user(), "d1", "Notes", "<p>a</p>");
        let id = DocumentId::from("d1");

        let ack = gateway.save_document(&id, &user(), "<p>b</p>").await.unwrap();
        assert_eq!(ack.revision, Some(1));
        let ack = gateway
            .append_to_document(&id, &user(), "<p>c</p>")
            .await
            .unwrap();
        assert_eq!(ack.revision, Some(2));
        assert_eq!(gateway.document_content("d1").unwrap(), "<p>b</p><p>c</p>");
    }

    #[tokio::test]
    async fn test_initialize_chat_idempotent_per_pair() {
        let gateway = MemoryGateway::new();
        let v1 = ContextId::from("v1");

        let first = gateway.initialize_chat(&user(), &v1).await.unwrap();
        let again = gateway.initialize_chat(&user(), &v1).await.unwrap();
        let other = gateway
            .initialize_chat(&user(), &ContextId::from("v2"))
            .await
            .unwrap();

        assert_eq!(first, again);
        assert_ne!(first, other);
        assert!(gateway
            .get_chat_history(&first, &user(), &v1)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_failure_injection_and_recovery() {
        let gateway = MemoryGateway::new();
        gateway.fail(Operation::QueryAssistant);
        assert!(matches!(
            gateway.query_assistant(&ContextId::from("v1"), "q").await,
            Err(Error::Assistant(_))
        ));

        gateway.recover(Operation::QueryAssistant);
        assert_eq!(
            gateway
                .query_assistant(&ContextId::from("v1"), "q")
                .await
                .unwrap(),
            "Answer: q"
        );
        assert_eq!(gateway.call_count(Operation::QueryAssistant), 2);
    }

    #[tokio::test]
    async fn test_create_and_list_documents() {
        let gateway = MemoryGateway::new();
        gateway.insert_document(&UserId::from("other"), "x", "Theirs", "");
        let created = gateway.create_document(&user(), "Lecture").await.unwrap();

        let listed = gateway.list_documents(&user()).await.unwrap();
        assert_eq!(listed, vec![created]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_uses_virtual_time() {
        let gateway = MemoryGateway::new().with_latency(Duration::from_secs(5));
        let start = tokio::time::Instant::now();
        gateway.list_documents(&user()).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(5));
    }
}
