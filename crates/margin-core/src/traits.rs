//! Collaborator contracts.
//!
//! These traits define the interfaces that concrete gateways must satisfy,
//! enabling pluggable transports and testability. Transport is the
//! implementor's concern; only the contract matters to callers.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// DOCUMENT STORE
// =============================================================================

/// Document store: fetch, replace, append, list and create documents.
#[async_trait]
pub trait DocumentGateway: Send + Sync {
    /// Fetch a document's serialized content.
    ///
    /// Fails with `NotFound` if the document is unknown or not owned by `user`.
    async fn get_document(&self, id: &DocumentId, user: &UserId) -> Result<String>;

    /// Replace a document's content (full replace, not patch).
    async fn save_document(&self, id: &DocumentId, user: &UserId, content: &str) -> Result<Ack>;

    /// Concatenate `fragment` onto the document's stored content.
    async fn append_to_document(
        &self,
        id: &DocumentId,
        user: &UserId,
        fragment: &str,
    ) -> Result<Ack>;

    /// List the user's documents.
    async fn list_documents(&self, user: &UserId) -> Result<Vec<DocumentSummary>>;

    /// Create an empty document with the given title.
    async fn create_document(&self, user: &UserId, title: &str) -> Result<DocumentSummary>;
}

// =============================================================================
// ASSET HOST
// =============================================================================

/// Binary asset host.
#[async_trait]
pub trait AssetUploader: Send + Sync {
    /// Upload an asset and return its public URL. Fails with `Upload` on rejection.
    async fn upload_asset(&self, asset: Asset) -> Result<AssetUrl>;
}

// =============================================================================
// CHAT TRANSCRIPT STORE
// =============================================================================

/// Remote chat transcript store.
#[async_trait]
pub trait ChatGateway: Send + Sync {
    /// Create or reuse the chat for a (user, context) pair. Idempotent per pair.
    async fn initialize_chat(&self, user: &UserId, context: &ContextId) -> Result<ChatId>;

    /// Fetch the ordered transcript of a chat.
    async fn get_chat_history(
        &self,
        chat: &ChatId,
        user: &UserId,
        context: &ContextId,
    ) -> Result<Vec<Message>>;

    /// Append one message to a chat transcript.
    async fn append_message(&self, chat: &ChatId, user: &UserId, message: &Message)
        -> Result<Ack>;
}

// =============================================================================
// ASSISTANT
// =============================================================================

/// Conversational assistant answering questions about a context.
#[async_trait]
pub trait AssistantBackend: Send + Sync {
    /// Answer `query` using the material identified by `context`.
    async fn query_assistant(&self, context: &ContextId, query: &str) -> Result<String>;

    /// Get the backend name for logging.
    fn backend_name(&self) -> &'static str {
        "assistant"
    }
}
