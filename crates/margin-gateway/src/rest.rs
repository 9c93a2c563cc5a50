//! REST gateway for the notes API.
//!
//! | Contract | Endpoint |
//! |----------|----------|
//! | `get_document` | `POST /api/get-note` `{user_id, note_id}` → `{note_content}` |
//! | `save_document` | `POST /api/add_to_note` `{note_id, text, user_id}` (full replace) |
//! | `append_to_document` | `POST /api/append_to_note` `{note_id, text, user_id}` |
//! | `list_documents` | `GET /api/get-user-notes/{user_id}` → `[{id, title, ...}]` |
//! | `create_document` | `POST /api/create-note` `{user_id, title, content}` → `{id, title}` |
//! | `initialize_chat` | `POST /api/initialize_chat` `{user_id, video_id}` → `{chat_id}` |
//! | `get_chat_history` | `POST /api/get_chat_history` `{chat_id, user_id, video_id}` → `{chat_content}` |
//! | `append_message` | `POST /api/add_message` `{chat_id, user_id, message, sender}` |
//! | `query_assistant` | `POST /api/queryVideo` `{user_id, video_id, query}` → `{response}` |
//!
//! HTTP 404 maps to `NotFound`; any other non-success status to `Network`
//! (`Assistant` for the query endpoint).

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use margin_core::defaults::HTTP_TIMEOUT_SECS;
use margin_core::{
    Ack, AssistantBackend, ChatGateway, ChatId, ClientConfig, ContextId, DocumentGateway,
    DocumentId, DocumentSummary, Error, Message, Result, Sender, UserId,
};

/// Gateway to the notes REST API.
#[derive(Clone)]
pub struct RestGateway {
    client: Client,
    base_url: String,
    /// User on whose behalf assistant queries are made.
    query_user: Option<UserId>,
}

impl RestGateway {
    /// Create a gateway with the default timeout.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_timeout(base_url, Duration::from_secs(HTTP_TIMEOUT_SECS))
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            query_user: None,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::with_timeout(&config.api_url, config.http_timeout())
    }

    /// Attribute assistant queries to `user` (the endpoint requires a user id).
    pub fn with_query_user(mut self, user: UserId) -> Self {
        self.query_user = Some(user);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_json<B: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R> {
        let response = self.send(self.client.post(self.url(path)).json(body), path).await?;
        response
            .json::<R>()
            .await
            .map_err(|e| Error::Network(format!("{}: invalid response body: {}", path, e)))
    }

    async fn post_ack<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Ack> {
        let response = self.send(self.client.post(self.url(path)).json(body), path).await?;
        let bytes = response.bytes().await?;
        // The API does not always report a revision.
        Ok(serde_json::from_slice::<Ack>(&bytes).unwrap_or_default())
    }

    async fn send(&self, request: reqwest::RequestBuilder, path: &str) -> Result<Response> {
        let start = Instant::now();
        let response = request
            .send()
            .await
            .map_err(|e| Error::Network(format!("{}: request failed: {}", path, e)))?;
        let status = response.status();
        debug!(
            subsystem = "gateway",
            op = path,
            status = status.as_u16(),
            duration_ms = start.elapsed().as_millis() as u64,
            "REST call"
        );
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(status_error(path, status, &body))
    }
}

fn status_error(path: &str, status: StatusCode, body: &str) -> Error {
    if status == StatusCode::NOT_FOUND {
        Error::NotFound(format!("{}: {}", path, body))
    } else {
        Error::Network(format!("{} returned {}: {}", path, status, body))
    }
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Serialize)]
struct NoteRef<'a> {
    user_id: &'a str,
    note_id: &'a str,
}

#[derive(Serialize)]
struct NoteText<'a> {
    note_id: &'a str,
    text: &'a str,
    user_id: &'a str,
}

#[derive(Deserialize)]
struct NoteContent {
    #[serde(default)]
    note_content: Option<String>,
}

#[derive(Serialize)]
struct CreateNote<'a> {
    user_id: &'a str,
    title: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct NoteSummary {
    #[serde(alias = "_id", alias = "note_id")]
    id: serde_json::Value,
    #[serde(default)]
    title: Option<String>,
}

impl NoteSummary {
    fn into_summary(self) -> DocumentSummary {
        let id = match self.id {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        DocumentSummary {
            id: DocumentId::from(id),
            title: self.title.unwrap_or_default(),
        }
    }
}

#[derive(Serialize)]
struct InitChat<'a> {
    user_id: &'a str,
    video_id: &'a str,
}

#[derive(Deserialize)]
struct ChatIdResponse {
    chat_id: serde_json::Value,
}

#[derive(Serialize)]
struct HistoryRequest<'a> {
    chat_id: &'a str,
    user_id: &'a str,
    video_id: &'a str,
}

#[derive(Deserialize)]
struct HistoryResponse {
    #[serde(default)]
    chat_content: Option<Vec<WireMessage>>,
}

#[derive(Deserialize)]
struct WireMessage {
    sender: String,
    message: String,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
}

impl From<WireMessage> for Message {
    fn from(wire: WireMessage) -> Self {
        Message {
            sender: Sender::from(wire.sender),
            text: wire.message,
            timestamp: wire.timestamp.unwrap_or_else(Utc::now),
        }
    }
}

#[derive(Serialize)]
struct AddMessage<'a> {
    chat_id: &'a str,
    user_id: &'a str,
    message: &'a str,
    sender: &'a str,
    timestamp: DateTime<Utc>,
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    user_id: &'a str,
    video_id: &'a str,
    query: &'a str,
}

#[derive(Deserialize)]
struct QueryResponse {
    response: String,
}

// =============================================================================
// CONTRACTS
// =============================================================================

#[async_trait]
impl DocumentGateway for RestGateway {
    #[instrument(skip(self), fields(subsystem = "gateway", op = "get_document"))]
    async fn get_document(&self, id: &DocumentId, user: &UserId) -> Result<String> {
        let body = NoteRef {
            user_id: user.as_str(),
            note_id: id.as_str(),
        };
        let response: NoteContent = self.post_json("/api/get-note", &body).await?;
        Ok(response.note_content.unwrap_or_default())
    }

    #[instrument(skip(self, content), fields(subsystem = "gateway", op = "save_document", bytes = content.len()))]
    async fn save_document(&self, id: &DocumentId, user: &UserId, content: &str) -> Result<Ack> {
        let body = NoteText {
            note_id: id.as_str(),
            text: content,
            user_id: user.as_str(),
        };
        self.post_ack("/api/add_to_note", &body).await
    }

    #[instrument(skip(self, fragment), fields(subsystem = "gateway", op = "append_to_document", bytes = fragment.len()))]
    async fn append_to_document(
        &self,
        id: &DocumentId,
        user: &UserId,
        fragment: &str,
    ) -> Result<Ack> {
        let body = NoteText {
            note_id: id.as_str(),
            text: fragment,
            user_id: user.as_str(),
        };
        self.post_ack("/api/append_to_note", &body).await
    }

    #[instrument(skip(self), fields(subsystem = "gateway", op = "list_documents"))]
    async fn list_documents(&self, user: &UserId) -> Result<Vec<DocumentSummary>> {
        let path = format!("/api/get-user-notes/{}", user);
        let response = self.send(self.client.get(self.url(&path)), &path).await?;
        let notes: Vec<NoteSummary> = response
            .json()
            .await
            .map_err(|e| Error::Network(format!("{}: invalid response body: {}", path, e)))?;
        Ok(notes.into_iter().map(NoteSummary::into_summary).collect())
    }

    #[instrument(skip(self), fields(subsystem = "gateway", op = "create_document"))]
    async fn create_document(&self, user: &UserId, title: &str) -> Result<DocumentSummary> {
        let body = CreateNote {
            user_id: user.as_str(),
            title,
            content: "",
        };
        let note: NoteSummary = self.post_json("/api/create-note", &body).await?;
        let mut summary = note.into_summary();
        if summary.title.is_empty() {
            summary.title = title.to_string();
        }
        Ok(summary)
    }
}

#[async_trait]
impl ChatGateway for RestGateway {
    #[instrument(skip(self), fields(subsystem = "gateway", op = "initialize_chat"))]
    async fn initialize_chat(&self, user: &UserId, context: &ContextId) -> Result<ChatId> {
        let body = InitChat {
            user_id: user.as_str(),
            video_id: context.as_str(),
        };
        let response: ChatIdResponse = self.post_json("/api/initialize_chat", &body).await?;
        let id = match response.chat_id {
            serde_json::Value::String(s) => s,
            serde_json::Value::Null => {
                return Err(Error::Network("initialize_chat returned no chat id".into()))
            }
            other => other.to_string(),
        };
        Ok(ChatId::from(id))
    }

    #[instrument(skip(self), fields(subsystem = "gateway", op = "get_chat_history"))]
    async fn get_chat_history(
        &self,
        chat: &ChatId,
        user: &UserId,
        context: &ContextId,
    ) -> Result<Vec<Message>> {
        let body = HistoryRequest {
            chat_id: chat.as_str(),
            user_id: user.as_str(),
            video_id: context.as_str(),
        };
        let response: HistoryResponse = self.post_json("/api/get_chat_history", &body).await?;
        Ok(response
            .chat_content
            .unwrap_or_default()
            .into_iter()
            .map(Message::from)
            .collect())
    }

    #[instrument(skip(self, message), fields(subsystem = "gateway", op = "append_message", sender = message.sender.label()))]
    async fn append_message(
        &self,
        chat: &ChatId,
        user: &UserId,
        message: &Message,
    ) -> Result<Ack> {
        let body = AddMessage {
            chat_id: chat.as_str(),
            user_id: user.as_str(),
            message: &message.text,
            sender: message.sender.label(),
            timestamp: message.timestamp,
        };
        self.post_ack("/api/add_message", &body).await
    }
}

#[async_trait]
impl AssistantBackend for RestGateway {
    #[instrument(skip(self, query), fields(subsystem = "assistant", op = "query", query_len = query.len()))]
    async fn query_assistant(&self, context: &ContextId, query: &str) -> Result<String> {
        let start = Instant::now();
        let body = QueryRequest {
            user_id: self.query_user.as_ref().map(UserId::as_str).unwrap_or_default(),
            video_id: context.as_str(),
            query,
        };
        let response: QueryResponse = self
            .post_json("/api/queryVideo", &body)
            .await
            .map_err(|e| match e {
                Error::NotFound(msg) | Error::Network(msg) => Error::Assistant(msg),
                other => other,
            })?;

        let elapsed = start.elapsed().as_millis() as u64;
        if elapsed > margin_core::defaults::SLOW_ASSISTANT_MS {
            warn!(duration_ms = elapsed, slow = true, "Slow assistant query");
        }
        Ok(response.response)
    }

    fn backend_name(&self) -> &'static str {
        "rest"
    }
}
