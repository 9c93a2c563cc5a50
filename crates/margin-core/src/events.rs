//! Client event types, envelope schema, and event bus for user-facing notices.
//!
//! Editor sessions, chat engines, the image pipeline and the capture pipeline
//! all report outcomes on one broadcast channel. The surrounding screens
//! subscribe and render notices; failures reported here never alter local
//! state (editor buffer, optimistic chat entries).

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::{AssetUrl, ChatId, ContextId, DocumentId};

// ============================================================================
// Event Envelope
// ============================================================================

/// Actor metadata for event attribution.
#[derive(Debug, Clone, Serialize)]
pub struct EventActor {
    /// Actor type: `"system"`, `"user"`, or `"assistant"`.
    pub kind: String,
    /// Optional actor identifier (user id).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl EventActor {
    /// Background activity (autosave, uploads).
    pub fn system() -> Self {
        Self {
            kind: "system".to_string(),
            id: None,
        }
    }

    /// A signed-in user.
    pub fn user(id: impl Into<String>) -> Self {
        Self {
            kind: "user".to_string(),
            id: Some(id.into()),
        }
    }

    /// The chat assistant.
    pub fn assistant() -> Self {
        Self {
            kind: "assistant".to_string(),
            id: None,
        }
    }
}

/// Versioned envelope around a [`ClientEvent`].
///
/// The `event_type` field uses dot-namespaced names (e.g. `"document.saved"`).
#[derive(Debug, Clone, Serialize)]
pub struct EventEnvelope {
    /// Unique event identifier (UUIDv7 for temporal ordering).
    pub event_id: Uuid,
    /// Namespaced event type.
    pub event_type: String,
    /// When the event occurred (UTC).
    pub occurred_at: DateTime<Utc>,
    /// Who/what caused this event.
    pub actor: EventActor,
    /// Type of entity this event relates to (`"document"`, `"chat"`).
    pub entity_type: &'static str,
    /// Id of the entity this event relates to.
    pub entity_id: String,
    /// How the notice should be surfaced.
    pub level: NoticeLevel,
    /// Domain-specific event data.
    pub payload: ClientEvent,
}

impl EventEnvelope {
    /// Wrap an event with the system actor.
    pub fn new(event: ClientEvent) -> Self {
        Self::with_actor(event, EventActor::system())
    }

    /// Wrap an event with an explicit actor.
    pub fn with_actor(event: ClientEvent, actor: EventActor) -> Self {
        Self {
            event_id: crate::uuid_utils::new_v7(),
            event_type: event.namespaced_event_type().to_string(),
            occurred_at: Utc::now(),
            actor,
            entity_type: event.entity_type(),
            entity_id: event.entity_id(),
            level: event.level(),
            payload: event,
        }
    }
}

/// How a notice is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    /// Informational; may be shown briefly or not at all.
    Info,
    /// Non-blocking failure; local state is preserved.
    Transient,
    /// The interaction cannot continue (e.g. a document failed to load).
    Blocking,
}

/// Stage of the send protocol that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SendStage {
    /// Persisting the user's message to the transcript store.
    PersistUser,
    /// Querying the assistant.
    Query,
    /// Persisting the assistant's reply.
    PersistReply,
}

// ============================================================================
// Client Event (domain payloads)
// ============================================================================

/// Events reported to the surrounding screens.
///
/// Serialized as JSON with a `type` tag field, e.g.
/// `{"type":"SaveFailed","document_id":"d1","error":"..."}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// An editor session hydrated a document.
    DocumentLoaded {
        document_id: DocumentId,
        degraded: bool,
    },
    /// A document load failed; no editor was mounted.
    LoadFailed {
        document_id: DocumentId,
        error: String,
    },
    /// Stored content was malformed and is shown as plain text.
    ContentDegraded {
        document_id: DocumentId,
        error: String,
    },
    /// An autosave or flush completed.
    DocumentSaved {
        document_id: DocumentId,
        bytes: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        revision: Option<u64>,
    },
    /// A save failed; the editor buffer is unchanged.
    SaveFailed {
        document_id: DocumentId,
        error: String,
    },
    /// An image was uploaded and embedded.
    ImageInserted {
        document_id: DocumentId,
        url: AssetUrl,
    },
    /// An image upload failed; nothing was inserted.
    UploadFailed {
        document_id: DocumentId,
        error: String,
    },
    /// A new document was created.
    DocumentCreated { document_id: DocumentId, title: String },
    /// A chat reached Ready.
    ChatReady {
        chat_id: ChatId,
        context_id: ContextId,
        message_count: usize,
    },
    /// Chat initialisation or history fetch failed.
    ChatUnavailable {
        context_id: ContextId,
        error: String,
    },
    /// A send failed at `stage`; the optimistic entry stays visible.
    MessageFailed {
        chat_id: ChatId,
        stage: SendStage,
        error: String,
    },
    /// Captured text was appended to a document.
    CaptureAppended { document_id: DocumentId, bytes: usize },
    /// A capture append failed.
    CaptureFailed {
        document_id: DocumentId,
        error: String,
    },
}

impl ClientEvent {
    /// Returns the short event type name.
    pub fn event_type(&self) -> &'static str {
        match self {
            ClientEvent::DocumentLoaded { .. } => "DocumentLoaded",
            ClientEvent::LoadFailed { .. } => "LoadFailed",
            ClientEvent::ContentDegraded { .. } => "ContentDegraded",
            ClientEvent::DocumentSaved { .. } => "DocumentSaved",
            ClientEvent::SaveFailed { .. } => "SaveFailed",
            ClientEvent::ImageInserted { .. } => "ImageInserted",
            ClientEvent::UploadFailed { .. } => "UploadFailed",
            ClientEvent::DocumentCreated { .. } => "DocumentCreated",
            ClientEvent::ChatReady { .. } => "ChatReady",
            ClientEvent::ChatUnavailable { .. } => "ChatUnavailable",
            ClientEvent::MessageFailed { .. } => "MessageFailed",
            ClientEvent::CaptureAppended { .. } => "CaptureAppended",
            ClientEvent::CaptureFailed { .. } => "CaptureFailed",
        }
    }

    /// Returns the namespaced event type for the envelope.
    pub fn namespaced_event_type(&self) -> &'static str {
        match self {
            ClientEvent::DocumentLoaded { .. } => "document.loaded",
            ClientEvent::LoadFailed { .. } => "document.load_failed",
            ClientEvent::ContentDegraded { .. } => "document.degraded",
            ClientEvent::DocumentSaved { .. } => "document.saved",
            ClientEvent::SaveFailed { .. } => "document.save_failed",
            ClientEvent::ImageInserted { .. } => "image.inserted",
            ClientEvent::UploadFailed { .. } => "image.upload_failed",
            ClientEvent::DocumentCreated { .. } => "document.created",
            ClientEvent::ChatReady { .. } => "chat.ready",
            ClientEvent::ChatUnavailable { .. } => "chat.unavailable",
            ClientEvent::MessageFailed { .. } => "chat.message_failed",
            ClientEvent::CaptureAppended { .. } => "capture.appended",
            ClientEvent::CaptureFailed { .. } => "capture.failed",
        }
    }

    /// Returns the entity type this event relates to.
    pub fn entity_type(&self) -> &'static str {
        match self {
            ClientEvent::ChatReady { .. }
            | ClientEvent::ChatUnavailable { .. }
            | ClientEvent::MessageFailed { .. } => "chat",
            _ => "document",
        }
    }

    /// Returns the primary entity id this event relates to.
    pub fn entity_id(&self) -> String {
        match self {
            ClientEvent::DocumentLoaded { document_id, .. }
            | ClientEvent::LoadFailed { document_id, .. }
            | ClientEvent::ContentDegraded { document_id, .. }
            | ClientEvent::DocumentSaved { document_id, .. }
            | ClientEvent::SaveFailed { document_id, .. }
            | ClientEvent::ImageInserted { document_id, .. }
            | ClientEvent::UploadFailed { document_id, .. }
            | ClientEvent::DocumentCreated { document_id, .. }
            | ClientEvent::CaptureAppended { document_id, .. }
            | ClientEvent::CaptureFailed { document_id, .. } => document_id.to_string(),
            ClientEvent::ChatReady { chat_id, .. } | ClientEvent::MessageFailed { chat_id, .. } => {
                chat_id.to_string()
            }
            ClientEvent::ChatUnavailable { context_id, .. } => context_id.to_string(),
        }
    }

    /// Returns how the event should be surfaced.
    pub fn level(&self) -> NoticeLevel {
        match self {
            ClientEvent::LoadFailed { .. } => NoticeLevel::Blocking,
            ClientEvent::ContentDegraded { .. }
            | ClientEvent::SaveFailed { .. }
            | ClientEvent::UploadFailed { .. }
            | ClientEvent::ChatUnavailable { .. }
            | ClientEvent::MessageFailed { .. }
            | ClientEvent::CaptureFailed { .. } => NoticeLevel::Transient,
            _ => NoticeLevel::Info,
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Broadcast-based event bus for distributing client events to subscribers.
///
/// Slow receivers that fall behind receive a `Lagged` error and miss events.
pub struct EventBus {
    tx: broadcast::Sender<EventEnvelope>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Emit an event with the system actor. Silently dropped without subscribers.
    pub fn emit(&self, event: ClientEvent) {
        self.send(EventEnvelope::new(event));
    }

    /// Emit an event attributed to `actor`.
    pub fn emit_as(&self, event: ClientEvent, actor: EventActor) {
        self.send(EventEnvelope::with_actor(event, actor));
    }

    fn send(&self, envelope: EventEnvelope) {
        tracing::debug!(
            event_type = %envelope.event_type,
            event_id = %envelope.event_id,
            subscriber_count = self.tx.receiver_count(),
            "EventBus emit"
        );
        let _ = self.tx.send(envelope);
    }

    /// Subscribe to receive enveloped events.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.tx.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(crate::defaults::EVENT_BUS_CAPACITY)
    }
}

// ============================================================================
// Tests
// ============================================================================
