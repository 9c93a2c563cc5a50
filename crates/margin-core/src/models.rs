//! Shared data model: identifiers, chat messages, transcripts, document summaries, assets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::uuid_utils::new_v7;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Declares an opaque string identifier issued by a collaborator.
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(
    /// Identifier of a stored document (a note).
    DocumentId
);
string_id!(
    /// Identifier of the authenticated user.
    UserId
);
string_id!(
    /// Identifier of a server-side chat transcript.
    ChatId
);
string_id!(
    /// Identifier of the material a chat is about (e.g. a video summary).
    ContextId
);
string_id!(
    /// Public URL of an uploaded asset.
    AssetUrl
);

// =============================================================================
// CHAT MESSAGES
// =============================================================================

/// Who authored a chat message.
///
/// On the wire the sender is a bare string: the user's id, or
/// [`Sender::ASSISTANT_LABEL`] for assistant replies.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Sender {
    User(UserId),
    Assistant,
}

impl Sender {
    pub const ASSISTANT_LABEL: &'static str = "assistant";

    pub fn is_assistant(&self) -> bool {
        matches!(self, Sender::Assistant)
    }

    pub fn label(&self) -> &str {
        match self {
            Sender::User(id) => id.as_str(),
            Sender::Assistant => Self::ASSISTANT_LABEL,
        }
    }
}

impl From<String> for Sender {
    fn from(label: String) -> Self {
        if label == Self::ASSISTANT_LABEL {
            Sender::Assistant
        } else {
            Sender::User(UserId::from(label))
        }
    }
}

impl From<Sender> for String {
    fn from(sender: Sender) -> Self {
        sender.label().to_string()
    }
}

/// A single chat message. Immutable once appended to a transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub sender: Sender,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// A message typed by `user`, stamped now.
    pub fn from_user(user: &UserId, text: impl Into<String>) -> Self {
        Self {
            sender: Sender::User(user.clone()),
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    /// An assistant reply, stamped now.
    pub fn from_assistant(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::Assistant,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

// =============================================================================
// DOCUMENTS AND ASSETS
// =============================================================================

/// Entry of the user's document list (capture-target picker).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub id: DocumentId,
    pub title: String,
}

/// Acknowledgement of a write. `revision` is present when the store tracks one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<u64>,
}

impl Ack {
    pub fn with_revision(revision: u64) -> Self {
        Self {
            revision: Some(revision),
        }
    }
}

/// Binary asset ready for upload.
#[derive(Clone, PartialEq, Eq)]
pub struct Asset {
    /// Collision-free storage name (see `file_safety::upload_filename`).
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl fmt::Debug for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Asset")
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .field("size", &self.bytes.len())
            .finish()
    }
}

// =============================================================================
// TRANSCRIPT
// =============================================================================

/// A message as shown in a chat transcript.
///
/// `confirmed` flips to true once the remote transcript store acknowledged
/// the message. Unconfirmed entries stay visible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEntry {
    /// Local id (UUIDv7), stable for the life of the transcript.
    pub id: Uuid,
    pub message: Message,
    pub confirmed: bool,
}

impl TranscriptEntry {
    /// An entry loaded from the remote transcript.
    pub fn confirmed(message: Message) -> Self {
        Self {
            id: new_v7(),
            message,
            confirmed: true,
        }
    }

    /// An optimistic entry awaiting acknowledgement.
    pub fn pending(message: Message) -> Self {
        Self {
            id: new_v7(),
            message,
            confirmed: false,
        }
    }
}

/// Transient request to copy chat text into a document. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionCapture {
    pub source_text: String,
    pub source_message_id: Uuid,
    pub target_document_id: DocumentId,
}

impl SelectionCapture {
    /// Capture `selected_text` from an assistant entry into `target`.
    ///
    /// Only assistant replies can be captured; blank selections are rejected.
    pub fn from_entry(
        entry: &TranscriptEntry,
        selected_text: &str,
        target: DocumentId,
    ) -> Result<Self> {
        if !entry.message.sender.is_assistant() {
            return Err(Error::InvalidInput(
                "only assistant messages can be captured".into(),
            ));
        }
        if selected_text.trim().is_empty() {
            return Err(Error::InvalidInput("nothing selected".into()));
        }
        Ok(Self {
            source_text: selected_text.to_string(),
            source_message_id: entry.id,
            target_document_id: target,
        })
    }
}
