//! Selection capture: copy assistant text into one of the user's documents.
//!
//! The fragment is appended through the gateway. Editors already open on the
//! target document are not told; they see the fragment after a reload.

use std::collections::HashMap;

use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use margin_core::{
    Ack, AppContext, ClientEvent, DocumentId, DocumentSummary, Error, EventActor, Result,
    SelectionCapture, UserId,
};

use crate::chat_markup::to_rich_markup;

/// Title used when a document is created without one.
pub const UNTITLED: &str = "Untitled";

pub struct CapturePipeline {
    ctx: AppContext,
    targets: Mutex<HashMap<UserId, Vec<DocumentSummary>>>,
}

impl CapturePipeline {
    pub fn new(ctx: AppContext) -> Self {
        Self {
            ctx,
            targets: Mutex::new(HashMap::new()),
        }
    }

    /// The user's documents, fetched on first use.
    pub async fn targets(&self, user: &UserId) -> Result<Vec<DocumentSummary>> {
        let mut targets = self.targets.lock().await;
        if let Some(list) = targets.get(user) {
            return Ok(list.clone());
        }
        let list = self.ctx.documents.list_documents(user).await?;
        targets.insert(user.clone(), list.clone());
        Ok(list)
    }

    /// Re-fetch the user's documents.
    pub async fn refresh_targets(&self, user: &UserId) -> Result<Vec<DocumentSummary>> {
        let mut targets = self.targets.lock().await;
        let list = self.ctx.documents.list_documents(user).await?;
        targets.insert(user.clone(), list.clone());
        Ok(list)
    }

    /// Create a document to capture into and add it to the target list.
    #[instrument(skip(self), fields(subsystem = "capture", op = "create_target"))]
    pub async fn create_target(&self, user: &UserId, title: &str) -> Result<DocumentSummary> {
        let title = match title.trim() {
            "" => UNTITLED,
            trimmed => trimmed,
        };
        let created = self.ctx.documents.create_document(user, title).await?;

        if let Some(list) = self.targets.lock().await.get_mut(user) {
            list.push(created.clone());
        }
        info!(document_id = %created.id, "Capture target created");
        self.ctx.events.emit_as(
            ClientEvent::DocumentCreated {
                document_id: created.id.clone(),
                title: created.title.clone(),
            },
            EventActor::user(user.as_str()),
        );
        Ok(created)
    }

    /// Append a captured assistant selection to its target document.
    pub async fn capture(&self, user: &UserId, capture: &SelectionCapture) -> Result<Ack> {
        self.append_text(user, &capture.source_text, &capture.target_document_id)
            .await
    }

    /// Convert `text` from chat markup and append it to `target`.
    #[instrument(skip(self, text), fields(subsystem = "capture", document_id = %target, user_id = %user))]
    pub async fn append_text(
        &self,
        user: &UserId,
        text: &str,
        target: &DocumentId,
    ) -> Result<Ack> {
        if text.trim().is_empty() {
            return Err(Error::InvalidInput("nothing to capture".into()));
        }
        let fragment = to_rich_markup(text);

        match self
            .ctx
            .documents
            .append_to_document(target, user, &fragment)
            .await
        {
            Ok(ack) => {
                info!(bytes = fragment.len(), revision = ?ack.revision, "Capture appended");
                self.ctx.events.emit_as(
                    ClientEvent::CaptureAppended {
                        document_id: target.clone(),
                        bytes: fragment.len(),
                    },
                    EventActor::user(user.as_str()),
                );
                Ok(ack)
            }
            Err(e) => {
                warn!(error = %e, kind = e.kind(), "Capture append failed");
                self.ctx.events.emit_as(
                    ClientEvent::CaptureFailed {
                        document_id: target.clone(),
                        error: e.to_string(),
                    },
                    EventActor::user(user.as_str()),
                );
                Err(e)
            }
        }
    }
}
