//! Image embed pipeline: pick a file, upload it, insert an image node.
//!
//! Only the insertion interaction waits on the upload; the editor keeps
//! accepting edits meanwhile. A failed attempt inserts nothing and emits
//! exactly one `UploadFailed` notice.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use margin_core::file_safety::{upload_filename, validate_image};
use margin_core::{AppContext, Asset, AssetUrl, ClientEvent, Error, Result};

use crate::content::{Block, Position};
use crate::session::EditorHandle;

/// A file chosen by the user.
#[derive(Clone, PartialEq, Eq)]
pub struct PickedFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for PickedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PickedFile")
            .field("name", &self.name)
            .field("size", &self.bytes.len())
            .finish()
    }
}

/// Source of user-picked files (a file dialog, a path argument, a test).
#[async_trait]
pub trait FilePicker: Send + Sync {
    /// `None` when the user cancelled.
    async fn pick_file(&self) -> Result<Option<PickedFile>>;
}

/// Outcome of [`ImageEmbedPipeline::embed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmbedOutcome {
    Inserted(AssetUrl),
    Cancelled,
}

pub struct ImageEmbedPipeline {
    ctx: AppContext,
    picker: Arc<dyn FilePicker>,
}

impl ImageEmbedPipeline {
    pub fn new(ctx: AppContext, picker: Arc<dyn FilePicker>) -> Self {
        Self { ctx, picker }
    }

    /// Pick, upload and insert an image at `cursor`.
    #[instrument(skip_all, fields(subsystem = "image", document_id = %editor.document_id()))]
    pub async fn embed(&self, editor: &EditorHandle, cursor: Position) -> Result<EmbedOutcome> {
        let Some(file) = self.picker.pick_file().await? else {
            return Ok(EmbedOutcome::Cancelled);
        };

        let alt = alt_text(&file.name);
        let url = match self.upload(file).await {
            Ok(url) => url,
            Err(e) => {
                warn!(error = %e, kind = e.kind(), "Image upload failed, nothing inserted");
                self.ctx.events.emit(ClientEvent::UploadFailed {
                    document_id: editor.document_id().clone(),
                    error: e.to_string(),
                });
                return Err(e);
            }
        };

        editor
            .insert_node_near(cursor, Block::image(url.as_str(), alt))
            .await?;
        info!(url = %url, "Image inserted");
        self.ctx.events.emit(ClientEvent::ImageInserted {
            document_id: editor.document_id().clone(),
            url: url.clone(),
        });
        Ok(EmbedOutcome::Inserted(url))
    }

    /// Validate and upload a file under a collision-free name.
    pub async fn upload(&self, file: PickedFile) -> Result<AssetUrl> {
        let check = validate_image(&file.name, &file.bytes, self.ctx.config.upload_max_bytes);
        if !check.allowed {
            return Err(Error::Upload(
                check
                    .block_reason
                    .unwrap_or_else(|| "file rejected".to_string()),
            ));
        }
        let content_type = check
            .detected_type
            .unwrap_or_else(|| "application/octet-stream".to_string());

        let asset = Asset {
            filename: upload_filename(&file.name, &content_type),
            content_type,
            bytes: file.bytes,
        };
        self.ctx.assets.upload_asset(asset).await
    }
}

/// Alt text from a file name: the stem, or empty.
fn alt_text(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    match base.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => base.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alt_text() {
        assert_eq!(alt_text("diagram.png"), "diagram");
        assert_eq!(alt_text("/tmp/shots/board.v2.jpg"), "board.v2");
        assert_eq!(alt_text("clipboard"), "clipboard");
        assert_eq!(alt_text(".hidden"), ".hidden");
    }
}
