//! # margin-editor
//!
//! Rich-text editing for margin: the content model and its persisted
//! markup, the autosave coordinator, editor sessions and image embedding.

pub mod autosave;
pub mod content;
pub mod image;
pub mod session;

pub use autosave::{Action, AutosaveCoordinator, SaveState, SaveStatus};
pub use content::{
    Block, BlockKind, Document, EditorVariant, Format, LoadOutcome, Mark, MarkSet, Position,
    Range, Run, Tree,
};
pub use image::{EmbedOutcome, FilePicker, ImageEmbedPipeline, PickedFile};
pub use session::{EditorHandle, EditorSession, SaveOutcome};
