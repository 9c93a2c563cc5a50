//! Rich content model.
//!
//! A document body is a flat list of [`Block`]s holding inline [`Run`]s with
//! [`MarkSet`]s. [`markup`] converts to and from the persisted form;
//! [`ops`] holds the editing operations.

pub mod markup;
pub mod ops;
pub mod tree;

use margin_core::{DocumentId, UserId};

pub use markup::{load, parse, serialize, LoadOutcome};
pub use ops::{normalize_href, Format};
pub use tree::{Block, BlockKind, EditorVariant, Mark, MarkSet, Position, Range, Run, Tree};

/// A document as held by an editor session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub id: DocumentId,
    pub owner: UserId,
    pub content: Tree,
    /// Last revision acknowledged by the store (0 until the first save).
    pub revision: u64,
}

impl Document {
    pub fn title(&self, variant: EditorVariant) -> String {
        self.content.title(variant)
    }
}
