//! Rich content tree: blocks of inline runs carrying marks.

use margin_core::{Error, Result};

// =============================================================================
// MARKS
// =============================================================================

/// Inline formatting mark.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Mark {
    Bold,
    Italic,
    Underline,
    Strike,
    Link { href: String },
}

/// Set of marks on a run. At most one link.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct MarkSet {
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub strike: bool,
    pub link: Option<String>,
}

impl MarkSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Whether the set carries `mark`. For links any href matches.
    pub fn contains(&self, mark: &Mark) -> bool {
        match mark {
            Mark::Bold => self.bold,
            Mark::Italic => self.italic,
            Mark::Underline => self.underline,
            Mark::Strike => self.strike,
            Mark::Link { .. } => self.link.is_some(),
        }
    }

    /// Add `mark`, replacing any existing link.
    pub fn insert(&mut self, mark: &Mark) {
        match mark {
            Mark::Bold => self.bold = true,
            Mark::Italic => self.italic = true,
            Mark::Underline => self.underline = true,
            Mark::Strike => self.strike = true,
            Mark::Link { href } => self.link = Some(href.clone()),
        }
    }

    pub fn remove(&mut self, mark: &Mark) {
        match mark {
            Mark::Bold => self.bold = false,
            Mark::Italic => self.italic = false,
            Mark::Underline => self.underline = false,
            Mark::Strike => self.strike = false,
            Mark::Link { .. } => self.link = None,
        }
    }

    pub fn with(mut self, mark: Mark) -> Self {
        self.insert(&mark);
        self
    }
}

// =============================================================================
// RUNS AND BLOCKS
// =============================================================================

/// Text with a uniform set of marks. A `'\n'` inside a run is a hard break.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Run {
    pub text: String,
    pub marks: MarkSet,
}

impl Run {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            marks: MarkSet::default(),
        }
    }

    pub fn marked(text: impl Into<String>, marks: MarkSet) -> Self {
        Self {
            text: text.into(),
            marks,
        }
    }

    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Kind of a top-level block. Consecutive list and task items form one list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockKind {
    Paragraph,
    Heading { level: u8 },
    BulletItem,
    OrderedItem,
    Task { checked: bool },
    Image { src: String, alt: String },
}

impl BlockKind {
    pub fn is_image(&self) -> bool {
        matches!(self, BlockKind::Image { .. })
    }

    /// Kind given to the second half when a block of this kind is split.
    pub fn continuation(&self) -> BlockKind {
        match self {
            BlockKind::Heading { .. } | BlockKind::Image { .. } => BlockKind::Paragraph,
            BlockKind::Task { .. } => BlockKind::Task { checked: false },
            other => other.clone(),
        }
    }
}

/// A top-level block. Image blocks carry no runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub kind: BlockKind,
    pub runs: Vec<Run>,
}

impl Block {
    pub fn new(kind: BlockKind, runs: Vec<Run>) -> Self {
        let mut block = Self { kind, runs };
        block.normalize();
        block
    }

    pub fn paragraph(text: impl Into<String>) -> Self {
        Self::new(BlockKind::Paragraph, vec![Run::plain(text)])
    }

    pub fn heading(level: u8, text: impl Into<String>) -> Self {
        Self::new(
            BlockKind::Heading {
                level: level.clamp(1, 6),
            },
            vec![Run::plain(text)],
        )
    }

    pub fn image(src: impl Into<String>, alt: impl Into<String>) -> Self {
        Self {
            kind: BlockKind::Image {
                src: src.into(),
                alt: alt.into(),
            },
            runs: Vec::new(),
        }
    }

    /// Length in chars.
    pub fn len(&self) -> usize {
        self.runs.iter().map(Run::char_len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn text(&self) -> String {
        self.runs.iter().map(|r| r.text.as_str()).collect()
    }

    /// Drop empty runs and merge neighbours with equal marks.
    pub fn normalize(&mut self) {
        if self.kind.is_image() {
            self.runs.clear();
            return;
        }
        if let BlockKind::Heading { level } = &mut self.kind {
            *level = (*level).clamp(1, 6);
        }
        let mut merged: Vec<Run> = Vec::with_capacity(self.runs.len());
        for run in self.runs.drain(..) {
            if run.text.is_empty() {
                continue;
            }
            match merged.last_mut() {
                Some(last) if last.marks == run.marks => last.text.push_str(&run.text),
                _ => merged.push(run),
            }
        }
        self.runs = merged;
    }

    /// Split runs at a char offset into (before, after).
    pub(crate) fn split_runs(&self, offset: usize) -> (Vec<Run>, Vec<Run>) {
        let mut before = Vec::new();
        let mut after = Vec::new();
        let mut seen = 0;
        for run in &self.runs {
            let len = run.char_len();
            if seen + len <= offset {
                before.push(run.clone());
            } else if seen >= offset {
                after.push(run.clone());
            } else {
                let at = byte_index(&run.text, offset - seen);
                before.push(Run::marked(&run.text[..at], run.marks.clone()));
                after.push(Run::marked(&run.text[at..], run.marks.clone()));
            }
            seen += len;
        }
        (before, after)
    }

    /// Marks a character typed at `offset` inherits. Links do not extend.
    pub(crate) fn marks_at(&self, offset: usize) -> MarkSet {
        let mut seen = 0;
        let mut marks = self
            .runs
            .first()
            .map(|r| r.marks.clone())
            .unwrap_or_default();
        for run in &self.runs {
            if seen >= offset {
                break;
            }
            marks = run.marks.clone();
            seen += run.char_len();
        }
        marks.link = None;
        marks
    }
}

pub(crate) fn byte_index(text: &str, char_offset: usize) -> usize {
    text.char_indices()
        .nth(char_offset)
        .map(|(i, _)| i)
        .unwrap_or(text.len())
}

// =============================================================================
// POSITIONS
// =============================================================================

/// Cursor position: block index and char offset within the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Position {
    pub block: usize,
    pub offset: usize,
}

impl Position {
    pub fn new(block: usize, offset: usize) -> Self {
        Self { block, offset }
    }
}

/// Selection between two positions. Normalised so `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    pub fn new(a: Position, b: Position) -> Self {
        if a <= b {
            Self { start: a, end: b }
        } else {
            Self { start: b, end: a }
        }
    }

    /// Empty range at `pos`.
    pub fn caret(pos: Position) -> Self {
        Self {
            start: pos,
            end: pos,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

// =============================================================================
// VARIANTS
// =============================================================================

/// Editor layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EditorVariant {
    /// Free-form body.
    #[default]
    Plain,
    /// Leading heading block is the document title.
    Titled,
}

// =============================================================================
// TREE
// =============================================================================

/// Ordered sequence of blocks. Never empty: an empty document is one empty
/// paragraph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tree {
    blocks: Vec<Block>,
}

impl Default for Tree {
    fn default() -> Self {
        Self {
            blocks: vec![Block::new(BlockKind::Paragraph, Vec::new())],
        }
    }
}

impl Tree {
    pub fn new(blocks: Vec<Block>) -> Self {
        let mut tree = Self { blocks };
        tree.normalize();
        tree
    }

    /// One paragraph per line of `text`.
    pub fn from_plain_text(text: &str) -> Self {
        Self::new(text.lines().map(Block::paragraph).collect())
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn block(&self, index: usize) -> Option<&Block> {
        self.blocks.get(index)
    }

    pub(crate) fn blocks_mut(&mut self) -> &mut Vec<Block> {
        &mut self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.iter().all(|b| b.is_empty() && !b.kind.is_image())
    }

    /// Position after the last character of the last block.
    pub fn end(&self) -> Position {
        let block = self.blocks.len().saturating_sub(1);
        Position::new(block, self.blocks.get(block).map(Block::len).unwrap_or(0))
    }

    /// Nearest valid position to `pos`.
    pub fn clamp(&self, pos: Position) -> Position {
        let block = pos.block.min(self.blocks.len().saturating_sub(1));
        let len = self.blocks.get(block).map(Block::len).unwrap_or(0);
        Position::new(block, pos.offset.min(len))
    }

    pub fn normalize(&mut self) {
        for block in &mut self.blocks {
            block.normalize();
        }
        if self.blocks.is_empty() {
            self.blocks.push(Block::new(BlockKind::Paragraph, Vec::new()));
        }
    }

    /// Enforce the variant's structure. `Titled` gets a leading heading.
    pub fn normalize_variant(&mut self, variant: EditorVariant) {
        self.normalize();
        if variant == EditorVariant::Titled
            && !matches!(self.blocks[0].kind, BlockKind::Heading { .. })
        {
            self.blocks
                .insert(0, Block::new(BlockKind::Heading { level: 1 }, Vec::new()));
        }
    }

    /// Document title: the leading heading (titled) or first non-empty block.
    pub fn title(&self, variant: EditorVariant) -> String {
        match variant {
            EditorVariant::Titled => self.blocks[0].text(),
            EditorVariant::Plain => self
                .blocks
                .iter()
                .map(Block::text)
                .find(|t| !t.trim().is_empty())
                .unwrap_or_default(),
        }
    }

    /// Text content, one line per block.
    pub fn plain_text(&self) -> String {
        self.blocks
            .iter()
            .map(|b| match &b.kind {
                BlockKind::Image { alt, .. } => alt.clone(),
                _ => b.text(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Check that `pos` addresses an existing block and offset.
    pub fn check_position(&self, pos: Position) -> Result<&Block> {
        let block = self.blocks.get(pos.block).ok_or_else(|| {
            Error::InvalidInput(format!(
                "block {} out of bounds ({} blocks)",
                pos.block,
                self.blocks.len()
            ))
        })?;
        if pos.offset > block.len() {
            return Err(Error::InvalidInput(format!(
                "offset {} out of bounds (block {} has {} chars)",
                pos.offset,
                pos.block,
                block.len()
            )));
        }
        Ok(block)
    }
}
