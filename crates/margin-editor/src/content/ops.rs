//! Editing operations on a [`Tree`].
//!
//! Every operation validates its positions, mutates in place, re-normalises
//! and returns the resulting cursor.

use margin_core::{Error, Result};

use super::tree::{Block, BlockKind, Mark, MarkSet, Position, Range, Run, Tree};

/// Toolbar formats, dispatched through [`Tree::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Format {
    Bold,
    Italic,
    Underline,
    Strike,
    /// Link the range. The href is normalised to `https://`.
    Link(String),
    Unlink,
    Paragraph,
    Heading(u8),
    BulletList,
    OrderedList,
    TaskList,
    /// Flip the checked state of task items in the range.
    ToggleTask,
}

impl Format {
    fn inline_mark(&self) -> Option<Mark> {
        match self {
            Format::Bold => Some(Mark::Bold),
            Format::Italic => Some(Mark::Italic),
            Format::Underline => Some(Mark::Underline),
            Format::Strike => Some(Mark::Strike),
            _ => None,
        }
    }
}

/// Normalise a user-entered link target to an `https://` URL.
pub fn normalize_href(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    let lower = trimmed.to_ascii_lowercase();
    let rest = if lower.starts_with("https://") {
        &trimmed[8..]
    } else if lower.starts_with("http://") {
        &trimmed[7..]
    } else {
        trimmed
    };
    if rest.is_empty() {
        return Err(Error::InvalidInput("link target is empty".into()));
    }
    Ok(format!("https://{}", rest))
}

impl Tree {
    /// Insert `text` at `pos`. Newlines split the block. Returns the cursor
    /// after the inserted text.
    pub fn insert_text(&mut self, pos: Position, text: &str) -> Result<Position> {
        let block = self.check_position(pos)?;
        if block.kind.is_image() {
            return Err(Error::InvalidInput("cannot type into an image".into()));
        }
        let mut cursor = pos;
        for (i, line) in text.split('\n').enumerate() {
            if i > 0 {
                cursor = self.split_block(cursor)?;
            }
            if !line.is_empty() {
                cursor = self.insert_inline(cursor, line);
            }
        }
        Ok(cursor)
    }

    fn insert_inline(&mut self, pos: Position, text: &str) -> Position {
        let block = &mut self.blocks_mut()[pos.block];
        let marks = block.marks_at(pos.offset);
        let (mut before, after) = block.split_runs(pos.offset);
        before.push(Run::marked(text, marks));
        before.extend(after);
        block.runs = before;
        block.normalize();
        Position::new(pos.block, pos.offset + text.chars().count())
    }

    /// Delete the content of `range`. A cross-block range joins the first
    /// and last block. Returns the cursor at the range start.
    pub fn delete_range(&mut self, range: Range) -> Result<Position> {
        let Range { start, end } = range;
        self.check_position(start)?;
        self.check_position(end)?;
        if range.is_empty() {
            return Ok(start);
        }

        let blocks = self.blocks_mut();
        let (head, _) = blocks[start.block].split_runs(start.offset);
        let (_, tail) = blocks[end.block].split_runs(end.offset);

        let kind = [&blocks[start.block].kind, &blocks[end.block].kind]
            .into_iter()
            .find(|k| !k.is_image())
            .cloned()
            .unwrap_or(BlockKind::Paragraph);

        let mut runs = head;
        runs.extend(tail);
        let joined = Block::new(kind, runs);
        blocks.drain(start.block..=end.block);
        blocks.insert(start.block, joined);
        self.normalize();

        Ok(Position::new(start.block, start.offset))
    }

    /// Split the block at `pos`. Returns the cursor at the start of the new
    /// block.
    pub fn split_block(&mut self, pos: Position) -> Result<Position> {
        let block = self.check_position(pos)?;
        let continuation = block.kind.continuation();
        let new_block = if block.kind.is_image() {
            Block::new(continuation, Vec::new())
        } else {
            let (before, after) = block.split_runs(pos.offset);
            let new_block = Block::new(continuation, after);
            let block = &mut self.blocks_mut()[pos.block];
            block.runs = before;
            block.normalize();
            new_block
        };
        self.blocks_mut().insert(pos.block + 1, new_block);
        Ok(Position::new(pos.block + 1, 0))
    }

    /// Insert a block at `pos`. Inside a block's text the block is split
    /// first. Returns the position of the inserted block.
    pub fn insert_node(&mut self, pos: Position, mut node: Block) -> Result<Position> {
        let block = self.check_position(pos)?;
        if let BlockKind::Image { src, .. } = &node.kind {
            if src.trim().is_empty() {
                return Err(Error::InvalidInput("image node without a source".into()));
            }
        }
        node.normalize();
        let index = if pos.offset == 0 && !block.is_empty() {
            pos.block
        } else if pos.offset == block.len() {
            pos.block + 1
        } else {
            self.split_block(pos)?.block
        };
        self.blocks_mut().insert(index, node);
        Ok(Position::new(index, 0))
    }

    /// Insert an image node at the cursor.
    pub fn insert_image(
        &mut self,
        pos: Position,
        src: impl Into<String>,
        alt: impl Into<String>,
    ) -> Result<Position> {
        self.insert_node(pos, Block::image(src, alt))
    }

    /// Add `mark` to every character in `range`.
    pub fn apply_mark(&mut self, range: Range, mark: &Mark) -> Result<()> {
        self.map_marks(range, |marks| marks.insert(mark))
    }

    /// Remove `mark` from every character in `range`.
    pub fn remove_mark(&mut self, range: Range, mark: &Mark) -> Result<()> {
        self.map_marks(range, |marks| marks.remove(mark))
    }

    /// Whether every character in a non-empty `range` carries `mark`.
    pub fn has_mark(&self, range: Range, mark: &Mark) -> Result<bool> {
        self.check_position(range.start)?;
        self.check_position(range.end)?;
        let mut any = false;
        for (index, block) in self.blocks().iter().enumerate() {
            let Some((from, to)) = block_span(range, index, block) else {
                continue;
            };
            let (_, rest) = block.split_runs(from);
            let (inside, _) = Block::new(block.kind.clone(), rest).split_runs(to - from);
            for run in inside {
                any = true;
                if !run.marks.contains(mark) {
                    return Ok(false);
                }
            }
        }
        Ok(any)
    }

    /// Apply a toolbar format to `range`.
    ///
    /// Inline marks toggle: added unless the whole range already carries
    /// them. Block formats toggle back to a paragraph when every block in
    /// the range already has that kind.
    pub fn apply(&mut self, range: Range, format: &Format) -> Result<()> {
        self.check_position(range.start)?;
        self.check_position(range.end)?;

        if let Some(mark) = format.inline_mark() {
            if range.is_empty() {
                return Ok(());
            }
            return if self.has_mark(range, &mark)? {
                self.remove_mark(range, &mark)
            } else {
                self.apply_mark(range, &mark)
            };
        }

        match format {
            Format::Link(href) => {
                let href = normalize_href(href)?;
                self.apply_mark(range, &Mark::Link { href })
            }
            Format::Unlink => self.remove_mark(range, &Mark::Link { href: String::new() }),
            Format::Paragraph => {
                self.set_block_kind(range, |_| BlockKind::Paragraph);
                Ok(())
            }
            Format::Heading(level) => {
                let level = (*level).clamp(1, 6);
                self.toggle_block_kind(range, BlockKind::Heading { level }, |k| {
                    *k == BlockKind::Heading { level }
                });
                Ok(())
            }
            Format::BulletList => {
                self.toggle_block_kind(range, BlockKind::BulletItem, |k| {
                    *k == BlockKind::BulletItem
                });
                Ok(())
            }
            Format::OrderedList => {
                self.toggle_block_kind(range, BlockKind::OrderedItem, |k| {
                    *k == BlockKind::OrderedItem
                });
                Ok(())
            }
            Format::TaskList => {
                self.toggle_block_kind(range, BlockKind::Task { checked: false }, |k| {
                    matches!(k, BlockKind::Task { .. })
                });
                Ok(())
            }
            Format::ToggleTask => {
                self.set_block_kind(range, |kind| match kind {
                    BlockKind::Task { checked } => BlockKind::Task { checked: !checked },
                    other => other.clone(),
                });
                Ok(())
            }
            Format::Bold | Format::Italic | Format::Underline | Format::Strike => Ok(()),
        }
    }

    fn map_marks(
        &mut self,
        range: Range,
        mut f: impl FnMut(&mut MarkSet),
    ) -> Result<()> {
        self.check_position(range.start)?;
        self.check_position(range.end)?;
        for (index, block) in self.blocks_mut().iter_mut().enumerate() {
            let Some((from, to)) = block_span(range, index, block) else {
                continue;
            };
            let (mut runs, rest) = block.split_runs(from);
            let (mut inside, after) =
                Block::new(block.kind.clone(), rest).split_runs(to - from);
            for run in &mut inside {
                f(&mut run.marks);
            }
            runs.extend(inside);
            runs.extend(after);
            block.runs = runs;
            block.normalize();
        }
        Ok(())
    }

    fn toggle_block_kind(
        &mut self,
        range: Range,
        target: BlockKind,
        has: impl Fn(&BlockKind) -> bool,
    ) {
        let all = self.blocks()[range.start.block..=range.end.block]
            .iter()
            .filter(|b| !b.kind.is_image())
            .all(|b| has(&b.kind));
        if all {
            self.set_block_kind(range, |_| BlockKind::Paragraph);
        } else {
            self.set_block_kind(range, |_| target.clone());
        }
    }

    fn set_block_kind(&mut self, range: Range, f: impl Fn(&BlockKind) -> BlockKind) {
        for block in &mut self.blocks_mut()[range.start.block..=range.end.block] {
            if !block.kind.is_image() {
                block.kind = f(&block.kind);
            }
        }
    }
}

/// Char span of `range` inside block `index`, if any text is covered.
fn block_span(range: Range, index: usize, block: &Block) -> Option<(usize, usize)> {
    if index < range.start.block || index > range.end.block || block.kind.is_image() {
        return None;
    }
    let from = if index == range.start.block {
        range.start.offset
    } else {
        0
    };
    let to = if index == range.end.block {
        range.end.offset
    } else {
        block.len()
    };
    (from < to).then_some((from, to))
}
