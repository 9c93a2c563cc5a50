//! Assistant chat markup (Markdown) to rich content.
//!
//! One-directional and best effort: paragraph breaks, headings, lists and
//! emphasis survive; code is kept as plain text and raw HTML is shown as
//! text. The result is never parsed back into Markdown.

use pulldown_cmark::{Event, HeadingLevel, Options, Parser, Tag, TagEnd};

use margin_editor::content::{normalize_href, serialize, Block, BlockKind, MarkSet, Run, Tree};

/// Convert assistant text to a content tree.
pub fn to_tree(text: &str) -> Tree {
    let options = Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TASKLISTS;
    let mut builder = TreeBuilder::default();
    for event in Parser::new_ext(text, options) {
        builder.feed(event);
    }
    builder.finish()
}

/// Convert assistant text to a serialised rich-content fragment, ready to
/// append to a document.
pub fn to_rich_markup(text: &str) -> String {
    serialize(&to_tree(text))
}

#[derive(Default)]
struct TreeBuilder {
    blocks: Vec<Block>,
    current: Option<Block>,
    /// Innermost list last; `true` for ordered lists.
    lists: Vec<bool>,
    bold: usize,
    italic: usize,
    strike: usize,
    links: Vec<Option<String>>,
    /// Open list items, innermost last.
    items: usize,
    in_code_block: bool,
    in_html_block: bool,
}

impl TreeBuilder {
    fn feed(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(tag) => self.end(tag),
            Event::Text(text) if self.in_code_block => self.push_lines(&text),
            Event::Html(html) if self.in_html_block => self.push_lines(&html),
            Event::Text(text) | Event::Code(text) => self.push_text(&text),
            Event::Html(html) | Event::InlineHtml(html) => {
                self.push_text(html.trim_end_matches('\n'))
            }
            Event::SoftBreak => self.push_text(" "),
            Event::HardBreak => self.push_text("\n"),
            Event::TaskListMarker(checked) => {
                let block = self.current_block();
                block.kind = BlockKind::Task { checked };
            }
            Event::Rule => self.flush(),
            _ => {}
        }
    }

    fn start(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Paragraph if self.items > 0 => {
                // Later paragraphs of a loose item stay in the item.
                match self.current.as_ref().map(|block| block.runs.is_empty()) {
                    Some(false) => self.push_text("\n"),
                    Some(true) => {}
                    None => {
                        let kind = self.item_kind();
                        self.begin(kind);
                    }
                }
            }
            Tag::Paragraph => self.begin(BlockKind::Paragraph),
            Tag::Heading { level, .. } => self.begin(BlockKind::Heading {
                level: heading_level(level),
            }),
            Tag::List(start) => {
                self.flush();
                self.lists.push(start.is_some());
            }
            Tag::Item => {
                self.items += 1;
                self.begin(self.item_kind());
            }
            Tag::CodeBlock(_) => {
                self.flush();
                self.in_code_block = true;
            }
            Tag::HtmlBlock => {
                self.flush();
                self.in_html_block = true;
            }
            Tag::Emphasis => self.italic += 1,
            Tag::Strong => self.bold += 1,
            Tag::Strikethrough => self.strike += 1,
            Tag::Link { dest_url, .. } => self.links.push(normalize_href(&dest_url).ok()),
            _ => {}
        }
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph if self.items > 0 => {}
            TagEnd::Paragraph | TagEnd::Heading(_) => self.flush(),
            TagEnd::Item => {
                self.items = self.items.saturating_sub(1);
                self.flush();
            }
            TagEnd::List(_) => {
                self.flush();
                self.lists.pop();
            }
            TagEnd::CodeBlock => self.in_code_block = false,
            TagEnd::HtmlBlock => self.in_html_block = false,
            TagEnd::Emphasis => self.italic = self.italic.saturating_sub(1),
            TagEnd::Strong => self.bold = self.bold.saturating_sub(1),
            TagEnd::Strikethrough => self.strike = self.strike.saturating_sub(1),
            TagEnd::Link => {
                self.links.pop();
            }
            _ => {}
        }
    }

    fn marks(&self) -> MarkSet {
        MarkSet {
            bold: self.bold > 0,
            italic: self.italic > 0,
            underline: false,
            strike: self.strike > 0,
            link: self.links.iter().rev().flatten().next().cloned(),
        }
    }

    fn item_kind(&self) -> BlockKind {
        match self.lists.last() {
            Some(true) => BlockKind::OrderedItem,
            _ => BlockKind::BulletItem,
        }
    }

    /// One plain paragraph per line (code and raw HTML blocks).
    fn push_lines(&mut self, text: &str) {
        for line in text.lines() {
            self.blocks.push(Block::paragraph(line));
        }
    }

    fn current_block(&mut self) -> &mut Block {
        self.current
            .get_or_insert_with(|| Block::new(BlockKind::Paragraph, Vec::new()))
    }

    fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let marks = self.marks();
        self.current_block().runs.push(Run::marked(text, marks));
    }

    fn begin(&mut self, kind: BlockKind) {
        self.flush();
        self.current = Some(Block::new(kind, Vec::new()));
    }

    fn flush(&mut self) {
        if let Some(mut block) = self.current.take() {
            block.normalize();
            if !block.runs.is_empty() {
                self.blocks.push(block);
            }
        }
    }

    fn finish(mut self) -> Tree {
        self.flush();
        Tree::new(self.blocks)
    }
}

fn heading_level(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paragraphs_and_emphasis() {
        assert_eq!(
            to_rich_markup("ATP is the **energy currency** of the *cell*.\n\nIt is made in mitochondria."),
            "<p>ATP is the <strong>energy currency</strong> of the <em>cell</em>.</p>\
             <p>It is made in mitochondria.</p>"
        );
    }

    #[test]
    fn test_lists() {
        assert_eq!(
            to_rich_markup("Steps:\n\n1. Glycolysis\n2. Krebs cycle\n\n- fast\n- slow"),
            "<p>Steps:</p><ol><li>Glycolysis</li><li>Krebs cycle</li></ol>\
             <ul><li>fast</li><li>slow</li></ul>"
        );
    }

    #[test]
    fn test_loose_list_items_keep_kind() {
        let tree = to_tree("- one\n\n- two\n");
        assert_eq!(tree.len(), 2);
        assert!(tree.blocks().iter().all(|b| b.kind == BlockKind::BulletItem));
    }

    #[test]
    fn test_task_list() {
        let tree = to_tree("- [x] read chapter\n- [ ] quiz");
        assert_eq!(tree.blocks()[0].kind, BlockKind::Task { checked: true });
        assert_eq!(tree.blocks()[1].kind, BlockKind::Task { checked: false });
        assert_eq!(tree.blocks()[1].text(), "quiz");
    }

    #[test]
    fn test_heading_and_strikethrough() {
        assert_eq!(
            to_rich_markup("## Summary\n~~old~~ new"),
            "<h2>Summary</h2><p><s>old</s> new</p>"
        );
    }

    #[test]
    fn test_links_normalised() {
        assert_eq!(
            to_rich_markup("See [notes](http://example.com/a)."),
            "<p>See <a href=\"https://example.com/a\">notes</a>.</p>"
        );
    }

    #[test]
    fn test_code_is_plain_text() {
        let tree = to_tree("Use `ls`:\n\n```\nls -la\ncd /tmp\n```\n");
        let texts: Vec<String> = tree.blocks().iter().map(Block::text).collect();
        assert_eq!(texts, vec!["Use ls:", "ls -la", "cd /tmp"]);
    }

    #[test]
    fn test_raw_html_is_escaped() {
        assert_eq!(
            to_rich_markup("a <b>bold</b> claim"),
            "<p>a &lt;b&gt;bold&lt;/b&gt; claim</p>"
        );
    }

    #[test]
    fn test_raw_html_block_keeps_lines() {
        let tree = to_tree("<div>\nraw\n</div>\n\nafter");
        let texts: Vec<String> = tree.blocks().iter().map(Block::text).collect();
        assert_eq!(texts, vec!["<div>", "raw", "</div>", "after"]);
        assert!(to_rich_markup("<div>\nraw\n</div>").starts_with("<p>&lt;div&gt;</p><p>raw</p>"));
    }

    #[test]
    fn test_loose_ordered_item_continuation_stays_in_list() {
        assert_eq!(
            to_rich_markup("1. first\n\n   more detail\n2. second"),
            "<ol><li>first<br>more detail</li><li>second</li></ol>"
        );
    }

    #[test]
    fn test_hard_break_becomes_br() {
        assert_eq!(to_rich_markup("line one  \nline two"), "<p>line one<br>line two</p>");
    }

    #[test]
    fn test_empty_input_is_single_empty_paragraph() {
        assert_eq!(to_tree("").len(), 1);
    }
}
