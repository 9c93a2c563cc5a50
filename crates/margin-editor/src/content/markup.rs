//! Persisted markup: an HTML subset.
//!
//! ```text
//! <h1>Title</h1>
//! <p>Some <strong>bold</strong> and <a href="https://x.io"><em>linked</em></a> text</p>
//! <ul><li>bullet</li></ul>
//! <ol><li>numbered</li></ol>
//! <ul data-type="taskList"><li data-checked="true">task</li></ul>
//! <img src="https://host/a.png" alt="a">
//! ```
//!
//! Serialisation is canonical: marks nest as `a > strong > em > u > s` and
//! each run is wrapped independently. Parsing also accepts the wrappers rich
//! text editors commonly emit (`<li><p>…</p></li>`, task item labels,
//! `<b>`, `<i>`, `<del>`, `<span>`, `<code>`).

use margin_core::{Error, Result};

use super::tree::{Block, BlockKind, MarkSet, Run, Tree};

/// Result of [`load`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOutcome {
    pub tree: Tree,
    /// ParseFailure message when the content was malformed and shown as
    /// plain text instead.
    pub degraded: Option<String>,
}

impl LoadOutcome {
    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }
}

/// Load stored content. Never fails.
///
/// Content that does not start with a tag is plain text. Malformed markup
/// degrades to one paragraph per raw line.
pub fn load(serialized: &str) -> LoadOutcome {
    if !serialized.trim_start().starts_with('<') {
        return LoadOutcome {
            tree: Tree::from_plain_text(serialized),
            degraded: None,
        };
    }
    match parse(serialized) {
        Ok(tree) => LoadOutcome {
            tree,
            degraded: None,
        },
        Err(e) => LoadOutcome {
            tree: Tree::from_plain_text(serialized),
            degraded: Some(e.to_string()),
        },
    }
}

/// Strict parse. Fails with `Parse` on malformed markup.
pub fn parse(serialized: &str) -> Result<Tree> {
    let mut builder = Builder::default();
    for token in Tokenizer::new(serialized) {
        builder.feed(token?)?;
    }
    builder.finish()
}

// =============================================================================
// SERIALISATION
// =============================================================================

/// Serialise a tree to canonical markup.
pub fn serialize(tree: &Tree) -> String {
    let mut out = String::new();
    let mut open_list: Option<&'static str> = None;

    for block in tree.blocks() {
        let list = list_open_tag(&block.kind);
        if open_list != list {
            if let Some(tag) = open_list {
                out.push_str(list_close_tag(tag));
            }
            if let Some(tag) = list {
                out.push_str(tag);
            }
            open_list = list;
        }

        match &block.kind {
            BlockKind::Paragraph => wrap(&mut out, "p", &block.runs),
            BlockKind::Heading { level } => wrap(&mut out, &format!("h{}", level), &block.runs),
            BlockKind::BulletItem | BlockKind::OrderedItem => wrap(&mut out, "li", &block.runs),
            BlockKind::Task { checked } => {
                out.push_str(&format!("<li data-checked=\"{}\">", checked));
                write_runs(&mut out, &block.runs);
                out.push_str("</li>");
            }
            BlockKind::Image { src, alt } => {
                out.push_str(&format!(
                    "<img src=\"{}\" alt=\"{}\">",
                    escape(src),
                    escape(alt)
                ));
            }
        }
    }
    if let Some(tag) = open_list {
        out.push_str(list_close_tag(tag));
    }
    out
}

const BULLET_OPEN: &str = "<ul>";
const ORDERED_OPEN: &str = "<ol>";
const TASK_OPEN: &str = "<ul data-type=\"taskList\">";

fn list_open_tag(kind: &BlockKind) -> Option<&'static str> {
    match kind {
        BlockKind::BulletItem => Some(BULLET_OPEN),
        BlockKind::OrderedItem => Some(ORDERED_OPEN),
        BlockKind::Task { .. } => Some(TASK_OPEN),
        _ => None,
    }
}

fn list_close_tag(open: &str) -> &'static str {
    if open == ORDERED_OPEN {
        "</ol>"
    } else {
        "</ul>"
    }
}

fn wrap(out: &mut String, tag: &str, runs: &[Run]) {
    out.push('<');
    out.push_str(tag);
    out.push('>');
    write_runs(out, runs);
    out.push_str("</");
    out.push_str(tag);
    out.push('>');
}

fn write_runs(out: &mut String, runs: &[Run]) {
    for run in runs {
        let marks = &run.marks;
        if let Some(href) = &marks.link {
            out.push_str(&format!("<a href=\"{}\">", escape(href)));
        }
        let tags: Vec<&str> = [
            (marks.bold, "strong"),
            (marks.italic, "em"),
            (marks.underline, "u"),
            (marks.strike, "s"),
        ]
        .into_iter()
        .filter_map(|(on, tag)| on.then_some(tag))
        .collect();
        for tag in &tags {
            out.push_str(&format!("<{}>", tag));
        }
        for (i, line) in run.text.split('\n').enumerate() {
            if i > 0 {
                out.push_str("<br>");
            }
            out.push_str(&escape(line));
        }
        for tag in tags.iter().rev() {
            out.push_str(&format!("</{}>", tag));
        }
        if marks.link.is_some() {
            out.push_str("</a>");
        }
    }
}

/// Escape text or attribute content.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn unescape(text: &str) -> Result<String> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        let semi = after
            .find(';')
            .filter(|&i| i <= 10)
            .ok_or_else(|| Error::Parse(format!("unterminated entity near {:?}", clip(after))))?;
        let name = &after[..semi];
        let decoded = match name {
            "amp" => '&',
            "lt" => '<',
            "gt" => '>',
            "quot" => '"',
            "apos" => '\'',
            "nbsp" => '\u{a0}',
            _ => {
                let code = if let Some(hex) = name
                    .strip_prefix("#x")
                    .or_else(|| name.strip_prefix("#X"))
                {
                    u32::from_str_radix(hex, 16).ok()
                } else if let Some(dec) = name.strip_prefix('#') {
                    dec.parse::<u32>().ok()
                } else {
                    None
                };
                code.and_then(char::from_u32)
                    .ok_or_else(|| Error::Parse(format!("unknown entity &{};", name)))?
            }
        };
        out.push(decoded);
        rest = &after[semi + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

fn clip(text: &str) -> String {
    text.chars().take(16).collect()
}

// =============================================================================
// TOKENIZER
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Start {
        name: String,
        attrs: Vec<(String, String)>,
    },
    End {
        name: String,
    },
    Text(String),
}

struct Tokenizer<'a> {
    rest: &'a str,
}

impl<'a> Tokenizer<'a> {
    fn new(input: &'a str) -> Self {
        Self { rest: input }
    }

    fn tag(&mut self) -> Result<Option<Token>> {
        if let Some(comment) = self.rest.strip_prefix("<!--") {
            let end = comment
                .find("-->")
                .ok_or_else(|| Error::Parse("unterminated comment".into()))?;
            self.rest = &comment[end + 3..];
            return Ok(None);
        }

        let close = self
            .rest
            .find('>')
            .ok_or_else(|| Error::Parse(format!("unterminated tag {:?}", clip(self.rest))))?;
        let inner = self.rest[1..close].trim();
        self.rest = &self.rest[close + 1..];

        if let Some(name) = inner.strip_prefix('/') {
            return Ok(Some(Token::End {
                name: tag_name(name.trim())?,
            }));
        }

        let inner = inner.strip_suffix('/').unwrap_or(inner).trim_end();
        let (name, attrs) = match inner.find(char::is_whitespace) {
            Some(i) => (&inner[..i], parse_attrs(&inner[i..])?),
            None => (inner, Vec::new()),
        };
        Ok(Some(Token::Start {
            name: tag_name(name)?,
            attrs,
        }))
    }
}

impl Iterator for Tokenizer<'_> {
    type Item = Result<Token>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.rest.is_empty() {
                return None;
            }
            if self.rest.starts_with('<') {
                match self.tag() {
                    Ok(Some(token)) => return Some(Ok(token)),
                    Ok(None) => continue,
                    Err(e) => {
                        self.rest = "";
                        return Some(Err(e));
                    }
                }
            }
            let end = self.rest.find('<').unwrap_or(self.rest.len());
            let raw = &self.rest[..end];
            self.rest = &self.rest[end..];
            return Some(unescape(raw).map(Token::Text));
        }
    }
}

fn tag_name(raw: &str) -> Result<String> {
    if raw.is_empty() || !raw.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(Error::Parse(format!("invalid tag name {:?}", raw)));
    }
    Ok(raw.to_ascii_lowercase())
}

fn parse_attrs(mut rest: &str) -> Result<Vec<(String, String)>> {
    let mut attrs = Vec::new();
    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            return Ok(attrs);
        }
        let name_end = rest
            .find(|c: char| c == '=' || c.is_whitespace())
            .unwrap_or(rest.len());
        let name = rest[..name_end].to_ascii_lowercase();
        rest = rest[name_end..].trim_start();

        let Some(after_eq) = rest.strip_prefix('=') else {
            attrs.push((name, String::new()));
            continue;
        };
        let after_eq = after_eq.trim_start();
        let (value, remaining) = match after_eq.chars().next() {
            Some(quote @ ('"' | '\'')) => {
                let body = &after_eq[1..];
                let end = body
                    .find(quote)
                    .ok_or_else(|| Error::Parse(format!("unterminated attribute {}", name)))?;
                (&body[..end], &body[end + 1..])
            }
            _ => {
                let end = after_eq.find(char::is_whitespace).unwrap_or(after_eq.len());
                (&after_eq[..end], &after_eq[end..])
            }
        };
        attrs.push((name, unescape(value)?));
        rest = remaining;
    }
}

fn attr<'a>(attrs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, v)| v.as_str())
}

// =============================================================================
// TREE BUILDER
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListKind {
    Bullet,
    Ordered,
    Task,
}

#[derive(Debug)]
enum Open {
    List(ListKind),
    Item,
    Block,
    Wrapper,
    Inline(Option<InlineMark>),
}

#[derive(Debug, Clone)]
enum InlineMark {
    Bold,
    Italic,
    Underline,
    Strike,
    Link(String),
}

#[derive(Debug)]
struct Current {
    block: Block,
    /// Started after an embedded image; dropped if it stays empty.
    continuation: bool,
}

#[derive(Debug, Default)]
struct Builder {
    blocks: Vec<Block>,
    open: Vec<(String, Open)>,
    current: Option<Current>,
    item_kind: Option<BlockKind>,
    skip_depth: usize,
}

const VOID: &[&str] = &["br", "img", "input", "hr", "wbr"];

impl Builder {
    fn feed(&mut self, token: Token) -> Result<()> {
        if self.skip_depth > 0 {
            match token {
                Token::Start { name, .. } if !VOID.contains(&name.as_str()) => {
                    self.skip_depth += 1
                }
                Token::End { .. } => self.skip_depth -= 1,
                _ => {}
            }
            return Ok(());
        }
        match token {
            Token::Start { name, attrs } => self.start(name, attrs),
            Token::End { name } => self.end(name),
            Token::Text(text) => self.text(text),
        }
    }

    fn in_item(&self) -> bool {
        self.item_kind.is_some()
    }

    fn innermost_list(&self) -> Option<ListKind> {
        self.open.iter().rev().find_map(|(_, o)| match o {
            Open::List(kind) => Some(*kind),
            _ => None,
        })
    }

    fn start(&mut self, name: String, attrs: Vec<(String, String)>) -> Result<()> {
        match name.as_str() {
            "p" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                if matches!(self.open.last(), Some((_, Open::Inline(_) | Open::Block))) {
                    return Err(Error::Parse(format!("<{}> inside inline content", name)));
                }
                if self.in_item() {
                    if name != "p" {
                        return Err(Error::Parse(format!("<{}> inside a list item", name)));
                    }
                    self.restart_item_block();
                    self.open.push((name, Open::Wrapper));
                } else {
                    let kind = match name.as_bytes() {
                        [b'h', level] => BlockKind::Heading {
                            level: level - b'0',
                        },
                        _ => BlockKind::Paragraph,
                    };
                    self.begin(kind);
                    self.open.push((name, Open::Block));
                }
            }
            "ul" | "ol" => {
                if self.current.is_some() && !self.in_item() {
                    return Err(Error::Parse(format!("<{}> inside a block", name)));
                }
                self.flush();
                let kind = if name == "ol" {
                    ListKind::Ordered
                } else if attr(&attrs, "data-type") == Some("taskList") {
                    ListKind::Task
                } else {
                    ListKind::Bullet
                };
                self.item_kind = None;
                self.open.push((name, Open::List(kind)));
            }
            "li" => {
                let Some((_, Open::List(list))) = self.open.last() else {
                    return Err(Error::Parse("<li> outside a list".into()));
                };
                let kind = match list {
                    ListKind::Bullet => BlockKind::BulletItem,
                    ListKind::Ordered => BlockKind::OrderedItem,
                    ListKind::Task => BlockKind::Task {
                        checked: attr(&attrs, "data-checked") == Some("true"),
                    },
                };
                self.begin(kind.clone());
                self.item_kind = Some(kind);
                self.open.push((name, Open::Item));
            }
            "label" if self.in_item() => self.skip_depth = 1,
            "div" => self.open.push((name, Open::Wrapper)),
            "img" => {
                let src = attr(&attrs, "src")
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| Error::Parse("<img> without src".into()))?;
                let image = Block::image(src, attr(&attrs, "alt").unwrap_or_default());
                match self.current.take() {
                    Some(current) => {
                        let kind = current.block.kind.clone();
                        if !current.block.is_empty() {
                            self.blocks.push(current.block);
                        }
                        self.blocks.push(image);
                        self.current = Some(Current {
                            block: Block::new(kind, Vec::new()),
                            continuation: true,
                        });
                    }
                    None => self.blocks.push(image),
                }
            }
            "br" => {
                if self.current.is_some() {
                    self.push_text("\n".to_string());
                }
            }
            "input" | "hr" | "wbr" => {}
            "strong" | "b" | "em" | "i" | "u" | "s" | "strike" | "del" | "a" | "span"
            | "code" => {
                if self.current.is_none() {
                    return Err(Error::Parse(format!("<{}> outside a block", name)));
                }
                let mark = match name.as_str() {
                    "strong" | "b" => Some(InlineMark::Bold),
                    "em" | "i" => Some(InlineMark::Italic),
                    "u" => Some(InlineMark::Underline),
                    "s" | "strike" | "del" => Some(InlineMark::Strike),
                    "a" => attr(&attrs, "href").map(|h| InlineMark::Link(h.to_string())),
                    _ => None,
                };
                self.open.push((name, Open::Inline(mark)));
            }
            other => return Err(Error::Parse(format!("unsupported tag <{}>", other))),
        }
        Ok(())
    }

    fn end(&mut self, name: String) -> Result<()> {
        if VOID.contains(&name.as_str()) {
            return Ok(());
        }
        let (open_name, open) = self
            .open
            .pop()
            .ok_or_else(|| Error::Parse(format!("unexpected </{}>", name)))?;
        if open_name != name {
            return Err(Error::Parse(format!(
                "mismatched </{}>, expected </{}>",
                name, open_name
            )));
        }
        match open {
            Open::Block => self.flush(),
            Open::Item => {
                self.flush();
                self.item_kind = None;
            }
            Open::List(_) => {
                // Returning to an enclosing item continues after the nested list.
                if self.open.iter().any(|(_, o)| matches!(o, Open::Item)) {
                    self.item_kind = self.innermost_list().map(|list| match list {
                        ListKind::Bullet => BlockKind::BulletItem,
                        ListKind::Ordered => BlockKind::OrderedItem,
                        ListKind::Task => BlockKind::Task { checked: false },
                    });
                    if let Some(kind) = self.item_kind.clone() {
                        self.current = Some(Current {
                            block: Block::new(kind, Vec::new()),
                            continuation: true,
                        });
                    }
                }
            }
            Open::Wrapper | Open::Inline(_) => {}
        }
        Ok(())
    }

    fn text(&mut self, text: String) -> Result<()> {
        if self.current.is_some() {
            self.push_text(text);
            Ok(())
        } else if text.trim().is_empty() {
            Ok(())
        } else {
            Err(Error::Parse(format!(
                "text outside a block: {:?}",
                clip(text.trim())
            )))
        }
    }

    fn push_text(&mut self, text: String) {
        let marks = self.marks();
        if let Some(current) = &mut self.current {
            current.block.runs.push(Run::marked(text, marks));
        }
    }

    fn marks(&self) -> MarkSet {
        let mut marks = MarkSet::default();
        for (_, open) in &self.open {
            if let Open::Inline(Some(mark)) = open {
                match mark {
                    InlineMark::Bold => marks.bold = true,
                    InlineMark::Italic => marks.italic = true,
                    InlineMark::Underline => marks.underline = true,
                    InlineMark::Strike => marks.strike = true,
                    InlineMark::Link(href) => marks.link = Some(href.clone()),
                }
            }
        }
        marks
    }

    fn begin(&mut self, kind: BlockKind) {
        self.flush();
        self.current = Some(Current {
            block: Block::new(kind, Vec::new()),
            continuation: false,
        });
    }

    /// A second paragraph inside one list item becomes its own item.
    fn restart_item_block(&mut self) {
        let Some(current) = &self.current else {
            if let Some(kind) = self.item_kind.clone() {
                self.begin(kind);
            }
            return;
        };
        if !current.block.is_empty() {
            let kind = current.block.kind.continuation();
            self.begin(kind);
        }
    }

    fn flush(&mut self) {
        if let Some(mut current) = self.current.take() {
            current.block.normalize();
            if !(current.continuation && current.block.is_empty()) {
                self.blocks.push(current.block);
            }
        }
    }

    fn finish(mut self) -> Result<Tree> {
        if let Some((name, _)) = self.open.last() {
            return Err(Error::Parse(format!("unclosed <{}>", name)));
        }
        self.flush();
        Ok(Tree::new(self.blocks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::tree::Mark;

    fn rich_tree() -> Tree {
        let bold = MarkSet::new().with(Mark::Bold);
        let link = MarkSet::new().with(Mark::Italic).with(Mark::Link {
            href: "https://example.com/?a=1&b=2".into(),
        });
        Tree::new(vec![
            Block::heading(1, "Week 3 <notes>"),
            Block::new(
                BlockKind::Paragraph,
                vec![
                    Run::plain("Plain, "),
                    Run::marked("bold", bold),
                    Run::plain(" and "),
                    Run::marked("linked", link),
                    Run::marked(
                        "all",
                        MarkSet::new()
                            .with(Mark::Bold)
                            .with(Mark::Italic)
                            .with(Mark::Underline)
                            .with(Mark::Strike),
                    ),
                ],
            ),
            Block::new(BlockKind::BulletItem, vec![Run::plain("first")]),
            Block::new(BlockKind::BulletItem, vec![Run::plain("second")]),
            Block::new(BlockKind::OrderedItem, vec![Run::plain("one")]),
            Block::new(BlockKind::Task { checked: true }, vec![Run::plain("done")]),
            Block::new(BlockKind::Task { checked: false }, vec![Run::plain("todo")]),
            Block::image("https://img.example/a.png", "a \"quoted\" alt"),
            Block::new(BlockKind::Paragraph, vec![Run::plain("line one\nline two")]),
            Block::new(BlockKind::Paragraph, Vec::new()),
        ])
    }

    #[test]
    fn test_round_trip_every_mark_and_node() {
        let tree = rich_tree();
        let serialized = serialize(&tree);
        let outcome = load(&serialized);
        assert!(!outcome.is_degraded(), "{:?}", outcome.degraded);
        assert_eq!(outcome.tree, tree);
        assert_eq!(serialize(&outcome.tree), serialized);
    }

    #[test]
    fn test_serialize_canonical_nesting() {
        let tree = Tree::new(vec![Block::new(
            BlockKind::Paragraph,
            vec![Run::marked(
                "x",
                MarkSet::new()
                    .with(Mark::Strike)
                    .with(Mark::Bold)
                    .with(Mark::Link {
                        href: "https://a.io".into(),
                    }),
            )],
        )]);
        assert_eq!(
            serialize(&tree),
            r#"<p><a href="https://a.io"><strong><s>x</s></strong></a></p>"#
        );
    }

    #[test]
    fn test_serialize_groups_list_items() {
        let tree = Tree::new(vec![
            Block::new(BlockKind::BulletItem, vec![Run::plain("a")]),
            Block::new(BlockKind::BulletItem, vec![Run::plain("b")]),
            Block::paragraph("c"),
        ]);
        assert_eq!(serialize(&tree), "<ul><li>a</li><li>b</li></ul><p>c</p>");
    }

    #[test]
    fn test_serialize_empty_tree() {
        assert_eq!(serialize(&Tree::default()), "<p></p>");
    }

    #[test]
    fn test_plain_text_content_is_not_degraded() {
        let outcome = load("first line\nTom & Jerry");
        assert!(!outcome.is_degraded());
        assert_eq!(outcome.tree.len(), 2);
        assert_eq!(outcome.tree.plain_text(), "first line\nTom & Jerry");
    }

    #[test]
    fn test_empty_content_loads_empty_paragraph() {
        let outcome = load("");
        assert!(!outcome.is_degraded());
        assert!(outcome.tree.is_empty());
    }

    #[test]
    fn test_malformed_markup_degrades_to_plain_text() {
        let raw = "<p>unclosed <strong>bold</p>\n<p>second";
        let outcome = load(raw);
        assert!(outcome.is_degraded());
        assert_eq!(outcome.tree.len(), 2);
        assert_eq!(outcome.tree.blocks()[0].text(), "<p>unclosed <strong>bold</p>");
        assert!(outcome.tree.blocks()[0].runs[0].marks.is_empty());
    }

    #[test]
    fn test_parse_failures() {
        assert!(matches!(parse("<p>a</p><blink>x</blink>"), Err(Error::Parse(_))));
        assert!(parse("<p>a &bogus; b</p>").is_err());
        assert!(parse("<p>a</p>stray").is_err());
        assert!(parse("<p>a</em></p>").is_err());
        assert!(parse("<li>x</li>").is_err());
        assert!(parse("<p>x").is_err());
        assert!(parse("<p").is_err());
    }

    #[test]
    fn test_parse_entities_and_whitespace_between_blocks() {
        let tree = parse("<p>a &lt;b&gt; &amp; &#233;&#x41;&nbsp;</p>\n  <p>c</p>").unwrap();
        assert_eq!(tree.blocks()[0].text(), "a <b> & éA\u{a0}");
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn test_parse_editor_wrappers() {
        let html = concat!(
            r#"<ul data-type="taskList">"#,
            r#"<li data-checked="true" data-type="taskItem">"#,
            r#"<label><input type="checkbox" checked="checked"><span></span></label>"#,
            r#"<div><p>ship it</p></div></li></ul>"#,
            r#"<ul><li><p>item</p></li></ul>"#,
            r#"<p><b>b</b><i>i</i><del>d</del><span>s</span><code>c</code></p>"#,
        );
        let tree = parse(html).unwrap();
        assert_eq!(tree.blocks()[0].kind, BlockKind::Task { checked: true });
        assert_eq!(tree.blocks()[0].text(), "ship it");
        assert_eq!(tree.blocks()[1].kind, BlockKind::BulletItem);
        assert_eq!(tree.blocks()[1].text(), "item");
        let runs = &tree.blocks()[2].runs;
        assert!(runs[0].marks.bold);
        assert!(runs[1].marks.italic);
        assert!(runs[2].marks.strike);
        assert_eq!(runs[3], Run::plain("sc"));
    }

    #[test]
    fn test_parse_image_inside_paragraph_splits_block() {
        let tree = parse(r#"<p>before<img src="https://i.example/x.png">after</p>"#).unwrap();
        assert_eq!(tree.len(), 3);
        assert_eq!(tree.blocks()[0].text(), "before");
        assert!(tree.blocks()[1].kind.is_image());
        assert_eq!(tree.blocks()[2].text(), "after");

        let only = parse(r#"<p><img src="https://i.example/y.png" /></p>"#).unwrap();
        assert_eq!(only.len(), 1);
        assert!(only.blocks()[0].kind.is_image());
    }

    #[test]
    fn test_parse_nested_list_flattens() {
        let tree = parse("<ul><li>a<ol><li>b</li></ol></li><li>c</li></ul>").unwrap();
        let kinds: Vec<_> = tree.blocks().iter().map(|b| b.kind.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                BlockKind::BulletItem,
                BlockKind::OrderedItem,
                BlockKind::BulletItem
            ]
        );
        assert_eq!(tree.plain_text(), "a\nb\nc");
    }

    #[test]
    fn test_comments_skipped() {
        let tree = parse("<!-- saved by margin --><p>x</p>").unwrap();
        assert_eq!(tree.plain_text(), "x");
    }
}
