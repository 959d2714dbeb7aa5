//! Markdown tutorial parser.
//!
//! A tutorial file starts with an optional `key: value` metadata header,
//! then a `# Title`. Every `## Heading` opens a step. Inside a step:
//!
//! - `duration: mm:ss` as the first paragraph sets the step duration
//! - a paragraph consisting solely of `<<reference>>` is an import
//! - `[button: Label](url)` is a button
//! - `> positive: ...` and `> negative: ...` are callouts

use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use tracing::debug;

use crate::error::ParseError;
use crate::model::{Codelab, Meta, Step, slugify};
use crate::node::{InfoboxKind, Node, TextStyle};

const BUTTON_PREFIX: &str = "button:";
const DURATION_PREFIX: &str = "duration:";

/// Parse a complete tutorial.
pub fn parse_document(source: &str) -> Result<Codelab, ParseError> {
    let (header, body) = split_header(source);
    let mut builder = TreeBuilder::new(false);
    builder.run(body);
    let (title, steps) = builder.finish_document();

    let title = title.ok_or(ParseError::MissingTitle)?;
    let mut meta = parse_header(&header)?;
    if meta.id.is_empty() {
        meta.id = slugify(&title);
    }
    if meta.duration == 0 {
        meta.duration = steps.iter().filter_map(|s| s.duration).sum();
    }
    meta.title = title;

    Ok(Codelab { meta, steps })
}

/// Parse an import fragment: plain content, no metadata or steps.
pub fn parse_fragment(source: &str) -> Vec<Node> {
    let mut builder = TreeBuilder::new(true);
    builder.run(source);
    builder.finish_fragment()
}

/// Split leading `key: value` lines from the rest of the source.
fn split_header(source: &str) -> (Vec<(String, String)>, &str) {
    let mut header = Vec::new();
    let mut offset = 0;

    for line in source.split_inclusive('\n') {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            if header.is_empty() {
                offset += line.len();
                continue;
            }
            break;
        }
        let Some((key, value)) = header_entry(trimmed) else {
            break;
        };
        header.push((key.to_lowercase(), value.to_owned()));
        offset += line.len();
    }

    (header, &source[offset..])
}

/// Split a `key: value` metadata line. Keys are words and spaces only.
pub(crate) fn header_entry(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once(':')?;
    let key = key.trim();
    let valid = !key.is_empty() && key.chars().all(|c| c.is_alphanumeric() || c == ' ');
    valid.then(|| (key, value.trim()))
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

fn parse_header(header: &[(String, String)]) -> Result<Meta, ParseError> {
    let mut meta = Meta::default();
    for (key, value) in header {
        match key.as_str() {
            "id" => meta.id.clone_from(value),
            "summary" => meta.summary.clone_from(value),
            "categories" | "category" => meta.categories = split_list(value),
            "tags" => meta.tags = split_list(value),
            "status" => meta.status = split_list(value),
            "author" | "authors" => meta.authors.clone_from(value),
            "feedback link" => meta.feedback = Some(value.clone()),
            "duration" => {
                meta.duration = value.parse().map_err(|_| ParseError::InvalidMeta {
                    key: key.clone(),
                    value: value.clone(),
                })?;
            }
            other => debug!(key = other, "Ignoring unknown metadata key"),
        }
    }
    Ok(meta)
}

/// Parse `mm:ss` or `mm` into whole minutes, rounding seconds up.
fn parse_minutes(value: &str) -> Option<u32> {
    let value = value.trim();
    match value.split_once(':') {
        Some((minutes, seconds)) => {
            let minutes: u32 = minutes.trim().parse().ok()?;
            let seconds: u32 = seconds.trim().parse().ok()?;
            Some(minutes + seconds.div_ceil(60))
        }
        None => value.parse().ok(),
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

/// Strip `prefix` (ASCII case-insensitive) from the first text node.
fn strip_leading_marker(nodes: &mut Vec<Node>, prefix: &str) -> bool {
    let Some(Node::Text { value, .. }) = nodes.first_mut() else {
        return false;
    };
    let matches = value
        .get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix));
    if !matches {
        return false;
    }
    let rest = value[prefix.len()..].trim_start().to_owned();
    if rest.is_empty() {
        nodes.remove(0);
    } else {
        *value = rest;
    }
    true
}

enum FrameKind {
    Root,
    Paragraph { raw: String },
    Header(u8),
    Quote,
    List { ordered: bool, items: Vec<Vec<Node>> },
    Item,
    Table { rows: Vec<Vec<Vec<Node>>> },
    Row { cells: Vec<Vec<Node>> },
    Cell,
    Link { href: String },
    Image { src: String, title: String },
    Code { language: Option<String>, value: String },
    Html { value: String },
}

struct Frame {
    kind: FrameKind,
    children: Vec<Node>,
}

impl Frame {
    fn new(kind: FrameKind) -> Self {
        Self {
            kind,
            children: Vec::new(),
        }
    }
}

struct StepHead {
    title: String,
    duration: Option<u32>,
}

/// Builds a node tree from pulldown-cmark events.
struct TreeBuilder {
    fragment: bool,
    stack: Vec<Frame>,
    bold: usize,
    italic: usize,
    title: Option<String>,
    current: Option<StepHead>,
    steps: Vec<Step>,
}

impl TreeBuilder {
    fn new(fragment: bool) -> Self {
        Self {
            fragment,
            stack: vec![Frame::new(FrameKind::Root)],
            bold: 0,
            italic: 0,
            title: None,
            current: None,
            steps: Vec::new(),
        }
    }

    fn run(&mut self, source: &str) {
        let options = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH;
        for (event, range) in Parser::new_ext(source, options).into_offset_iter() {
            self.process_event(event, source.get(range).unwrap_or_default());
        }
    }

    fn finish_document(mut self) -> (Option<String>, Vec<Step>) {
        self.flush_step();
        (self.title, self.steps)
    }

    fn finish_fragment(mut self) -> Vec<Node> {
        self.stack
            .drain(..)
            .next()
            .map(|root| root.children)
            .unwrap_or_default()
    }

    /// `raw` is the source text the event was produced from.
    fn process_event(&mut self, event: Event<'_>, raw: &str) {
        match event {
            Event::Start(tag) => self.start_tag(tag, raw),
            Event::End(tag) => self.end_tag(tag),
            Event::Text(text) => self.text(&text, false),
            Event::Code(code) => self.text(&code, true),
            Event::Html(html) => self.block_html(&html),
            Event::InlineHtml(html) => self.push(Node::Html {
                value: html.into_string(),
            }),
            Event::SoftBreak => self.text(" ", false),
            Event::HardBreak => self.push(Node::Break),
            Event::Rule => self.push(Node::Html {
                value: "<hr>".to_owned(),
            }),
            _ => {}
        }
    }

    fn start_tag(&mut self, tag: Tag<'_>, raw: &str) {
        let kind = match tag {
            Tag::Paragraph => FrameKind::Paragraph {
                raw: raw.to_owned(),
            },
            Tag::Heading { level, .. } => FrameKind::Header(heading_level(level)),
            Tag::BlockQuote(_) => FrameKind::Quote,
            Tag::CodeBlock(kind) => FrameKind::Code {
                language: match kind {
                    CodeBlockKind::Fenced(lang) if !lang.is_empty() => Some(lang.into_string()),
                    _ => None,
                },
                value: String::new(),
            },
            Tag::List(start) => FrameKind::List {
                ordered: start.is_some(),
                items: Vec::new(),
            },
            Tag::Item => FrameKind::Item,
            Tag::Table(_) => FrameKind::Table { rows: Vec::new() },
            Tag::TableHead | Tag::TableRow => FrameKind::Row { cells: Vec::new() },
            Tag::TableCell => FrameKind::Cell,
            Tag::Link { dest_url, .. } => FrameKind::Link {
                href: dest_url.into_string(),
            },
            Tag::Image {
                dest_url, title, ..
            } => FrameKind::Image {
                src: dest_url.into_string(),
                title: title.into_string(),
            },
            Tag::HtmlBlock => FrameKind::Html {
                value: String::new(),
            },
            Tag::Emphasis => {
                self.italic += 1;
                return;
            }
            Tag::Strong => {
                self.bold += 1;
                return;
            }
            _ => return,
        };
        self.stack.push(Frame::new(kind));
    }

    fn end_tag(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Emphasis => {
                self.italic = self.italic.saturating_sub(1);
                return;
            }
            TagEnd::Strong => {
                self.bold = self.bold.saturating_sub(1);
                return;
            }
            TagEnd::Paragraph
            | TagEnd::Heading(_)
            | TagEnd::BlockQuote(_)
            | TagEnd::CodeBlock
            | TagEnd::List(_)
            | TagEnd::Item
            | TagEnd::Table
            | TagEnd::TableHead
            | TagEnd::TableRow
            | TagEnd::TableCell
            | TagEnd::Link
            | TagEnd::Image
            | TagEnd::HtmlBlock => {}
            _ => return,
        }

        if self.stack.len() <= 1 {
            return;
        }
        let Some(frame) = self.stack.pop() else {
            return;
        };
        let children = frame.children;

        match frame.kind {
            FrameKind::Root => {}
            FrameKind::Paragraph { raw } => self.end_paragraph(&raw, children),
            FrameKind::Header(level) => self.end_heading(level, children),
            FrameKind::Quote => self.end_quote(children),
            FrameKind::Code { language, value } => self.push(Node::Code { language, value }),
            FrameKind::List { ordered, items } => self.push(Node::ItemsList { ordered, items }),
            FrameKind::Item => {
                if let Some(Frame {
                    kind: FrameKind::List { items, .. },
                    ..
                }) = self.stack.last_mut()
                {
                    items.push(children);
                }
            }
            FrameKind::Table { rows } => self.push(Node::Grid { rows }),
            FrameKind::Row { cells } => {
                if let Some(Frame {
                    kind: FrameKind::Table { rows },
                    ..
                }) = self.stack.last_mut()
                {
                    rows.push(cells);
                }
            }
            FrameKind::Cell => {
                if let Some(Frame {
                    kind: FrameKind::Row { cells },
                    ..
                }) = self.stack.last_mut()
                {
                    cells.push(children);
                }
            }
            FrameKind::Link { href } => self.end_link(href, children),
            FrameKind::Image { src, title } => {
                let alt = children.iter().map(Node::plain_text).collect();
                self.push(Node::Image { src, alt, title });
            }
            FrameKind::Html { value } => self.push(Node::Html { value }),
        }
    }

    fn end_paragraph(&mut self, raw: &str, children: Vec<Node>) {
        let raw = raw.trim();
        if let Some(reference) = raw
            .strip_prefix("<<")
            .and_then(|r| r.strip_suffix(">>"))
            .map(str::trim)
            .filter(|r| !r.is_empty())
        {
            self.push(Node::Import {
                reference: reference.to_owned(),
                content: Vec::new(),
            });
            return;
        }

        let paragraph = Node::Paragraph { content: children };
        if !self.fragment && self.stack.len() == 1 && self.stack[0].children.is_empty() {
            let text = paragraph.plain_text();
            if let Some(step) = self.current.as_mut()
                && let Some(value) = text
                    .get(..DURATION_PREFIX.len())
                    .filter(|head| head.eq_ignore_ascii_case(DURATION_PREFIX))
                    .and_then(|_| parse_minutes(&text[DURATION_PREFIX.len()..]))
            {
                step.duration = Some(value);
                return;
            }
        }
        self.push(paragraph);
    }

    fn end_heading(&mut self, level: u8, children: Vec<Node>) {
        if !self.fragment && self.stack.len() == 1 {
            let text: String = children.iter().map(Node::plain_text).collect();
            match level {
                1 if self.title.is_none() => {
                    self.title = Some(text.trim().to_owned());
                    return;
                }
                2 => {
                    self.flush_step();
                    self.current = Some(StepHead {
                        title: text.trim().to_owned(),
                        duration: None,
                    });
                    return;
                }
                _ => {}
            }
        }
        self.push(Node::Header {
            level,
            content: children,
        });
    }

    fn end_quote(&mut self, mut children: Vec<Node>) {
        let mut kind = InfoboxKind::Plain;
        if let Some(Node::Paragraph { content }) = children.first_mut() {
            if strip_leading_marker(content, "positive:") {
                kind = InfoboxKind::Positive;
            } else if strip_leading_marker(content, "negative:") {
                kind = InfoboxKind::Negative;
            }
        }
        self.push(Node::Infobox {
            kind,
            content: children,
        });
    }

    fn end_link(&mut self, href: String, mut children: Vec<Node>) {
        if strip_leading_marker(&mut children, BUTTON_PREFIX) {
            self.push(Node::Button {
                href,
                content: children,
            });
        } else {
            self.push(Node::Url {
                href,
                content: children,
            });
        }
    }

    fn flush_step(&mut self) {
        let content = std::mem::take(&mut self.stack[0].children);
        match self.current.take() {
            Some(head) => self.steps.push(Step {
                title: head.title,
                duration: head.duration,
                content,
            }),
            None if !content.is_empty() => {
                debug!(nodes = content.len(), "Dropping content before the first step");
            }
            None => {}
        }
    }

    fn text(&mut self, text: &str, code: bool) {
        if let Some(frame) = self.stack.last_mut() {
            match &mut frame.kind {
                FrameKind::Code { value, .. } | FrameKind::Html { value } => {
                    value.push_str(text);
                    return;
                }
                _ => {}
            }
        }
        let style = TextStyle {
            bold: self.bold > 0,
            italic: self.italic > 0,
            code,
        };
        // Merge adjacent runs with the same style so markers stay in one node.
        if let Some(Frame { children, .. }) = self.stack.last_mut()
            && let Some(Node::Text {
                value,
                style: last_style,
            }) = children.last_mut()
            && *last_style == style
        {
            value.push_str(text);
            return;
        }
        self.push(Node::Text {
            value: text.to_owned(),
            style,
        });
    }

    fn block_html(&mut self, html: &str) {
        if let Some(Frame {
            kind: FrameKind::Html { value },
            ..
        }) = self.stack.last_mut()
        {
            value.push_str(html);
        } else {
            self.push(Node::Html {
                value: html.to_owned(),
            });
        }
    }

    fn push(&mut self, node: Node) {
        if let Some(frame) = self.stack.last_mut() {
            frame.children.push(node);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{image_sources, import_references};
    use pretty_assertions::assert_eq;

    const TUTORIAL: &str = "\
id: first-snap
summary: Build your first snap
categories: packaging, desktop
tags: snap, beginner
status: published
authors: Jane Doe
feedback link: https://example.com/issues

# Create your first snap

## Overview
duration: 2:30

Snaps are **easy**.

![logo](images/logo.png)

## Build it
duration: 5:00

<<shared/install.md>>

1. Run `snapcraft`
2. Check [button: Download](https://example.com/dl)

> positive: It works!

| a | b |
|---|---|
| ![x](images/x.png) | y |
";

    #[test]
    fn test_parse_document_meta() {
        let codelab = parse_document(TUTORIAL).unwrap();
        let meta = &codelab.meta;
        assert_eq!(meta.id, "first-snap");
        assert_eq!(meta.title, "Create your first snap");
        assert_eq!(meta.summary, "Build your first snap");
        assert_eq!(meta.categories, vec!["packaging", "desktop"]);
        assert_eq!(meta.tags, vec!["snap", "beginner"]);
        assert_eq!(meta.status, vec!["published"]);
        assert_eq!(meta.authors, "Jane Doe");
        assert_eq!(meta.feedback.as_deref(), Some("https://example.com/issues"));
        assert_eq!(meta.duration, 8);
    }

    #[test]
    fn test_parse_document_steps() {
        let codelab = parse_document(TUTORIAL).unwrap();
        let titles: Vec<_> = codelab.steps.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["Overview", "Build it"]);
        assert_eq!(codelab.steps[0].duration, Some(3));
        assert_eq!(codelab.steps[1].duration, Some(5));
    }

    #[test]
    fn test_parse_document_references() {
        let codelab = parse_document(TUTORIAL).unwrap();
        assert_eq!(
            image_sources(&codelab.steps[0].content),
            vec!["images/logo.png".to_owned()]
        );
        assert_eq!(
            image_sources(&codelab.steps[1].content),
            vec!["images/x.png".to_owned()]
        );
        assert_eq!(
            import_references(&codelab.steps[1].content),
            vec!["shared/install.md".to_owned()]
        );
    }

    #[test]
    fn test_button_and_infobox() {
        let codelab = parse_document(TUTORIAL).unwrap();
        let content = &codelab.steps[1].content;

        let Some(Node::ItemsList { ordered, items }) = content.get(1) else {
            panic!("expected list, got {:?}", content.get(1));
        };
        assert!(ordered);
        let has_button = items[1].iter().any(|n| {
            matches!(n, Node::Paragraph { content } if content.iter().any(|c| matches!(c, Node::Button { href, .. } if href == "https://example.com/dl")))
        }) || items[1]
            .iter()
            .any(|n| matches!(n, Node::Button { href, .. } if href == "https://example.com/dl"));
        assert!(has_button, "items: {items:?}");

        assert!(content.iter().any(|n| matches!(
            n,
            Node::Infobox {
                kind: InfoboxKind::Positive,
                ..
            }
        )));
    }

    #[test]
    fn test_missing_id_derived_from_title() {
        let codelab = parse_document("# Hello World\n\n## Step\n\nText\n").unwrap();
        assert_eq!(codelab.meta.id, "hello-world");
        assert_eq!(codelab.meta.duration, 0);
    }

    #[test]
    fn test_missing_title() {
        let err = parse_document("## Only a step\n").unwrap_err();
        assert!(matches!(err, ParseError::MissingTitle));
    }

    #[test]
    fn test_invalid_duration_header() {
        let err = parse_document("duration: soon\n\n# T\n").unwrap_err();
        assert!(matches!(err, ParseError::InvalidMeta { .. }));
    }

    #[test]
    fn test_import_without_extension() {
        let codelab = parse_document("# T\n\n## S\n\n<<intro>>\n").unwrap();
        assert_eq!(
            import_references(&codelab.steps[0].content),
            vec!["intro".to_owned()]
        );
    }

    #[test]
    fn test_parse_fragment_keeps_headings() {
        let nodes = parse_fragment("## Install\n\nRun it.\n");
        assert_eq!(nodes.len(), 2);
        assert!(matches!(nodes[0], Node::Header { level: 2, .. }));
        assert_eq!(nodes[1].plain_text(), "Run it.");
    }

    #[test]
    fn test_parse_minutes() {
        assert_eq!(parse_minutes("5:00"), Some(5));
        assert_eq!(parse_minutes("0:01"), Some(1));
        assert_eq!(parse_minutes(" 12 "), Some(12));
        assert_eq!(parse_minutes("x"), None);
    }
}
