//! Tutorial content tree.
//!
//! [`Node`] is a closed set of variants. Containers expose their child lists
//! through [`Node::children`] / [`Node::children_mut`], so a single walker
//! ([`visit`], [`visit_mut`]) serves every recursive query over the tree.

use serde::Serialize;

/// Inline text styling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TextStyle {
    pub bold: bool,
    pub italic: bool,
    pub code: bool,
}

/// Callout flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InfoboxKind {
    /// Tips and good practice.
    Positive,
    /// Warnings.
    Negative,
    /// Plain quotation.
    Plain,
}

/// One node of tutorial content.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Node {
    /// Styled text run.
    Text { value: String, style: TextStyle },
    /// Line break.
    Break,
    /// Fenced or indented code block.
    Code {
        language: Option<String>,
        value: String,
    },
    /// Block of inline content.
    Paragraph { content: Vec<Node> },
    /// Section heading inside a step.
    Header { level: u8, content: Vec<Node> },
    /// Image reference; `src` is rewritten once the asset is stored.
    Image {
        src: String,
        alt: String,
        title: String,
    },
    /// Hyperlink.
    Url { href: String, content: Vec<Node> },
    /// Hyperlink rendered as a call-to-action button.
    Button { href: String, content: Vec<Node> },
    /// Bulleted or numbered list.
    ItemsList {
        ordered: bool,
        items: Vec<Vec<Node>>,
    },
    /// Table; each cell holds its own content.
    Grid { rows: Vec<Vec<Vec<Node>>> },
    /// Highlighted callout.
    Infobox {
        kind: InfoboxKind,
        content: Vec<Node>,
    },
    /// Fragment pulled in from another source; `content` is empty until resolved.
    Import {
        reference: String,
        content: Vec<Node>,
    },
    /// Raw HTML passed through.
    Html { value: String },
}

impl Node {
    /// Unstyled text node.
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text {
            value: value.into(),
            style: TextStyle::default(),
        }
    }

    /// Child containers of this node, in document order.
    pub fn children(&self) -> Vec<&Vec<Node>> {
        match self {
            Self::Paragraph { content }
            | Self::Header { content, .. }
            | Self::Url { content, .. }
            | Self::Button { content, .. }
            | Self::Infobox { content, .. }
            | Self::Import { content, .. } => vec![content],
            Self::ItemsList { items, .. } => items.iter().collect(),
            Self::Grid { rows } => rows.iter().flatten().collect(),
            Self::Text { .. }
            | Self::Break
            | Self::Code { .. }
            | Self::Image { .. }
            | Self::Html { .. } => Vec::new(),
        }
    }

    /// Mutable child containers of this node, in document order.
    pub fn children_mut(&mut self) -> Vec<&mut Vec<Node>> {
        match self {
            Self::Paragraph { content }
            | Self::Header { content, .. }
            | Self::Url { content, .. }
            | Self::Button { content, .. }
            | Self::Infobox { content, .. }
            | Self::Import { content, .. } => vec![content],
            Self::ItemsList { items, .. } => items.iter_mut().collect(),
            Self::Grid { rows } => rows.iter_mut().flatten().collect(),
            Self::Text { .. }
            | Self::Break
            | Self::Code { .. }
            | Self::Image { .. }
            | Self::Html { .. } => Vec::new(),
        }
    }

    /// Concatenated text of this node and its descendants.
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        match self {
            Self::Text { value, .. } => out.push_str(value),
            Self::Break => out.push(' '),
            _ => {
                for children in self.children() {
                    for child in children {
                        child.collect_text(out);
                    }
                }
            }
        }
    }
}

/// Depth-first, pre-order walk over `nodes`.
pub fn visit<'a>(nodes: &'a [Node], f: &mut dyn FnMut(&'a Node)) {
    for node in nodes {
        f(node);
        for children in node.children() {
            visit(children, f);
        }
    }
}

/// Depth-first, pre-order walk allowing in-place edits.
///
/// Children are read after `f` runs, so edits to a container's own child
/// list are walked too.
pub fn visit_mut(nodes: &mut [Node], f: &mut dyn FnMut(&mut Node)) {
    for node in nodes {
        f(node);
        for children in node.children_mut() {
            visit_mut(children, f);
        }
    }
}

/// Every image `src` under `nodes`, first occurrence order, no duplicates.
pub fn image_sources(nodes: &[Node]) -> Vec<String> {
    let mut sources: Vec<String> = Vec::new();
    visit(nodes, &mut |node| {
        if let Node::Image { src, .. } = node
            && !sources.contains(src)
        {
            sources.push(src.clone());
        }
    });
    sources
}

/// Every import reference under `nodes`, first occurrence order, no duplicates.
pub fn import_references(nodes: &[Node]) -> Vec<String> {
    let mut references: Vec<String> = Vec::new();
    visit(nodes, &mut |node| {
        if let Node::Import { reference, .. } = node
            && !references.contains(reference)
        {
            references.push(reference.clone());
        }
    });
    references
}
