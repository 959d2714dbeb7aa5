//! Parsed tutorial model.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::node::Node;

/// Public metadata of a tutorial.
///
/// Serialized as the `codelab.json` sidecar and as one entry of the site
/// index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Meta {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
    pub status: Vec<String>,
    pub authors: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    /// Estimated completion time in minutes.
    pub duration: u32,
    /// Source modification time.
    pub updated: DateTime<Utc>,
    /// Public URL of the rendered tutorial, set by the builder.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub url: String,
}

impl Default for Meta {
    fn default() -> Self {
        Self {
            id: String::new(),
            title: String::new(),
            summary: String::new(),
            categories: Vec::new(),
            tags: Vec::new(),
            status: Vec::new(),
            authors: String::new(),
            feedback: None,
            duration: 0,
            updated: DateTime::<Utc>::UNIX_EPOCH,
            url: String::new(),
        }
    }
}

/// One step of a tutorial.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Step {
    pub title: String,
    /// Step duration in minutes, when declared.
    pub duration: Option<u32>,
    pub content: Vec<Node>,
}

/// A parsed tutorial: metadata plus its ordered steps.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Codelab {
    pub meta: Meta,
    pub steps: Vec<Step>,
}

impl Codelab {
    /// Apply `f` to the content of every step.
    pub fn for_each_content_mut(&mut self, mut f: impl FnMut(&mut Vec<Node>)) {
        for step in &mut self.steps {
            f(&mut step.content);
        }
    }

    /// Every node of every step, as one slice per step.
    pub fn contents(&self) -> impl Iterator<Item = &[Node]> {
        self.steps.iter().map(|s| s.content.as_slice())
    }
}

/// Derive a URL-safe id from a title: lowercase, runs of other characters
/// collapse to a single `-`.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Create a Snap!"), "create-a-snap");
        assert_eq!(slugify("  Hello,  World  "), "hello-world");
        assert_eq!(slugify("???"), "");
    }
}
