//! Source-format dispatch.

use std::io::Read;

use tut_fetch::SourceKind;

use crate::error::ParseError;
use crate::model::Codelab;
use crate::node::Node;
use crate::{markdown, rich};

/// Turns fetched bytes into tutorial content.
///
/// The builder only depends on this trait, so alternative front-ends can be
/// plugged in without touching the build pipeline.
pub trait DocumentParser: Send + Sync {
    /// Parse a complete tutorial.
    fn parse(&self, kind: SourceKind, source: &mut dyn Read) -> Result<Codelab, ParseError>;

    /// Parse an import fragment.
    fn parse_fragment(&self, kind: SourceKind, source: &mut dyn Read)
    -> Result<Vec<Node>, ParseError>;
}

/// Markdown and provider-export parser.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultParser;

fn read_source(source: &mut dyn Read) -> Result<String, ParseError> {
    let mut text = String::new();
    source.read_to_string(&mut text)?;
    Ok(text)
}

impl DocumentParser for DefaultParser {
    fn parse(&self, kind: SourceKind, source: &mut dyn Read) -> Result<Codelab, ParseError> {
        let text = read_source(source)?;
        match kind {
            SourceKind::Markdown => markdown::parse_document(&text),
            SourceKind::RichDocument => rich::parse_document(&text),
        }
    }

    fn parse_fragment(
        &self,
        kind: SourceKind,
        source: &mut dyn Read,
    ) -> Result<Vec<Node>, ParseError> {
        let text = read_source(source)?;
        match kind {
            SourceKind::Markdown => Ok(markdown::parse_fragment(&text)),
            SourceKind::RichDocument => rich::parse_fragment(&text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_by_kind() {
        let parser = DefaultParser;
        let mut md: &[u8] = b"# Title\n\n## Step\n\nHi\n";
        let codelab = parser.parse(SourceKind::Markdown, &mut md).unwrap();
        assert_eq!(codelab.meta.title, "Title");

        let mut html: &[u8] = b"<h1>Title</h1><h2>Step</h2><p>Hi</p>";
        let codelab = parser.parse(SourceKind::RichDocument, &mut html).unwrap();
        assert_eq!(codelab.steps.len(), 1);
    }

    #[test]
    fn test_invalid_utf8_is_io_error() {
        let mut bytes: &[u8] = &[0xff, 0xfe];
        let err = DefaultParser
            .parse(SourceKind::Markdown, &mut bytes)
            .unwrap_err();
        assert!(matches!(err, ParseError::Io(_)));
    }
}
