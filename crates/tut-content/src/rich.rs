//! Rich document conversion.
//!
//! Provider documents arrive as exported HTML. They are converted to
//! markdown with `htmd` and then parsed like any markdown tutorial.

use crate::error::ParseError;
use crate::markdown::{self, header_entry};
use crate::model::Codelab;
use crate::node::Node;

/// Tags with no tutorial content.
const SKIPPED_TAGS: &[&str] = &["script", "style", "head", "title", "meta", "link"];

fn to_markdown(html: &str) -> Result<String, ParseError> {
    htmd::HtmlToMarkdown::builder()
        .skip_tags(SKIPPED_TAGS.to_vec())
        .build()
        .convert(html)
        .map_err(|e| ParseError::Conversion(e.to_string()))
}

/// Exported paragraphs are separated by blank lines, which would end the
/// metadata header after its first entry. Pull the leading entries together.
fn compact_header(markdown: &str) -> String {
    let mut header = Vec::new();
    let mut lines = markdown.lines().peekable();

    while let Some(line) = lines.peek() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            lines.next();
            continue;
        }
        if header_entry(trimmed).is_none() {
            break;
        }
        header.push(trimmed.to_owned());
        lines.next();
    }

    let body: Vec<&str> = lines.collect();
    if header.is_empty() {
        return body.join("\n");
    }
    format!("{}\n\n{}", header.join("\n"), body.join("\n"))
}

/// Parse an exported rich document.
pub fn parse_document(html: &str) -> Result<Codelab, ParseError> {
    let markdown = compact_header(&to_markdown(html)?);
    markdown::parse_document(&markdown)
}

/// Parse an exported rich document as an import fragment.
pub fn parse_fragment(html: &str) -> Result<Vec<Node>, ParseError> {
    Ok(markdown::parse_fragment(&to_markdown(html)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const EXPORT: &str = "<html><head><title>ignored</title><style>p{}</style></head><body>\
        <p>id: rich-doc</p><p>summary: From the provider</p>\
        <h1>Rich tutorial</h1>\
        <h2>First</h2><p>Hello <strong>there</strong>.</p>\
        <h2>Second</h2><p>Bye.</p>\
        </body></html>";

    #[test]
    fn test_parse_rich_document() {
        let codelab = parse_document(EXPORT).unwrap();
        assert_eq!(codelab.meta.id, "rich-doc");
        assert_eq!(codelab.meta.summary, "From the provider");
        assert_eq!(codelab.meta.title, "Rich tutorial");
        let titles: Vec<_> = codelab.steps.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["First", "Second"]);
    }

    #[test]
    fn test_parse_rich_fragment() {
        let nodes = parse_fragment("<p>Shared text</p>").unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].plain_text(), "Shared text");
    }

    #[test]
    fn test_compact_header() {
        assert_eq!(
            compact_header("\nid: a\n\nsummary: b\n\n# T\n"),
            "id: a\nsummary: b\n\n# T"
        );
        assert_eq!(compact_header("# T\n\ntext"), "# T\n\ntext");
    }
}
