//! HTML emission for step content.

use crate::node::{InfoboxKind, Node, TextStyle};

/// Append `text` to `out` with HTML special characters escaped.
pub fn escape_into(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
}

/// Render `nodes` as an HTML fragment.
pub fn render_nodes(nodes: &[Node]) -> String {
    let mut out = String::new();
    write_nodes(nodes, &mut out);
    out
}

fn write_nodes(nodes: &[Node], out: &mut String) {
    for node in nodes {
        write_node(node, out);
    }
}

fn attr(out: &mut String, name: &str, value: &str) {
    out.push(' ');
    out.push_str(name);
    out.push_str("=\"");
    escape_into(out, value);
    out.push('"');
}

fn write_text(value: &str, style: TextStyle, out: &mut String) {
    let tags: Vec<&str> = [
        (style.bold, "strong"),
        (style.italic, "em"),
        (style.code, "code"),
    ]
    .into_iter()
    .filter_map(|(on, tag)| on.then_some(tag))
    .collect();

    for tag in &tags {
        out.push('<');
        out.push_str(tag);
        out.push('>');
    }
    escape_into(out, value);
    for tag in tags.iter().rev() {
        out.push_str("</");
        out.push_str(tag);
        out.push('>');
    }
}

fn write_node(node: &Node, out: &mut String) {
    match node {
        Node::Text { value, style } => write_text(value, *style, out),
        Node::Break => out.push_str("<br>"),
        Node::Code { language, value } => {
            out.push_str("<pre><code");
            if let Some(language) = language {
                attr(out, "class", &format!("language-{language}"));
            }
            out.push('>');
            escape_into(out, value);
            out.push_str("</code></pre>");
        }
        Node::Paragraph { content } => {
            out.push_str("<p>");
            write_nodes(content, out);
            out.push_str("</p>");
        }
        Node::Header { level, content } => {
            let level = (*level).clamp(1, 6);
            out.push_str(&format!("<h{level}>"));
            write_nodes(content, out);
            out.push_str(&format!("</h{level}>"));
        }
        Node::Image { src, alt, title } => {
            out.push_str("<img");
            attr(out, "src", src);
            attr(out, "alt", alt);
            if !title.is_empty() {
                attr(out, "title", title);
            }
            out.push('>');
        }
        Node::Url { href, content } => {
            out.push_str("<a");
            attr(out, "href", href);
            attr(out, "target", "_blank");
            out.push('>');
            write_nodes(content, out);
            out.push_str("</a>");
        }
        Node::Button { href, content } => {
            out.push_str("<a");
            attr(out, "href", href);
            attr(out, "target", "_blank");
            out.push_str("><paper-button class=\"colored\" raised>");
            write_nodes(content, out);
            out.push_str("</paper-button></a>");
        }
        Node::ItemsList { ordered, items } => {
            let tag = if *ordered { "ol" } else { "ul" };
            out.push_str(&format!("<{tag}>"));
            for item in items {
                out.push_str("<li>");
                write_nodes(item, out);
                out.push_str("</li>");
            }
            out.push_str(&format!("</{tag}>"));
        }
        Node::Grid { rows } => {
            out.push_str("<table>");
            for row in rows {
                out.push_str("<tr>");
                for cell in row {
                    out.push_str("<td>");
                    write_nodes(cell, out);
                    out.push_str("</td>");
                }
                out.push_str("</tr>");
            }
            out.push_str("</table>");
        }
        Node::Infobox { kind, content } => {
            let (open, close) = match kind {
                InfoboxKind::Positive => ("<aside class=\"special\">", "</aside>"),
                InfoboxKind::Negative => ("<aside class=\"warning\">", "</aside>"),
                InfoboxKind::Plain => ("<blockquote>", "</blockquote>"),
            };
            out.push_str(open);
            write_nodes(content, out);
            out.push_str(close);
        }
        Node::Import { content, .. } => write_nodes(content, out),
        Node::Html { value } => out.push_str(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_escape_into() {
        let mut out = String::new();
        escape_into(&mut out, r#"<a href="x">&'"#);
        assert_eq!(out, "&lt;a href=&quot;x&quot;&gt;&amp;&#39;");
    }

    #[test]
    fn test_render_paragraph_with_styles() {
        let nodes = vec![Node::Paragraph {
            content: vec![
                Node::text("a < b "),
                Node::Text {
                    value: "bold".to_owned(),
                    style: TextStyle {
                        bold: true,
                        italic: true,
                        code: false,
                    },
                },
            ],
        }];
        assert_eq!(
            render_nodes(&nodes),
            "<p>a &lt; b <strong><em>bold</em></strong></p>"
        );
    }

    #[test]
    fn test_render_code_block() {
        let nodes = vec![Node::Code {
            language: Some("bash".to_owned()),
            value: "echo <hi>\n".to_owned(),
        }];
        assert_eq!(
            render_nodes(&nodes),
            "<pre><code class=\"language-bash\">echo &lt;hi&gt;\n</code></pre>"
        );
    }

    #[test]
    fn test_render_image_and_button() {
        let nodes = vec![
            Node::Image {
                src: "img/abc.png".to_owned(),
                alt: "logo".to_owned(),
                title: String::new(),
            },
            Node::Button {
                href: "https://example.com/?a=1&b=2".to_owned(),
                content: vec![Node::text("Go")],
            },
        ];
        assert_eq!(
            render_nodes(&nodes),
            "<img src=\"img/abc.png\" alt=\"logo\">\
             <a href=\"https://example.com/?a=1&amp;b=2\" target=\"_blank\">\
             <paper-button class=\"colored\" raised>Go</paper-button></a>"
        );
    }

    #[test]
    fn test_render_import_inlines_content() {
        let nodes = vec![Node::Import {
            reference: "frag.md".to_owned(),
            content: vec![Node::Paragraph {
                content: vec![Node::text("shared")],
            }],
        }];
        assert_eq!(render_nodes(&nodes), "<p>shared</p>");
    }

    #[test]
    fn test_render_infobox_and_list() {
        let nodes = vec![
            Node::Infobox {
                kind: InfoboxKind::Negative,
                content: vec![Node::text("careful")],
            },
            Node::ItemsList {
                ordered: true,
                items: vec![vec![Node::text("one")], vec![Node::text("two")]],
            },
        ];
        assert_eq!(
            render_nodes(&nodes),
            "<aside class=\"warning\">careful</aside><ol><li>one</li><li>two</li></ol>"
        );
    }
}
