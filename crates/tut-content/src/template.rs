//! Page rendering through a `minijinja` template.
//!
//! The template sees:
//!
//! - `meta`: the tutorial metadata
//! - `steps`: a list of `{title, duration, html}`, where `html` is the
//!   already-escaped step body

use std::io::Write;
use std::path::Path;

use minijinja::{AutoEscape, Environment, Value, context};

use crate::error::RenderError;
use crate::html::render_nodes;
use crate::model::{Codelab, Meta};

/// Compiled page template.
#[derive(Debug, Clone)]
pub struct Renderer {
    name: String,
    source: String,
}

impl Renderer {
    /// Read and compile the template at `path`.
    pub fn from_path(path: &Path) -> Result<Self, RenderError> {
        let source = std::fs::read_to_string(path).map_err(|source| RenderError::Template {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_source(path.display().to_string(), source)
    }

    /// Compile a template held in memory.
    pub fn from_source(
        name: impl Into<String>,
        source: impl Into<String>,
    ) -> Result<Self, RenderError> {
        let renderer = Self {
            name: name.into(),
            source: source.into(),
        };
        // Surface syntax errors before the first render.
        Self::environment().template_from_str(&renderer.source)?;
        Ok(renderer)
    }

    fn environment() -> Environment<'static> {
        let mut env = Environment::new();
        env.set_auto_escape_callback(|_| AutoEscape::Html);
        env
    }

    /// Template name, for diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Render `codelab` into `out`.
    pub fn render(&self, codelab: &Codelab, out: &mut impl Write) -> Result<(), RenderError> {
        let steps: Vec<Value> = codelab
            .steps
            .iter()
            .map(|step| {
                context! {
                    title => step.title,
                    duration => step.duration,
                    html => Value::from_safe_string(render_nodes(&step.content)),
                }
            })
            .collect();

        let env = Self::environment();
        let template = env.template_from_str(&self.source)?;
        template.render_to_write(context! { meta => codelab.meta, steps }, out)?;
        Ok(())
    }
}

/// Write the metadata sidecar as pretty JSON.
pub fn write_meta(meta: &Meta, out: impl Write) -> Result<(), RenderError> {
    serde_json::to_writer_pretty(out, meta)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Step;
    use crate::node::Node;
    use pretty_assertions::assert_eq;

    fn codelab() -> Codelab {
        Codelab {
            meta: Meta {
                id: "demo".to_owned(),
                title: "Demo <1>".to_owned(),
                ..Meta::default()
            },
            steps: vec![Step {
                title: "Start".to_owned(),
                duration: Some(2),
                content: vec![Node::Paragraph {
                    content: vec![Node::text("a & b")],
                }],
            }],
        }
    }

    #[test]
    fn test_render_escapes_meta_but_not_step_html() {
        let renderer = Renderer::from_source(
            "page.html",
            "<title>{{ meta.title }}</title>{% for s in steps %}<h2>{{ s.title }} ({{ s.duration }})</h2>{{ s.html }}{% endfor %}",
        )
        .unwrap();
        let mut out = Vec::new();
        renderer.render(&codelab(), &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "<title>Demo &lt;1&gt;</title><h2>Start (2)</h2><p>a &amp; b</p>"
        );
    }

    #[test]
    fn test_syntax_error_reported_on_load() {
        let err = Renderer::from_source("bad.html", "{% for %}").unwrap_err();
        assert!(matches!(err, RenderError::Engine(_)));
    }

    #[test]
    fn test_from_path_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = Renderer::from_path(&dir.path().join("nope.html")).unwrap_err();
        assert!(matches!(err, RenderError::Template { .. }));
    }

    #[test]
    fn test_write_meta() {
        let mut out = Vec::new();
        write_meta(&codelab().meta, &mut out).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["id"], "demo");
        assert_eq!(value["duration"], 0);
        assert!(value.get("url").is_none());
    }
}
