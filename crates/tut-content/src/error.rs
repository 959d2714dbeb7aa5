//! Error types for parsing and rendering.

/// Error while turning source bytes into a tutorial.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// Source could not be read or was not UTF-8.
    #[error("I/O error reading source")]
    Io(#[from] std::io::Error),

    /// Document has no `# Title` line.
    #[error("document has no title")]
    MissingTitle,

    /// Metadata header holds an unusable value.
    #[error("invalid metadata {key}: {value:?}")]
    InvalidMeta {
        /// Header key.
        key: String,
        /// Offending value.
        value: String,
    },

    /// Rich document could not be converted to markdown.
    #[error("rich document conversion failed: {0}")]
    Conversion(String),
}

/// Error while writing rendered output.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// Template could not be read.
    #[error("I/O error reading template {}", path.display())]
    Template {
        /// Template path.
        path: std::path::PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Template failed to compile or render.
    #[error("template error")]
    Engine(#[from] minijinja::Error),

    /// Metadata sidecar could not be serialized.
    #[error("failed to serialize metadata")]
    Json(#[from] serde_json::Error),
}
