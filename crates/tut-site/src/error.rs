//! Error types for discovery, builds and site assembly.

use std::fmt;
use std::path::PathBuf;

use tut_content::{ParseError, RenderError};
use tut_fetch::FetchError;

/// One asset that could not be stored.
#[derive(Debug)]
pub struct AssetFailure {
    /// Reference as written in the document.
    pub src: String,
    /// Intended stored path, when it got that far.
    pub dest: Option<PathBuf>,
    /// What went wrong.
    pub cause: String,
}

impl fmt::Display for AssetFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dest = self
            .dest
            .as_ref()
            .map_or_else(|| "?".to_owned(), |d| d.display().to_string());
        write!(f, "couldn't copy {} => {dest}: {}", self.src, self.cause)
    }
}

/// Every asset failure of one document.
#[derive(Debug)]
pub struct AssetError {
    pub failures: Vec<AssetFailure>,
}

impl fmt::Display for AssetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, failure) in self.failures.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{failure}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AssetError {}

/// Failure to build or refresh one document.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// Document or include could not be fetched.
    #[error("failed to fetch {reference}")]
    Fetch {
        reference: String,
        #[source]
        source: FetchError,
    },

    /// Document or include could not be parsed.
    #[error("failed to parse {reference}")]
    Parse {
        reference: String,
        #[source]
        source: ParseError,
    },

    /// One or more assets failed.
    #[error("failed to materialize assets")]
    Assets(#[from] AssetError),

    /// Output could not be rendered.
    #[error("failed to render {id}")]
    Render {
        id: String,
        #[source]
        source: RenderError,
    },

    /// The id cannot name an output directory.
    #[error("invalid tutorial id {id:?} in {reference}")]
    InvalidId { reference: String, id: String },

    /// Another document already publishes under this id.
    #[error("tutorial id {id} is already used by {owner}")]
    DuplicateId { id: String, owner: String },

    /// Output directory could not be written.
    #[error("I/O error at {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Several includes failed.
    #[error("failed to resolve {} includes:\n{}", .0.len(), list_causes(.0))]
    Includes(Vec<BuildError>),

    /// A build task panicked or was cancelled.
    #[error("build task failed: {0}")]
    Task(String),
}

/// One line per error, each with its cause chain.
fn list_causes(errors: &[BuildError]) -> String {
    let lines: Vec<String> = errors.iter().map(|e| error_chain(e)).collect();
    lines.join("\n")
}

/// Error message followed by every underlying cause, joined with `: `.
pub fn error_chain(err: &dyn std::error::Error) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}

impl BuildError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failure of discovery or site-wide assembly.
#[derive(Debug, thiserror::Error)]
pub enum SiteError {
    #[error("couldn't access {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("couldn't decode {}", path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("couldn't encode site index")]
    Json(#[from] serde_json::Error),
}

impl SiteError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_chain_joins_causes() {
        let err = BuildError::io(
            "out/demo",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(error_chain(&err), "I/O error at out/demo: denied");
    }

    #[test]
    fn test_asset_error_lists_every_failure() {
        let err = AssetError {
            failures: vec![
                AssetFailure {
                    src: "a.png".to_owned(),
                    dest: Some(PathBuf::from("out/img/1.png")),
                    cause: "disk full".to_owned(),
                },
                AssetFailure {
                    src: "https://x/b".to_owned(),
                    dest: None,
                    cause: "404".to_owned(),
                },
            ],
        };
        assert_eq!(
            err.to_string(),
            "couldn't copy a.png => out/img/1.png: disk full\ncouldn't copy https://x/b => ?: 404"
        );
    }
}
