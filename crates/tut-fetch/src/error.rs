//! Error types for fetching.

use std::path::PathBuf;

/// Broad class of a fetch failure.
///
/// Callers use this to decide how loudly to report a failure; the fetcher
/// itself has already retried everything that was worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// Timeouts, server errors and rate limiting, after retries ran out.
    TransientNetwork,
    /// Rejections that retrying cannot fix (4xx, MIME mismatch, no credentials).
    TerminalNetwork,
    /// Missing or unreadable local file.
    LocalIo,
    /// A response arrived but could not be understood.
    Content,
}

/// Error from a fetch operation.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Local file could not be read.
    #[error("I/O error reading {}", path.display())]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Server answered with a status that is not worth retrying.
    #[error("fetch {url}: {status}; {body}")]
    Status {
        /// Requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
        /// Response body (may contain error details).
        body: String,
    },

    /// Every attempt failed with a retryable error.
    #[error("{url}: failed after {retries} retries: {last_error}")]
    Exhausted {
        /// Requested URL.
        url: String,
        /// Retries performed after the first attempt.
        retries: u32,
        /// Description of the final failed attempt.
        last_error: String,
    },

    /// Provider document has an unexpected type.
    #[error("{id}: invalid mime type: {mime_type}")]
    MimeType {
        /// Provider document id.
        id: String,
        /// MIME type the provider declared.
        mime_type: String,
    },

    /// Provider metadata response could not be decoded.
    #[error("invalid metadata for {id}")]
    Metadata {
        /// Provider document id.
        id: String,
        /// Decoding error.
        #[source]
        source: serde_json::Error,
    },

    /// No usable credentials for a provider request.
    #[error("provider credentials unavailable: {0}")]
    Credentials(String),
}

impl FetchError {
    /// Classify this error.
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            Self::Io { .. } => FetchErrorKind::LocalIo,
            Self::Exhausted { .. } => FetchErrorKind::TransientNetwork,
            Self::Status { .. } | Self::MimeType { .. } | Self::Credentials(_) => {
                FetchErrorKind::TerminalNetwork
            }
            Self::Metadata { .. } => FetchErrorKind::Content,
        }
    }

    /// Whether the failure came from a retryable condition.
    pub fn is_transient(&self) -> bool {
        self.kind() == FetchErrorKind::TransientNetwork
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
