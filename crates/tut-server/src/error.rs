use std::time::Duration;

/// Server error.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Invalid listen address.
    #[error("invalid listen address {addr}")]
    Address {
        addr: String,
        #[source]
        source: std::net::AddrParseError,
    },

    /// Listener could not be bound.
    #[error("cannot listen on {addr}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Serving failed.
    #[error("server error")]
    Io(#[from] std::io::Error),

    /// File watcher could not be created.
    #[error("file watcher error")]
    Watch(#[from] notify::Error),

    /// A background task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(String),

    /// Shutdown exceeded its grace period.
    #[error("shutdown did not finish within {}s", .0.as_secs())]
    ShutdownTimeout(Duration),
}
