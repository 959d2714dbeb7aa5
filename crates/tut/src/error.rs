//! CLI error types.

use tut_config::ConfigError;
use tut_content::RenderError;
use tut_server::ServerError;
use tut_site::SiteError;

/// CLI error type.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("cannot load page template")]
    Template(#[from] RenderError),

    #[error(transparent)]
    Site(#[from] SiteError),

    #[error(transparent)]
    Server(#[from] ServerError),

    #[error("{failed} of {total} tutorials failed to build")]
    Failed { failed: usize, total: usize },
}
