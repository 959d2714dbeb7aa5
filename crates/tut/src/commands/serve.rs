//! `tut serve` command implementation.

use clap::Args;
use tut_config::Config;
use tut_server::run_server;
use tut_site::{BuildContext, assemble, error_chain};

use super::CommonArgs;
use crate::error::CliError;
use crate::output::Output;

/// Arguments for the serve command.
#[derive(Args)]
pub(crate) struct ServeArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Host to bind to (overrides config).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind to (overrides config).
    #[arg(short, long)]
    port: Option<u16>,

    /// Disable watching and live reload.
    #[arg(long)]
    no_live_reload: bool,
}

impl ServeArgs {
    /// Build every tutorial into a temporary tree, then serve and rebuild on
    /// change until interrupted.
    pub(crate) async fn execute(self) -> Result<(), CliError> {
        let output = Output::new();
        let mut settings = self.common.settings()?;
        settings.host = self.host;
        settings.port = self.port;
        settings.live_reload_enabled = self.no_live_reload.then_some(false);

        let mut config = Config::load(self.common.config.as_deref(), Some(&settings))?;
        let preview = tempfile::Builder::new().prefix("tut-preview-").tempdir()?;
        config.paths_resolved = config.paths_resolved.with_output_root(preview.path());

        let ctx = BuildContext::from_config(&config)?.with_watch(config.live_reload.enabled);
        let (_, report) = super::build(&config, &ctx, &output).await?;
        let assembled =
            assemble(&config.paths_resolved, &config.site.api_url, &report.documents).await;
        if let Err(err) = assembled {
            output.error(&format!("Site index not written: {}", error_chain(&err)));
        }

        output.highlight(&format!(
            "Serving on http://{}:{}",
            config.server.host, config.server.port
        ));
        output.detail(&format!("Website: {}", config.paths_resolved.website.display()));
        output.detail(&format!("Preview output: {}", preview.path().display()));
        if config.live_reload.enabled {
            output.detail("Live reload: enabled");
        } else {
            output.detail("Live reload: disabled");
        }

        run_server(&config, ctx, report.documents).await?;
        drop(preview);
        Ok(())
    }
}
