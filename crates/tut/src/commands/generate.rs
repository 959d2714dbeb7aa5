//! `tut generate` command implementation.

use std::path::PathBuf;

use clap::Args;
use tut_config::Config;
use tut_site::{BuildContext, assemble};

use super::CommonArgs;
use crate::error::CliError;
use crate::output::Output;

/// Arguments for the generate command.
#[derive(Args)]
pub(crate) struct GenerateArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Export directory for rendered tutorials (overrides config).
    #[arg(short, long)]
    export: Option<PathBuf>,

    /// API directory for the site index (overrides config).
    #[arg(short, long)]
    api: Option<PathBuf>,
}

impl GenerateArgs {
    /// Build every tutorial once and write the site index.
    ///
    /// Fails with [`CliError::Failed`] when any tutorial failed, after the
    /// successful ones were written.
    pub(crate) async fn execute(self) -> Result<(), CliError> {
        let output = Output::new();
        let cwd = std::env::current_dir()?;
        let mut settings = self.common.settings()?;
        settings.export = self.export.map(|p| cwd.join(p));
        settings.api = self.api.map(|p| cwd.join(p));

        let config = Config::load(self.common.config.as_deref(), Some(&settings))?;
        let ctx = BuildContext::from_config(&config)?;
        output.info(&format!(
            "Exporting to {}",
            config.paths_resolved.export.display()
        ));

        let (refs, report) = super::build(&config, &ctx, &output).await?;
        let index =
            assemble(&config.paths_resolved, &config.site.api_url, &report.documents).await?;
        output.highlight(&format!("Site index written to {}", index.display()));

        if report.had_errors() {
            return Err(CliError::Failed {
                failed: report.failures.len(),
                total: refs.len(),
            });
        }
        output.success(&format!("Built {} tutorial(s)", report.documents.len()));
        Ok(())
    }
}
