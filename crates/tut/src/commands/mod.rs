//! CLI command implementations.

pub(crate) mod generate;
pub(crate) mod serve;

use std::path::PathBuf;

use clap::Args;
use tut_config::{CliSettings, Config};
use tut_site::{BuildContext, BuildReport, DocumentRef, build_all, discover, error_chain};

use crate::error::CliError;
use crate::output::Output;

pub(crate) use generate::GenerateArgs;
pub(crate) use serve::ServeArgs;

/// Arguments shared by every command.
#[derive(Args)]
pub(crate) struct CommonArgs {
    /// Tutorial files or directories (default: configured inputs).
    paths: Vec<PathBuf>,

    /// Path to configuration file (default: auto-discover tut.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Website root (overrides config).
    #[arg(short, long)]
    website: Option<PathBuf>,

    /// Metadata directory with categories, events and the page template.
    #[arg(short, long)]
    metadata: Option<PathBuf>,

    /// Log every build step.
    #[arg(short, long)]
    pub verbose: bool,
}

impl CommonArgs {
    pub(crate) fn settings(&self) -> Result<CliSettings, CliError> {
        let cwd = std::env::current_dir()?;
        let absolute = |p: &PathBuf| cwd.join(p);
        Ok(CliSettings {
            website: self.website.as_ref().map(absolute),
            metadata: self.metadata.as_ref().map(absolute),
            inputs: self.paths.iter().map(absolute).collect(),
            ..CliSettings::default()
        })
    }
}

/// Discover and build every tutorial, printing one line per result.
async fn build(
    config: &Config,
    ctx: &BuildContext,
    output: &Output,
) -> Result<(Vec<DocumentRef>, BuildReport), CliError> {
    let refs = discover(&config.paths_resolved.inputs, &config.provider.prefix)?;
    output.info(&format!("Building {} tutorial(s)", refs.len()));

    let report = build_all(ctx, &refs).await;
    for document in &report.documents {
        output.success(&format!("✓ {}", document.meta().id));
        output.detail(&document.output_dir().display().to_string());
    }
    for (reference, err) in &report.failures {
        output.error(&format!("✗ {reference}"));
        output.detail(&error_chain(err));
    }
    Ok((refs, report))
}
