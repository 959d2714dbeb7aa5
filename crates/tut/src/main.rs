//! Tutorial builder CLI.
//!
//! Provides commands for:
//! - `generate`: Build every tutorial once and write the site index
//! - `serve`: Build, serve and rebuild on change with live reload

mod commands;
mod error;
mod output;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::{GenerateArgs, ServeArgs};
use error::CliError;
use output::Output;

/// Tutorial builder with live preview.
#[derive(Parser)]
#[command(name = "tut", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build every tutorial once.
    Generate(GenerateArgs),
    /// Serve tutorials and rebuild them on change.
    Serve(ServeArgs),
}

impl Commands {
    fn verbose(&self) -> bool {
        match self {
            Self::Generate(args) => args.common.verbose,
            Self::Serve(args) => args.common.verbose,
        }
    }

    async fn execute(self) -> Result<(), CliError> {
        match self {
            Self::Generate(args) => args.execute().await,
            Self::Serve(args) => args.execute().await,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let output = Output::new();

    // RUST_LOG wins; --verbose raises the default from INFO to DEBUG
    let default_level = if cli.command.verbose() { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let result = tokio::runtime::Runtime::new()
        .map_err(CliError::from)
        .and_then(|rt| rt.block_on(cli.command.execute()));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            output.error(&format!("Error: {}", tut_site::error_chain(&err)));
            ExitCode::FAILURE
        }
    }
}
