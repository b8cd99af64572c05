//! FOMA CLI - Tiered Lossless Archive Encoder
//!
//! Command-line interface for the FOMA archive encoder.

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use foma::cli::{commands, Cli, Commands};
use foma::FomaError;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    info!("FOMA encoder v{}", env!("CARGO_PKG_VERSION"));

    match handle_command(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            print_error(&err);
            ExitCode::FAILURE
        }
    }
}

fn handle_command(cmd: Commands) -> anyhow::Result<()> {
    match cmd {
        Commands::Encode(args) => {
            commands::encode(&args).context("encoding did not complete")?;
        }
        Commands::Plan {
            input,
            config,
            include_cd,
        } => {
            commands::plan(&input, config.as_deref(), include_cd)
                .with_context(|| format!("cannot plan {}", input.display()))?;
        }
        Commands::Verify {
            residual,
            threshold_dbfs,
        } => commands::verify(&residual, threshold_dbfs)?,
    }
    Ok(())
}

fn print_error(err: &anyhow::Error) {
    match err.downcast_ref::<FomaError>() {
        Some(foma) => {
            eprintln!("{}", foma.friendly_message());
            eprintln!("[{}] {:#}", foma.error_code(), err);
            for suggestion in foma.recovery_suggestions() {
                eprintln!("  - {}", suggestion);
            }
        }
        None => eprintln!("Error: {:#}", err),
    }
}
