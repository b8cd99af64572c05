//! CLI Module
//!
//! Command-line interface for the FOMA archive encoder.

pub mod commands;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::engine::ResamplerKind;

/// FOMA - tiered lossless archive encoder
#[derive(Parser, Debug)]
#[command(name = "foma")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Encode one or more FLAC masters into tiered archives
    #[command(name = "encode")]
    Encode(EncodeArgs),

    /// Show the tier plan for a FLAC file without writing anything
    #[command(name = "plan")]
    Plan {
        /// Input FLAC file
        input: PathBuf,

        /// JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Add the 44.1 kHz / 16-bit CD tier
        #[arg(long)]
        include_cd: bool,
    },

    /// Check a reconstruction residual against the threshold
    #[command(name = "verify")]
    Verify {
        /// Reconstruction residual file
        residual: PathBuf,

        /// Pass threshold in dBFS
        #[arg(long, default_value_t = -130.0, allow_hyphen_values = true)]
        threshold_dbfs: f32,
    },
}

#[derive(Args, Debug, Default)]
pub struct EncodeArgs {
    /// Input FLAC files, processed one after another
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// JSON configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Keep an existing output folder instead of wiping it
    #[arg(long)]
    pub reuse_output: bool,

    /// Verification threshold in dBFS
    #[arg(long, allow_hyphen_values = true)]
    pub threshold_dbfs: Option<f32>,

    /// Add the 44.1 kHz / 16-bit CD tier
    #[arg(long)]
    pub include_cd: bool,

    /// Resampler used to align tiers
    #[arg(long, value_enum)]
    pub resampler: Option<ResamplerArg>,

    /// Path to the ffmpeg executable
    #[arg(long)]
    pub ffmpeg: Option<PathBuf>,

    /// Write a JSON run report here
    #[arg(long)]
    pub report_json: Option<PathBuf>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResamplerArg {
    Sinc,
    Linear,
}

impl From<ResamplerArg> for ResamplerKind {
    fn from(arg: ResamplerArg) -> Self {
        match arg {
            ResamplerArg::Sinc => ResamplerKind::Sinc,
            ResamplerArg::Linear => ResamplerKind::Linear,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_encode_flags_parse() {
        let cli = Cli::parse_from([
            "foma",
            "encode",
            "a.flac",
            "b.flac",
            "--threshold-dbfs",
            "-120",
            "--resampler",
            "linear",
            "--reuse-output",
        ]);
        match cli.command {
            Commands::Encode(args) => {
                assert_eq!(args.inputs.len(), 2);
                assert_eq!(args.threshold_dbfs, Some(-120.0));
                assert_eq!(args.resampler, Some(ResamplerArg::Linear));
                assert!(args.reuse_output);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
