//! CLI Command Implementations
//!
//! Implements the actual logic for each CLI command.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{error, info};

use crate::cli::EncodeArgs;
use crate::config::PipelineConfig;
use crate::differential::VerificationGate;
use crate::engine::{check_input_format, probe_source, FlacStore};
use crate::error::{FomaError, Result};
use crate::pipeline::{format_size, OutputMode, Pipeline, PipelineRun, RunReport};
use crate::tier::TierPlanner;
use crate::transcode::FfmpegTranscoder;

/// Configuration file (or defaults) with the CLI flags applied on top
pub fn resolve_config(args: &EncodeArgs) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };

    if args.reuse_output {
        config.output_mode = OutputMode::Reuse;
    }
    if let Some(threshold) = args.threshold_dbfs {
        config.threshold_dbfs = threshold;
    }
    if args.include_cd {
        config.include_cd_tier = true;
    }
    if let Some(resampler) = args.resampler {
        config.resampler = resampler.into();
    }
    if let Some(ffmpeg) = &args.ffmpeg {
        config.ffmpeg_path = Some(ffmpeg.clone());
    }

    config.validate()?;
    Ok(config)
}

/// Where the report for `input` goes; several inputs get one file each
fn report_path(base: &Path, input: &Path, several: bool) -> PathBuf {
    if !several {
        return base.to_path_buf();
    }
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "report".to_string());
    let input_stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    base.with_file_name(format!("{}.{}.json", stem, input_stem))
}

fn print_summary(run: &PipelineRun) {
    println!("{}", run.layout.input().display());
    println!("  Output folder: {}", run.layout.output_dir().display());
    println!("  Final state: {}", run.state);
    for check in &run.verification.checks {
        println!("  {} verification {}", check.tier, check.outcome);
    }
    for failure in &run.failures {
        println!(
            "  [{}] {}: {}",
            failure.stage, failure.code, failure.message
        );
    }
    println!(
        "  Output folder size: {}",
        format_size(run.sizes.output_folder_bytes)
    );
}

/// Encode every input with ffmpeg and the configured resampler
pub fn encode(args: &EncodeArgs) -> Result<()> {
    let config = resolve_config(args)?;
    let executable = FfmpegTranscoder::locate(config.ffmpeg_path.as_deref())?;
    info!("Using ffmpeg at {}", executable.display());

    let transcoder = FfmpegTranscoder::new(
        executable,
        config.flac_compression_level,
        config.flac_block_size,
    );
    let store = FlacStore::new(&transcoder);
    let resampler = config.resampler.build();
    let pipeline = Pipeline::new(&config, &transcoder, &store, resampler.as_ref());

    encode_all(&pipeline, &args.inputs, args.report_json.as_deref())
}

/// Run `pipeline` over every input in turn
///
/// A failure on one input, whether in the pipeline or while writing its
/// report, is logged and the next input is processed; the first such error
/// is returned once all inputs have been tried.
pub fn encode_all(
    pipeline: &Pipeline<'_>,
    inputs: &[PathBuf],
    report_json: Option<&Path>,
) -> Result<()> {
    let several = inputs.len() > 1;
    let mut first_error: Option<FomaError> = None;

    for input in inputs {
        let started_at = Utc::now();
        let result = pipeline.run(input).and_then(|run| {
            print_summary(&run);
            match report_json {
                Some(base) => RunReport::from_run(&run, started_at)
                    .write_json(&report_path(base, input, several)),
                None => Ok(()),
            }
        });

        if let Err(e) = result {
            error!("{}: {}", input.display(), e.friendly_message());
            first_error.get_or_insert(e);
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Print the tier plan without writing anything
pub fn plan(input: &Path, config: Option<&Path>, include_cd: bool) -> Result<()> {
    let mut config = match config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    config.include_cd_tier |= include_cd;

    check_input_format(input)?;
    let source = probe_source(input)?;
    let plan = TierPlanner::new(config.topology()).plan(&source)?;

    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}

/// Check one reconstruction residual
///
/// # Errors
/// `VerificationFailed` when the residual is missing, unreadable, or louder
/// than the threshold.
pub fn verify(residual: &Path, threshold_dbfs: f32) -> Result<()> {
    let gate = VerificationGate::new(threshold_dbfs);
    // Loading never calls the transcoder, so the executable is not located
    let transcoder = FfmpegTranscoder::new("ffmpeg", 8, 4096);
    let store = FlacStore::new(&transcoder);

    let outcome = gate.check_file(&store, residual);
    println!("{}: {}", residual.display(), outcome);
    if outcome.passed() {
        return Ok(());
    }

    Err(FomaError::VerificationFailed {
        tier: residual
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default(),
        detail: outcome.to_string(),
    })
}
