//! Size report and machine-readable run report

use std::fmt;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::differential::{Deletion, TierCheck};
use crate::error::Result;
use crate::pipeline::orchestrator::{PipelineRun, StageFailure};
use crate::pipeline::{ArtifactLayout, PipelineState};
use crate::tier::{TierName, TierPlan};

const SIZE_UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB", "EB", "ZB", "YB"];

/// Human-readable size with 1024-based units and two decimals
pub fn format_size(bytes: u64) -> String {
    let mut value = bytes as f64;
    for unit in &SIZE_UNITS[..SIZE_UNITS.len() - 1] {
        if value < 1024.0 {
            return format!("{:.2} {}", value, unit);
        }
        value /= 1024.0;
    }
    format!("{:.2} {}", value, SIZE_UNITS[SIZE_UNITS.len() - 1])
}

fn file_size(path: &Path) -> u64 {
    fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

/// Total size of regular files under `dir`, not following symlinks
pub fn folder_size(dir: &Path) -> u64 {
    WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.metadata().ok())
        .map(|meta| meta.len())
        .sum()
}

// ============================================================================
// Size report
// ============================================================================

/// Storage footprint of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeReport {
    pub input_bytes: u64,
    pub preview_bytes: u64,
    pub consumer_bytes: u64,
    /// Input + preview + consumer tier, only when the standard tier was processed
    pub combined_bytes: Option<u64>,
    pub output_folder_bytes: u64,
}

impl SizeReport {
    /// Measure the input and output folder; missing files count as zero
    pub fn collect(layout: &ArtifactLayout, include_combined: bool) -> Self {
        let input_bytes = file_size(layout.input());
        let preview_bytes = file_size(&layout.preview());
        let consumer_bytes = file_size(&layout.tier(&TierName::cr()));

        Self {
            input_bytes,
            preview_bytes,
            consumer_bytes,
            combined_bytes: include_combined
                .then_some(input_bytes + preview_bytes + consumer_bytes),
            output_folder_bytes: folder_size(layout.output_dir()),
        }
    }

    pub fn log(&self) {
        for line in self.to_string().lines() {
            info!("{}", line);
        }
    }
}

impl fmt::Display for SizeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Input file size: {}", format_size(self.input_bytes))?;
        writeln!(f, "LB file size: {}", format_size(self.preview_bytes))?;
        writeln!(f, "CR file size: {}", format_size(self.consumer_bytes))?;
        if let Some(combined) = self.combined_bytes {
            writeln!(
                f,
                "Input + LB + CR combined file size: {}",
                format_size(combined)
            )?;
        }
        write!(
            f,
            "Total output folder size: {}",
            format_size(self.output_folder_bytes)
        )
    }
}

// ============================================================================
// Run report
// ============================================================================

/// A file left in the output folder, with its checksum
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactDigest {
    pub path: PathBuf,
    pub bytes: u64,
    pub sha256: String,
}

/// Hex SHA-256 of a file
pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut chunk = [0u8; 64 * 1024];
    loop {
        let read = file.read(&mut chunk)?;
        if read == 0 {
            break;
        }
        hasher.update(&chunk[..read]);
    }
    Ok(hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect())
}

/// Everything that happened to one input, for `--report-json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub plan: TierPlan,
    pub final_state: PipelineState,
    pub stage_failures: Vec<StageFailure>,
    pub checks: Vec<TierCheck>,
    pub deletions: Vec<Deletion>,
    pub retained: Vec<ArtifactDigest>,
    pub sizes: SizeReport,
}

impl RunReport {
    /// Build the report, hashing every file still in the output folder
    pub fn from_run(run: &PipelineRun, started_at: DateTime<Utc>) -> Self {
        let mut retained: Vec<ArtifactDigest> = WalkDir::new(run.layout.output_dir())
            .follow_links(false)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| {
                let path = entry.path();
                match sha256_file(path) {
                    Ok(sha256) => Some(ArtifactDigest {
                        path: path.to_path_buf(),
                        bytes: file_size(path),
                        sha256,
                    }),
                    Err(e) => {
                        warn!("Cannot hash {}: {}", path.display(), e);
                        None
                    }
                }
            })
            .collect();
        retained.sort_by(|a, b| a.path.cmp(&b.path));

        Self {
            run_id: Uuid::new_v4(),
            started_at,
            finished_at: Utc::now(),
            input: run.layout.input().to_path_buf(),
            output_dir: run.layout.output_dir().to_path_buf(),
            plan: run.plan.clone(),
            final_state: run.state,
            stage_failures: run.failures.clone(),
            checks: run.verification.checks.clone(),
            deletions: run.deletions.clone(),
            retained,
            sizes: run.sizes,
        }
    }

    /// Write the report as pretty-printed JSON
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        info!("Run report written to {}", path.display());
        Ok(())
    }
}
