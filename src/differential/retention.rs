//! Deciding what to delete once verification has run

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::pipeline::ArtifactLayout;
use crate::tier::TierName;

/// What happened to one file marked for deletion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeletionOutcome {
    Deleted,
    /// Already gone; not an error
    Missing,
    /// Could not be removed, left in place
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deletion {
    pub path: PathBuf,
    pub outcome: DeletionOutcome,
}

/// Applies the keep/delete policy to an output folder
///
/// Only files whose content is provably recoverable are removed: the
/// standalone tier, its reconstruction, and its reconstruction residual. The
/// root tier, lossy outputs and residuals are always kept.
pub struct RetentionManager<'a> {
    layout: &'a ArtifactLayout,
}

impl<'a> RetentionManager<'a> {
    pub fn new(layout: &'a ArtifactLayout) -> Self {
        Self { layout }
    }

    /// Files that become redundant once `tier` is verified
    pub fn redundant_files(&self, tier: &TierName) -> [PathBuf; 3] {
        [
            self.layout.tier(tier),
            self.layout.reco(tier),
            self.layout.reco_residual(tier),
        ]
    }

    /// Delete redundant files when `verified`, otherwise keep everything
    pub fn apply(&self, verified: bool, tiers: &[TierName]) -> Vec<Deletion> {
        if !verified {
            warn!("Verification failed. Files retained for manual review:");
            for tier in tiers {
                for path in self.redundant_files(tier) {
                    let state = if path.exists() { "present" } else { "missing" };
                    warn!("  {} ({})", path.display(), state);
                }
            }
            return Vec::new();
        }

        info!("Verification successful. Deleting unnecessary files.");
        tiers
            .iter()
            .flat_map(|tier| self.redundant_files(tier))
            .map(|path| {
                let outcome = match fs::remove_file(&path) {
                    Ok(()) => {
                        info!("Deleted {}", path.display());
                        DeletionOutcome::Deleted
                    }
                    Err(e) if e.kind() == ErrorKind::NotFound => {
                        info!("{} not found, skipping", path.display());
                        DeletionOutcome::Missing
                    }
                    Err(e) => {
                        warn!("Cannot delete {}: {}", path.display(), e);
                        DeletionOutcome::Failed {
                            reason: e.to_string(),
                        }
                    }
                };
                Deletion { path, outcome }
            })
            .collect()
    }
}
