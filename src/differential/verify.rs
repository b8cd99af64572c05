//! Verification gate
//!
//! A tier passes when the residual between its reconstruction and its
//! original encode is no louder than the threshold. Anything that prevents
//! measuring the peak counts as a failure.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::engine::{calculate_peak, db_to_linear, linear_to_db, AudioBuffer, PcmStore};
use crate::tier::TierName;

/// Default pass threshold in dBFS
pub const DEFAULT_THRESHOLD_DBFS: f32 = -130.0;

/// Result of checking one residual-of-reconstruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CheckOutcome {
    /// Peak at or below the threshold
    Passed { peak: f32 },
    /// Peak above the threshold, or not a number
    Exceeded { peak: f32 },
    /// File missing or undecodable
    Unreadable { reason: String },
}

impl CheckOutcome {
    pub fn passed(&self) -> bool {
        matches!(self, CheckOutcome::Passed { .. })
    }

    /// Linear peak, when one was measured
    pub fn peak(&self) -> Option<f32> {
        match self {
            CheckOutcome::Passed { peak } | CheckOutcome::Exceeded { peak } => Some(*peak),
            CheckOutcome::Unreadable { .. } => None,
        }
    }

    pub fn peak_dbfs(&self) -> Option<f32> {
        self.peak().map(linear_to_db)
    }
}

impl fmt::Display for CheckOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckOutcome::Passed { peak } => {
                write!(f, "passed (peak {:.2} dBFS)", linear_to_db(*peak))
            }
            CheckOutcome::Exceeded { peak } => {
                write!(f, "failed (peak {:.2} dBFS)", linear_to_db(*peak))
            }
            CheckOutcome::Unreadable { reason } => write!(f, "failed ({})", reason),
        }
    }
}

/// One tier's check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierCheck {
    pub tier: TierName,
    pub path: PathBuf,
    pub outcome: CheckOutcome,
}

/// Result of running the gate over every verified tier
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VerificationOutcome {
    /// Checks actually performed, in order; stops after the first failure
    pub checks: Vec<TierCheck>,
}

impl VerificationOutcome {
    /// True when every performed check passed; vacuously true when none ran
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.outcome.passed())
    }

    pub fn first_failure(&self) -> Option<&TierCheck> {
        self.checks.iter().find(|c| !c.outcome.passed())
    }
}

/// Peak-threshold check on reconstruction residuals
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VerificationGate {
    threshold_dbfs: f32,
    threshold_linear: f32,
}

impl Default for VerificationGate {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD_DBFS)
    }
}

impl VerificationGate {
    pub fn new(threshold_dbfs: f32) -> Self {
        Self {
            threshold_dbfs,
            threshold_linear: db_to_linear(threshold_dbfs),
        }
    }

    pub fn threshold_dbfs(&self) -> f32 {
        self.threshold_dbfs
    }

    pub fn threshold_linear(&self) -> f32 {
        self.threshold_linear
    }

    /// Check a peak value; the boundary is inclusive and NaN fails
    pub fn check_peak(&self, peak: f32) -> CheckOutcome {
        if peak <= self.threshold_linear {
            CheckOutcome::Passed { peak }
        } else {
            CheckOutcome::Exceeded { peak }
        }
    }

    pub fn check_buffer(&self, buffer: &AudioBuffer) -> CheckOutcome {
        self.check_peak(calculate_peak(buffer))
    }

    /// Load and check a residual file; a missing file fails
    pub fn check_file(&self, store: &dyn PcmStore, path: &Path) -> CheckOutcome {
        if !path.exists() {
            error!("File not found: {}", path.display());
            return CheckOutcome::Unreadable {
                reason: format!("file not found: {}", path.display()),
            };
        }

        match store.load(path) {
            Ok(buffer) => self.check_buffer(&buffer),
            Err(e) => {
                error!("Cannot read {}: {}", path.display(), e);
                CheckOutcome::Unreadable {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Check each `(tier, residual)` in order, stopping at the first failure
    pub fn verify_all(
        &self,
        store: &dyn PcmStore,
        residuals: &[(TierName, PathBuf)],
    ) -> VerificationOutcome {
        let mut outcome = VerificationOutcome::default();
        if !residuals.is_empty() {
            info!(
                "Checking {} reconstruction(s) against {} dBFS",
                residuals.len(),
                self.threshold_dbfs
            );
        }

        for (tier, path) in residuals {
            let check = self.check_file(store, path);
            if check.passed() {
                info!("{} verification {}", tier, check);
            } else {
                warn!("{} verification {}", tier, check);
            }

            let passed = check.passed();
            outcome.checks.push(TierCheck {
                tier: tier.clone(),
                path: path.clone(),
                outcome: check,
            });
            if !passed {
                break;
            }
        }

        outcome
    }
}
