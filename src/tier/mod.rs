//! Tier planning
//!
//! A tier is one fidelity level of the same recording. Which tiers get
//! encoded, and which get residual-coded and verified, is decided by a
//! declarative [`Topology`] evaluated against the probed source.

mod planner;
mod topology;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use planner::{PlannedTier, TierPlan, TierPlanner};
pub use topology::{Condition, Resolution, Topology, TierSpec};

/// Audio properties of the input master
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceProperties {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Bits per sample as declared by the container
    pub bit_depth: u16,
    /// Number of channels
    pub channels: u16,
    /// Total frames, when the container declares it
    pub frames: Option<u64>,
}

impl SourceProperties {
    /// Properties for planning when only rate and depth matter
    pub fn new(sample_rate: u32, bit_depth: u16) -> Self {
        Self {
            sample_rate,
            bit_depth,
            channels: 2,
            frames: None,
        }
    }
}

/// Name of a tier, used in artifact file names (`<base>_<name>.flac`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TierName(String);

impl TierName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Consumer tier, 48 kHz / 16-bit
    pub fn cr() -> Self {
        Self::new("CR")
    }

    /// Standard tier, 48 kHz / 24-bit
    pub fn sr() -> Self {
        Self::new("SR")
    }

    /// High-resolution tier, native rate and depth
    pub fn hr() -> Self {
        Self::new("HR")
    }

    /// CD tier, 44.1 kHz / 16-bit
    pub fn cd() -> Self {
        Self::new("CD")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TierName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
