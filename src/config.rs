//! Pipeline configuration
//!
//! Loaded from an optional JSON file; every field has a default so an empty
//! object is a valid configuration. CLI flags are applied on top.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::differential::verify::DEFAULT_THRESHOLD_DBFS;
use crate::engine::ResamplerKind;
use crate::error::{FomaError, Result};
use crate::pipeline::OutputMode;
use crate::tier::Topology;
use crate::transcode::OpusProfile;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Verification pass threshold in dBFS
    pub threshold_dbfs: f32,
    pub output_mode: OutputMode,
    /// Add the 44.1 kHz / 16-bit CD tier to the default topology
    pub include_cd_tier: bool,
    pub resampler: ResamplerKind,
    /// Explicit ffmpeg executable
    pub ffmpeg_path: Option<PathBuf>,
    pub flac_compression_level: u8,
    pub flac_block_size: u32,
    pub lb_profile: OpusProfile,
    pub tn_profile: OpusProfile,
    pub extract_cover: bool,
    pub strip_metadata: bool,
    /// Replaces the default tier table when set
    pub topology: Option<Topology>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            threshold_dbfs: DEFAULT_THRESHOLD_DBFS,
            output_mode: OutputMode::Wipe,
            include_cd_tier: false,
            resampler: ResamplerKind::Sinc,
            ffmpeg_path: None,
            flac_compression_level: 8,
            flac_block_size: 4096,
            lb_profile: OpusProfile::preview(),
            tn_profile: OpusProfile::thumbnail(),
            extract_cover: true,
            strip_metadata: true,
            topology: None,
        }
    }
}

impl PipelineConfig {
    /// Read and validate a JSON configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| FomaError::Config {
            reason: format!("cannot read {}: {}", path.display(), e),
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|e| FomaError::Config {
            reason: format!("{}: {}", path.display(), e),
        })?;

        config.validate()?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Reject values no run could succeed with
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| {
            Err(FomaError::Config {
                reason: reason.to_string(),
            })
        };

        if !self.threshold_dbfs.is_finite() || self.threshold_dbfs > 0.0 {
            return invalid("threshold_dbfs must be a finite value at or below 0 dBFS");
        }
        if self.flac_compression_level > 12 {
            return invalid("flac_compression_level must be between 0 and 12");
        }
        if self.flac_block_size == 0 {
            return invalid("flac_block_size must be positive");
        }
        for profile in [&self.lb_profile, &self.tn_profile] {
            if profile.sample_rate == 0 || profile.channels == 0 {
                return invalid("opus profiles need a sample rate and at least one channel");
            }
        }
        Ok(())
    }

    /// Tier table this configuration selects
    pub fn topology(&self) -> Topology {
        match (&self.topology, self.include_cd_tier) {
            (Some(custom), include_cd) => {
                if include_cd {
                    warn!("include_cd_tier is ignored when a custom topology is configured");
                }
                custom.clone()
            }
            (None, true) => Topology::with_cd_tier(),
            (None, false) => Topology::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tier::TierName;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_object_is_default() {
        let config: PipelineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("foma.json");
        fs::write(
            &path,
            r#"{ "threshold_dbfs": -120.0, "output_mode": "reuse", "resampler": "linear" }"#,
        )
        .unwrap();

        let config = PipelineConfig::load(&path).unwrap();

        assert_eq!(config.threshold_dbfs, -120.0);
        assert_eq!(config.output_mode, OutputMode::Reuse);
        assert_eq!(config.resampler, ResamplerKind::Linear);
        assert_eq!(config.flac_block_size, 4096);
        assert_eq!(config.tn_profile, OpusProfile::thumbnail());
    }

    #[test]
    fn test_positive_threshold_is_rejected() {
        let config = PipelineConfig {
            threshold_dbfs: 3.0,
            ..Default::default()
        };
        assert_eq!(config.validate().unwrap_err().error_code(), "CONFIG_ERROR");
    }

    #[test]
    fn test_invalid_topology_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("foma.json");
        fs::write(&path, r#"{ "topology": [] }"#).unwrap();

        let err = PipelineConfig::load(&path).unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("no tiers"));
    }

    #[test]
    fn test_cd_tier_toggle() {
        let config = PipelineConfig {
            include_cd_tier: true,
            ..Default::default()
        };
        assert!(config.topology().get(&TierName::cd()).is_some());
        assert!(PipelineConfig::default()
            .topology()
            .get(&TierName::cd())
            .is_none());
    }
}
