//! External transcoding capability
//!
//! Everything that needs a real codec (tier resampling and bit-depth
//! conversion, FLAC packing, Opus encoding, cover extraction, metadata
//! stripping) goes through [`Transcode`]. The differential core never calls
//! it directly; the orchestrator and [`crate::engine::FlacStore`] do.

mod ffmpeg;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use ffmpeg::FfmpegTranscoder;

/// Target PCM format of a FLAC output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub bit_depth: u16,
}

impl PcmFormat {
    pub fn new(sample_rate: u32, bit_depth: u16) -> Self {
        Self {
            sample_rate,
            bit_depth,
        }
    }
}

/// Opus encoder application mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpusApplication {
    Audio,
    Voip,
    LowDelay,
}

impl OpusApplication {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpusApplication::Audio => "audio",
            OpusApplication::Voip => "voip",
            OpusApplication::LowDelay => "lowdelay",
        }
    }
}

/// Settings for one lossy Opus output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpusProfile {
    pub sample_rate: u32,
    /// Bitrate as understood by the encoder, e.g. `"128k"`
    pub bitrate: String,
    pub vbr: bool,
    pub frame_duration_ms: f32,
    pub application: OpusApplication,
    pub channels: u16,
    /// Gain applied when the output is mono
    #[serde(default)]
    pub mono_gain_db: Option<f32>,
}

impl OpusProfile {
    /// Full-band lossy preview (`_LB`)
    pub fn preview() -> Self {
        Self {
            sample_rate: 48000,
            bitrate: "128k".to_string(),
            vbr: false,
            frame_duration_ms: 2.5,
            application: OpusApplication::LowDelay,
            channels: 2,
            mono_gain_db: None,
        }
    }

    /// Tiny mono thumbnail (`_TN`), keeps its metadata
    pub fn thumbnail() -> Self {
        Self {
            sample_rate: 12000,
            bitrate: "6k".to_string(),
            vbr: true,
            frame_duration_ms: 40.0,
            application: OpusApplication::Audio,
            channels: 1,
            mono_gain_db: Some(-6.0),
        }
    }
}

/// Narrow contract with the external codec toolchain
///
/// Every call blocks until the output file exists or the call failed.
pub trait Transcode {
    /// Produce a FLAC file from `source` at the given rate and depth
    fn encode_flac(&self, source: &Path, dest: &Path, format: PcmFormat) -> Result<()>;

    /// Produce an Opus file from `source`
    fn encode_opus(&self, source: &Path, dest: &Path, profile: &OpusProfile) -> Result<()>;

    /// Extract the first embedded picture of `source` to `dest`
    fn extract_cover(&self, source: &Path, dest: &Path) -> Result<()>;

    /// Remove container metadata from `path` in place
    fn strip_metadata(&self, path: &Path) -> Result<()>;
}
