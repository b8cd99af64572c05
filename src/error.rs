//! Error handling for FOMA
//!
//! Errors are split into fatal ones, which abort a run before any output is
//! written, and stage-local ones, which the pipeline logs and degrades around.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for FOMA operations
pub type Result<T> = std::result::Result<T, FomaError>;

/// How an input extension was classified when it is not FLAC
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectedFormat {
    /// Lossless, but must be transcoded to FLAC first (WAV, AIFF, ALAC)
    OtherLossless,
    /// Lossy source, never valid input (MP3, AAC, Opus)
    Lossy,
    /// Anything else
    Unknown,
}

/// Main error type for FOMA operations
#[derive(Error, Debug)]
pub enum FomaError {
    // Input gating
    #[error("unsupported input format {extension}")]
    UnsupportedFormat {
        extension: String,
        kind: RejectedFormat,
    },

    #[error("failed to read audio properties of {path}: {reason}")]
    Probe { path: PathBuf, reason: String },

    // Stage-local errors
    #[error("failed to encode {artifact}: {reason}")]
    Encode { artifact: PathBuf, reason: String },

    #[error("failed to decode {path}: {reason}")]
    Decode { path: PathBuf, reason: String },

    #[error("resampling failed: {reason}")]
    Resample { reason: String },

    #[error("channel count mismatch: base has {base}, target has {target}")]
    ChannelMismatch { base: usize, target: usize },

    #[error("verification failed for {tier}: {detail}")]
    VerificationFailed { tier: String, detail: String },

    // External tools
    #[error("{tool} executable not found")]
    ToolNotFound { tool: String },

    #[error("{tool} exited with status {status}: {stderr}")]
    ToolFailed {
        tool: String,
        status: i32,
        stderr: String,
    },

    // Configuration
    #[error("invalid tier topology: {reason}")]
    InvalidTopology { reason: String },

    #[error("configuration error: {reason}")]
    Config { reason: String },

    #[error("invalid pipeline transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("cannot prepare output folder {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl FomaError {
    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            FomaError::UnsupportedFormat { .. } => "UNSUPPORTED_FORMAT",
            FomaError::Probe { .. } => "PROBE_ERROR",
            FomaError::Encode { .. } => "ENCODE_ERROR",
            FomaError::Decode { .. } => "DECODE_ERROR",
            FomaError::Resample { .. } => "RESAMPLE_ERROR",
            FomaError::ChannelMismatch { .. } => "CHANNEL_MISMATCH",
            FomaError::VerificationFailed { .. } => "VERIFICATION_FAILED",
            FomaError::ToolNotFound { .. } => "TOOL_NOT_FOUND",
            FomaError::ToolFailed { .. } => "TOOL_FAILED",
            FomaError::InvalidTopology { .. } => "INVALID_TOPOLOGY",
            FomaError::Config { .. } => "CONFIG_ERROR",
            FomaError::InvalidTransition { .. } => "INVALID_TRANSITION",
            FomaError::OutputDir { .. } => "OUTPUT_DIR_ERROR",
            FomaError::Io(_) => "IO_ERROR",
            FomaError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Whether this error aborts the whole run rather than a single stage
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FomaError::UnsupportedFormat { .. }
                | FomaError::Probe { .. }
                | FomaError::ToolNotFound { .. }
                | FomaError::InvalidTopology { .. }
                | FomaError::Config { .. }
                | FomaError::InvalidTransition { .. }
                | FomaError::OutputDir { .. }
        )
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            FomaError::UnsupportedFormat { kind, .. } => match kind {
                RejectedFormat::OtherLossless => vec![
                    "Transcode the file to FLAC and run again",
                    "Keep the original lossless master; do not re-encode from a lossy copy",
                ],
                RejectedFormat::Lossy => vec![
                    "Lossy files are not valid input",
                    "Use the original, non-transcoded lossless master",
                ],
                RejectedFormat::Unknown => vec!["Only .flac input files are supported"],
            },
            FomaError::Probe { .. } => vec![
                "Check that the file exists and plays in another application",
                "The file may be truncated or corrupted - try re-exporting it",
            ],
            FomaError::ToolNotFound { .. } => vec![
                "Install ffmpeg and make sure it is on PATH",
                "Or point FOMA_FFMPEG / --ffmpeg at the executable",
            ],
            FomaError::VerificationFailed { .. } => vec![
                "Keep the standalone tier file; it is not safely reconstructible",
                "Inspect the *_reco_residual.flac file to see where reconstruction diverged",
            ],
            FomaError::InvalidTopology { .. } | FomaError::Config { .. } => vec![
                "Check the configuration file against the documented fields",
                "Remove the custom topology to fall back to the default CR/SR/HR tiers",
            ],
            FomaError::OutputDir { .. } => vec![
                "Check permissions on the folder next to the input file",
                "Free up disk space",
            ],
            _ => vec![],
        }
    }

    /// Get a user-facing message for this error
    pub fn friendly_message(&self) -> String {
        match self {
            FomaError::UnsupportedFormat {
                kind: RejectedFormat::OtherLossless,
                ..
            } => "ERROR: only FLAC input files are supported; please transcode to FLAC and try again."
                .to_string(),
            FomaError::UnsupportedFormat {
                kind: RejectedFormat::Lossy,
                ..
            } => "WARNING: lossy files are not valid input for FOMA; please use original (i.e. non-transcoded) lossless files only."
                .to_string(),
            FomaError::UnsupportedFormat {
                extension,
                kind: RejectedFormat::Unknown,
            } => format!(
                "ERROR: Unsupported file format {}; FOMA only supports FLAC files.",
                extension
            ),
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = FomaError::Decode {
            path: PathBuf::from("x_SR.flac"),
            reason: "missing".to_string(),
        };
        assert_eq!(err.error_code(), "DECODE_ERROR");
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_gating_errors_are_fatal() {
        let err = FomaError::UnsupportedFormat {
            extension: ".mp3".to_string(),
            kind: RejectedFormat::Lossy,
        };
        assert!(err.is_fatal());
        assert!(!err.recovery_suggestions().is_empty());
    }

    #[test]
    fn test_rejected_formats_have_distinct_messages() {
        let make = |kind| FomaError::UnsupportedFormat {
            extension: ".xyz".to_string(),
            kind,
        };
        let lossless = make(RejectedFormat::OtherLossless).friendly_message();
        let lossy = make(RejectedFormat::Lossy).friendly_message();
        let unknown = make(RejectedFormat::Unknown).friendly_message();

        assert_ne!(lossless, lossy);
        assert_ne!(lossy, unknown);
        assert!(unknown.contains(".xyz"));
    }

    #[test]
    fn test_unsupported_format_display_is_neutral() {
        for kind in [
            RejectedFormat::OtherLossless,
            RejectedFormat::Lossy,
            RejectedFormat::Unknown,
        ] {
            let err = FomaError::UnsupportedFormat {
                extension: ".mp3".to_string(),
                kind,
            };
            assert_eq!(err.to_string(), "unsupported input format .mp3");
        }
    }
}
