//! Lossless PCM storage for tiers, residuals and reconstructions

use std::path::Path;

use tracing::debug;

use crate::engine::buffer::AudioBuffer;
use crate::engine::io::{load_pcm, probe_source, write_wav};
use crate::error::{FomaError, Result};
use crate::tier::SourceProperties;
use crate::transcode::{PcmFormat, Transcode};

/// Bit depth of every residual and reconstruction artifact
pub const ARTIFACT_BIT_DEPTH: u16 = 24;

/// Load and store whole-file PCM buffers
pub trait PcmStore {
    /// Read rate, depth and channel count without decoding
    fn probe(&self, path: &Path) -> Result<SourceProperties>;

    /// Decode the whole file
    fn load(&self, path: &Path) -> Result<AudioBuffer>;

    /// Write `buffer` losslessly as 24-bit PCM at its own rate
    fn store(&self, path: &Path, buffer: &AudioBuffer) -> Result<()>;
}

/// FLAC-backed store
///
/// Decoding is native. Encoding writes a 24-bit WAV next to the destination
/// and hands it to the transcoder, so the scratch file is on the same
/// filesystem and removed when the call returns.
pub struct FlacStore<'a> {
    transcoder: &'a dyn Transcode,
}

impl<'a> FlacStore<'a> {
    pub fn new(transcoder: &'a dyn Transcode) -> Self {
        Self { transcoder }
    }
}

impl PcmStore for FlacStore<'_> {
    fn probe(&self, path: &Path) -> Result<SourceProperties> {
        probe_source(path)
    }

    fn load(&self, path: &Path) -> Result<AudioBuffer> {
        load_pcm(path)
    }

    fn store(&self, path: &Path, buffer: &AudioBuffer) -> Result<()> {
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };

        let scratch = tempfile::Builder::new()
            .prefix(".foma-")
            .suffix(".wav")
            .tempfile_in(dir)
            .map_err(|e| FomaError::Encode {
                artifact: path.to_path_buf(),
                reason: format!("cannot create scratch file: {}", e),
            })?
            .into_temp_path();

        write_wav(&scratch, buffer, ARTIFACT_BIT_DEPTH)?;
        debug!(
            "Packing {} frames into {}",
            buffer.len(),
            path.display()
        );

        self.transcoder.encode_flac(
            &scratch,
            path,
            PcmFormat::new(buffer.sample_rate, ARTIFACT_BIT_DEPTH),
        )
    }
}
