//! Shared test fixtures
//!
//! Lets the whole pipeline run without ffmpeg: "FLAC" files are integer WAV
//! files under a `.flac` name, read with hound and written with
//! `foma::engine::write_wav`.

#![allow(dead_code)]

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};

use foma::engine::{write_wav, AudioBuffer, LinearResampler, PcmStore, Resample};
use foma::tier::SourceProperties;
use foma::transcode::{OpusProfile, PcmFormat, Transcode};
use foma::{FomaError, Result};

/// Read a WAV file into a float buffer, `2^(bits-1)` scaling
pub fn read_wav(path: &Path) -> Result<AudioBuffer> {
    let decode = |e: hound::Error| FomaError::Decode {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };
    let mut reader = hound::WavReader::open(path).map_err(decode)?;
    let spec = reader.spec();
    let scale = (1_i64 << (spec.bits_per_sample - 1)) as f32;
    let interleaved = reader
        .samples::<i32>()
        .map(|s| s.map(|v| v as f32 / scale))
        .collect::<std::result::Result<Vec<f32>, _>>()
        .map_err(decode)?;
    AudioBuffer::from_interleaved(&interleaved, spec.channels as usize, spec.sample_rate)
}

/// PCM store over plain WAV files
#[derive(Default)]
pub struct WavStore;

impl PcmStore for WavStore {
    fn probe(&self, path: &Path) -> Result<SourceProperties> {
        let reader = hound::WavReader::open(path).map_err(|e| FomaError::Probe {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let spec = reader.spec();
        Ok(SourceProperties {
            sample_rate: spec.sample_rate,
            bit_depth: spec.bits_per_sample,
            channels: spec.channels,
            frames: Some(reader.duration() as u64),
        })
    }

    fn load(&self, path: &Path) -> Result<AudioBuffer> {
        read_wav(path)
    }

    fn store(&self, path: &Path, buffer: &AudioBuffer) -> Result<()> {
        write_wav(path, buffer, 24)
    }
}

/// In-process transcoder
///
/// Tier encodes resample linearly and requantize; Opus outputs and cover art
/// are placeholder bytes. Any destination whose file name ends with one of
/// `fail_suffixes` fails with an encode error.
#[derive(Default)]
pub struct FakeTranscoder {
    pub fail_suffixes: Vec<String>,
    pub stripped: RefCell<Vec<PathBuf>>,
    pub encoded: RefCell<Vec<PathBuf>>,
}

impl FakeTranscoder {
    pub fn failing_on(suffix: &str) -> Self {
        Self {
            fail_suffixes: vec![suffix.to_string()],
            ..Default::default()
        }
    }

    fn check(&self, dest: &Path) -> Result<()> {
        let name = dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if self.fail_suffixes.iter().any(|s| name.ends_with(s.as_str())) {
            return Err(FomaError::Encode {
                artifact: dest.to_path_buf(),
                reason: "injected failure".to_string(),
            });
        }
        self.encoded.borrow_mut().push(dest.to_path_buf());
        Ok(())
    }

    pub fn stripped_names(&self) -> Vec<String> {
        self.stripped
            .borrow()
            .iter()
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect()
    }
}

impl Transcode for FakeTranscoder {
    fn encode_flac(&self, source: &Path, dest: &Path, format: PcmFormat) -> Result<()> {
        self.check(dest)?;
        let buffer = read_wav(source)?;
        let buffer = LinearResampler.resample(&buffer, format.sample_rate)?;
        write_wav(dest, &buffer, format.bit_depth)
    }

    fn encode_opus(&self, _source: &Path, dest: &Path, profile: &OpusProfile) -> Result<()> {
        self.check(dest)?;
        fs::write(dest, format!("opus {} {}", profile.sample_rate, profile.bitrate))?;
        Ok(())
    }

    fn extract_cover(&self, _source: &Path, dest: &Path) -> Result<()> {
        self.check(dest)?;
        fs::write(dest, b"\xFF\xD8\xFF")?;
        Ok(())
    }

    fn strip_metadata(&self, path: &Path) -> Result<()> {
        self.stripped.borrow_mut().push(path.to_path_buf());
        Ok(())
    }
}

/// Write a two-tone stereo master quantized to `bit_depth`
pub fn write_source(
    dir: &Path,
    name: &str,
    sample_rate: u32,
    bit_depth: u16,
    frames: usize,
) -> PathBuf {
    let path = dir.join(name);
    let channel = |freq: f32, amp: f32| -> Vec<f32> {
        (0..frames)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                (t * freq * std::f32::consts::TAU).sin() * amp
                    + (t * 3.7 * freq * std::f32::consts::TAU).sin() * amp * 0.3
            })
            .collect()
    };
    let buffer =
        AudioBuffer::from_channels(vec![channel(440.0, 0.4), channel(660.0, 0.35)], sample_rate)
            .unwrap();
    write_wav(&path, &buffer, bit_depth).unwrap();
    path
}
