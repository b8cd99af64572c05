//! Audio file I/O for FOMA
//!
//! Decoding goes through symphonia so FLAC tiers and WAV scratch files load
//! the same way; writing is always integer PCM WAV through hound, which the
//! transcoder then packs into FLAC.
//!
//! Integer samples map to floats by dividing by `2^(bits-1)`, and back by the
//! same factor, so a 16- or 24-bit value survives a load/store cycle exactly.

use std::fs::File;
use std::path::Path;

use hound::{SampleFormat, WavSpec, WavWriter};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::debug;

use crate::engine::buffer::AudioBuffer;
use crate::error::{FomaError, RejectedFormat, Result};
use crate::tier::SourceProperties;

/// Lossless containers that must be converted to FLAC before archiving
const OTHER_LOSSLESS_EXTENSIONS: &[&str] = &["alac", "aiff", "wav"];

/// Lossy formats that are never valid masters
const LOSSY_EXTENSIONS: &[&str] = &["mp3", "aac", "opus"];

// ============================================================================
// Input gating
// ============================================================================

/// Reject anything that is not a `.flac` file
///
/// Runs before any output is written. The error kind distinguishes "lossless
/// but not FLAC", "lossy" and "unknown" so each gets its own message.
pub fn check_input_format(path: &Path) -> Result<()> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    if extension == "flac" {
        return Ok(());
    }

    let kind = if OTHER_LOSSLESS_EXTENSIONS.contains(&extension.as_str()) {
        RejectedFormat::OtherLossless
    } else if LOSSY_EXTENSIONS.contains(&extension.as_str()) {
        RejectedFormat::Lossy
    } else {
        RejectedFormat::Unknown
    };

    Err(FomaError::UnsupportedFormat {
        extension: format!(".{}", extension),
        kind,
    })
}

// ============================================================================
// Decoding
// ============================================================================

fn decode_error(path: &Path, reason: impl Into<String>) -> FomaError {
    FomaError::Decode {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

fn open_format(path: &Path) -> std::result::Result<Box<dyn FormatReader>, String> {
    let file = File::open(path).map_err(|e| format!("Failed to open file: {}", e))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| format!("Failed to probe format: {}", e))?;

    Ok(probed.format)
}

/// Read the sample rate, bit depth and channel count of a source file
///
/// # Errors
/// `Probe` if the file cannot be opened or does not declare a bit depth.
pub fn probe_source(path: &Path) -> Result<SourceProperties> {
    let probe_error = |reason: String| FomaError::Probe {
        path: path.to_path_buf(),
        reason,
    };

    let format = open_format(path).map_err(probe_error)?;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| probe_error("No audio track found".to_string()))?;
    let params = &track.codec_params;

    let sample_rate = params
        .sample_rate
        .ok_or_else(|| probe_error("Sample rate not found".to_string()))?;
    let bit_depth = params
        .bits_per_sample
        .ok_or_else(|| probe_error("Bit depth not found".to_string()))?;
    let channels = params
        .channels
        .map(|c| c.count() as u16)
        .ok_or_else(|| probe_error("Channel count not found".to_string()))?;

    Ok(SourceProperties {
        sample_rate,
        bit_depth: bit_depth as u16,
        channels,
        frames: params.n_frames,
    })
}

/// Decode an entire audio file into a planar buffer at its native rate
///
/// # Errors
/// `Decode` for a missing file, an unknown container, or a corrupt packet.
/// Corrupt packets are not skipped: a partially decoded artifact must never
/// take part in verification.
pub fn load_pcm(path: &Path) -> Result<AudioBuffer> {
    debug!("Decoding {}", path.display());

    let mut format = open_format(path).map_err(|reason| decode_error(path, reason))?;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| decode_error(path, "No audio track found"))?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let sample_rate = codec_params
        .sample_rate
        .ok_or_else(|| decode_error(path, "Sample rate not found"))?;
    let channels = codec_params
        .channels
        .map(|c| c.count())
        .ok_or_else(|| decode_error(path, "Channel count not found"))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| decode_error(path, format!("Failed to create decoder: {}", e)))?;

    let mut interleaved = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(decode_error(path, format!("Error reading packet: {}", e))),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = decoder
            .decode(&packet)
            .map_err(|e| decode_error(path, format!("Decode error: {}", e)))?;
        let mut samples = SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
        samples.copy_interleaved_ref(decoded);
        interleaved.extend_from_slice(samples.samples());
    }

    let buffer = AudioBuffer::from_interleaved(&interleaved, channels, sample_rate)
        .map_err(|e| decode_error(path, e.to_string()))?;

    debug!(
        "Decoded {} frames, {:.2}s ({} channels @ {}Hz)",
        buffer.len(),
        buffer.duration_secs(),
        channels,
        sample_rate
    );

    Ok(buffer)
}

// ============================================================================
// Encoding
// ============================================================================

/// Write a buffer as integer PCM WAV at the given bit depth
///
/// Samples are scaled by `2^(bits-1)`, rounded to nearest, and clamped to the
/// integer range.
pub fn write_wav(path: &Path, buffer: &AudioBuffer, bit_depth: u16) -> Result<()> {
    if !matches!(bit_depth, 16 | 24 | 32) {
        return Err(FomaError::Encode {
            artifact: path.to_path_buf(),
            reason: format!("{}-bit audio (only 16, 24, 32 supported)", bit_depth),
        });
    }

    let write_error = |e: hound::Error| FomaError::Encode {
        artifact: path.to_path_buf(),
        reason: e.to_string(),
    };

    let spec = WavSpec {
        channels: buffer.channels() as u16,
        sample_rate: buffer.sample_rate,
        bits_per_sample: bit_depth,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec).map_err(write_error)?;

    let scale = (1_i64 << (bit_depth - 1)) as f64;
    let (min, max) = (-scale, scale - 1.0);
    for sample in buffer.to_interleaved() {
        let quantized = (sample as f64 * scale).round().clamp(min, max) as i32;
        writer.write_sample(quantized).map_err(write_error)?;
    }

    writer.finalize().map_err(write_error)?;

    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
