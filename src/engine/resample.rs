//! Sample rate conversion used to align tiers before subtraction
//!
//! Residual computation and reconstruction only need "bring this buffer to
//! that rate"; the algorithm is pluggable behind [`Resample`].

use rubato::{
    Resampler as RubatoResampler, SincFixedIn, SincInterpolationParameters,
    SincInterpolationType, WindowFunction,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::buffer::AudioBuffer;
use crate::error::{FomaError, Result};

/// Frames fed to the sinc resampler per call
const SINC_CHUNK_FRAMES: usize = 1024;

/// Resampling capability injected into the differential stages
pub trait Resample {
    /// Return `buffer` converted to `target_rate`.
    ///
    /// Implementations must return the input unchanged when the rates already
    /// match, so equal-rate residuals stay bit-exact.
    fn resample(&self, buffer: &AudioBuffer, target_rate: u32) -> Result<AudioBuffer>;
}

/// Which resampler the pipeline uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResamplerKind {
    /// Windowed sinc (rubato)
    #[default]
    Sinc,
    /// Linear interpolation
    Linear,
}

impl ResamplerKind {
    /// Build the resampler for this kind
    pub fn build(self) -> Box<dyn Resample> {
        match self {
            ResamplerKind::Sinc => Box::new(SincResampler::default()),
            ResamplerKind::Linear => Box::new(LinearResampler),
        }
    }
}

/// Expected output length when converting `len` frames by `ratio`
fn target_len(len: usize, ratio: f64) -> usize {
    ((len as f64) * ratio).ceil() as usize
}

// ============================================================================
// Linear interpolation
// ============================================================================

/// Linear interpolation resampler
///
/// Cheap and deterministic. Introduces aliasing when downsampling, which is
/// irrelevant here because alignment only ever upsamples.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearResampler;

impl Resample for LinearResampler {
    fn resample(&self, buffer: &AudioBuffer, target_rate: u32) -> Result<AudioBuffer> {
        if buffer.sample_rate == target_rate {
            return Ok(buffer.clone());
        }
        if buffer.sample_rate == 0 || target_rate == 0 {
            return Err(FomaError::Resample {
                reason: format!("cannot resample {} Hz to {} Hz", buffer.sample_rate, target_rate),
            });
        }

        let ratio = target_rate as f64 / buffer.sample_rate as f64;
        let samples = buffer
            .samples
            .iter()
            .map(|channel| resample_linear(channel, ratio))
            .collect();

        Ok(AudioBuffer {
            samples,
            sample_rate: target_rate,
        })
    }
}

fn resample_linear(samples: &[f32], ratio: f64) -> Vec<f32> {
    if samples.is_empty() {
        return Vec::new();
    }

    let source_len = samples.len();
    let out_len = target_len(source_len, ratio);
    let mut output = Vec::with_capacity(out_len);

    for i in 0..out_len {
        let src_pos = i as f64 / ratio;
        let src_idx = src_pos.floor() as usize;
        let frac = (src_pos - src_idx as f64) as f32;

        let sample = if src_idx + 1 < source_len {
            samples[src_idx] * (1.0 - frac) + samples[src_idx + 1] * frac
        } else if src_idx < source_len {
            samples[src_idx]
        } else {
            0.0
        };

        output.push(sample);
    }

    output
}

// ============================================================================
// Windowed sinc (rubato)
// ============================================================================

/// Band-limited resampler backed by rubato's `SincFixedIn`
///
/// The filter delay is removed, so sample `n` of the output lines up with
/// time `n / target_rate` of the input.
#[derive(Debug, Clone)]
pub struct SincResampler {
    pub sinc_len: usize,
    pub f_cutoff: f32,
    pub oversampling_factor: usize,
}

impl Default for SincResampler {
    fn default() -> Self {
        Self {
            sinc_len: 256,
            f_cutoff: 0.95,
            oversampling_factor: 256,
        }
    }
}

impl SincResampler {
    fn create(&self, ratio: f64, channels: usize) -> Result<SincFixedIn<f32>> {
        let params = SincInterpolationParameters {
            sinc_len: self.sinc_len,
            f_cutoff: self.f_cutoff,
            interpolation: SincInterpolationType::Cubic,
            oversampling_factor: self.oversampling_factor,
            window: WindowFunction::BlackmanHarris2,
        };

        SincFixedIn::<f32>::new(ratio, 1.0, params, SINC_CHUNK_FRAMES, channels).map_err(|e| {
            FomaError::Resample {
                reason: format!("Failed to create sinc resampler: {}", e),
            }
        })
    }
}

impl Resample for SincResampler {
    fn resample(&self, buffer: &AudioBuffer, target_rate: u32) -> Result<AudioBuffer> {
        if buffer.sample_rate == target_rate {
            return Ok(buffer.clone());
        }
        if buffer.sample_rate == 0 || target_rate == 0 {
            return Err(FomaError::Resample {
                reason: format!("cannot resample {} Hz to {} Hz", buffer.sample_rate, target_rate),
            });
        }

        let channels = buffer.channels();
        let frames = buffer.len();
        if channels == 0 || frames == 0 {
            return Ok(AudioBuffer::new(channels, 0, target_rate));
        }

        debug!(
            "Resampling {} frames from {}Hz to {}Hz ({} channels)",
            frames, buffer.sample_rate, target_rate, channels
        );

        let ratio = target_rate as f64 / buffer.sample_rate as f64;
        let mut resampler = self.create(ratio, channels)?;
        let delay = resampler.output_delay();
        let wanted = target_len(frames, ratio) + delay;
        let mut output: Vec<Vec<f32>> = vec![Vec::with_capacity(wanted); channels];

        let map_err = |e: rubato::ResampleError| FomaError::Resample {
            reason: format!("Resampling failed: {}", e),
        };

        let mut pos = 0;
        while pos + SINC_CHUNK_FRAMES <= frames {
            let chunk: Vec<&[f32]> = buffer
                .samples
                .iter()
                .map(|ch| &ch[pos..pos + SINC_CHUNK_FRAMES])
                .collect();
            append_planar(&mut output, resampler.process(&chunk, None).map_err(map_err)?);
            pos += SINC_CHUNK_FRAMES;
        }

        if pos < frames {
            let tail: Vec<&[f32]> = buffer.samples.iter().map(|ch| &ch[pos..]).collect();
            append_planar(
                &mut output,
                resampler.process_partial(Some(tail.as_slice()), None).map_err(map_err)?,
            );
        }

        // Flush the filter so the last input frames reach the output
        while output[0].len() < wanted {
            let flushed = resampler
                .process_partial(None::<&[&[f32]]>, None)
                .map_err(map_err)?;
            if flushed.first().map_or(true, |ch| ch.is_empty()) {
                break;
            }
            append_planar(&mut output, flushed);
        }

        for channel in &mut output {
            channel.drain(..delay.min(channel.len()));
            channel.truncate(wanted - delay);
        }

        Ok(AudioBuffer {
            samples: output,
            sample_rate: target_rate,
        })
    }
}

fn append_planar(output: &mut [Vec<f32>], chunk: Vec<Vec<f32>>) {
    for (out, part) in output.iter_mut().zip(chunk) {
        out.extend_from_slice(&part);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, rate: u32, len: usize) -> AudioBuffer {
        let samples = (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / rate as f32).sin() * 0.5)
            .collect();
        AudioBuffer {
            samples: vec![samples],
            sample_rate: rate,
        }
    }

    #[test]
    fn test_equal_rate_is_identity() {
        let buffer = sine(440.0, 48000, 1000);
        for kind in [ResamplerKind::Sinc, ResamplerKind::Linear] {
            let out = kind.build().resample(&buffer, 48000).unwrap();
            assert_eq!(out, buffer);
        }
    }

    #[test]
    fn test_resample_linear_upsample() {
        let samples = vec![0.0, 1.0, 0.0];
        let resampled = resample_linear(&samples, 2.0);

        assert_eq!(resampled.len(), 6);
        // Source position 0.5 interpolates halfway
        assert!((resampled[1] - 0.5).abs() < 0.01);
    }

    #[test]
    fn test_linear_sets_target_rate_and_length() {
        let buffer = sine(440.0, 48000, 4800);
        let out = LinearResampler.resample(&buffer, 96000).unwrap();
        assert_eq!(out.sample_rate, 96000);
        assert_eq!(out.len(), 9600);
    }

    #[test]
    fn test_sinc_length_matches_ratio() {
        let buffer = sine(1000.0, 48000, 5000);
        let out = SincResampler::default().resample(&buffer, 96000).unwrap();
        assert_eq!(out.sample_rate, 96000);
        assert_eq!(out.len(), 10000);
    }

    #[test]
    fn test_sinc_preserves_low_frequency_content() {
        let buffer = sine(1000.0, 48000, 4800);
        let out = SincResampler::default().resample(&buffer, 96000).unwrap();
        let reference = sine(1000.0, 96000, 9600);

        // Compare away from the edges where the filter has no history
        let max_err = out.channel(0)[1000..8000]
            .iter()
            .zip(&reference.channel(0)[1000..8000])
            .map(|(a, b)| (a - b).abs())
            .fold(0.0_f32, f32::max);
        assert!(max_err < 0.01, "max error {}", max_err);
    }

    #[test]
    fn test_zero_rate_is_rejected() {
        let buffer = AudioBuffer::new(1, 10, 0);
        assert!(LinearResampler.resample(&buffer, 48000).is_err());
    }
}
