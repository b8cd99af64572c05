//! Audio Buffer Management
//!
//! Planar 32-bit float sample storage used by every differential stage.
//! Bit depth is deliberately absent: it only matters for tier planning and
//! for the integer format an artifact is written in.

use crate::error::{FomaError, Result};

// ============================================================================
// Helper Functions
// ============================================================================

/// Convert decibels to linear amplitude
///
/// # Arguments
/// * `db` - Value in decibels
///
/// # Returns
/// Linear amplitude (0.0 to 1.0+ range)
#[inline]
pub fn db_to_linear(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Convert linear amplitude to decibels
///
/// # Returns
/// Value in decibels. Returns -f32::INFINITY for zero input.
#[inline]
pub fn linear_to_db(linear: f32) -> f32 {
    if linear <= 0.0 {
        f32::NEG_INFINITY
    } else {
        20.0 * linear.log10()
    }
}

/// Peak absolute sample value across all channels of a buffer
///
/// Returns 0.0 for empty buffers. NaN samples propagate as NaN so that a
/// corrupt residual can never compare as "below threshold".
pub fn calculate_peak(buffer: &AudioBuffer) -> f32 {
    let mut peak = 0.0_f32;
    for &sample in buffer.samples.iter().flat_map(|channel| channel.iter()) {
        if sample.is_nan() {
            return f32::NAN;
        }
        peak = peak.max(sample.abs());
    }
    peak
}

// ============================================================================
// Audio Buffer
// ============================================================================

/// Multi-channel sample matrix at a known sample rate
///
/// Stores audio as non-interleaved 32-bit floating point samples.
/// Each channel is a separate Vec<f32>; all channels have the same length.
///
/// # Example
/// ```
/// use foma::engine::AudioBuffer;
///
/// // One second of stereo silence at 48 kHz
/// let buffer = AudioBuffer::new(2, 48000, 48000);
/// assert_eq!(buffer.channels(), 2);
/// assert_eq!(buffer.len(), 48000);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Sample data: outer Vec is channels, inner Vec is samples
    pub samples: Vec<Vec<f32>>,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl AudioBuffer {
    /// Create a zeroed buffer with the given channel count and length
    pub fn new(num_channels: usize, num_samples: usize, sample_rate: u32) -> Self {
        Self {
            samples: vec![vec![0.0_f32; num_samples]; num_channels],
            sample_rate,
        }
    }

    /// Create a buffer from planar channel data
    ///
    /// # Errors
    /// `Decode` if the channels have different lengths or there are none.
    pub fn from_channels(samples: Vec<Vec<f32>>, sample_rate: u32) -> Result<Self> {
        let Some(first) = samples.first() else {
            return Err(FomaError::Decode {
                path: Default::default(),
                reason: "buffer has no channels".to_string(),
            });
        };
        let expected = first.len();
        if let Some(bad) = samples.iter().position(|ch| ch.len() != expected) {
            return Err(FomaError::Decode {
                path: Default::default(),
                reason: format!(
                    "channel {} has {} samples, channel 0 has {}",
                    bad,
                    samples[bad].len(),
                    expected
                ),
            });
        }
        Ok(Self {
            samples,
            sample_rate,
        })
    }

    /// Create an audio buffer from interleaved sample data
    ///
    /// # Arguments
    /// * `interleaved` - Interleaved sample data (L, R, L, R, ... for stereo)
    /// * `num_channels` - Channel count of the interleaved data
    /// * `sample_rate` - Sample rate in Hz
    pub fn from_interleaved(
        interleaved: &[f32],
        num_channels: usize,
        sample_rate: u32,
    ) -> Result<Self> {
        if num_channels == 0 || interleaved.len() % num_channels != 0 {
            return Err(FomaError::Decode {
                path: Default::default(),
                reason: format!(
                    "Interleaved data length {} is not divisible by channel count {}",
                    interleaved.len(),
                    num_channels
                ),
            });
        }

        let num_samples = interleaved.len() / num_channels;
        let mut samples = vec![Vec::with_capacity(num_samples); num_channels];

        for frame in interleaved.chunks_exact(num_channels) {
            for (ch, &sample) in frame.iter().enumerate() {
                samples[ch].push(sample);
            }
        }

        Ok(Self {
            samples,
            sample_rate,
        })
    }

    /// Convert the buffer to interleaved format
    pub fn to_interleaved(&self) -> Vec<f32> {
        let num_channels = self.channels();
        let num_samples = self.len();

        if num_channels == 0 || num_samples == 0 {
            return Vec::new();
        }

        let mut interleaved = Vec::with_capacity(num_channels * num_samples);

        for sample_idx in 0..num_samples {
            for channel in &self.samples {
                interleaved.push(channel[sample_idx]);
            }
        }

        interleaved
    }

    /// Get the number of channels
    #[inline]
    pub fn channels(&self) -> usize {
        self.samples.len()
    }

    /// Get the number of samples per channel
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.first().map(|ch| ch.len()).unwrap_or(0)
    }

    /// Check if the buffer is empty (no samples)
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the duration in seconds
    #[inline]
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.len() as f64 / self.sample_rate as f64
    }

    /// Get immutable access to a channel's samples
    ///
    /// # Panics
    /// Panics if the channel index is out of bounds
    #[inline]
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.samples[index]
    }

    /// Shorten every channel to at most `len` samples
    ///
    /// Never grows the buffer.
    pub fn truncate(&mut self, len: usize) {
        for channel in &mut self.samples {
            channel.truncate(len);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
