//! Residual computation: `target - base` at the higher of the two rates

use std::path::Path;

use tracing::{debug, info};

use crate::differential::ensure_same_channels;
use crate::engine::{AudioBuffer, PcmStore, Resample};
use crate::error::Result;

/// A residual and the rate it was computed at
#[derive(Debug, Clone, PartialEq)]
pub struct Residual {
    pub buffer: AudioBuffer,
    pub working_rate: u32,
}

/// Computes what has to be added to a base tier to recover a target tier
pub struct ResidualComputer<'a> {
    resampler: &'a dyn Resample,
}

impl<'a> ResidualComputer<'a> {
    pub fn new(resampler: &'a dyn Resample) -> Self {
        Self { resampler }
    }

    /// Compute `target - base`
    ///
    /// The lower-rate buffer is resampled up to the higher rate, both are
    /// truncated to the shorter length, then subtracted sample by sample.
    /// No rounding, dithering or clipping is applied.
    ///
    /// # Errors
    /// `ChannelMismatch` if the buffers disagree on channel count, or any
    /// resampler error.
    pub fn compute(&self, base: &AudioBuffer, target: &AudioBuffer) -> Result<Residual> {
        ensure_same_channels(base, target)?;

        let working_rate = base.sample_rate.max(target.sample_rate);
        let base = self.resampler.resample(base, working_rate)?;
        let target = self.resampler.resample(target, working_rate)?;

        let len = base.len().min(target.len());
        let samples = target
            .samples
            .iter()
            .zip(&base.samples)
            .map(|(t, b)| t[..len].iter().zip(&b[..len]).map(|(t, b)| t - b).collect())
            .collect();

        debug!(
            "Residual: {} channels x {} frames at {} Hz",
            base.channels(),
            len,
            working_rate
        );

        Ok(Residual {
            buffer: AudioBuffer {
                samples,
                sample_rate: working_rate,
            },
            working_rate,
        })
    }

    /// Load `base` and `target`, compute the residual and store it at `dest`
    ///
    /// # Errors
    /// `Decode` if either input cannot be read, `Encode` if the residual
    /// cannot be written.
    pub fn compute_files(
        &self,
        store: &dyn PcmStore,
        base: &Path,
        target: &Path,
        dest: &Path,
    ) -> Result<u32> {
        let base_buffer = store.load(base)?;
        let target_buffer = store.load(target)?;
        let residual = self.compute(&base_buffer, &target_buffer)?;

        store.store(dest, &residual.buffer)?;
        info!(
            "Residual FLAC file created at {} Hz: {}",
            residual.working_rate,
            dest.display()
        );
        Ok(residual.working_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::LinearResampler;
    use crate::error::FomaError;
    use approx::assert_relative_eq;

    fn ramp(len: usize, rate: u32, scale: f32) -> AudioBuffer {
        let channel: Vec<f32> = (0..len).map(|i| (i as f32 * scale).sin() * 0.5).collect();
        AudioBuffer::from_channels(vec![channel.clone(), channel], rate).unwrap()
    }

    #[test]
    fn test_equal_rate_residual_is_exact_difference() {
        let base = ramp(512, 48000, 0.01);
        let target = ramp(512, 48000, 0.011);
        let computer = ResidualComputer::new(&LinearResampler);

        let residual = computer.compute(&base, &target).unwrap();

        assert_eq!(residual.working_rate, 48000);
        for ch in 0..2 {
            for i in 0..512 {
                assert_eq!(
                    residual.buffer.samples[ch][i],
                    target.samples[ch][i] - base.samples[ch][i]
                );
            }
        }
    }

    #[test]
    fn test_residual_truncates_to_shorter_input() {
        let base = ramp(1000, 48000, 0.01);
        let target = ramp(998, 48000, 0.01);
        let computer = ResidualComputer::new(&LinearResampler);

        let residual = computer.compute(&base, &target).unwrap();

        assert_eq!(residual.buffer.len(), 998);
        assert!(residual.buffer.samples[0].iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_residual_works_at_higher_rate() {
        let base = ramp(480, 48000, 0.01);
        let target = ramp(960, 96000, 0.005);
        let computer = ResidualComputer::new(&LinearResampler);

        let residual = computer.compute(&base, &target).unwrap();

        assert_eq!(residual.working_rate, 96000);
        assert_eq!(residual.buffer.sample_rate, 96000);
        // Linear upsampling of a slow sine tracks the finer-grained target closely
        assert_relative_eq!(residual.buffer.samples[0][100], 0.0, epsilon = 1e-3);
    }

    #[test]
    fn test_channel_mismatch_is_an_error() {
        let base = ramp(10, 48000, 0.1);
        let target = AudioBuffer::new(1, 10, 48000);
        let computer = ResidualComputer::new(&LinearResampler);

        let err = computer.compute(&base, &target).unwrap_err();
        assert!(matches!(
            err,
            FomaError::ChannelMismatch { base: 2, target: 1 }
        ));
        assert!(!err.is_fatal());
    }
}
