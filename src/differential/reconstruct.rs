//! Rebuilding a tier from its root plus a cascade of residuals

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::differential::ensure_same_channels;
use crate::engine::{AudioBuffer, PcmStore, Resample};
use crate::error::Result;

/// Sums a base and its residuals at a target rate
pub struct ReconstructionEngine<'a> {
    resampler: &'a dyn Resample,
}

impl<'a> ReconstructionEngine<'a> {
    pub fn new(resampler: &'a dyn Resample) -> Self {
        Self { resampler }
    }

    /// `base + residuals[0] + residuals[1] + ...` at `target_rate`
    ///
    /// Every input is brought to `target_rate` first. After each addition the
    /// running sum is truncated to the shorter of itself and the residual.
    pub fn reconstruct(
        &self,
        base: &AudioBuffer,
        residuals: &[AudioBuffer],
        target_rate: u32,
    ) -> Result<AudioBuffer> {
        let mut output = self.resampler.resample(base, target_rate)?;

        for residual in residuals {
            ensure_same_channels(&output, residual)?;
            let residual = self.resampler.resample(residual, target_rate)?;

            let len = output.len().min(residual.len());
            output.truncate(len);
            for (out, res) in output.samples.iter_mut().zip(&residual.samples) {
                for (o, r) in out.iter_mut().zip(&res[..len]) {
                    *o += r;
                }
            }
        }

        debug!(
            "Reconstructed {} frames from {} residual(s) at {} Hz",
            output.len(),
            residuals.len(),
            target_rate
        );
        Ok(output)
    }

    /// File variant of [`reconstruct`](Self::reconstruct), storing the result at `dest`
    ///
    /// # Errors
    /// `Decode` if the base or any residual cannot be read; nothing is
    /// written in that case.
    pub fn reconstruct_files(
        &self,
        store: &dyn PcmStore,
        base: &Path,
        residuals: &[PathBuf],
        target_rate: u32,
        dest: &Path,
    ) -> Result<()> {
        let base_buffer = store.load(base)?;
        let residual_buffers = residuals
            .iter()
            .map(|path| store.load(path))
            .collect::<Result<Vec<_>>>()?;

        let output = self.reconstruct(&base_buffer, &residual_buffers, target_rate)?;
        store.store(dest, &output)?;
        info!("Reconstructed file created: {}", dest.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::differential::ResidualComputer;
    use crate::engine::LinearResampler;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;

    fn tone(len: usize, rate: u32, freq: f32) -> AudioBuffer {
        let channel: Vec<f32> = (0..len)
            .map(|i| (i as f32 * freq / rate as f32 * std::f32::consts::TAU).sin() * 0.25)
            .collect();
        AudioBuffer::from_channels(vec![channel.clone(), channel], rate).unwrap()
    }

    #[test]
    fn test_equal_rate_round_trip_is_exact() {
        // Values on the 16-bit grid: every difference is exactly representable
        let base = AudioBuffer::from_channels(
            vec![vec![0.5, -0.25, 0.125, 0.0], vec![0.0, 0.75, -0.5, 0.25]],
            48000,
        )
        .unwrap();
        let target = AudioBuffer::from_channels(
            vec![vec![0.5, -0.25, 0.25, 0.0], vec![0.0, 0.5, -0.5, 0.375]],
            48000,
        )
        .unwrap();

        let residual = ResidualComputer::new(&LinearResampler)
            .compute(&base, &target)
            .unwrap();
        let rebuilt = ReconstructionEngine::new(&LinearResampler)
            .reconstruct(&base, &[residual.buffer], 48000)
            .unwrap();

        assert_eq!(rebuilt, target);
    }

    #[test]
    fn test_residual_order_does_not_matter() {
        let base = tone(256, 48000, 440.0);
        let a = tone(256, 48000, 1000.0);
        let b = tone(250, 48000, 3000.0);
        let engine = ReconstructionEngine::new(&LinearResampler);

        let ab = engine
            .reconstruct(&base, &[a.clone(), b.clone()], 48000)
            .unwrap();
        let ba = engine.reconstruct(&base, &[b, a], 48000).unwrap();

        assert_eq!(ab.len(), 250);
        assert_eq!(ab.len(), ba.len());
        for ch in 0..2 {
            for i in 0..ab.len() {
                assert_relative_eq!(ab.samples[ch][i], ba.samples[ch][i], epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn test_base_is_resampled_to_target_rate() {
        let base = tone(480, 48000, 100.0);
        let engine = ReconstructionEngine::new(&LinearResampler);

        let rebuilt = engine.reconstruct(&base, &[], 96000).unwrap();

        assert_eq!(rebuilt.sample_rate, 96000);
        assert_eq!(rebuilt.len(), 960);
    }

    #[test]
    fn test_each_addition_truncates() {
        let base = AudioBuffer::new(1, 10, 48000);
        let short = AudioBuffer::from_channels(vec![vec![0.1; 6]], 48000).unwrap();
        let long = AudioBuffer::from_channels(vec![vec![0.2; 8]], 48000).unwrap();

        let rebuilt = ReconstructionEngine::new(&LinearResampler)
            .reconstruct(&base, &[long, short], 48000)
            .unwrap();

        assert_eq!(rebuilt.len(), 6);
        assert_relative_eq!(rebuilt.samples[0][5], 0.3, epsilon = 1e-6);
    }
}
