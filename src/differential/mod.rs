//! Differential coding: residuals, reconstruction, verification, retention
//!
//! These stages only ever touch PCM through [`crate::engine::PcmStore`] and
//! rate conversion through [`crate::engine::Resample`], so they run the same
//! against FLAC on disk and against in-memory fakes.

pub mod reconstruct;
pub mod residual;
pub mod retention;
pub mod verify;

pub use reconstruct::ReconstructionEngine;
pub use residual::{Residual, ResidualComputer};
pub use retention::{Deletion, DeletionOutcome, RetentionManager};
pub use verify::{CheckOutcome, TierCheck, VerificationGate, VerificationOutcome};

use crate::engine::AudioBuffer;
use crate::error::{FomaError, Result};

/// Fail with `ChannelMismatch` unless both buffers have the same channel count
pub(crate) fn ensure_same_channels(base: &AudioBuffer, target: &AudioBuffer) -> Result<()> {
    if base.channels() != target.channels() {
        return Err(FomaError::ChannelMismatch {
            base: base.channels(),
            target: target.channels(),
        });
    }
    Ok(())
}
