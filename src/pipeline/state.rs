//! Pipeline state machine
//!
//! ```text
//! PLAN -> ENCODE_TIERS -> ENCODE_RESIDUALS -> RECONSTRUCT -> VERIFY -> CLEANUP
//!                                                                  \-> RETAIN_ALL
//! ```
//!
//! Stages run strictly forward. `CLEANUP` and `RETAIN_ALL` are terminal.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{FomaError, Result};

/// Stage of a single-file run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineState {
    #[default]
    Plan,
    EncodeTiers,
    EncodeResiduals,
    Reconstruct,
    Verify,
    /// Verification passed; redundant files were deleted
    Cleanup,
    /// Verification failed; every artifact was kept
    RetainAll,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Cleanup | PipelineState::RetainAll)
    }

    /// Whether `next` directly follows `self`
    pub fn can_advance_to(&self, next: PipelineState) -> bool {
        use PipelineState::*;
        matches!(
            (self, next),
            (Plan, EncodeTiers)
                | (EncodeTiers, EncodeResiduals)
                | (EncodeResiduals, Reconstruct)
                | (Reconstruct, Verify)
                | (Verify, Cleanup)
                | (Verify, RetainAll)
        )
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Plan => write!(f, "PLAN"),
            PipelineState::EncodeTiers => write!(f, "ENCODE_TIERS"),
            PipelineState::EncodeResiduals => write!(f, "ENCODE_RESIDUALS"),
            PipelineState::Reconstruct => write!(f, "RECONSTRUCT"),
            PipelineState::Verify => write!(f, "VERIFY"),
            PipelineState::Cleanup => write!(f, "CLEANUP"),
            PipelineState::RetainAll => write!(f, "RETAIN_ALL"),
        }
    }
}

/// Tracks the current stage and the path taken to reach it
#[derive(Debug, Clone, Default)]
pub struct StateTracker {
    state: PipelineState,
    history: Vec<PipelineState>,
}

impl StateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Every state visited so far, including the current one
    pub fn history(&self) -> Vec<PipelineState> {
        let mut visited = self.history.clone();
        visited.push(self.state);
        visited
    }

    /// Move to `next`
    ///
    /// # Errors
    /// `InvalidTransition` when `next` does not directly follow the current
    /// state, including any move out of a terminal state.
    pub fn advance(&mut self, next: PipelineState) -> Result<()> {
        if !self.state.can_advance_to(next) {
            return Err(FomaError::InvalidTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }

        debug!("Pipeline state: {} -> {}", self.state, next);
        self.history.push(self.state);
        self.state = next;
        Ok(())
    }
}
