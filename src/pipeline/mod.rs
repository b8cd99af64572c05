//! Pipeline orchestration
//!
//! Drives one input through planning, tier encoding, residual coding,
//! reconstruction, verification and retention, and reports on the result.

pub mod layout;
pub mod orchestrator;
pub mod report;
pub mod state;

pub use layout::{ArtifactLayout, OutputMode};
pub use orchestrator::{Pipeline, PipelineRun, StageFailure};
pub use report::{format_size, RunReport, SizeReport};
pub use state::{PipelineState, StateTracker};
