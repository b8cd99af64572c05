//! FOMA - tiered lossless archive encoder
//!
//! A FLAC master is encoded into several quality tiers (consumer, standard,
//! high resolution). Every tier above the consumer tier is stored as a
//! residual against the tier below it, the tier is rebuilt from those
//! residuals and compared with a direct encode, and the standalone copy is
//! only deleted when the rebuilt audio matches to within -130 dBFS.
//!
//! # Architecture
//!
//! - [`tier`]: which tiers to encode and verify for a given source
//! - [`differential`]: residuals, reconstruction, verification, retention
//! - [`pipeline`]: the per-file state machine and reports
//! - [`engine`] and [`transcode`]: PCM access, resampling and the external
//!   codec toolchain, injected into the stages above

pub mod cli;
pub mod config;
pub mod differential;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod tier;
pub mod transcode;

pub use config::PipelineConfig;
pub use error::{FomaError, Result};
