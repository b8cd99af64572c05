//! Audio engine
//!
//! - In-memory PCM buffers and level helpers
//! - Decoding and WAV writing
//! - Sample rate conversion
//! - Whole-file PCM storage

pub mod buffer;
pub mod io;
pub mod resample;
pub mod store;

pub use buffer::{calculate_peak, db_to_linear, linear_to_db, AudioBuffer};
pub use io::{check_input_format, load_pcm, probe_source, write_wav};
pub use resample::{LinearResampler, Resample, ResamplerKind, SincResampler};
pub use store::{FlacStore, PcmStore, ARTIFACT_BIT_DEPTH};
