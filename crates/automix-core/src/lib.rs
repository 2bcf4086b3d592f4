//! Automix Core - beat-matched automatic DJ mixing
//!
//! Tracks are decoded, analysed for tempo and beat anchors, and played on
//! up to two decks whose crossfades are scheduled on a shared timeline. An
//! incoming track starts tempo-matched to the outgoing one through a phase
//! vocoder and drifts back to its native tempo once the mix is over.

pub mod analysis;
pub mod audio_file;
pub mod clock;
pub mod config;
pub mod dsp;
pub mod engine;
pub mod recording;
pub mod timestretch;
pub mod types;

pub use types::*;
