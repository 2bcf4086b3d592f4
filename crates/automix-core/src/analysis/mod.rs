//! Offline tempo and beat-anchor estimation
//!
//! The analyzer runs once per track, over the whole decoded buffer, before
//! any scheduling happens. See [`BeatAnalyzer`] for the algorithm.

mod bpm;

pub use bpm::{fold_tempo, BeatAnalysis, BeatAnalyzer, IntervalGroup, Peak};

use thiserror::Error;

/// Errors from beat analysis
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    /// Not a single pair of peaks produced a tempo candidate
    #[error("No BPM guess: the track has no usable beat peaks")]
    NoBpmGuess,

    #[error("Invalid sample rate for analysis: {0}Hz")]
    SampleRate(u32),
}

/// Result type for analysis operations
pub type AnalysisResult<T> = Result<T, AnalysisError>;
