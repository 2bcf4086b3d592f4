//! Engine error types

use thiserror::Error;

use crate::dsp::DspError;
use crate::types::TrackId;

/// Errors returned by mixer controls and rendering
#[derive(Error, Debug)]
pub enum EngineError {
    /// The track is not loaded on any deck
    #[error("No active deck plays {0}")]
    DeckNotFound(TrackId),

    /// The deck is waiting for its beat-aligned start
    #[error("Deck for {0} has not started playing")]
    DeckNotStarted(TrackId),

    #[error("DSP error: {0}")]
    Dsp(#[from] DspError),

    #[error("Audio sink error: {0}")]
    Sink(String),
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
