//! Time-stretching via a phase-locked phase vocoder
//!
//! [`PhaseVocoder`] is the mono streaming core. [`StretchPlayer`] drives a
//! pair of them over a decoded stereo track to play it at a different tempo,
//! optionally resampled so tempo and pitch can be moved independently.

mod player;
mod vocoder;

pub use player::StretchPlayer;
pub use vocoder::{overlap_factor, PhaseVocoder};
