//! Mixer-level lifecycle events

use super::schedule::Schedule;
use super::track::TrackAnalysis;
use crate::types::TrackId;

#[derive(Debug, Clone, PartialEq)]
pub enum MixerEventKind {
    Loaded { duration: f64 },
    /// Decoding failed; the track was dropped from the mix
    LoadFailed(String),
    Analyzed(Option<TrackAnalysis>),
    Playing,
    Paused,
    Mixin,
    Mixout,
    LoadNext(Schedule),
    TrackEnd,
}

/// Event for one track, delivered to every subscriber
#[derive(Debug, Clone, PartialEq)]
pub struct MixerEvent {
    pub track: TrackId,
    pub kind: MixerEventKind,
}

impl MixerEvent {
    pub fn new(track: TrackId, kind: MixerEventKind) -> Self {
        Self { track, kind }
    }
}
