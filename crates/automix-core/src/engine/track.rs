//! Track descriptors

use crate::analysis::BeatAnalysis;
use crate::audio_file::TrackSource;
use crate::types::TrackId;

/// Analysis results kept on the track once its deck has analysed it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackAnalysis {
    pub bpm: u32,
    pub beat_anchor: f64,
    pub mixout_anchor: f64,
    pub beat_interval_samples: f64,
}

impl From<&BeatAnalysis> for TrackAnalysis {
    fn from(analysis: &BeatAnalysis) -> Self {
        Self {
            bpm: analysis.bpm,
            beat_anchor: analysis.beat_anchor,
            mixout_anchor: analysis.mixout_anchor,
            beat_interval_samples: analysis.beat_interval_samples,
        }
    }
}

impl TrackAnalysis {
    pub fn beat_interval_secs(&self, sample_rate: u32) -> f64 {
        self.beat_interval_samples / sample_rate as f64
    }
}

/// A queued or playing track
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub id: TrackId,
    pub source: TrackSource,
    /// Filled once, when the deck finishes analysis
    pub analysis: Option<TrackAnalysis>,
    /// Tempo the deck should play at while mixing in (tempo match)
    pub target_bpm: Option<u32>,
}

impl Track {
    pub fn new(id: TrackId, source: TrackSource) -> Self {
        Self {
            id,
            source,
            analysis: None,
            target_bpm: None,
        }
    }

    /// Analysed tempo, if the analyzer found one
    pub fn bpm(&self) -> Option<u32> {
        self.analysis.map(|a| a.bpm)
    }
}
