//! Track decoding
//!
//! The engine asks an [`AudioSource`] to turn a [`TrackSource`] into a stereo
//! buffer at the engine's sample rate. [`SymphoniaSource`] decodes local
//! files; tests and embedders can supply their own source.

mod decoder;
mod resample;

use std::path::PathBuf;

use thiserror::Error;

use crate::types::StereoBuffer;

pub use decoder::SymphoniaSource;
pub use resample::resample_buffer;

/// Where a track's audio comes from
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TrackSource {
    Url(String),
    File(PathBuf),
}

impl TrackSource {
    /// Human-readable locator for logs and events
    pub fn locator(&self) -> String {
        match self {
            TrackSource::Url(url) => url.clone(),
            TrackSource::File(path) => path.display().to_string(),
        }
    }
}

impl From<PathBuf> for TrackSource {
    fn from(path: PathBuf) -> Self {
        TrackSource::File(path)
    }
}

/// A fully decoded track
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub samples: StereoBuffer,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn new(samples: StereoBuffer, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    pub fn duration_secs(&self) -> f64 {
        self.samples.duration_secs(self.sample_rate)
    }
}

/// Errors that can occur while decoding a track
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Failed to read audio file: {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported track source: {0}")]
    UnsupportedSource(String),

    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("No audio track found in {0}")]
    NoAudioTrack(String),

    #[error("Decoding failed: {0}")]
    Codec(String),

    #[error("Sample rate conversion failed: {0}")]
    Resample(String),

    #[error("Track contains no audio: {0}")]
    Empty(String),
}

/// Decodes track sources into stereo buffers at a fixed rate
pub trait AudioSource: Send {
    /// Decode the whole track, converted to `target_sample_rate`
    fn decode(&self, source: &TrackSource, target_sample_rate: u32) -> Result<DecodedAudio, DecodeError>;
}
