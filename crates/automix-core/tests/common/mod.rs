//! Shared fixtures: synthetic beat tracks and an in-memory audio source

#![allow(dead_code)]

use std::collections::HashMap;
use std::f32::consts::PI;

use automix_core::audio_file::{AudioSource, DecodeError, DecodedAudio, TrackSource};
use automix_core::config::MixerConfig;
use automix_core::engine::{AudioContext, MixerEngine, MixerEvent};
use automix_core::StereoBuffer;

use crossbeam::channel::Receiver;

/// First beat of every synthetic track, in seconds
pub const FIRST_BEAT: f64 = 0.25;

/// Kick-like bursts: a 120 Hz sine with a fast exponential decay on every
/// beat
///
/// Bursts get slowly louder towards the end of the track, so the loudest
/// peaks sit in the outro the way they do in real dance music.
pub fn click_track(bpm: f64, seconds: f64, sample_rate: u32) -> StereoBuffer {
    let sr = sample_rate as f64;
    let len = (seconds * sr) as usize;
    let burst = (0.05 * sr) as usize;
    let mut mono = vec![0.0f32; len];

    let mut beat = 0usize;
    loop {
        let onset = ((FIRST_BEAT + beat as f64 * 60.0 / bpm) * sr).round() as usize;
        if onset >= len {
            break;
        }
        let level = 0.4 + 0.5 * (onset as f32 / len as f32);
        for (k, sample) in mono[onset..].iter_mut().take(burst).enumerate() {
            let t = k as f32 / sample_rate as f32;
            *sample = level * (2.0 * PI * 120.0 * t).sin() * (-t * 60.0).exp();
        }
        beat += 1;
    }
    StereoBuffer::from_mono(&mono)
}

pub fn sine(freq: f32, seconds: f64, sample_rate: u32) -> StereoBuffer {
    let len = (seconds * sample_rate as f64) as usize;
    let mono: Vec<f32> = (0..len)
        .map(|i| 0.5 * (2.0 * PI * freq * i as f32 / sample_rate as f32).sin())
        .collect();
    StereoBuffer::from_mono(&mono)
}

/// Serves `mem://<name>` locators from memory
pub struct MemorySource {
    sample_rate: u32,
    tracks: HashMap<String, StereoBuffer>,
}

impl MemorySource {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            tracks: HashMap::new(),
        }
    }

    pub fn with_track(mut self, name: &str, buffer: StereoBuffer) -> Self {
        self.tracks.insert(name.to_string(), buffer);
        self
    }
}

impl AudioSource for MemorySource {
    fn decode(&self, source: &TrackSource, _target_sample_rate: u32) -> Result<DecodedAudio, DecodeError> {
        let locator = source.locator();
        let name = locator.strip_prefix("mem://").unwrap_or(&locator);
        self.tracks
            .get(name)
            .map(|buffer| DecodedAudio::new(buffer.clone(), self.sample_rate))
            .ok_or_else(|| DecodeError::UnsupportedSource(locator.clone()))
    }
}

pub fn mem(name: &str) -> TrackSource {
    TrackSource::Url(format!("mem://{}", name))
}

/// Offline engine over `source` with its event stream
pub fn engine(source: MemorySource, config: MixerConfig) -> (MixerEngine, Receiver<MixerEvent>) {
    let ctx = AudioContext::offline(source.sample_rate);
    let mut engine = MixerEngine::new(ctx, config, Box::new(source));
    let events = engine.subscribe();
    (engine, events)
}
