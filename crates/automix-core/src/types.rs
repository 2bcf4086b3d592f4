//! Common types for the automix engine
//!
//! Stereo sample/buffer handling shared by the decoder, the phase vocoder,
//! the decks and the mixer, plus track identity.

use std::fmt;
use std::ops::{Index, IndexMut};

/// Sample rate used when no audio context overrides it (CD rate, the rate
/// most decoded material arrives at)
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// The engine only ever overlaps two tracks: outgoing and incoming
pub const MAX_DECKS: usize = 2;

/// Audio sample type (32-bit float for processing)
pub type Sample = f32;

/// Identity of a queued track, stable for the lifetime of the engine
///
/// Assigned by [`crate::engine::MixerEngine::enqueue`] and reused as the
/// deck identifier once the track becomes active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackId(pub u64);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "track#{}", self.0)
    }
}

/// A single stereo sample (left and right channels)
///
/// `#[repr(C)]` keeps the layout `[left, right]` so a `&[StereoSample]` can be
/// viewed as interleaved `&[f32]` through bytemuck (used by the WAV sink).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct StereoSample {
    pub left: Sample,
    pub right: Sample,
}

impl StereoSample {
    #[inline]
    pub fn new(left: Sample, right: Sample) -> Self {
        Self { left, right }
    }

    #[inline]
    pub fn silence() -> Self {
        Self::default()
    }

    /// Same value in both channels
    #[inline]
    pub fn mono(value: Sample) -> Self {
        Self { left: value, right: value }
    }

    /// Loudest channel magnitude, the per-sample measure the beat analyzer uses
    #[inline]
    pub fn peak(&self) -> Sample {
        self.left.abs().max(self.right.abs())
    }
}

impl std::ops::Add for StereoSample {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Self::new(self.left + other.left, self.right + other.right)
    }
}

impl std::ops::AddAssign for StereoSample {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.left += other.left;
        self.right += other.right;
    }
}

impl std::ops::Mul<Sample> for StereoSample {
    type Output = Self;

    #[inline]
    fn mul(self, factor: Sample) -> Self {
        Self::new(self.left * factor, self.right * factor)
    }
}

/// A buffer of stereo samples
///
/// Decoded tracks, render blocks and the mix bus all use this type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StereoBuffer {
    samples: Vec<StereoSample>,
}

impl StereoBuffer {
    /// Create a buffer filled with silence
    pub fn silence(len: usize) -> Self {
        Self {
            samples: vec![StereoSample::silence(); len],
        }
    }

    /// Create a buffer from separate left and right channel slices
    ///
    /// The shorter channel decides the length.
    pub fn from_channels(left: &[Sample], right: &[Sample]) -> Self {
        let samples = left
            .iter()
            .zip(right.iter())
            .map(|(&l, &r)| StereoSample::new(l, r))
            .collect();
        Self { samples }
    }

    /// Duplicate a mono signal into both channels
    pub fn from_mono(mono: &[Sample]) -> Self {
        Self {
            samples: mono.iter().map(|&s| StereoSample::mono(s)).collect(),
        }
    }

    pub fn from_vec(samples: Vec<StereoSample>) -> Self {
        Self { samples }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Resize the buffer, filling with silence if growing
    pub fn resize(&mut self, new_len: usize) {
        self.samples.resize(new_len, StereoSample::silence());
    }

    pub fn fill_silence(&mut self) {
        self.samples.fill(StereoSample::silence());
    }

    #[inline]
    pub fn as_slice(&self) -> &[StereoSample] {
        &self.samples
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [StereoSample] {
        &mut self.samples
    }

    /// Zero-copy view of the samples as interleaved f32 `[L, R, L, R, ...]`
    #[inline]
    pub fn as_interleaved(&self) -> &[Sample] {
        bytemuck::cast_slice(&self.samples)
    }

    /// Split into separate left/right vectors (used by the resampler)
    pub fn to_channels(&self) -> (Vec<Sample>, Vec<Sample>) {
        self.samples.iter().map(|s| (s.left, s.right)).unzip()
    }

    /// Sum another buffer into this one, sample by sample
    ///
    /// Only the overlapping prefix is mixed when lengths differ.
    pub fn add_buffer(&mut self, other: &StereoBuffer) {
        for (dst, src) in self.samples.iter_mut().zip(other.samples.iter()) {
            *dst += *src;
        }
    }

    pub fn scale(&mut self, factor: Sample) {
        for sample in &mut self.samples {
            *sample = *sample * factor;
        }
    }

    #[inline]
    pub fn push(&mut self, sample: StereoSample) {
        self.samples.push(sample);
    }

    pub fn iter(&self) -> impl Iterator<Item = &StereoSample> {
        self.samples.iter()
    }

    /// Get the peak amplitude in the buffer
    pub fn peak(&self) -> Sample {
        self.samples.iter().map(|s| s.peak()).fold(0.0, Sample::max)
    }

    /// Duration in seconds at the given sample rate
    pub fn duration_secs(&self, sample_rate: u32) -> f64 {
        if sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / sample_rate as f64
    }
}

impl Index<usize> for StereoBuffer {
    type Output = StereoSample;

    #[inline]
    fn index(&self, index: usize) -> &Self::Output {
        &self.samples[index]
    }
}

impl IndexMut<usize> for StereoBuffer {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.samples[index]
    }
}
