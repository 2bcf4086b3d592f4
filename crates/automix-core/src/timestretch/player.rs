//! Buffered stereo playback through the phase vocoder
//!
//! The player owns its own read position in the source buffer. Every vocoder
//! call consumes a frame starting at that position and advances it by the
//! analysis hop; the synthesized samples wait in a small ring until the
//! renderer pulls them. A linear interpolator on the way out applies the
//! pitch factor, so the overall source consumption per output sample is
//! `pitch / alpha`.
//!
//! Hops are whole samples, so the real consumption is `pitch * Ha / Hs`.
//! The player accounts for it exactly in [`StretchPlayer::playhead`], which
//! lets the caller steer back onto its own timeline.

use std::collections::VecDeque;

use crate::dsp::{DspResult, RingBuffer};
use crate::types::{StereoBuffer, StereoSample};

use super::PhaseVocoder;

pub struct StretchPlayer {
    left: PhaseVocoder,
    right: PhaseVocoder,
    frame_size: usize,
    /// Next frame start in the source, in samples
    position: usize,
    /// Ratio applied at the next frame boundary
    pending_alpha: Option<f64>,
    out_left: RingBuffer<f32>,
    out_right: RingBuffer<f32>,
    /// Fractional read offset between the first two queued samples
    frac: f64,
    /// Source position of the first queued sample
    playhead: f64,
    /// Queued samples per frame with the source samples each one covers
    spans: VecDeque<(usize, f64)>,
    frame_left: Vec<f32>,
    frame_right: Vec<f32>,
}

impl StretchPlayer {
    pub fn new(frame_size: usize, sample_rate: u32) -> DspResult<Self> {
        Ok(Self {
            left: PhaseVocoder::new(frame_size, sample_rate)?,
            right: PhaseVocoder::new(frame_size, sample_rate)?,
            frame_size,
            position: 0,
            pending_alpha: None,
            out_left: RingBuffer::new(2 * frame_size),
            out_right: RingBuffer::new(2 * frame_size),
            frac: 0.0,
            playhead: 0.0,
            spans: VecDeque::new(),
            frame_left: vec![0.0; frame_size],
            frame_right: vec![0.0; frame_size],
        })
    }

    /// Request a new stretch ratio, applied before the next frame
    pub fn set_alpha(&mut self, alpha: f64) {
        if (alpha - self.left.alpha()).abs() > f64::EPSILON {
            self.pending_alpha = Some(alpha);
        } else {
            self.pending_alpha = None;
        }
    }

    /// Ratio currently in effect (pending changes excluded)
    pub fn alpha(&self) -> f64 {
        self.left.alpha()
    }

    /// Source position of the next analysis frame
    pub fn position(&self) -> usize {
        self.position
    }

    /// Source position, in fractional samples, of the next rendered sample
    pub fn playhead(&self) -> f64 {
        let step = self.spans.front().map(|&(_, step)| step).unwrap_or(1.0);
        self.playhead + self.frac * step
    }

    /// Restart playback at `position` in the source
    ///
    /// Drops queued output and phase history, then primes the vocoders with
    /// the first frame so the next rendered sample is the source sample at
    /// `position` rather than the vocoder's one-hop delay.
    pub fn set_position(&mut self, source: &StereoBuffer, position: usize) -> DspResult<()> {
        if let Some(alpha) = self.pending_alpha.take() {
            self.left.set_alpha(alpha);
            self.right.set_alpha(alpha);
        }
        self.left.reset();
        self.right.reset();
        self.out_left.clear();
        self.out_right.clear();
        self.frac = 0.0;
        self.position = position;

        self.process_frame(source)?;
        self.out_left.clear();
        self.out_right.clear();
        self.spans.clear();
        self.playhead = position as f64;
        Ok(())
    }

    /// True once every frame overlapping the source has been analysed
    pub fn is_exhausted(&self, source: &StereoBuffer) -> bool {
        self.position >= source.len() + self.frame_size
    }

    fn process_frame(&mut self, source: &StereoBuffer) -> DspResult<()> {
        if let Some(alpha) = self.pending_alpha.take() {
            self.left.set_alpha(alpha);
            self.right.set_alpha(alpha);
        }

        let available = source.len().saturating_sub(self.position).min(self.frame_size);
        let slice = &source.as_slice()[self.position.min(source.len())..][..available];
        for (i, s) in slice.iter().enumerate() {
            self.frame_left[i] = s.left;
            self.frame_right[i] = s.right;
        }
        self.frame_left[available..].fill(0.0);
        self.frame_right[available..].fill(0.0);

        let emitted = self.left.process(&self.frame_left, &mut self.out_left)?;
        self.right.process(&self.frame_right, &mut self.out_right)?;
        let hop = self.left.analysis_hop();
        self.spans
            .push_back((emitted, hop as f64 / self.left.synthesis_hop() as f64));
        self.position += hop;
        Ok(())
    }

    /// Drop the first queued sample
    fn consume(&mut self) {
        self.out_left.shift();
        self.out_right.shift();
        if let Some((count, step)) = self.spans.front_mut() {
            self.playhead += *step;
            *count -= 1;
            if *count == 0 {
                self.spans.pop_front();
            }
        }
    }

    fn ensure_queued(&mut self, source: &StereoBuffer, count: usize) -> DspResult<()> {
        while self.out_left.len() < count {
            self.process_frame(source)?;
        }
        Ok(())
    }

    /// Fill `output` with stretched audio, resampled by `pitch`
    ///
    /// `pitch == 1.0` passes vocoder output straight through.
    pub fn render(
        &mut self,
        source: &StereoBuffer,
        output: &mut [StereoSample],
        pitch: f64,
    ) -> DspResult<()> {
        let step = if pitch.is_finite() && pitch > 0.0 { pitch } else { 1.0 };

        for out in output.iter_mut() {
            self.ensure_queued(source, 2)?;
            let (l0, l1) = (queued(&self.out_left, 0), queued(&self.out_left, 1));
            let (r0, r1) = (queued(&self.out_right, 0), queued(&self.out_right, 1));
            let t = self.frac as f32;
            *out = StereoSample::new(l0 + (l1 - l0) * t, r0 + (r1 - r0) * t);

            self.frac += step;
            while self.frac >= 1.0 {
                self.consume();
                self.frac -= 1.0;
                self.ensure_queued(source, 2)?;
            }
        }
        Ok(())
    }
}

#[inline]
fn queued(ring: &RingBuffer<f32>, index: usize) -> f32 {
    ring.get(index).copied().unwrap_or(0.0)
}
