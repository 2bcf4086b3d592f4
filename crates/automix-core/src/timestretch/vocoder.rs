//! Phase-locked phase vocoder
//!
//! Streams fixed-size frames through STFT analysis, rotates every bin by the
//! phase rotation of the spectral peak that owns its region, resynthesizes and
//! overlap-adds with hop `Hs`. Each [`PhaseVocoder::process`] call consumes
//! one input frame taken `Ha` samples after the previous one and emits `Hs`
//! output samples, so `alpha = Hs / Ha` scales duration.
//!
//! Output is delayed by one synthesis hop: the samples drained by a call
//! belong to frames added by earlier calls.

use std::f32::consts::PI;

use crate::dsp::{DspError, DspResult, RingBuffer, SpectralTransform};

const TWO_PI: f32 = 2.0 * PI;

/// Accumulated window energy below which samples are passed through
/// unnormalized (frame edges at stream start)
const ENERGY_FLOOR: f32 = 1e-3;

/// Exponent of the `sin^β` analysis window
const WINDOW_BETA: i32 = 1;

/// Wrap a phase into `(-π, π]`
#[inline]
pub(crate) fn wrap_phase(phase: f32) -> f32 {
    phase - TWO_PI * ((phase - PI) / TWO_PI).ceil()
}

/// Overlap factor for a stretch ratio: sparser overlap when compressing
pub fn overlap_factor(alpha: f64) -> usize {
    if alpha <= 0.8 {
        2
    } else if alpha <= 1.0 {
        4
    } else {
        5
    }
}

pub struct PhaseVocoder {
    frame_size: usize,
    sample_rate: u32,
    alpha: f64,
    overlap: usize,
    analysis_hop: usize,
    synthesis_hop: usize,

    window: Vec<f32>,
    squared_window: Vec<f32>,
    /// Nominal angular frequency of each bin, in radians per sample
    omega: Vec<f32>,

    fft: SpectralTransform,
    prev_in_phase: Vec<f32>,
    prev_out_phase: Vec<f32>,

    /// Overlap-add accumulators, always exactly `frame_size` long
    signal: RingBuffer<f32>,
    energy: RingBuffer<f32>,

    // Per-frame scratch
    windowed: Vec<f32>,
    instantaneous_advance: Vec<f32>,
    peaks: Vec<usize>,
    rotated_real: Vec<f32>,
    rotated_imag: Vec<f32>,
    synthesized: Vec<f32>,
    drained: Vec<f32>,
}

impl PhaseVocoder {
    pub fn new(frame_size: usize, sample_rate: u32) -> DspResult<Self> {
        let fft = SpectralTransform::new(frame_size)?;
        let bins = fft.bins();

        let window: Vec<f32> = (0..frame_size)
            .map(|i| (PI * i as f32 / frame_size as f32).sin().powi(WINDOW_BETA))
            .collect();
        let squared_window = window.iter().map(|w| w * w).collect();
        let omega = (0..bins)
            .map(|k| TWO_PI * k as f32 / frame_size as f32)
            .collect();

        let mut vocoder = Self {
            frame_size,
            sample_rate,
            alpha: 1.0,
            overlap: 4,
            analysis_hop: frame_size / 4,
            synthesis_hop: frame_size / 4,
            window,
            squared_window,
            omega,
            fft,
            prev_in_phase: vec![0.0; bins],
            prev_out_phase: vec![0.0; bins],
            signal: RingBuffer::filled(frame_size),
            energy: RingBuffer::filled(frame_size),
            windowed: vec![0.0; frame_size],
            instantaneous_advance: vec![0.0; bins],
            peaks: Vec::with_capacity(bins / 2),
            rotated_real: vec![0.0; bins],
            rotated_imag: vec![0.0; bins],
            synthesized: vec![0.0; frame_size],
            drained: Vec::with_capacity(frame_size),
        };
        vocoder.set_alpha(1.0);
        Ok(vocoder)
    }

    /// Change the stretch ratio
    ///
    /// Recomputes both hops; phase history is kept so the stream stays
    /// continuous across ratio changes. The synthesis hop is kept within
    /// `1..=frame_size` so the accumulators never run dry.
    pub fn set_alpha(&mut self, alpha: f64) {
        if !(alpha.is_finite() && alpha > 0.0) {
            log::warn!("PhaseVocoder: ignoring invalid stretch ratio {}", alpha);
            return;
        }
        self.alpha = alpha;
        self.overlap = overlap_factor(alpha);
        self.analysis_hop = ((self.frame_size as f64 / self.overlap as f64).round() as usize).max(1);
        self.synthesis_hop = ((alpha * self.analysis_hop as f64).round() as usize)
            .clamp(1, self.frame_size);
        log::trace!(
            "PhaseVocoder: alpha={:.4} overlap={} Ha={} Hs={}",
            alpha,
            self.overlap,
            self.analysis_hop,
            self.synthesis_hop
        );
    }

    #[inline]
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    #[inline]
    pub fn analysis_hop(&self) -> usize {
        self.analysis_hop
    }

    #[inline]
    pub fn synthesis_hop(&self) -> usize {
        self.synthesis_hop
    }

    #[inline]
    pub fn overlap(&self) -> usize {
        self.overlap
    }

    #[inline]
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Forget phase history and pending overlap-add output (used on seek)
    pub fn reset(&mut self) {
        self.prev_in_phase.fill(0.0);
        self.prev_out_phase.fill(0.0);
        self.signal.fill(0.0);
        self.energy.fill(0.0);
    }

    /// Analyse one input frame and append `Hs` output samples to `output`
    ///
    /// Returns the number of samples appended.
    pub fn process<E: Extend<f32>>(&mut self, frame: &[f32], output: &mut E) -> DspResult<usize> {
        if frame.len() != self.frame_size {
            return Err(DspError::InvalidFrameSize {
                expected: self.frame_size,
                found: frame.len(),
            });
        }

        for ((dst, &x), &w) in self.windowed.iter_mut().zip(frame).zip(&self.window) {
            *dst = x * w;
        }
        self.fft.forward(&self.windowed)?;

        self.lock_phases();

        self.fft
            .inverse(&self.rotated_real, &self.rotated_imag, &mut self.synthesized)?;
        for (sample, &w) in self.synthesized.iter_mut().zip(&self.window) {
            *sample *= w;
        }

        Ok(self.overlap_add(output))
    }

    /// Phase-locked rotation of the current spectrum into `rotated_*`
    fn lock_phases(&mut self) {
        let bins = self.fft.bins();
        let ha = self.analysis_hop as f32;
        let hs = self.synthesis_hop as f32;
        let phase = self.fft.phase();
        let magnitude = self.fft.magnitude();

        for k in 0..bins {
            let expected = self.omega[k] * ha;
            let heterodyned = wrap_phase(phase[k] - self.prev_in_phase[k] - expected);
            self.instantaneous_advance[k] = (self.omega[k] + heterodyned / ha) * hs;
        }

        self.peaks.clear();
        let neighbour = |i: isize| -> f32 {
            if i < 0 || i as usize >= bins {
                0.0
            } else {
                magnitude[i as usize]
            }
        };
        for k in 0..bins {
            let i = k as isize;
            let around = neighbour(i - 2)
                .max(neighbour(i - 1))
                .max(neighbour(i + 1))
                .max(neighbour(i + 2));
            if magnitude[k] > around {
                self.peaks.push(k);
            }
        }
        if self.peaks.is_empty() {
            self.peaks.push(0);
        }

        let real = self.fft.real();
        let imag = self.fft.imag();
        for (j, &peak) in self.peaks.iter().enumerate() {
            let start = if j == 0 { 0 } else { (self.peaks[j - 1] + peak + 1) / 2 };
            let end = match self.peaks.get(j + 1) {
                Some(&next) => (peak + next + 1) / 2,
                None => bins,
            };

            let theta = self.prev_out_phase[peak] + self.instantaneous_advance[peak] - phase[peak];
            let (sin, cos) = theta.sin_cos();
            for k in start..end {
                self.rotated_real[k] = real[k] * cos - imag[k] * sin;
                self.rotated_imag[k] = real[k] * sin + imag[k] * cos;
                self.prev_out_phase[k] = wrap_phase(phase[k] + theta);
            }
        }

        self.prev_in_phase.copy_from_slice(phase);
    }

    /// Drain one synthesis hop, then add the new frame at the front
    fn overlap_add<E: Extend<f32>>(&mut self, output: &mut E) -> usize {
        let hop = self.synthesis_hop;
        self.drained.clear();
        for _ in 0..hop {
            let sample = self.signal.shift().unwrap_or(0.0);
            let energy = self.energy.shift().unwrap_or(0.0);
            let norm = if energy < ENERGY_FLOOR { 1.0 } else { energy };
            self.drained.push(sample / norm);
            self.signal.push(0.0);
            self.energy.push(0.0);
        }

        for i in 0..self.frame_size {
            if let Some(acc) = self.signal.get_mut(i) {
                *acc += self.synthesized[i];
            }
            if let Some(acc) = self.energy.get_mut(i) {
                *acc += self.squared_window[i];
            }
        }

        output.extend(self.drained.iter().copied());
        hop
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(len: usize, freq: f32, sample_rate: u32) -> Vec<f32> {
        (0..len)
            .map(|i| 0.5 * (TWO_PI * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    #[test]
    fn test_wrap_phase_range() {
        assert!((wrap_phase(PI) - PI).abs() < 1e-6);
        assert!((wrap_phase(-PI) - PI).abs() < 1e-6);
        assert!((wrap_phase(3.0 * PI) - PI).abs() < 1e-5);
        assert!((wrap_phase(0.5) - 0.5).abs() < 1e-6);
        assert!((wrap_phase(-7.0) - (-7.0 + TWO_PI)).abs() < 1e-5);
    }

    #[test]
    fn test_hops_follow_overlap_factor() {
        let mut pv = PhaseVocoder::new(2048, 44100).unwrap();
        pv.set_alpha(0.5);
        assert_eq!((pv.overlap(), pv.analysis_hop(), pv.synthesis_hop()), (2, 1024, 512));
        pv.set_alpha(1.0);
        assert_eq!((pv.overlap(), pv.analysis_hop(), pv.synthesis_hop()), (4, 512, 512));
        pv.set_alpha(1.5);
        assert_eq!((pv.overlap(), pv.analysis_hop(), pv.synthesis_hop()), (5, 410, 615));
    }

    #[test]
    fn test_invalid_frame_size() {
        assert!(matches!(PhaseVocoder::new(1000, 44100), Err(DspError::NotPowerOfTwo(1000))));
        let mut pv = PhaseVocoder::new(256, 44100).unwrap();
        let mut out = Vec::new();
        assert_eq!(
            pv.process(&[0.0; 128], &mut out),
            Err(DspError::InvalidFrameSize { expected: 256, found: 128 })
        );
    }

    #[test]
    fn test_identity_reproduces_sine() {
        let sr = 44100;
        let n = 1024;
        let mut pv = PhaseVocoder::new(n, sr).unwrap();
        let ha = pv.analysis_hop();
        let hs = pv.synthesis_hop();
        assert_eq!(ha, hs);

        let frames = 40;
        let input = sine(frames * ha + n, 441.0, sr);
        let mut output = Vec::new();
        for k in 0..frames {
            let emitted = pv.process(&input[k * ha..k * ha + n], &mut output).unwrap();
            assert_eq!(emitted, hs);
        }
        assert_eq!(output.len(), frames * hs);

        // Output lags input by one synthesis hop once the overlap is complete
        let mut max_err = 0.0f32;
        for m in (n + hs)..output.len() {
            max_err = max_err.max((output[m] - input[m - hs]).abs());
        }
        assert!(max_err < 1e-3, "max error {}", max_err);
    }

    #[test]
    fn test_silence_has_no_peaks_and_stays_silent() {
        let mut pv = PhaseVocoder::new(512, 44100).unwrap();
        let mut out = Vec::new();
        for _ in 0..6 {
            pv.process(&[0.0; 512], &mut out).unwrap();
        }
        assert!(out.iter().all(|s| s.abs() < 1e-9));
    }

    #[test]
    fn test_stretch_emits_synthesis_hop_per_frame() {
        let sr = 44100;
        let n = 1024;
        let mut pv = PhaseVocoder::new(n, sr).unwrap();
        pv.set_alpha(1.25);
        let ha = pv.analysis_hop();
        let input = sine(30 * ha + n, 220.0, sr);
        let mut output = Vec::new();
        for k in 0..30 {
            pv.process(&input[k * ha..k * ha + n], &mut output).unwrap();
        }
        assert_eq!(output.len(), 30 * pv.synthesis_hop());

        // Stretched steady sine keeps its level
        let tail = &output[2 * n..];
        let peak = tail.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(peak > 0.4 && peak < 0.6, "peak {}", peak);
    }
}
