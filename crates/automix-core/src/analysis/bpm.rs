//! Peak-interval tempo estimation
//!
//! 1. One peak per fixed window (loudest sample across both channels)
//! 2. Keep the loudest N peaks, back in chronological order
//! 3. Each peak pairs with its next few neighbours; every pair's distance
//!    gives a tempo candidate, folded into one octave and rounded
//! 4. Candidates are histogrammed by tempo; the most supported tempo wins,
//!    earlier-created groups first on ties
//! 5. The winning group's latest peak is a reliable beat: it becomes the
//!    mixout anchor, and stepping back whole beats from it finds the first
//!    beat of the track

use crate::config::AnalysisConfig;
use crate::dsp::BandIsolator;
use crate::types::StereoBuffer;

use super::{AnalysisError, AnalysisResult};

/// Loudest sample of one analysis window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    pub position: usize,
    pub amplitude: f32,
}

/// A tempo hypothesis and the peak positions supporting it
#[derive(Debug, Clone, PartialEq)]
pub struct IntervalGroup {
    pub tempo: u32,
    pub count: usize,
    /// First peak of the pair that created the group
    pub seed_position: usize,
    pub positions: Vec<usize>,
}

/// Result of analysing one track
#[derive(Debug, Clone, PartialEq)]
pub struct BeatAnalysis {
    /// Folded tempo of the winning group
    pub bpm: u32,
    /// Seconds from track start to the first usable beat
    pub beat_anchor: f64,
    /// Seconds from track start to the winning group's latest peak
    pub mixout_anchor: f64,
    /// Distance between beats in samples at the analysis rate
    pub beat_interval_samples: f64,
    /// Ranked groups, best first
    pub guesses: Vec<IntervalGroup>,
    /// Retained peaks in chronological order
    pub peaks: Vec<Peak>,
}

impl BeatAnalysis {
    /// Beat interval in seconds
    pub fn beat_interval_secs(&self, sample_rate: u32) -> f64 {
        self.beat_interval_samples / sample_rate as f64
    }
}

/// Fold a raw tempo into `[min_bpm, max_bpm)` by octaves and round it
///
/// Rounding can land exactly on `max_bpm`; that value is folded once more.
/// A range narrower than an octave is widened to `[min_bpm, 2 * min_bpm)`.
pub fn fold_tempo(mut tempo: f64, min_bpm: u32, max_bpm: u32) -> u32 {
    let min_bpm = min_bpm.max(1);
    let max_bpm = max_bpm.max(min_bpm.saturating_mul(2));
    let (min, max) = (min_bpm as f64, max_bpm as f64);
    if !(tempo.is_finite() && tempo > 0.0) {
        return min_bpm;
    }
    while tempo < min {
        tempo *= 2.0;
    }
    while tempo >= max {
        tempo /= 2.0;
    }
    let rounded = tempo.round() as u32;
    if rounded >= max_bpm {
        ((rounded as f64) / 2.0).round() as u32
    } else {
        rounded
    }
}

pub struct BeatAnalyzer {
    config: AnalysisConfig,
}

impl BeatAnalyzer {
    pub fn new(mut config: AnalysisConfig) -> Self {
        config.validate();
        Self { config }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Estimate tempo and anchors for a whole track
    ///
    /// The buffer is band-limited to the kick-drum band first unless
    /// `prefilter` is disabled (input already filtered).
    pub fn analyze(&self, buffer: &StereoBuffer, sample_rate: u32) -> AnalysisResult<BeatAnalysis> {
        if sample_rate == 0 {
            return Err(AnalysisError::SampleRate(sample_rate));
        }

        let peaks = if self.config.prefilter {
            let mut isolator =
                BandIsolator::new(self.config.band_low_hz, self.config.band_high_hz, sample_rate);
            self.find_peaks(&isolator.process_buffer(buffer), sample_rate)
        } else {
            self.find_peaks(buffer, sample_rate)
        };

        let peaks = self.loudest_peaks(peaks);
        let groups = self.group_intervals(&peaks, sample_rate);
        let guesses = self.rank_groups(groups);

        let best = guesses.first().ok_or(AnalysisError::NoBpmGuess)?;
        let sr = sample_rate as f64;
        let beat_interval_samples = sr / (best.tempo as f64 / 60.0);
        let latest = best.positions.iter().copied().max().unwrap_or(best.seed_position);
        let mixout_anchor = latest as f64 / sr;

        let interval_secs = beat_interval_samples / sr;
        let mut anchor = mixout_anchor;
        while anchor - interval_secs >= 0.0 {
            anchor -= interval_secs;
        }
        let beat_anchor = anchor + self.config.anchor_correction;

        log::info!(
            "BeatAnalyzer: {} BPM, beat anchor {:.3}s, mixout anchor {:.3}s ({} peaks, {} guesses)",
            best.tempo,
            beat_anchor,
            mixout_anchor,
            peaks.len(),
            guesses.len()
        );

        Ok(BeatAnalysis {
            bpm: best.tempo,
            beat_anchor,
            mixout_anchor,
            beat_interval_samples,
            guesses,
            peaks,
        })
    }

    /// One peak per window; silent windows produce no peak
    ///
    /// Within a window the first sample reaching the maximum wins. The final
    /// partial window counts as a window.
    pub fn find_peaks(&self, buffer: &StereoBuffer, sample_rate: u32) -> Vec<Peak> {
        let window = ((sample_rate as f64 * self.config.window_seconds).round() as usize).max(1);
        buffer
            .as_slice()
            .chunks(window)
            .enumerate()
            .filter_map(|(index, chunk)| {
                let mut best = Peak { position: 0, amplitude: 0.0 };
                for (offset, sample) in chunk.iter().enumerate() {
                    let amplitude = sample.peak();
                    if amplitude > best.amplitude {
                        best = Peak {
                            position: index * window + offset,
                            amplitude,
                        };
                    }
                }
                (best.amplitude > 0.0).then_some(best)
            })
            .collect()
    }

    /// Keep the loudest peaks, returned in chronological order
    pub fn loudest_peaks(&self, mut peaks: Vec<Peak>) -> Vec<Peak> {
        // Stable: equally loud peaks keep their chronological order
        peaks.sort_by(|a, b| b.amplitude.total_cmp(&a.amplitude));
        peaks.truncate(self.config.loudest_peaks);
        peaks.sort_by_key(|p| p.position);
        peaks
    }

    /// Histogram folded tempo candidates of neighbouring peak pairs
    ///
    /// Groups come back in creation order.
    pub fn group_intervals(&self, peaks: &[Peak], sample_rate: u32) -> Vec<IntervalGroup> {
        let mut groups: Vec<IntervalGroup> = Vec::new();
        let sr = sample_rate as f64;

        for (i, a) in peaks.iter().enumerate() {
            for b in peaks.iter().skip(i + 1).take(self.config.neighbours) {
                let distance = b.position.saturating_sub(a.position);
                if distance == 0 {
                    continue;
                }
                let tempo = fold_tempo(
                    60.0 * sr / distance as f64,
                    self.config.min_bpm,
                    self.config.max_bpm,
                );

                match groups.iter_mut().find(|g| g.tempo == tempo) {
                    Some(group) => {
                        group.count += 1;
                        for position in [a.position, b.position] {
                            if !group.positions.contains(&position) {
                                group.positions.push(position);
                            }
                        }
                    }
                    None => groups.push(IntervalGroup {
                        tempo,
                        count: 1,
                        seed_position: a.position,
                        positions: vec![a.position, b.position],
                    }),
                }
            }
        }

        log::debug!("BeatAnalyzer: {} interval groups from {} peaks", groups.len(), peaks.len());
        groups
    }

    /// Most supported first, creation order on ties, at most `max_guesses`
    pub fn rank_groups(&self, mut groups: Vec<IntervalGroup>) -> Vec<IntervalGroup> {
        groups.sort_by(|a, b| b.count.cmp(&a.count));
        groups.truncate(self.config.max_guesses);
        groups
    }
}
