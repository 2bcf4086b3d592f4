//! Mixer and analysis settings

use serde::{Deserialize, Serialize};

/// Vocoder frame size bounds
const MIN_FRAME_SIZE: usize = 64;
const MAX_FRAME_SIZE: usize = 1 << 16;

/// Crossfade and playback configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixerConfig {
    /// Crossfade length in seconds, quantized to whole beats per track
    /// Default: 20.0
    pub mix_length: f64,

    /// Seconds over which a tempo-matched track drifts back to its native
    /// tempo, starting once the crossfade is over
    /// Default: 60.0
    pub playback_rate_tween: f64,

    /// Seconds before a track's end at which the next track must be ready,
    /// on top of the crossfade itself
    /// Default: 60.0
    pub load_ahead: f64,

    /// Master output gain applied to the mix bus
    /// Default: 1.0
    pub volume: f32,

    /// Match the incoming track's tempo to the outgoing one during the
    /// crossfade
    /// Default: true
    pub tempo_match: bool,

    /// Phase vocoder frame size (power of two)
    /// Default: 2048
    pub frame_size: usize,

    /// Render quantum in samples; scheduled events fire on block boundaries
    /// Default: 512
    pub block_size: usize,

    pub analysis: AnalysisConfig,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            mix_length: 20.0,
            playback_rate_tween: 60.0,
            load_ahead: 60.0,
            volume: 1.0,
            tempo_match: true,
            frame_size: 2048,
            block_size: 512,
            analysis: AnalysisConfig::default(),
        }
    }
}

/// Beat analyzer tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Width of a peak-picking window in seconds
    pub window_seconds: f64,
    /// How many of the loudest window peaks take part in interval voting
    pub loudest_peaks: usize,
    /// How many following peaks each peak is paired with
    pub neighbours: usize,
    /// Tempo octave, `[min_bpm, max_bpm)`
    pub min_bpm: u32,
    pub max_bpm: u32,
    /// Ranked tempo groups kept in the result
    pub max_guesses: usize,
    /// Added to the beat anchor; the window boundaries land one tick early
    pub anchor_correction: f64,
    /// Band-limit the track to the kick band before picking peaks
    pub prefilter: bool,
    pub band_low_hz: f32,
    pub band_high_hz: f32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            window_seconds: 0.5,
            loudest_peaks: 60,
            neighbours: 9,
            min_bpm: 90,
            max_bpm: 180,
            max_guesses: 5,
            anchor_correction: 0.01,
            prefilter: true,
            band_low_hz: 100.0,
            band_high_hz: 150.0,
        }
    }
}

impl MixerConfig {
    /// Repair values the engine cannot run with
    ///
    /// Negative or non-finite times become 0, the frame size is rounded up
    /// to a power of two and the analysis settings are validated as well.
    pub fn validate(&mut self) {
        for (name, value, default) in [
            ("mix_length", &mut self.mix_length, 20.0),
            ("playback_rate_tween", &mut self.playback_rate_tween, 60.0),
            ("load_ahead", &mut self.load_ahead, 60.0),
        ] {
            if !value.is_finite() {
                log::warn!("MixerConfig: {} is not finite, using {}", name, default);
                *value = default;
            } else if *value < 0.0 {
                log::warn!("MixerConfig: {} = {} is negative, using 0", name, value);
                *value = 0.0;
            }
        }
        if !(self.volume.is_finite() && self.volume >= 0.0) {
            log::warn!("MixerConfig: invalid volume {}, using 1.0", self.volume);
            self.volume = 1.0;
        }

        let frame_size = self.frame_size.clamp(MIN_FRAME_SIZE, MAX_FRAME_SIZE).next_power_of_two();
        if frame_size != self.frame_size {
            log::warn!("MixerConfig: frame_size {} adjusted to {}", self.frame_size, frame_size);
            self.frame_size = frame_size;
        }
        self.block_size = self.block_size.max(1);

        self.analysis.validate();
    }
}

impl AnalysisConfig {
    /// Repair the analysis settings
    ///
    /// The tempo range has to start above zero and span at least one octave,
    /// otherwise folding a tempo into it is impossible.
    pub fn validate(&mut self) {
        if !(self.window_seconds.is_finite() && self.window_seconds > 0.0) {
            log::warn!("AnalysisConfig: invalid window_seconds {}, using 0.5", self.window_seconds);
            self.window_seconds = 0.5;
        }
        self.loudest_peaks = self.loudest_peaks.max(2);
        self.neighbours = self.neighbours.max(1);
        self.max_guesses = self.max_guesses.max(1);

        self.min_bpm = self.min_bpm.max(1);
        let octave = self.min_bpm.saturating_mul(2);
        if self.max_bpm < octave {
            log::warn!(
                "AnalysisConfig: tempo range [{}, {}) is narrower than an octave, widening to [{}, {})",
                self.min_bpm,
                self.max_bpm,
                self.min_bpm,
                octave
            );
            self.max_bpm = octave;
        }

        if !(self.band_low_hz > 0.0 && self.band_high_hz > self.band_low_hz) {
            log::warn!(
                "AnalysisConfig: invalid kick band {}..{} Hz, using 100..150 Hz",
                self.band_low_hz,
                self.band_high_hz
            );
            self.band_low_hz = 100.0;
            self.band_high_hz = 150.0;
        }
    }
}
