//! Deck - one track's journey from queue entry to fade-out
//!
//! A deck decodes and analyses its track, starts playing so that its beat
//! anchor lands on the mixin point it was given, and publishes a
//! [`Schedule`] for the deck that follows it. Everything time-based is
//! expressed on the shared mixer timeline: gain and tempo as [`AudioParam`]
//! curves, lifecycle steps as tasks registered with the [`Clock`].
//!
//! Decks never talk to the mixer directly. They queue [`DeckEvent`]s which
//! the mixer drains after every operation or fired task.

use crate::analysis::{AnalysisError, BeatAnalyzer};
use crate::audio_file::{resample_buffer, AudioSource};
use crate::clock::{Clock, DeckAction, ScheduledTask, TimerHandle};
use crate::config::MixerConfig;
use crate::timestretch::StretchPlayer;
use crate::types::{StereoBuffer, StereoSample, TrackId};

use super::automation::AudioParam;
use super::schedule::{plan_schedule, PlanInput, Schedule};
use super::track::{Track, TrackAnalysis};
use super::EngineResult;

/// Gain used instead of zero at fade endpoints
pub const NEAR_SILENT_GAIN: f64 = 0.0001;

/// Detune target of the exponential ramp back to native pitch
const DETUNE_REST: f64 = 0.0001;

/// Below these the vocoder is bypassed
const RATE_EPSILON: f64 = 1e-6;
const DETUNE_EPSILON_CENTS: f64 = 1e-3;

/// Vocoder drift beyond which playback jumps back onto the timeline
const RESYNC_SECS: f64 = 0.05;

/// Largest relative speed correction applied to pull the vocoder back
const MAX_STEER: f64 = 0.005;

/// Deck lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeckState {
    #[default]
    Idle,
    Loading,
    Analyzing,
    /// Start registered with the clock, transport not running yet
    Scheduled,
    Playing,
    Paused,
    /// Fade-out reached, waiting for the hard stop
    MixingOut,
    Ended,
}

/// Lifecycle notifications drained by the mixer
#[derive(Debug, Clone, PartialEq)]
pub enum DeckEvent {
    Loaded { duration: f64 },
    LoadFailed(String),
    /// `None` when no tempo could be estimated
    Analyzed(Option<TrackAnalysis>),
    Playing,
    Paused,
    Mixin,
    Mixout,
    LoadNext(Schedule),
    Ended,
}

/// Pitch correction that keeps a track at its native key while it plays at
/// `rate`
#[inline]
pub fn detune_for_rate(rate: f64) -> f64 {
    -1200.0 * rate.log2()
}

pub struct Deck {
    track: Track,
    state: DeckState,
    sample_rate: u32,
    config: MixerConfig,
    /// Schedule of the deck this one follows
    seed: Option<Schedule>,

    /// Released when the deck ends
    audio: Option<StereoBuffer>,
    duration: f64,

    // Transport
    playing: bool,
    started: bool,
    resumable: bool,
    /// Timeline time the transport last (re)started
    start_time: f64,
    /// Track seconds at `start_time`, or the paused position
    offset: f64,

    gain: AudioParam,
    playback_rate: AudioParam,
    detune: AudioParam,
    /// The initial tempo-match ramp has been laid out
    tempo_planned: bool,

    timers: Vec<TimerHandle>,
    schedule: Option<Schedule>,
    load_next_fired: bool,

    stretch: Option<StretchPlayer>,
    stretch_active: bool,
    output: StereoBuffer,

    events: Vec<DeckEvent>,
}

impl Deck {
    pub fn new(track: Track, sample_rate: u32, config: MixerConfig, seed: Option<Schedule>) -> Self {
        Self {
            track,
            state: DeckState::Idle,
            sample_rate,
            config,
            seed,
            audio: None,
            duration: 0.0,
            playing: false,
            started: false,
            resumable: false,
            start_time: 0.0,
            offset: 0.0,
            gain: AudioParam::new(1.0),
            playback_rate: AudioParam::new(1.0),
            detune: AudioParam::new(0.0),
            tempo_planned: false,
            timers: Vec::new(),
            schedule: None,
            load_next_fired: false,
            stretch: None,
            stretch_active: false,
            output: StereoBuffer::default(),
            events: Vec::new(),
        }
    }

    pub fn id(&self) -> TrackId {
        self.track.id
    }

    pub fn track(&self) -> &Track {
        &self.track
    }

    pub fn state(&self) -> DeckState {
        self.state
    }

    pub fn seed(&self) -> Option<Schedule> {
        self.seed
    }

    /// Published schedule of the current play attempt
    pub fn schedule(&self) -> Option<Schedule> {
        self.schedule
    }

    /// Track length in seconds (0 until loaded)
    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_resumable(&self) -> bool {
        self.resumable
    }

    /// False until the transport ran at least once
    pub fn has_started(&self) -> bool {
        self.started
    }

    pub fn load_next_fired(&self) -> bool {
        self.load_next_fired
    }

    pub fn gain(&self) -> &AudioParam {
        &self.gain
    }

    pub fn playback_rate(&self) -> &AudioParam {
        &self.playback_rate
    }

    pub fn detune(&self) -> &AudioParam {
        &self.detune
    }

    /// Last rendered block
    pub fn output(&self) -> &StereoBuffer {
        &self.output
    }

    pub fn take_events(&mut self) -> Vec<DeckEvent> {
        std::mem::take(&mut self.events)
    }

    /// Tempo to match while mixing in
    pub fn set_bpm(&mut self, bpm: u32) {
        self.track.target_bpm = Some(bpm);
    }

    pub fn reset_bpm(&mut self) {
        self.track.target_bpm = None;
    }

    /// Track position in seconds at timeline time `now`
    ///
    /// While playing this is the paused offset plus the track time that the
    /// playback-rate curve has covered since the transport started.
    pub fn current_time(&self, now: f64) -> f64 {
        if self.playing {
            (self.offset + self.playback_rate.integrate(self.start_time, now)).min(self.duration)
        } else {
            self.offset
        }
    }

    fn set_state(&mut self, state: DeckState) {
        if self.state != state {
            log::debug!("Deck {}: {:?} -> {:?}", self.track.id, self.state, state);
            self.state = state;
        }
    }

    /// Initial playback rate for tempo matching
    fn tempo_ratio(&self) -> f64 {
        if !self.config.tempo_match {
            return 1.0;
        }
        match (self.track.target_bpm, self.track.bpm()) {
            (Some(target), Some(native)) if target != native && native > 0 => {
                target as f64 / native as f64
            }
            _ => 1.0,
        }
    }

    /// Decode and analyse the track
    ///
    /// Failures are reported as [`DeckEvent::LoadFailed`] and leave the deck
    /// `Idle`. A track without a usable tempo still loads, in unknown-tempo
    /// mode.
    pub fn load(&mut self, source: &dyn AudioSource) {
        self.set_state(DeckState::Loading);
        log::info!("Deck {}: loading {}", self.track.id, self.track.source.locator());

        let decoded = match source.decode(&self.track.source, self.sample_rate) {
            Ok(decoded) => decoded,
            Err(e) => return self.fail_load(e.to_string()),
        };
        // Sources are free to hand back their native rate
        let audio = if decoded.sample_rate == self.sample_rate {
            decoded.samples
        } else {
            match resample_buffer(&decoded.samples, decoded.sample_rate, self.sample_rate) {
                Ok(samples) => samples,
                Err(e) => return self.fail_load(e.to_string()),
            }
        };
        if audio.is_empty() {
            return self.fail_load(format!("{} contains no audio", self.track.source.locator()));
        }

        self.duration = audio.duration_secs(self.sample_rate);
        self.events.push(DeckEvent::Loaded { duration: self.duration });
        self.set_state(DeckState::Analyzing);

        let analyzer = BeatAnalyzer::new(self.config.analysis.clone());
        self.track.analysis = match analyzer.analyze(&audio, self.sample_rate) {
            Ok(analysis) => Some(TrackAnalysis::from(&analysis)),
            Err(AnalysisError::NoBpmGuess) => {
                log::warn!("Deck {}: no tempo found, playing with unknown tempo", self.track.id);
                None
            }
            Err(e) => {
                log::warn!("Deck {}: analysis failed ({}), playing with unknown tempo", self.track.id, e);
                None
            }
        };
        self.audio = Some(audio);
        self.events.push(DeckEvent::Analyzed(self.track.analysis));
    }

    fn fail_load(&mut self, reason: String) {
        log::warn!("Deck {}: load failed: {}", self.track.id, reason);
        self.set_state(DeckState::Idle);
        self.events.push(DeckEvent::LoadFailed(reason));
    }

    /// Play so that the beat anchor lands on `target`
    ///
    /// The gain starts near silence and ramps to unity over half the mix
    /// length from `target`. If the computed start is already in the past
    /// the transport starts now, part-way into the track, keeping the beat
    /// grid. A track with unknown tempo mixes in immediately.
    pub fn mixin_at(&mut self, clock: &mut dyn Clock, target: f64) {
        if self.audio.is_none() || self.state == DeckState::Ended {
            return;
        }
        let now = clock.now();
        self.cancel_timers(clock);
        self.resumable = false;

        let rate = self.tempo_ratio();
        let (start, target) = match self.track.analysis {
            Some(analysis) => (target - analysis.beat_anchor / rate, target),
            None => (now, now),
        };

        self.gain.reset(NEAR_SILENT_GAIN);
        self.gain.set_value_at_time(NEAR_SILENT_GAIN, start.min(target));
        self.gain.set_value_at_time(NEAR_SILENT_GAIN, target);
        self.gain
            .linear_ramp_to_value_at_time(1.0, target + self.config.mix_length / 2.0);

        log::info!(
            "Deck {}: mixin at {:.3}s, transport start {:.3}s (rate {:.4})",
            self.track.id,
            target,
            start,
            rate
        );

        if start <= now {
            let offset = ((now - start) * rate).min(self.duration);
            self.start_transport(clock, now, offset);
        } else {
            self.offset = 0.0;
            let handle = clock.schedule(
                start,
                ScheduledTask {
                    deck: self.track.id,
                    action: DeckAction::Start,
                },
            );
            self.timers.push(handle);
            self.set_state(DeckState::Scheduled);
        }
    }

    fn start_transport(&mut self, clock: &mut dyn Clock, at: f64, offset: f64) {
        self.playing = true;
        self.started = true;
        self.resumable = false;
        self.start_time = at;
        self.offset = offset;
        self.stretch_active = false;
        self.set_state(DeckState::Playing);
        self.events.push(DeckEvent::Playing);
        self.schedule_events(clock);
    }

    /// Lay out the tempo curve, compute the schedule and register the
    /// deck's automation and clock tasks
    ///
    /// Registration order is gain-mixin, gain-mixout, tempo ramp, load-next.
    fn schedule_events(&mut self, clock: &mut dyn Clock) {
        self.cancel_timers(clock);
        let (rate, detune) = self.plan_tempo_ramp();

        let plan = plan_schedule(
            &PlanInput {
                now: clock.now(),
                start_time: self.start_time,
                offset: self.offset,
                duration: self.duration,
                analysis: self.track.analysis,
                sample_rate: self.sample_rate,
                mix_length: self.config.mix_length,
                load_ahead: self.config.load_ahead,
            },
            &rate,
        );
        log::info!(
            "Deck {}: mixin {:.3}s, mixout {:.3}s, load next {:.3}s, end {:.3}s",
            self.track.id,
            plan.mixin_time,
            plan.mixout_time,
            plan.load_next_time,
            plan.end_time
        );

        // Gain-mixin: whatever level the fade-in reached is held from here
        self.gain.cancel_and_hold(plan.mixin_time);
        self.register(clock, plan.mixin_time, DeckAction::Mixin);

        // Gain-mixout
        self.gain
            .linear_ramp_to_value_at_time(NEAR_SILENT_GAIN, plan.mixout_time);
        self.register(clock, plan.mixout_time, DeckAction::Mixout);
        self.register(clock, plan.stop_time, DeckAction::Stop);

        self.playback_rate = rate;
        self.detune = detune;

        if !self.load_next_fired {
            self.register(clock, plan.load_next_time, DeckAction::LoadNext);
        }
        self.register(clock, plan.end_time, DeckAction::TransportEnd);

        self.schedule = Some(plan);
    }

    /// Playback-rate and detune curves from the current transport start
    ///
    /// The first play holds the tempo-matched rate for the whole crossfade
    /// before easing back. After a resume the held rate eases back right away.
    fn plan_tempo_ramp(&mut self) -> (AudioParam, AudioParam) {
        let mut rate = AudioParam::new(1.0);
        let mut detune = AudioParam::new(0.0);

        let (initial, hold_until) = if self.tempo_planned {
            (self.playback_rate.value_at(self.start_time), self.start_time)
        } else {
            self.tempo_planned = true;
            (self.tempo_ratio(), self.start_time + self.config.mix_length)
        };
        if (initial - 1.0).abs() <= RATE_EPSILON || !(initial > 0.0) {
            return (rate, detune);
        }

        let ramp_end = hold_until + self.config.playback_rate_tween;
        rate.set_value_at_time(initial, self.start_time);
        rate.set_value_at_time(initial, hold_until);
        rate.linear_ramp_to_value_at_time(1.0, ramp_end);

        let cents = detune_for_rate(initial);
        detune.set_value_at_time(cents, self.start_time);
        detune.set_value_at_time(cents, hold_until);
        detune.exponential_ramp_to_value_at_time(DETUNE_REST.copysign(cents), ramp_end);

        log::debug!(
            "Deck {}: tempo ramp {:.4} -> 1.0 from {:.3}s to {:.3}s ({:+.1} cents)",
            self.track.id,
            initial,
            hold_until,
            ramp_end,
            cents
        );
        (rate, detune)
    }

    fn register(&mut self, clock: &mut dyn Clock, at: f64, action: DeckAction) {
        let handle = clock.schedule(
            at,
            ScheduledTask {
                deck: self.track.id,
                action,
            },
        );
        self.timers.push(handle);
    }

    fn cancel_timers(&mut self, clock: &mut dyn Clock) {
        for handle in self.timers.drain(..) {
            clock.cancel(handle);
        }
    }

    /// Run a task the clock fired for this deck at `at`
    pub fn handle(&mut self, clock: &mut dyn Clock, action: DeckAction, at: f64) {
        match action {
            DeckAction::Start => {
                if self.state == DeckState::Scheduled {
                    let offset = self.offset;
                    self.start_transport(clock, at, offset);
                }
            }
            DeckAction::Mixin => {
                if self.playing {
                    self.events.push(DeckEvent::Mixin);
                }
            }
            DeckAction::Mixout => {
                if self.playing {
                    self.set_state(DeckState::MixingOut);
                    self.events.push(DeckEvent::Mixout);
                }
            }
            DeckAction::LoadNext => {
                self.load_next_fired = true;
                if let Some(schedule) = self.schedule {
                    self.events.push(DeckEvent::LoadNext(schedule));
                }
            }
            DeckAction::Stop | DeckAction::TransportEnd => self.finish(clock, at),
        }
    }

    /// Halt the transport at `when`
    ///
    /// Every pending clock task and every future automation point of the
    /// deck is dropped together. A non-terminal pause leaves the deck
    /// resumable; a terminal one ends it.
    pub fn pause(&mut self, clock: &mut dyn Clock, when: f64, terminal: bool) {
        if self.state == DeckState::Ended {
            return;
        }
        if self.playing {
            self.offset = self.current_time(when);
        }
        self.playing = false;
        self.cancel_timers(clock);
        self.gain.cancel_and_hold(when);
        self.playback_rate.cancel_and_hold(when);
        self.detune.cancel_and_hold(when);

        if terminal {
            self.finish(clock, when);
            return;
        }
        if matches!(
            self.state,
            DeckState::Scheduled | DeckState::Playing | DeckState::MixingOut
        ) {
            self.resumable = true;
            self.set_state(DeckState::Paused);
            self.events.push(DeckEvent::Paused);
        }
    }

    pub fn stop(&mut self, clock: &mut dyn Clock, when: f64) {
        self.pause(clock, when, true);
    }

    /// Continue a paused deck from its offset at full gain
    pub fn resume(&mut self, clock: &mut dyn Clock) -> bool {
        if self.state != DeckState::Paused || !self.resumable {
            return false;
        }
        let now = clock.now();
        self.gain.reset(1.0);
        let offset = self.offset;
        self.start_transport(clock, now, offset);
        true
    }

    /// Move the playback position to `position` seconds
    ///
    /// Returns false for a deck whose transport never ran; its start is
    /// beat-aligned to the offset it was scheduled with.
    pub fn seek(&mut self, clock: &mut dyn Clock, position: f64) -> bool {
        if !self.started || self.state == DeckState::Ended {
            log::warn!("Deck {}: seek ignored in state {:?}", self.track.id, self.state);
            return false;
        }
        let was_playing = self.playing;
        if was_playing {
            let now = clock.now();
            self.pause(clock, now, false);
        }
        self.offset = position.clamp(0.0, self.duration);
        self.stretch_active = false;
        log::debug!("Deck {}: seek to {:.3}s", self.track.id, self.offset);
        if was_playing {
            self.resume(clock);
        }
        true
    }

    fn finish(&mut self, clock: &mut dyn Clock, at: f64) {
        if self.state == DeckState::Ended {
            return;
        }
        if self.playing {
            self.offset = self.current_time(at);
        }
        self.playing = false;
        self.resumable = false;
        self.cancel_timers(clock);
        self.gain.reset(0.0);
        self.audio = None;
        self.stretch = None;
        self.set_state(DeckState::Ended);
        log::info!("Deck {}: ended at {:.3}s (track {:.3}s)", self.track.id, at, self.offset);
        self.events.push(DeckEvent::Ended);
    }

    /// Render `frames` samples starting at timeline time `now` into
    /// [`Deck::output`]
    ///
    /// Rate and detune are taken at the block start; gain is applied per
    /// sample. Any tempo or detune away from neutral goes through the
    /// vocoder, which plays at `rate * 2^(detune / 1200)` with a stretch
    /// ratio that restores the rate.
    pub fn render(&mut self, now: f64, frames: usize) -> EngineResult<()> {
        self.output.resize(frames);
        self.output.fill_silence();
        let Some(audio) = self.audio.as_ref() else {
            return Ok(());
        };
        if !self.playing || now < self.start_time {
            return Ok(());
        }

        let sr = self.sample_rate as f64;
        let rate = self.playback_rate.value_at(now);
        let detune = self.detune.value_at(now);
        let expected = self.current_time(now) * sr;
        let position = expected.round() as usize;

        if (rate - 1.0).abs() > RATE_EPSILON || detune.abs() > DETUNE_EPSILON_CENTS {
            let pitch = rate * 2f64.powf(detune / 1200.0);
            if self.stretch.is_none() {
                self.stretch = Some(StretchPlayer::new(self.config.frame_size, self.sample_rate)?);
            }
            let Some(stretch) = self.stretch.as_mut() else {
                return Ok(());
            };
            stretch.set_alpha(pitch / rate);

            // Whole-sample hops make the vocoder run slightly off the rate
            // curve; steer it back within the block, resync on large jumps
            let mut steer = 1.0;
            if !self.stretch_active {
                stretch.set_position(audio, position)?;
                self.stretch_active = true;
            } else {
                let drift = expected - stretch.playhead();
                if drift.abs() > RESYNC_SECS * sr {
                    log::debug!(
                        "Deck {}: vocoder {:.1}ms off the timeline, resyncing",
                        self.track.id,
                        drift / sr * 1000.0
                    );
                    stretch.set_position(audio, position)?;
                } else if frames > 0 {
                    steer += (drift / (frames as f64 * rate)).clamp(-MAX_STEER, MAX_STEER);
                }
            }
            stretch.render(audio, self.output.as_mut_slice(), pitch * steer)?;
        } else {
            self.stretch_active = false;
            let source = audio.as_slice();
            for (i, out) in self.output.as_mut_slice().iter_mut().enumerate() {
                *out = source.get(position + i).copied().unwrap_or_else(StereoSample::silence);
            }
        }

        for (i, out) in self.output.as_mut_slice().iter_mut().enumerate() {
            let gain = self.gain.value_at(now + i as f64 / sr) as f32;
            *out = *out * gain;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_file::{DecodeError, DecodedAudio, TrackSource};
    use crate::clock::TimelineClock;

    const SR: u32 = 8000;

    /// Decodes every locator to the same buffer
    struct FixedSource(Option<StereoBuffer>);

    impl AudioSource for FixedSource {
        fn decode(&self, source: &TrackSource, _rate: u32) -> Result<DecodedAudio, DecodeError> {
            match &self.0 {
                Some(buffer) => Ok(DecodedAudio::new(buffer.clone(), SR)),
                None => Err(DecodeError::UnsupportedSource(source.locator())),
            }
        }
    }

    /// 120 BPM bursts, first beat at 0.25s
    fn clicks(seconds: f64) -> StereoBuffer {
        let len = (seconds * SR as f64) as usize;
        let interval = SR as usize / 2;
        let mut mono = vec![0.0f32; len];
        let mut start = SR as usize / 4;
        while start < len {
            for (k, sample) in mono[start..].iter_mut().take(400).enumerate() {
                let t = k as f32 / SR as f32;
                *sample = (2.0 * std::f32::consts::PI * 120.0 * t).sin() * (-t * 40.0).exp();
            }
            start += interval;
        }
        StereoBuffer::from_mono(&mono)
    }

    fn config() -> MixerConfig {
        let mut config = MixerConfig::default();
        config.frame_size = 512;
        config
    }

    fn loaded_deck(seconds: f64) -> Deck {
        let track = Track::new(TrackId(1), TrackSource::Url("mem://a".to_string()));
        let mut deck = Deck::new(track, SR, config(), None);
        deck.load(&FixedSource(Some(clicks(seconds))));
        deck
    }

    #[test]
    fn test_load_analyses_and_reports() {
        let mut deck = loaded_deck(60.0);
        let events = deck.take_events();
        assert!(matches!(events[0], DeckEvent::Loaded { .. }));
        match &events[1] {
            DeckEvent::Analyzed(Some(analysis)) => assert_eq!(analysis.bpm, 120),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(deck.state(), DeckState::Analyzing);
        assert!((deck.duration() - 60.0).abs() < 1e-3);
    }

    #[test]
    fn test_load_failure_returns_to_idle() {
        let track = Track::new(TrackId(4), TrackSource::Url("mem://missing".to_string()));
        let mut deck = Deck::new(track, SR, config(), None);
        deck.load(&FixedSource(None));
        assert_eq!(deck.state(), DeckState::Idle);
        assert!(matches!(deck.take_events()[..], [DeckEvent::LoadFailed(_)]));
    }

    #[test]
    fn test_future_mixin_waits_for_clock() {
        let mut clock = TimelineClock::new();
        let mut deck = loaded_deck(60.0);
        deck.mixin_at(&mut clock, 10.0);
        assert_eq!(deck.state(), DeckState::Scheduled);
        assert_eq!(clock.pending_for(deck.id()), 1);

        let (at, task) = clock.pop_due(20.0).unwrap();
        let anchor = deck.track().analysis.unwrap().beat_anchor;
        assert!((at - (10.0 - anchor)).abs() < 1e-9);
        deck.handle(&mut clock, task.action, at);
        assert_eq!(deck.state(), DeckState::Playing);
        assert!(deck.schedule().is_some());
        // Near silence until the mixin point, then halfway up the fade-in
        assert!((deck.gain().value_at(9.0) - NEAR_SILENT_GAIN).abs() < 1e-12);
        assert!((deck.gain().value_at(15.0) - 0.50005).abs() < 1e-9);
        let schedule = deck.schedule().unwrap();
        assert!((deck.gain().value_at(schedule.mixout_time) - NEAR_SILENT_GAIN).abs() < 1e-9);
    }

    #[test]
    fn test_late_start_keeps_beat_grid() {
        let mut clock = TimelineClock::new();
        clock.advance_to(5.0);
        let mut deck = loaded_deck(60.0);
        deck.mixin_at(&mut clock, 3.0);
        assert!(deck.is_playing());
        let anchor = deck.track().analysis.unwrap().beat_anchor;
        // The anchor played at 3s, so 5s is two seconds past it
        assert!((deck.current_time(5.0) - (anchor + 2.0)).abs() < 1e-9);
    }

    #[test]
    fn test_tempo_match_ramps_back_to_native() {
        let mut clock = TimelineClock::new();
        let mut deck = loaded_deck(200.0);
        deck.set_bpm(126);
        deck.mixin_at(&mut clock, 0.0);

        let ratio = 126.0 / 120.0;
        assert!((deck.playback_rate().value_at(1.0) - ratio).abs() < 1e-9);
        assert!((deck.playback_rate().value_at(20.0) - ratio).abs() < 1e-9);
        assert!((deck.playback_rate().value_at(50.0) - (ratio + (1.0 - ratio) * 0.5)).abs() < 1e-9);
        assert!((deck.playback_rate().value_at(100.0) - 1.0).abs() < 1e-9);
        // Faster playback is corrected downwards
        assert!((deck.detune().value_at(1.0) - detune_for_rate(ratio)).abs() < 1e-9);
        assert!(deck.detune().value_at(1.0) < 0.0);
        assert!(deck.detune().value_at(100.0).abs() < DETUNE_EPSILON_CENTS);
    }

    #[test]
    fn test_pause_cancels_everything_and_resume_reschedules() {
        let mut clock = TimelineClock::new();
        let mut deck = loaded_deck(200.0);
        deck.mixin_at(&mut clock, 0.0);
        assert!(clock.pending_for(deck.id()) > 0);

        clock.advance_to(10.0);
        deck.pause(&mut clock, 10.0, false);
        assert_eq!(clock.pending_for(deck.id()), 0);
        assert_eq!(deck.state(), DeckState::Paused);
        assert!(deck.is_resumable());
        let paused_at = deck.current_time(10.0);
        assert_eq!(deck.current_time(15.0), paused_at);

        clock.advance_to(20.0);
        assert!(deck.resume(&mut clock));
        assert!(clock.pending_for(deck.id()) > 0);
        assert!((deck.current_time(21.0) - (paused_at + 1.0)).abs() < 1e-9);
        let schedule = deck.schedule().unwrap();
        assert!(schedule.mixout_time > 20.0);
    }

    #[test]
    fn test_stop_ends_and_releases_audio() {
        let mut clock = TimelineClock::new();
        let mut deck = loaded_deck(60.0);
        deck.mixin_at(&mut clock, 0.0);
        deck.take_events();
        deck.stop(&mut clock, 1.0);
        assert_eq!(deck.state(), DeckState::Ended);
        assert_eq!(clock.pending_for(deck.id()), 0);
        assert_eq!(deck.take_events(), vec![DeckEvent::Ended]);

        deck.render(2.0, 64).unwrap();
        assert_eq!(deck.output().peak(), 0.0);
    }

    #[test]
    fn test_seek_moves_position() {
        let mut clock = TimelineClock::new();
        let mut deck = loaded_deck(60.0);
        deck.mixin_at(&mut clock, 0.0);
        clock.advance_to(2.0);
        assert!(deck.seek(&mut clock, 30.0));
        assert!(deck.is_playing());
        assert!((deck.current_time(3.0) - 31.0).abs() < 1e-9);
    }

    #[test]
    fn test_render_copies_source_at_unity() {
        let mut clock = TimelineClock::new();
        let source = clicks(30.0);
        let mut deck = loaded_deck(30.0);
        deck.mixin_at(&mut clock, 0.0);
        // Resuming after the seek restores full gain
        assert!(deck.seek(&mut clock, 0.0));
        clock.advance_to(5.0);
        deck.render(5.0, 256).unwrap();
        let position = (5.0 * SR as f64) as usize;
        for (i, sample) in deck.output().iter().enumerate() {
            assert!((sample.left - source[position + i].left).abs() < 1e-6);
        }
    }

    #[test]
    fn test_vocoder_follows_timeline_through_tempo_ramp() {
        let mut clock = TimelineClock::new();
        let mut deck = loaded_deck(120.0);
        deck.set_bpm(126);
        deck.mixin_at(&mut clock, 0.0);
        assert!(deck.is_playing());

        let block = 256;
        let sr = SR as f64;
        let mut now = 0.0;
        let mut worst = 0.0f64;
        // 20s hold at 1.05x, then the 60s ramp back to native tempo
        while now < 85.0 {
            deck.render(now, block).unwrap();
            now += block as f64 / sr;
            if let Some(stretch) = deck.stretch.as_ref().filter(|_| deck.stretch_active) {
                let drift = stretch.playhead() - deck.current_time(now) * sr;
                worst = worst.max(drift.abs());
            }
        }
        assert!(worst < 2.0, "vocoder drifted {} samples", worst);
        // Ramp over, plain copying resumed
        assert!(!deck.stretch_active);
    }
}
