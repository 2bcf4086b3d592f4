//! Mixer engine - queue, deck sequencing and the mix bus
//!
//! The engine keeps a FIFO of queued tracks and at most [`MAX_DECKS`] active
//! decks. Each deck publishes a schedule once it plays; its load-next point
//! pulls the next queue entry onto a fresh deck seeded with that schedule,
//! so the newcomer's beat anchor lands on the outgoing deck's mixin time.
//!
//! All timing runs on the [`AudioContext`] clock. [`MixerEngine::render`]
//! advances it block by block; [`MixerEngine::advance`] moves it without
//! producing audio.

use std::collections::VecDeque;

use crossbeam::channel::{unbounded, Receiver, Sender};
use rayon::prelude::*;

use crate::audio_file::{AudioSource, TrackSource};
use crate::config::MixerConfig;
use crate::types::{StereoBuffer, TrackId, MAX_DECKS};

use super::context::AudioContext;
use super::deck::{Deck, DeckEvent, DeckState};
use super::events::{MixerEvent, MixerEventKind};
use super::schedule::Schedule;
use super::sink::AudioSink;
use super::track::Track;
use super::{EngineError, EngineResult};

pub struct MixerEngine {
    ctx: AudioContext,
    config: MixerConfig,
    source: Box<dyn AudioSource>,
    queue: VecDeque<Track>,
    decks: Vec<Deck>,
    sinks: Vec<Box<dyn AudioSink>>,
    subscribers: Vec<Sender<MixerEvent>>,
    finished: Vec<TrackId>,
    next_id: u64,
    started: bool,
}

impl MixerEngine {
    pub fn new(ctx: AudioContext, mut config: MixerConfig, source: Box<dyn AudioSource>) -> Self {
        config.validate();
        log::info!(
            "MixerEngine: {}Hz, mix {:.1}s, tempo match {}",
            ctx.sample_rate(),
            config.mix_length,
            config.tempo_match
        );
        Self {
            ctx,
            config,
            source,
            queue: VecDeque::new(),
            decks: Vec::with_capacity(MAX_DECKS),
            sinks: Vec::new(),
            subscribers: Vec::new(),
            finished: Vec::new(),
            next_id: 1,
            started: false,
        }
    }

    pub fn config(&self) -> &MixerConfig {
        &self.config
    }

    pub fn sample_rate(&self) -> u32 {
        self.ctx.sample_rate()
    }

    /// Current timeline position in seconds
    pub fn now(&self) -> f64 {
        self.ctx.now()
    }

    pub fn context(&self) -> &AudioContext {
        &self.ctx
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Queued tracks, head first
    pub fn queue(&self) -> impl Iterator<Item = &Track> {
        self.queue.iter()
    }

    pub fn decks(&self) -> &[Deck] {
        &self.decks
    }

    pub fn deck(&self, id: TrackId) -> Option<&Deck> {
        self.decks.iter().find(|d| d.id() == id)
    }

    /// State of the deck playing `id`; `Ended` for retired tracks
    pub fn deck_state(&self, id: TrackId) -> Option<DeckState> {
        match self.deck(id) {
            Some(deck) => Some(deck.state()),
            None if self.is_finished(id) => Some(DeckState::Ended),
            None => None,
        }
    }

    pub fn is_finished(&self, id: TrackId) -> bool {
        self.finished.contains(&id)
    }

    /// Nothing queued and nothing playing
    pub fn is_idle(&self) -> bool {
        self.decks.is_empty() && self.queue.is_empty()
    }

    /// Receive every event emitted from now on
    pub fn subscribe(&mut self) -> Receiver<MixerEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.push(tx);
        rx
    }

    pub fn connect(&mut self, sink: Box<dyn AudioSink>) {
        self.sinks.push(sink);
        log::debug!("MixerEngine: {} sink(s) connected", self.sinks.len());
    }

    /// Finish and drop every connected sink
    pub fn disconnect(&mut self) {
        for mut sink in self.sinks.drain(..) {
            if let Err(e) = sink.finish() {
                log::warn!("MixerEngine: failed to finish sink: {}", e);
            }
        }
    }

    /// Append a track to the queue
    ///
    /// With exactly one deck playing, the new queue head is scheduled
    /// against its schedule right away. A paused deck's schedule is stale,
    /// so the head waits for [`MixerEngine::play`]. With no deck at all on a
    /// started engine, the head starts playing immediately.
    pub fn enqueue(&mut self, source: TrackSource) -> TrackId {
        let id = TrackId(self.next_id);
        self.next_id += 1;
        log::info!("MixerEngine: queued {} ({})", id, source.locator());
        self.queue.push_back(Track::new(id, source));

        if self.decks.is_empty() {
            if self.started {
                self.schedule_next(None);
            }
        } else {
            self.follow_playing_deck();
        }
        self.drain_deck_events();
        id
    }

    /// Drop a queued track; active decks are not affected
    pub fn remove(&mut self, id: TrackId) -> bool {
        match self.queue.iter().position(|t| t.id == id) {
            Some(index) => {
                self.queue.remove(index);
                log::info!("MixerEngine: removed {} from queue", id);
                true
            }
            None => false,
        }
    }

    /// Start the mix with the queue head
    pub fn start(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        log::info!("MixerEngine: started with {} queued track(s)", self.queue.len());
        if self.decks.is_empty() {
            self.schedule_next(None);
        }
        self.drain_deck_events();
    }

    /// Resume every resumable deck, or start the mix if it never started
    ///
    /// Decks paused before they ever played are mixed in again, against the
    /// fresh schedule of a resumed deck if there is one. A track queued
    /// while paused is scheduled against the resumed deck.
    pub fn play(&mut self) {
        if !self.started {
            self.start();
            return;
        }
        let clock = self.ctx.clock_mut();
        for deck in self.decks.iter_mut().filter(|d| d.is_resumable() && d.has_started()) {
            deck.resume(clock);
        }

        let now = clock.now();
        let target = self
            .decks
            .iter()
            .filter(|d| d.is_playing())
            .find_map(|d| d.schedule())
            .map(|s| s.mixin_time)
            .unwrap_or(now);
        for deck in self.decks.iter_mut().filter(|d| d.is_resumable() && !d.has_started()) {
            deck.mixin_at(clock, target);
        }
        self.drain_deck_events();
        self.follow_playing_deck();
        self.drain_deck_events();
    }

    pub fn pause(&mut self) {
        let clock = self.ctx.clock_mut();
        let now = clock.now();
        for deck in &mut self.decks {
            deck.pause(clock, now, false);
        }
        self.drain_deck_events();
    }

    /// Jump the deck playing `id` to `position` seconds
    ///
    /// Decks that have not started yet are waiting for a beat-aligned start
    /// and cannot be moved.
    pub fn seek(&mut self, id: TrackId, position: f64) -> EngineResult<()> {
        let clock = self.ctx.clock_mut();
        let deck = self
            .decks
            .iter_mut()
            .find(|d| d.id() == id)
            .ok_or(EngineError::DeckNotFound(id))?;
        if !deck.seek(clock, position) {
            return Err(EngineError::DeckNotStarted(id));
        }
        self.drain_deck_events();
        Ok(())
    }

    /// Fire every task due up to `until` and move the clock there
    pub fn advance(&mut self, until: f64) {
        while let Some((at, task)) = self.ctx.clock_mut().pop_due(until) {
            let clock = self.ctx.clock_mut();
            match self.decks.iter_mut().find(|d| d.id() == task.deck) {
                Some(deck) => deck.handle(clock, task.action, at),
                None => log::trace!("MixerEngine: dropping {:?} for retired {}", task.action, task.deck),
            }
            self.drain_deck_events();
        }
        self.ctx.clock_mut().advance_to(until);
    }

    /// Render one block of the mix into `output`
    ///
    /// Tasks due at the block start fire first; the block length is
    /// `output.len()` samples and the clock moves past it afterwards. The
    /// block is also written to every connected sink.
    pub fn render(&mut self, output: &mut StereoBuffer) -> EngineResult<()> {
        let now = self.now();
        self.advance(now);

        let frames = output.len();
        self.decks
            .par_iter_mut()
            .try_for_each(|deck| deck.render(now, frames))?;

        output.fill_silence();
        for deck in &self.decks {
            output.add_buffer(deck.output());
        }
        output.scale(self.config.volume);

        let sample_rate = self.sample_rate();
        for sink in &mut self.sinks {
            sink.write(output, sample_rate)?;
        }

        let block_secs = frames as f64 / sample_rate as f64;
        self.ctx.clock_mut().advance_to(now + block_secs);
        Ok(())
    }

    fn emit(&mut self, track: TrackId, kind: MixerEventKind) {
        log::debug!("MixerEngine: {} {:?}", track, kind);
        let event = MixerEvent::new(track, kind);
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Put the queue head on a new deck, seeded with the outgoing deck's
    /// schedule
    fn schedule_next(&mut self, seed: Option<Schedule>) {
        if self.decks.len() >= MAX_DECKS {
            log::debug!("MixerEngine: both decks busy, next track waits");
            return;
        }
        let Some(track) = self.queue.pop_front() else {
            log::debug!("MixerEngine: queue empty, nothing to schedule");
            return;
        };

        let mut deck = Deck::new(track, self.sample_rate(), self.config.clone(), seed);
        if let Some(bpm) = seed.and_then(|s| s.bpm) {
            deck.set_bpm(bpm);
        }
        log::info!(
            "MixerEngine: scheduling {} (seed mixin {:?})",
            deck.id(),
            seed.map(|s| s.mixin_time)
        );
        deck.load(self.source.as_ref());
        self.decks.push(deck);
    }

    /// Schedule the queue head against the only deck, if that deck is
    /// playing
    fn follow_playing_deck(&mut self) {
        let seed = match self.decks.as_slice() {
            [only] if only.is_playing() => only.schedule(),
            _ => None,
        };
        if seed.is_some() {
            self.schedule_next(seed);
        }
    }

    /// React to deck events until no deck has anything left to report
    fn drain_deck_events(&mut self) {
        loop {
            let pending: Vec<(TrackId, DeckEvent)> = self
                .decks
                .iter_mut()
                .flat_map(|deck| {
                    let id = deck.id();
                    deck.take_events().into_iter().map(move |e| (id, e))
                })
                .collect();
            if pending.is_empty() {
                return;
            }
            for (id, event) in pending {
                self.on_deck_event(id, event);
            }
        }
    }

    fn on_deck_event(&mut self, id: TrackId, event: DeckEvent) {
        match event {
            DeckEvent::Loaded { duration } => self.emit(id, MixerEventKind::Loaded { duration }),
            DeckEvent::LoadFailed(reason) => {
                let seed = self.retire(id).and_then(|deck| deck.seed());
                self.emit(id, MixerEventKind::LoadFailed(reason));
                self.schedule_next(seed);
            }
            DeckEvent::Analyzed(analysis) => {
                self.emit(id, MixerEventKind::Analyzed(analysis));
                let clock = self.ctx.clock_mut();
                let now = clock.now();
                if let Some(deck) = self.decks.iter_mut().find(|d| d.id() == id) {
                    let target = deck.seed().map(|s| s.mixin_time).unwrap_or(now);
                    deck.mixin_at(clock, target);
                }
            }
            DeckEvent::Playing => self.emit(id, MixerEventKind::Playing),
            DeckEvent::Paused => self.emit(id, MixerEventKind::Paused),
            DeckEvent::Mixin => self.emit(id, MixerEventKind::Mixin),
            DeckEvent::Mixout => self.emit(id, MixerEventKind::Mixout),
            DeckEvent::LoadNext(schedule) => {
                self.emit(id, MixerEventKind::LoadNext(schedule));
                self.schedule_next(Some(schedule));
            }
            DeckEvent::Ended => {
                self.retire(id);
                self.finished.push(id);
                self.emit(id, MixerEventKind::TrackEnd);

                match self.decks.first() {
                    Some(survivor) if survivor.load_next_fired() => {
                        let seed = survivor.schedule();
                        self.schedule_next(seed);
                    }
                    Some(_) => {}
                    None if self.started => self.schedule_next(None),
                    None => {}
                }
            }
        }
    }

    fn retire(&mut self, id: TrackId) -> Option<Deck> {
        let index = self.decks.iter().position(|d| d.id() == id)?;
        log::debug!("MixerEngine: retiring deck for {}", id);
        Some(self.decks.remove(index))
    }
}

impl Drop for MixerEngine {
    fn drop(&mut self) {
        self.disconnect();
    }
}
