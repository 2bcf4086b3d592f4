//! Timeline clock for scheduled deck actions
//!
//! Decks never run timers themselves. They register [`ScheduledTask`]s at
//! absolute timeline seconds and the mixer executes each task when the clock
//! reaches it. Tasks are data rather than closures so the mixer can dispatch
//! them with full mutable access to its decks.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use crate::types::TrackId;

/// Handle returned by [`Clock::schedule`], used to cancel the task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

/// Deck lifecycle step to run at a given time
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeckAction {
    /// Start the transport from the deck's current offset
    Start,
    /// Fade-in point reached
    Mixin,
    /// Fade-out point reached
    Mixout,
    /// Time to load the next queued track
    LoadNext,
    /// Hard stop just after the fade-out
    Stop,
    /// The transport runs out of samples
    TransportEnd,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledTask {
    pub deck: TrackId,
    pub action: DeckAction,
}

/// Timed task registry driving the mixer timeline
pub trait Clock: Send {
    /// Current timeline position in seconds
    fn now(&self) -> f64;

    /// Register `task` to fire at `at` seconds. Tasks at equal times fire in
    /// registration order.
    fn schedule(&mut self, at: f64, task: ScheduledTask) -> TimerHandle;

    /// Cancel a pending task; false if it already fired or was cancelled
    fn cancel(&mut self, handle: TimerHandle) -> bool;

    /// Number of tasks still pending for `deck`
    fn pending_for(&self, deck: TrackId) -> usize;

    /// Remove the earliest task due at or before `until`, moving `now` to its
    /// time (never backwards)
    fn pop_due(&mut self, until: f64) -> Option<(f64, ScheduledTask)>;

    /// Move `now` forward to `time`; earlier times are ignored
    fn advance_to(&mut self, time: f64);
}

#[derive(Debug)]
struct HeapEntry {
    at: f64,
    seq: u64,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap on (time, registration order)
        other
            .at
            .total_cmp(&self.at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Manually advanced clock
///
/// Time only moves when the owner advances it, which makes offline rendering
/// and tests fully deterministic.
#[derive(Debug, Default)]
pub struct TimelineClock {
    now: f64,
    next_seq: u64,
    heap: BinaryHeap<HeapEntry>,
    /// Live tasks by sequence number; cancelled ones are dropped lazily from
    /// the heap
    tasks: HashMap<u64, (f64, ScheduledTask)>,
}

impl TimelineClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total pending tasks across all decks
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }
}

impl Clock for TimelineClock {
    fn now(&self) -> f64 {
        self.now
    }

    fn schedule(&mut self, at: f64, task: ScheduledTask) -> TimerHandle {
        let seq = self.next_seq;
        self.next_seq += 1;
        let at = if at.is_finite() { at } else { self.now };
        self.heap.push(HeapEntry { at, seq });
        self.tasks.insert(seq, (at, task));
        log::trace!("TimelineClock: {:?} for {} at {:.3}s", task.action, task.deck, at);
        TimerHandle(seq)
    }

    fn cancel(&mut self, handle: TimerHandle) -> bool {
        self.tasks.remove(&handle.0).is_some()
    }

    fn pending_for(&self, deck: TrackId) -> usize {
        self.tasks.values().filter(|(_, task)| task.deck == deck).count()
    }

    fn pop_due(&mut self, until: f64) -> Option<(f64, ScheduledTask)> {
        while let Some(top) = self.heap.peek() {
            if !self.tasks.contains_key(&top.seq) {
                self.heap.pop();
                continue;
            }
            if top.at > until {
                return None;
            }
            let seq = top.seq;
            self.heap.pop();
            let (at, task) = self.tasks.remove(&seq)?;
            self.now = self.now.max(at);
            return Some((at, task));
        }
        None
    }

    fn advance_to(&mut self, time: f64) {
        if time > self.now {
            self.now = time;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(deck: u64, action: DeckAction) -> ScheduledTask {
        ScheduledTask { deck: TrackId(deck), action }
    }

    #[test]
    fn test_fires_in_time_then_registration_order() {
        let mut clock = TimelineClock::new();
        clock.schedule(2.0, task(1, DeckAction::Stop));
        clock.schedule(1.0, task(1, DeckAction::Mixin));
        clock.schedule(1.0, task(2, DeckAction::Mixout));

        let fired: Vec<_> = std::iter::from_fn(|| clock.pop_due(10.0)).collect();
        assert_eq!(fired[0], (1.0, task(1, DeckAction::Mixin)));
        assert_eq!(fired[1], (1.0, task(2, DeckAction::Mixout)));
        assert_eq!(fired[2], (2.0, task(1, DeckAction::Stop)));
        assert_eq!(clock.now(), 2.0);
    }

    #[test]
    fn test_pop_due_respects_horizon() {
        let mut clock = TimelineClock::new();
        clock.schedule(5.0, task(1, DeckAction::LoadNext));
        assert!(clock.pop_due(4.9).is_none());
        assert_eq!(clock.now(), 0.0);
        assert!(clock.pop_due(5.0).is_some());
    }

    #[test]
    fn test_cancel_removes_from_pending() {
        let mut clock = TimelineClock::new();
        let a = clock.schedule(1.0, task(7, DeckAction::Mixin));
        clock.schedule(2.0, task(7, DeckAction::Mixout));
        clock.schedule(3.0, task(8, DeckAction::Mixout));

        assert_eq!(clock.pending_for(TrackId(7)), 2);
        assert!(clock.cancel(a));
        assert!(!clock.cancel(a));
        assert_eq!(clock.pending_for(TrackId(7)), 1);

        let (at, fired) = clock.pop_due(10.0).unwrap();
        assert_eq!((at, fired.action), (2.0, DeckAction::Mixout));
        assert_eq!(clock.pending(), 1);
    }

    #[test]
    fn test_past_tasks_do_not_rewind() {
        let mut clock = TimelineClock::new();
        clock.advance_to(3.0);
        clock.schedule(1.0, task(1, DeckAction::Stop));
        assert_eq!(clock.pop_due(3.0).map(|(at, _)| at), Some(1.0));
        assert_eq!(clock.now(), 3.0);
        clock.advance_to(2.0);
        assert_eq!(clock.now(), 3.0);
    }
}
