//! Shared timeline context handed to the mixer

use crate::clock::{Clock, TimelineClock};
use crate::types::DEFAULT_SAMPLE_RATE;

/// Sample rate plus the clock every deck schedules against
pub struct AudioContext {
    sample_rate: u32,
    clock: Box<dyn Clock>,
}

impl AudioContext {
    pub fn new(sample_rate: u32, clock: Box<dyn Clock>) -> Self {
        Self { sample_rate, clock }
    }

    /// Deterministic context driven only by rendering or explicit advances
    pub fn offline(sample_rate: u32) -> Self {
        Self::new(sample_rate, Box::new(TimelineClock::new()))
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn clock_mut(&mut self) -> &mut dyn Clock {
        self.clock.as_mut()
    }
}

impl Default for AudioContext {
    fn default() -> Self {
        Self::offline(DEFAULT_SAMPLE_RATE)
    }
}
