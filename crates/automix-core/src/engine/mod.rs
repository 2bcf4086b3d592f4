//! Mixing engine - decks, scheduling and the mix bus
//!
//! - [`AudioParam`]: time-stamped gain and tempo automation
//! - [`plan_schedule`]: mix points of a playing deck on the shared timeline
//! - [`Deck`]: per-track lifecycle from load to fade-out
//! - [`MixerEngine`]: queue, deck sequencing, rendering and sinks

mod automation;
mod context;
mod deck;
mod error;
mod events;
mod mixer;
mod schedule;
mod sink;
mod track;

pub use automation::{AudioParam, ParamEvent};
pub use context::AudioContext;
pub use deck::{detune_for_rate, Deck, DeckEvent, DeckState, NEAR_SILENT_GAIN};
pub use error::{EngineError, EngineResult};
pub use events::{MixerEvent, MixerEventKind};
pub use mixer::MixerEngine;
pub use schedule::{plan_schedule, quantized_mix_span, PlanInput, Schedule, STOP_DELAY};
pub use sink::{AudioSink, MemorySink};
pub use track::{Track, TrackAnalysis};
