//! Output destinations for the mix bus

use std::sync::{Arc, Mutex};

use super::EngineResult;
use crate::types::StereoBuffer;

/// Receives every rendered mix block
pub trait AudioSink: Send {
    fn write(&mut self, block: &StereoBuffer, sample_rate: u32) -> EngineResult<()>;

    /// Flush and close; called once when the sink is disconnected
    fn finish(&mut self) -> EngineResult<()> {
        Ok(())
    }
}

/// Collects the mix in memory
///
/// The buffer is shared, so a caller can keep a [`MemorySink::handle`] after
/// handing the sink to the mixer.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    buffer: Arc<Mutex<StereoBuffer>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self) -> Arc<Mutex<StereoBuffer>> {
        Arc::clone(&self.buffer)
    }
}

impl AudioSink for MemorySink {
    fn write(&mut self, block: &StereoBuffer, _sample_rate: u32) -> EngineResult<()> {
        let mut buffer = self
            .buffer
            .lock()
            .map_err(|_| super::EngineError::Sink("memory sink poisoned".to_string()))?;
        for sample in block.iter() {
            buffer.push(*sample);
        }
        Ok(())
    }
}
