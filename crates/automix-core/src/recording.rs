//! Recording the mixed stream to disk

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::engine::{AudioSink, EngineError, EngineResult};
use crate::types::StereoBuffer;

/// Writes every mix block to a 32-bit float stereo WAV file
///
/// The file header is completed when the sink is finished (on
/// [`MixerEngine::disconnect`](crate::engine::MixerEngine::disconnect)).
pub struct WavSink {
    path: PathBuf,
    sample_rate: u32,
    writer: Option<WavWriter<BufWriter<File>>>,
    frames_written: u64,
}

impl WavSink {
    pub fn create(path: impl AsRef<Path>, sample_rate: u32) -> EngineResult<Self> {
        let path = path.as_ref().to_path_buf();
        let spec = WavSpec {
            channels: 2,
            sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let writer = WavWriter::create(&path, spec).map_err(|e| {
            EngineError::Sink(format!("cannot create {}: {}", path.display(), e))
        })?;
        log::info!("WavSink: recording to {:?} at {}Hz", path, sample_rate);
        Ok(Self {
            path,
            sample_rate,
            writer: Some(writer),
            frames_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }
}

impl AudioSink for WavSink {
    fn write(&mut self, block: &StereoBuffer, sample_rate: u32) -> EngineResult<()> {
        if sample_rate != self.sample_rate {
            return Err(EngineError::Sink(format!(
                "{}Hz block for a {}Hz recording",
                sample_rate, self.sample_rate
            )));
        }
        let Some(writer) = self.writer.as_mut() else {
            return Err(EngineError::Sink(format!("{} already finished", self.path.display())));
        };
        for &sample in block.as_interleaved() {
            writer
                .write_sample(sample)
                .map_err(|e| EngineError::Sink(e.to_string()))?;
        }
        self.frames_written += block.len() as u64;
        Ok(())
    }

    fn finish(&mut self) -> EngineResult<()> {
        if let Some(writer) = self.writer.take() {
            writer
                .finalize()
                .map_err(|e| EngineError::Sink(e.to_string()))?;
            log::info!(
                "WavSink: wrote {} frames to {:?}",
                self.frames_written,
                self.path
            );
        }
        Ok(())
    }
}

impl Drop for WavSink {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            log::warn!("WavSink: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StereoSample;

    #[test]
    fn test_writes_interleaved_float_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mix.wav");
        let mut sink = WavSink::create(&path, 8000).unwrap();

        let block = StereoBuffer::from_vec(vec![
            StereoSample::new(0.25, -0.25),
            StereoSample::new(0.5, -0.5),
        ]);
        sink.write(&block, 8000).unwrap();
        sink.write(&block, 8000).unwrap();
        sink.finish().unwrap();
        assert_eq!(sink.frames_written(), 4);

        let mut reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.sample_rate, 8000);
        let samples: Vec<f32> = reader.samples::<f32>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![0.25, -0.25, 0.5, -0.5, 0.25, -0.25, 0.5, -0.5]);
    }

    #[test]
    fn test_rejects_mismatched_rate() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = WavSink::create(dir.path().join("mix.wav"), 44100).unwrap();
        let block = StereoBuffer::silence(4);
        assert!(matches!(sink.write(&block, 48000), Err(EngineError::Sink(_))));
    }
}
