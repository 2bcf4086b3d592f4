//! File decoding through Symphonia

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::{resample_buffer, AudioSource, DecodeError, DecodedAudio, TrackSource};
use crate::types::{StereoBuffer, StereoSample};

/// Decodes local audio files (FLAC, MP3, WAV) with Symphonia
///
/// Mono files are duplicated into both channels; channels beyond the
/// first two are dropped. Remote URLs are not supported.
#[derive(Debug, Clone, Copy, Default)]
pub struct SymphoniaSource;

impl SymphoniaSource {
    pub fn new() -> Self {
        Self
    }
}

impl AudioSource for SymphoniaSource {
    fn decode(&self, source: &TrackSource, target_sample_rate: u32) -> Result<DecodedAudio, DecodeError> {
        let path = match source {
            TrackSource::File(path) => path,
            TrackSource::Url(url) => return Err(DecodeError::UnsupportedSource(url.clone())),
        };

        log::info!("SymphoniaSource: decoding {:?}", path);
        let (samples, sample_rate) = decode_file(path)?;
        if samples.is_empty() {
            return Err(DecodeError::Empty(path.display().to_string()));
        }

        let samples = resample_buffer(&samples, sample_rate, target_sample_rate)?;
        let decoded = DecodedAudio::new(samples, target_sample_rate);
        log::info!(
            "SymphoniaSource: decoded {:?} ({:.1}s, source rate {}Hz)",
            path,
            decoded.duration_secs(),
            sample_rate
        );
        Ok(decoded)
    }
}

/// Decode every packet of the first audio track into a stereo buffer
fn decode_file(path: &Path) -> Result<(StereoBuffer, u32), DecodeError> {
    let file = File::open(path).map_err(|e| DecodeError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| DecodeError::UnsupportedFormat(e.to_string()))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| DecodeError::NoAudioTrack(path.display().to_string()))?;
    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| DecodeError::UnsupportedFormat("unknown sample rate".to_string()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| DecodeError::UnsupportedFormat(e.to_string()))?;

    let mut stereo = StereoBuffer::default();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => return Err(DecodeError::Codec(e.to_string())),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                log::warn!("SymphoniaSource: skipping corrupt packet: {}", e);
                continue;
            }
            Err(e) => return Err(DecodeError::Codec(e.to_string())),
        };

        let channels = decoded.spec().channels.count().max(1);
        let too_small = sample_buf
            .as_ref()
            .map_or(true, |b| b.capacity() < decoded.capacity() * channels);
        if too_small {
            sample_buf = Some(SampleBuffer::new(decoded.capacity() as u64, *decoded.spec()));
        }
        let Some(buf) = sample_buf.as_mut() else {
            continue;
        };
        buf.copy_interleaved_ref(decoded);

        for frame in buf.samples().chunks_exact(channels) {
            let sample = match frame {
                [mono] => StereoSample::mono(*mono),
                [left, right, ..] => StereoSample::new(*left, *right),
                [] => continue,
            };
            stereo.push(sample);
        }
    }

    Ok((stereo, sample_rate))
}
