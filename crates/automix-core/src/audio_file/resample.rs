//! Whole-buffer sample rate conversion with rubato

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use super::DecodeError;
use crate::types::StereoBuffer;

const SINC_LEN: usize = 256;

/// Input position of the calibration impulse
const IMPULSE_AT: usize = SINC_LEN;

fn sinc_params() -> SincInterpolationParameters {
    SincInterpolationParameters {
        sinc_len: SINC_LEN,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    }
}

/// Signed output offset of a single-chunk pass, measured with an impulse
///
/// rubato's reported `output_delay` does not match what a fresh resampler
/// produces on its first chunk, so the offset is taken from the resampler
/// itself.
fn measure_offset(ratio: f64) -> Result<i64, DecodeError> {
    let chunk = 4 * SINC_LEN;
    let mut impulse = vec![0.0f32; chunk];
    impulse[IMPULSE_AT] = 1.0;

    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, sinc_params(), chunk, 1)
        .map_err(|e| DecodeError::Resample(e.to_string()))?;
    let waves_in = vec![impulse];
    let out = resampler
        .process(&waves_in, None)
        .map_err(|e| DecodeError::Resample(e.to_string()))?;

    let peak = out
        .first()
        .and_then(|channel| {
            channel
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map(|(i, _)| i)
        })
        .ok_or_else(|| DecodeError::Resample("calibration produced no output".to_string()))?;
    Ok(peak as i64 - (IMPULSE_AT as f64 * ratio).round() as i64)
}

/// Convert a stereo buffer between sample rates
///
/// The resampler's offset is measured and removed, and the output trimmed
/// to the exact converted length, so time positions survive the conversion.
pub fn resample_buffer(
    buffer: &StereoBuffer,
    from_rate: u32,
    to_rate: u32,
) -> Result<StereoBuffer, DecodeError> {
    if from_rate == to_rate || buffer.is_empty() {
        return Ok(buffer.clone());
    }
    if from_rate == 0 || to_rate == 0 {
        return Err(DecodeError::Resample(format!(
            "invalid rates {}Hz -> {}Hz",
            from_rate, to_rate
        )));
    }

    let ratio = to_rate as f64 / from_rate as f64;
    let expected_len = (buffer.len() as f64 * ratio).round() as usize;
    let offset = measure_offset(ratio)?;

    // Leading silence keeps the trim point positive whichever way the
    // resampler is off; trailing silence flushes the filter tail
    let (left, right) = buffer.to_channels();
    let pad = |channel: Vec<f32>| -> Vec<f32> {
        let mut padded = vec![0.0f32; SINC_LEN];
        padded.extend(channel);
        padded.resize(padded.len() + 2 * SINC_LEN, 0.0);
        padded
    };
    let (left, right) = (pad(left), pad(right));

    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, sinc_params(), left.len(), 2)
        .map_err(|e| DecodeError::Resample(e.to_string()))?;

    let waves_in = vec![left, right];
    let waves_out = resampler
        .process(&waves_in, None)
        .map_err(|e| DecodeError::Resample(e.to_string()))?;

    let mut channels = waves_out.into_iter();
    let (out_left, out_right) = match (channels.next(), channels.next()) {
        (Some(l), Some(r)) => (l, r),
        _ => return Err(DecodeError::Resample("resampler dropped a channel".to_string())),
    };

    let lead = ((SINC_LEN as f64 * ratio).round() as i64 + offset).max(0) as usize;
    let start = lead.min(out_left.len());
    let end = (start + expected_len).min(out_left.len());
    let mut resampled = StereoBuffer::from_channels(&out_left[start..end], &out_right[start..end]);
    resampled.resize(expected_len);

    log::debug!(
        "resample_buffer: {} -> {} samples ({}Hz -> {}Hz, offset {})",
        buffer.len(),
        resampled.len(),
        from_rate,
        to_rate,
        offset
    );
    Ok(resampled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    #[test]
    fn test_same_rate_is_identity() {
        let buffer = StereoBuffer::from_mono(&[0.1, 0.2, 0.3]);
        assert_eq!(resample_buffer(&buffer, 44100, 44100).unwrap(), buffer);
    }

    #[test]
    fn test_upsample_keeps_length_ratio_and_timing() {
        let from = 24000;
        let to = 48000;
        // One second of quiet sine with a marker peak at 0.5s
        let mut mono: Vec<f32> = (0..from)
            .map(|i| 0.2 * (2.0 * PI * 300.0 * i as f32 / from as f32).sin())
            .collect();
        mono[from as usize / 2] = 1.0;

        let out = resample_buffer(&StereoBuffer::from_mono(&mono), from, to).unwrap();
        assert_eq!(out.len(), 48000);

        let (loudest, _) = out
            .iter()
            .enumerate()
            .fold((0, 0.0f32), |best, (i, s)| if s.left > best.1 { (i, s.left) } else { best });
        assert!((loudest as i64 - 24000).abs() <= 4, "marker at {}", loudest);
    }

    #[test]
    fn test_downsample_keeps_marker_position() {
        let from = 48000;
        let to = 44100;
        let mut mono = vec![0.0f32; from as usize];
        mono[36000] = 1.0;

        let out = resample_buffer(&StereoBuffer::from_mono(&mono), from, to).unwrap();
        assert_eq!(out.len(), 44100);

        let (loudest, _) = out
            .iter()
            .enumerate()
            .fold((0, 0.0f32), |best, (i, s)| if s.left > best.1 { (i, s.left) } else { best });
        // 0.75s in both rates
        assert!((loudest as i64 - 33075).abs() <= 2, "marker at {}", loudest);
    }
}
