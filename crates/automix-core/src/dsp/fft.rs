//! Power-of-two spectral transform
//!
//! Forward transform of a real frame into the non-negative half spectrum
//! (`N/2 + 1` bins, with real/imag/magnitude/phase views), and inverse
//! transform of a half spectrum back into a real frame.

use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use super::error::{DspError, DspResult};

pub struct SpectralTransform {
    size: usize,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    real: Vec<f32>,
    imag: Vec<f32>,
    magnitude: Vec<f32>,
    phase: Vec<f32>,
}

impl SpectralTransform {
    /// Plan forward and inverse transforms of `size` points
    pub fn new(size: usize) -> DspResult<Self> {
        if size == 0 || !size.is_power_of_two() {
            return Err(DspError::NotPowerOfTwo(size));
        }

        let mut planner = FftPlanner::new();
        let forward = planner.plan_fft_forward(size);
        let inverse = planner.plan_fft_inverse(size);
        let scratch_len = forward
            .get_inplace_scratch_len()
            .max(inverse.get_inplace_scratch_len());
        let bins = size / 2 + 1;

        Ok(Self {
            size,
            forward,
            inverse,
            buffer: vec![Complex::new(0.0, 0.0); size],
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
            real: vec![0.0; bins],
            imag: vec![0.0; bins],
            magnitude: vec![0.0; bins],
            phase: vec![0.0; bins],
        })
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of bins in the half spectrum (`N/2 + 1`)
    #[inline]
    pub fn bins(&self) -> usize {
        self.size / 2 + 1
    }

    fn check_len(&self, found: usize, expected: usize) -> DspResult<()> {
        if found != expected {
            return Err(DspError::InvalidFrameSize { expected, found });
        }
        Ok(())
    }

    /// Transform a real frame, refreshing all four spectrum views
    pub fn forward(&mut self, frame: &[f32]) -> DspResult<()> {
        self.check_len(frame.len(), self.size)?;

        for (slot, &sample) in self.buffer.iter_mut().zip(frame) {
            *slot = Complex::new(sample, 0.0);
        }
        self.forward
            .process_with_scratch(&mut self.buffer, &mut self.scratch);

        for bin in 0..self.bins() {
            let c = self.buffer[bin];
            self.real[bin] = c.re;
            self.imag[bin] = c.im;
            self.magnitude[bin] = c.norm();
            self.phase[bin] = c.arg();
        }
        Ok(())
    }

    /// Reconstruct a real frame from a half spectrum
    ///
    /// The negative frequencies are the conjugate mirror of `real`/`imag`.
    /// Output is scaled by `1/N` so that `inverse(forward(x)) == x`.
    pub fn inverse(&mut self, real: &[f32], imag: &[f32], output: &mut [f32]) -> DspResult<()> {
        let bins = self.bins();
        self.check_len(real.len(), bins)?;
        self.check_len(imag.len(), bins)?;
        self.check_len(output.len(), self.size)?;

        for bin in 0..bins {
            self.buffer[bin] = Complex::new(real[bin], imag[bin]);
        }
        for bin in bins..self.size {
            let mirror = self.size - bin;
            self.buffer[bin] = Complex::new(real[mirror], -imag[mirror]);
        }
        self.inverse
            .process_with_scratch(&mut self.buffer, &mut self.scratch);

        let norm = 1.0 / self.size as f32;
        for (out, c) in output.iter_mut().zip(&self.buffer) {
            *out = c.re * norm;
        }
        Ok(())
    }

    pub fn real(&self) -> &[f32] {
        &self.real
    }

    pub fn imag(&self) -> &[f32] {
        &self.imag
    }

    pub fn magnitude(&self) -> &[f32] {
        &self.magnitude
    }

    pub fn phase(&self) -> &[f32] {
        &self.phase
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    #[test]
    fn test_rejects_non_power_of_two() {
        assert_eq!(SpectralTransform::new(1000).err(), Some(DspError::NotPowerOfTwo(1000)));
        assert_eq!(SpectralTransform::new(0).err(), Some(DspError::NotPowerOfTwo(0)));
    }

    #[test]
    fn test_rejects_mismatched_frame() {
        let mut fft = SpectralTransform::new(64).unwrap();
        let err = fft.forward(&[0.0; 32]).unwrap_err();
        assert_eq!(err, DspError::InvalidFrameSize { expected: 64, found: 32 });
    }

    #[test]
    fn test_sine_lands_in_its_bin() {
        let size = 256;
        let mut fft = SpectralTransform::new(size).unwrap();
        let frame: Vec<f32> = (0..size)
            .map(|i| (2.0 * PI * 8.0 * i as f32 / size as f32).sin())
            .collect();
        fft.forward(&frame).unwrap();

        let loudest = fft
            .magnitude()
            .iter()
            .enumerate()
            .fold((0, 0.0f32), |best, (bin, &m)| if m > best.1 { (bin, m) } else { best });
        assert_eq!(loudest.0, 8);
        assert!((loudest.1 - size as f32 / 2.0).abs() < 1e-2);
        assert_eq!(fft.phase().len(), size / 2 + 1);
    }

    #[test]
    fn test_inverse_reconstructs_frame() {
        let size = 128;
        let mut fft = SpectralTransform::new(size).unwrap();
        let frame: Vec<f32> = (0..size).map(|i| ((i * 7) % 13) as f32 / 13.0 - 0.5).collect();
        fft.forward(&frame).unwrap();

        let real = fft.real().to_vec();
        let imag = fft.imag().to_vec();
        let mut output = vec![0.0; size];
        fft.inverse(&real, &imag, &mut output).unwrap();

        for (a, b) in frame.iter().zip(&output) {
            assert!((a - b).abs() < 1e-4, "{} vs {}", a, b);
        }
    }
}
