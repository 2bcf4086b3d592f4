//! DSP primitives shared by the analyzer and the phase vocoder
//!
//! - [`RingBuffer`]: fixed-capacity overlap-add accumulator
//! - [`SpectralTransform`]: power-of-two FFT with magnitude/phase views
//! - [`BandIsolator`]: biquad pair isolating the kick-drum band

mod error;
mod fft;
mod filter;
mod ring_buffer;

pub use error::{DspError, DspResult};
pub use fft::SpectralTransform;
pub use filter::BandIsolator;
pub use ring_buffer::RingBuffer;
