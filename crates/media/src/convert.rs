//! Converting raw frames into the format an encoder wants.
//!
//! Converters are created through a [ConverterFactory] so a stream can open
//! one lazily (on the first frame that needs it) and so tests can check that
//! one is never opened at all.

mod resample;
mod scale;

use crate::format::{AudioFormat, VideoFormat};
use crate::frame::{AudioFrame, VideoFrame};

pub use resample::LinearResampler;
pub use scale::PlaneScaler;

/// Converts audio between sample formats, channel layouts and sample rates.
#[cfg_attr(test, mockall::automock)]
pub trait Resampler {
    /// How much input is buffered (not converted yet), expressed as a number
    /// of samples at `base_rate`, rounded up.
    fn delay(&self, base_rate: u32) -> i64;

    /// Convert all of `input` and write as many samples as are ready into
    /// `output` (up to its capacity). Returns the number of samples written,
    /// which is also set as `output`'s length.
    ///
    /// # Contract
    ///
    /// `input` and `output` must have the formats the resampler was opened
    /// with. `output` must have room for
    /// `rescale_rnd(delay(in_rate) + input.samples(), out_rate, in_rate, Up)`
    /// samples so that nothing has to be held back.
    fn convert(&mut self, input: &AudioFrame, output: &mut AudioFrame)
    -> Result<usize, ConvertError>;

    /// Write out everything that is still buffered, as if the input had
    /// ended. Returns the number of samples written.
    fn flush(&mut self, output: &mut AudioFrame) -> Result<usize, ConvertError>;
}

/// Rescales and reformats video frames.
#[cfg_attr(test, mockall::automock)]
pub trait Scaler {
    /// Convert `input` into `output`.
    ///
    /// # Contract
    ///
    /// `input` and `output` must have the formats the scaler was opened with.
    fn scale(&mut self, input: &VideoFrame, output: &mut VideoFrame) -> Result<(), ConvertError>;
}

/// Opens [Resampler]s and [Scaler]s.
#[cfg_attr(test, mockall::automock)]
pub trait ConverterFactory {
    fn open_resampler(
        &self,
        input: AudioFormat,
        output: AudioFormat,
    ) -> Result<Box<dyn Resampler>, ConvertError>;

    fn open_scaler(
        &self,
        input: VideoFormat,
        output: VideoFormat,
    ) -> Result<Box<dyn Scaler>, ConvertError>;
}

/// Opens [LinearResampler]s and [PlaneScaler]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinConverters;

impl ConverterFactory for BuiltinConverters {
    fn open_resampler(
        &self,
        input: AudioFormat,
        output: AudioFormat,
    ) -> Result<Box<dyn Resampler>, ConvertError> {
        Ok(Box::new(LinearResampler::new(input, output)?))
    }

    fn open_scaler(
        &self,
        input: VideoFormat,
        output: VideoFormat,
    ) -> Result<Box<dyn Scaler>, ConvertError> {
        Ok(Box::new(PlaneScaler::new(input, output)?))
    }
}

/// Indicates that a converter couldn't be opened or couldn't convert a frame.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConvertError {
    #[error("A sample rate of 0 Hz can't be converted.")]
    ZeroSampleRate,
    #[error("Can't convert video from {0} (only yuv420p and yuv444p sources are supported).")]
    UnsupportedSource(VideoFormat),
    #[error("Expected an audio frame in {expected} but got {actual}.")]
    WrongAudioFormat {
        expected: AudioFormat,
        actual: AudioFormat,
    },
    #[error("Expected a video frame in {expected} but got {actual}.")]
    WrongVideoFormat {
        expected: VideoFormat,
        actual: VideoFormat,
    },
}
