use super::Clock;
use crate::adapter::Input;
use crate::convert::{ConverterFactory, Scaler};
use crate::error::MuxError;
use crate::format::{MediaKind, PixelFormat, VideoFormat};
use crate::frame::VideoFrame;
use crate::synth::VideoSynth;
use crate::time::{Rational, rescale};

/// Generates `yuv420p` frames at the encoder's size and converts them if the
/// encoder wants another pixel format.
pub(super) struct VideoTrack {
    raw: VideoFrame,
    output: VideoFormat,
    converters: Box<dyn ConverterFactory>,
    conversion: Option<(Box<dyn Scaler>, VideoFrame)>,
}

impl VideoTrack {
    pub(super) fn new(output: VideoFormat, converters: Box<dyn ConverterFactory>) -> Self {
        Self {
            raw: VideoFrame::new(VideoFormat {
                pixel_format: PixelFormat::Yuv420p,
                dimensions: output.dimensions,
            }),
            output,
            converters,
            conversion: None,
        }
    }

    pub(super) fn next_input(
        &mut self,
        clock: &mut Clock,
        end: Rational,
        encoder_time_base: Rational,
    ) -> Result<Option<Input<'_>>, MuxError> {
        if clock.reached(end) {
            return Ok(Some(Input::EndOfStream));
        }

        VideoSynth.fill(&mut self.raw, clock.next_pts);
        clock.next_pts += 1;
        let pts = rescale(clock.counter, clock.time_base, encoder_time_base);
        clock.counter += 1;

        if self.raw.format() == self.output {
            self.raw.set_pts(pts);
            return Ok(Some(Input::Video(&self.raw)));
        }

        let (scaler, converted) = match &mut self.conversion {
            Some(conversion) => conversion,
            slot => {
                let scaler = self
                    .converters
                    .open_scaler(self.raw.format(), self.output)
                    .map_err(|source| MuxError::OpenConverter {
                        kind: MediaKind::Video,
                        source,
                    })?;
                util::debug_log_info!(
                    "Opened a video scaler ({} -> {}).",
                    self.raw.format(),
                    self.output
                );
                slot.insert((scaler, VideoFrame::new(self.output)))
            }
        };

        scaler
            .scale(&self.raw, converted)
            .map_err(|source| MuxError::Convert {
                kind: MediaKind::Video,
                source,
            })?;
        converted.set_pts(pts);
        Ok(Some(Input::Video(converted)))
    }

    pub(super) fn close(self) {
        let Self {
            raw, conversion, ..
        } = self;

        if let Some((scaler, converted)) = conversion {
            drop(scaler);
            drop(converted);
        }
        drop(raw);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::{ConvertError, MockConverterFactory, MockScaler};

    fn format(pixel_format: PixelFormat) -> VideoFormat {
        VideoFormat {
            pixel_format,
            dimensions: (16, 8).into(),
        }
    }

    #[test]
    fn the_scaler_is_opened_once_and_reused() {
        let mut converters = MockConverterFactory::new();
        converters.expect_open_scaler().times(1).returning(|_, _| {
            let mut scaler = MockScaler::new();
            scaler.expect_scale().times(3).returning(|_, _| Ok(()));
            Ok(Box::new(scaler))
        });

        let mut track = VideoTrack::new(format(PixelFormat::Gray8), Box::new(converters));
        let mut clock = Clock::new(Rational::per_second(25).unwrap());
        let tb = clock.time_base;

        for expected in 0..3 {
            let input = track.next_input(&mut clock, Rational::ONE, tb).unwrap();
            let Some(Input::Video(frame)) = input else {
                panic!("expected a frame");
            };
            assert_eq!(frame.pixel_format(), PixelFormat::Gray8);
            assert_eq!(frame.pts(), expected);
        }
        track.close();
    }

    #[test]
    fn failing_to_open_the_scaler_is_reported() {
        let mut converters = MockConverterFactory::new();
        converters
            .expect_open_scaler()
            .returning(|input, _| Err(ConvertError::UnsupportedSource(input)));

        let mut track = VideoTrack::new(format(PixelFormat::Rgba), Box::new(converters));
        let mut clock = Clock::new(Rational::per_second(25).unwrap());
        let tb = clock.time_base;

        assert!(matches!(
            track.next_input(&mut clock, Rational::ONE, tb),
            Err(MuxError::OpenConverter {
                kind: MediaKind::Video,
                ..
            })
        ));
    }
}
