use super::Clock;
use crate::adapter::Input;
use crate::config::MuxConfig;
use crate::convert::{ConverterFactory, Resampler};
use crate::error::{ConfigError, MuxError};
use crate::format::{AudioFormat, MediaKind, SampleFormat};
use crate::frame::AudioFrame;
use crate::synth::AudioSynth;
use crate::time::{Rational, Rounding, rescale, rescale_rnd};

/// Generates interleaved signed 16-bit audio at the synthesizer's rate (in
/// the encoder's channel layout) and resamples it if the encoder wants
/// anything else.
pub(super) struct AudioTrack {
    synth: AudioSynth,
    raw: AudioFrame,
    output: AudioFormat,
    /// One sample at the encoder's rate.
    counter_time_base: Rational,
    converters: Box<dyn ConverterFactory>,
    conversion: Option<(Box<dyn Resampler>, AudioFrame)>,
    tail_flushed: bool,
}

impl AudioTrack {
    pub(super) fn new(
        output: AudioFormat,
        synth_rate: u32,
        frame_size: usize,
        config: &MuxConfig,
        converters: Box<dyn ConverterFactory>,
    ) -> Result<Self, MuxError> {
        let raw_format = AudioFormat {
            sample_format: SampleFormat::S16,
            layout: output.layout,
            sample_rate: synth_rate,
        };

        Ok(Self {
            synth: AudioSynth::new(synth_rate, config.tone),
            raw: AudioFrame::new(raw_format, frame_size),
            output,
            counter_time_base: Rational::per_second(output.sample_rate)
                .ok_or(ConfigError::ZeroSampleRate)?,
            converters,
            conversion: None,
            tail_flushed: false,
        })
    }

    fn in_rate(&self) -> i64 {
        self.raw.sample_rate() as i64
    }

    fn out_rate(&self) -> i64 {
        self.output.sample_rate as i64
    }

    /// The next thing to send to the encoder, or [None] if the resampler
    /// swallowed the whole frame.
    pub(super) fn next_input(
        &mut self,
        clock: &mut Clock,
        end: Rational,
        encoder_time_base: Rational,
    ) -> Result<Option<Input<'_>>, MuxError> {
        let (in_rate, out_rate) = (self.in_rate(), self.out_rate());
        let counter_time_base = self.counter_time_base;

        if clock.reached(end) {
            if !self.tail_flushed {
                self.tail_flushed = true;

                if let Some((resampler, converted)) = &mut self.conversion {
                    let delay = resampler.delay(in_rate as u32);
                    converted.reserve(rescale_rnd(delay, out_rate, in_rate, Rounding::Up).max(1) as usize);

                    let written = resampler
                        .flush(converted)
                        .map_err(|source| MuxError::Convert {
                            kind: MediaKind::Audio,
                            source,
                        })?;
                    if written > 0 {
                        converted.set_pts(rescale(
                            clock.counter,
                            counter_time_base,
                            encoder_time_base,
                        ));
                        clock.counter += written as i64;
                        return Ok(Some(Input::Audio(converted)));
                    }
                }
            }
            return Ok(Some(Input::EndOfStream));
        }

        self.synth.fill(&mut self.raw, clock.next_pts as u64);
        self.raw.set_pts(clock.next_pts);
        let samples = self.raw.samples();
        clock.next_pts += samples as i64;

        if self.raw.format() == self.output {
            self.raw.set_pts(rescale(clock.counter, counter_time_base, encoder_time_base));
            clock.counter += samples as i64;
            return Ok(Some(Input::Audio(&self.raw)));
        }

        let (resampler, converted) = match &mut self.conversion {
            Some(conversion) => conversion,
            slot => {
                let resampler = self
                    .converters
                    .open_resampler(self.raw.format(), self.output)
                    .map_err(|source| MuxError::OpenConverter {
                        kind: MediaKind::Audio,
                        source,
                    })?;
                util::debug_log_info!(
                    "Opened an audio resampler ({} -> {}).",
                    self.raw.format(),
                    self.output
                );
                slot.insert((resampler, AudioFrame::new(self.output, self.raw.capacity())))
            }
        };

        let capacity = rescale_rnd(
            resampler.delay(in_rate as u32) + samples as i64,
            out_rate,
            in_rate,
            Rounding::Up,
        );
        converted.reserve(capacity as usize);

        let written = resampler
            .convert(&self.raw, converted)
            .map_err(|source| MuxError::Convert {
                kind: MediaKind::Audio,
                source,
            })?;
        if written == 0 {
            return Ok(None);
        }

        converted.set_pts(rescale(clock.counter, counter_time_base, encoder_time_base));
        clock.counter += written as i64;
        Ok(Some(Input::Audio(converted)))
    }

    pub(super) fn close(self) {
        let Self {
            raw, conversion, ..
        } = self;

        if let Some((resampler, converted)) = conversion {
            drop(resampler);
            drop(converted);
        }
        drop(raw);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::{BuiltinConverters, MockConverterFactory};
    use crate::format::ChannelLayout;

    fn output(sample_format: SampleFormat, sample_rate: u32) -> AudioFormat {
        AudioFormat {
            sample_format,
            layout: ChannelLayout::Stereo,
            sample_rate,
        }
    }

    #[test]
    fn raw_frames_go_straight_to_a_matching_encoder() {
        let mut converters = MockConverterFactory::new();
        converters.expect_open_resampler().times(0);

        let config = MuxConfig::default();
        let mut track = AudioTrack::new(
            output(SampleFormat::S16, 44100),
            44100,
            1000,
            &config,
            Box::new(converters),
        )
        .unwrap();
        let mut clock = Clock::new(Rational::per_second(44100).unwrap());
        let tb = clock.time_base;

        let input = track.next_input(&mut clock, Rational::ONE, tb).unwrap();
        let Some(Input::Audio(frame)) = input else {
            panic!("expected a frame");
        };
        assert_eq!((frame.pts(), frame.samples()), (0, 1000));
        assert_eq!(clock.next_pts, 1000);
        assert_eq!(clock.counter, 1000);
    }

    #[test]
    fn the_end_is_sent_once_the_clock_runs_out() {
        let config = MuxConfig::default();
        let mut track = AudioTrack::new(
            output(SampleFormat::F32, 44100),
            44100,
            1000,
            &config,
            Box::new(BuiltinConverters),
        )
        .unwrap();
        let mut clock = Clock::new(Rational::per_second(44100).unwrap());
        clock.next_pts = 44100;
        let tb = clock.time_base;

        // Nothing was resampled, so there's no tail.
        assert!(matches!(
            track.next_input(&mut clock, Rational::ONE, tb).unwrap(),
            Some(Input::EndOfStream)
        ));
    }

    #[test]
    fn converted_frames_are_timestamped_at_the_encoder_rate() {
        let config = MuxConfig::default();
        let mut track = AudioTrack::new(
            output(SampleFormat::F32Planar, 8000),
            16000,
            1600,
            &config,
            Box::new(BuiltinConverters),
        )
        .unwrap();
        let mut clock = Clock::new(Rational::per_second(16000).unwrap());
        let encoder_tb = Rational::per_second(8000).unwrap();

        let mut pts = Vec::new();
        for _ in 0..3 {
            if let Some(Input::Audio(frame)) =
                track.next_input(&mut clock, Rational::ONE, encoder_tb).unwrap()
            {
                assert_eq!(frame.format(), output(SampleFormat::F32Planar, 8000));
                pts.push(frame.pts());
            }
        }

        assert_eq!(clock.next_pts, 4800);
        assert_eq!(pts[0], 0);
        assert!(pts.windows(2).all(|w| w[0] < w[1]));
        assert!((2390..=2400).contains(&clock.counter));
    }
}
