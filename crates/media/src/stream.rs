//! One output stream: its clock, the raw and converted frames it reuses, its
//! (lazily opened) converter and its encoder.
//!
//! A stream is opened, [produces](OutputStream::produce_one) packets one at a
//! time until it's finished and is then [closed](OutputStream::close).

mod audio;
mod video;

use std::cmp::Ordering;
use std::collections::VecDeque;

use crate::adapter::{AdapterState, Drained, EncoderAdapter};
use crate::codec::{CodecParameters, Encoder, MediaParameters};
use crate::config::MuxConfig;
use crate::convert::ConverterFactory;
use crate::error::{ConfigError, MuxError};
use crate::format::MediaKind;
use crate::packet::{Packet, StreamId};
use crate::scheduler::PacketSource;
use crate::time::{Rational, compare};

use audio::AudioTrack;
use video::VideoTrack;

/// The result of [OutputStream::produce_one].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// A packet, timestamped in the stream's destination time base.
    Produced(Packet),
    /// A frame went in but the encoder didn't emit anything yet.
    Pending,
    /// Every packet has been produced.
    Finished,
}

/// Where the synthesizer is.
#[derive(Debug, Clone, Copy)]
struct Clock {
    time_base: Rational,
    /// The timestamp of the next frame to generate, in [Self::time_base].
    next_pts: i64,
    /// Samples (at the encoder's rate) or frames handed to the encoder so
    /// far.
    counter: i64,
}

impl Clock {
    fn new(time_base: Rational) -> Self {
        Self {
            time_base,
            next_pts: 0,
            counter: 0,
        }
    }

    /// Whether the next frame would start at or after `end` (in seconds).
    fn reached(&self, end: Rational) -> bool {
        compare(self.next_pts, self.time_base, 1, end) != Ordering::Less
    }
}

enum Track {
    Audio(AudioTrack),
    Video(VideoTrack),
}

pub struct OutputStream {
    id: StreamId,
    kind: MediaKind,
    clock: Clock,
    end: Rational,
    track: Track,
    adapter: EncoderAdapter,
    queue: VecDeque<Packet>,
    finished: bool,
}

impl OutputStream {
    /// Set up a stream that feeds `encoder`, which was opened with `params`.
    ///
    /// Audio parameters must have their frame size filled in. The clock runs
    /// at the synthesizer's sample rate (audio) or the frame rate (video).
    /// Packets stay in the encoder's time base until
    /// [Self::set_destination] is called.
    pub fn open(
        id: StreamId,
        params: &CodecParameters,
        encoder: Box<dyn Encoder>,
        converters: Box<dyn ConverterFactory>,
        config: &MuxConfig,
    ) -> Result<Self, MuxError> {
        let (clock, track) = match params.media {
            MediaParameters::Audio(audio) => {
                let frame_size = audio
                    .frame_size
                    .ok_or_else(|| ConfigError::MissingFrameSize(params.codec.clone()))?;
                let synth_rate = config.synth_sample_rate.unwrap_or(audio.format.sample_rate);
                let time_base = Rational::per_second(synth_rate).ok_or(ConfigError::ZeroSampleRate)?;

                let track = AudioTrack::new(audio.format, synth_rate, frame_size, config, converters)?;
                (Clock::new(time_base), Track::Audio(track))
            }
            MediaParameters::Video(video) => {
                let time_base = Rational::per_second(video.frame_rate).ok_or(ConfigError::ZeroFrameRate)?;
                (Clock::new(time_base), Track::Video(VideoTrack::new(video.format, converters)))
            }
        };

        Ok(Self {
            id,
            kind: params.kind(),
            clock,
            end: config.duration,
            track,
            adapter: EncoderAdapter::new(encoder, id),
            queue: VecDeque::new(),
            finished: false,
        })
    }

    pub fn id(&self) -> StreamId {
        self.id
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    /// The timestamp of the next frame to generate, in [Self::time_base].
    pub fn next_pts(&self) -> i64 {
        self.clock.next_pts
    }

    /// The time base of the stream's clock.
    pub fn time_base(&self) -> Rational {
        self.clock.time_base
    }

    /// Samples or frames handed to the encoder so far.
    pub fn counter(&self) -> i64 {
        self.clock.counter
    }

    pub fn is_finished(&self) -> bool {
        self.finished && self.queue.is_empty()
    }

    pub fn encoder_state(&self) -> AdapterState {
        self.adapter.state()
    }

    /// Set the time base packets are emitted in (the container stream's).
    pub fn set_destination(&mut self, time_base: Rational) {
        self.adapter.set_destination(time_base);
    }

    /// Advance the stream by (at most) one packet.
    ///
    /// A packet left over from an earlier drain is returned first. Otherwise
    /// the next frame is generated, converted and sent to the encoder (or,
    /// past the end, the resampler's tail and then the end of the stream) and
    /// the encoder is drained.
    pub fn produce_one(&mut self) -> Result<Step, MuxError> {
        if let Some(packet) = self.queue.pop_front() {
            return Ok(Step::Produced(packet));
        }
        if self.finished {
            return Ok(Step::Finished);
        }

        let kind = self.kind;
        let time_base = self.adapter.time_base();
        let input = match &mut self.track {
            Track::Audio(track) => track.next_input(&mut self.clock, self.end, time_base)?,
            Track::Video(track) => track.next_input(&mut self.clock, self.end, time_base)?,
        };
        let Some(input) = input else {
            return Ok(Step::Pending);
        };

        self.adapter
            .submit(input)
            .map_err(|source| MuxError::Encode { kind, source })?;
        let drained = self
            .adapter
            .drain(&mut self.queue)
            .map_err(|source| MuxError::Encode { kind, source })?;
        if drained == Drained::Exhausted {
            self.finished = true;
        }

        Ok(match self.queue.pop_front() {
            Some(packet) => Step::Produced(packet),
            None if self.finished => Step::Finished,
            None => Step::Pending,
        })
    }

    /// Release the converter, then the frames and finally the encoder.
    pub fn close(self) {
        let Self {
            id,
            kind,
            track,
            adapter,
            queue,
            ..
        } = self;

        match track {
            Track::Audio(track) => track.close(),
            Track::Video(track) => track.close(),
        }
        adapter.close();

        if !queue.is_empty() {
            util::debug_log_warning!(
                "Closed the {kind} stream {id} with {} packets never written.",
                queue.len()
            );
        }
        util::debug_log_info!("Closed the {kind} stream {id}.");
    }
}

impl PacketSource for OutputStream {
    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn next_pts(&self) -> i64 {
        self.clock.next_pts
    }

    fn time_base(&self) -> Rational {
        self.clock.time_base
    }

    fn packet_time_base(&self) -> Rational {
        self.adapter.destination()
    }

    fn is_finished(&self) -> bool {
        OutputStream::is_finished(self)
    }

    fn produce_one(&mut self) -> Result<Step, MuxError> {
        OutputStream::produce_one(self)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    use super::*;
    use crate::codec::{
        self, EncoderOutput, MockEncoder, PcmEncoder, RawVideoEncoder, audio_parameters,
        video_parameters,
    };
    use crate::config::Options;
    use crate::convert::{BuiltinConverters, MockConverterFactory, PlaneScaler};
    use crate::format::PixelFormat;
    use crate::time::rescale;

    fn seconds(num: i64, den: i64) -> Rational {
        Rational::new(num, den).unwrap()
    }

    fn video_stream(
        config: &MuxConfig,
        converters: Box<dyn ConverterFactory>,
    ) -> OutputStream {
        let params = video_parameters(&RawVideoEncoder::descriptor(), config).unwrap();
        let encoder = RawVideoEncoder::open(&params, &mut Options::new(), 0).unwrap();
        OutputStream::open(StreamId(0), &params, Box::new(encoder), converters, config).unwrap()
    }

    fn pcm_stream(codec: codec::CodecId, config: &MuxConfig) -> OutputStream {
        let descriptor = PcmEncoder::descriptor(&codec).unwrap();
        let mut params = audio_parameters(&descriptor, config).unwrap();
        let encoder = PcmEncoder::open(&params, &mut Options::new()).unwrap();
        if let MediaParameters::Audio(audio) = &mut params.media {
            audio.frame_size = Some(
                codec::audio_frame_size(&descriptor, audio.format, encoder.frame_size(), config)
                    .unwrap(),
            );
        }
        OutputStream::open(
            StreamId(1),
            &params,
            Box::new(encoder),
            Box::new(BuiltinConverters),
            config,
        )
        .unwrap()
    }

    /// Run `stream` to the end, returning every packet.
    fn run(stream: &mut OutputStream) -> Vec<Packet> {
        let mut packets = Vec::new();
        loop {
            match stream.produce_one().unwrap() {
                Step::Produced(packet) => packets.push(packet),
                Step::Pending => {}
                Step::Finished => return packets,
            }
        }
    }

    #[test]
    fn one_second_of_video_is_25_frames() {
        let config = MuxConfig {
            duration: seconds(1, 1),
            ..MuxConfig::default()
        };
        let mut stream = video_stream(&config, Box::new(BuiltinConverters));

        let pts: Vec<_> = run(&mut stream).iter().map(|p| p.pts).collect();
        assert_eq!(pts, (0..25).collect::<Vec<_>>());
        assert_eq!(stream.next_pts(), 25);
        assert!(stream.is_finished());
        assert_eq!(stream.produce_one().unwrap(), Step::Finished);
    }

    #[test]
    fn the_frame_on_the_boundary_is_excluded() {
        // 2/25 s: frames at 0 and 1/25 start before the end, 2/25 doesn't.
        let config = MuxConfig {
            duration: seconds(2, 25),
            ..MuxConfig::default()
        };
        let mut stream = video_stream(&config, Box::new(BuiltinConverters));
        assert_eq!(run(&mut stream).len(), 2);

        // Just past the boundary it's included.
        let config = MuxConfig {
            duration: seconds(2001, 25000),
            ..MuxConfig::default()
        };
        let mut stream = video_stream(&config, Box::new(BuiltinConverters));
        assert_eq!(run(&mut stream).len(), 3);
    }

    #[test]
    fn audio_timestamps_come_from_the_sample_counter() {
        let config = MuxConfig {
            duration: seconds(1, 1),
            ..MuxConfig::default()
        };
        let mut stream = pcm_stream(codec::CodecId::PCM_S16LE, &config);
        stream.set_destination(seconds(1, 1000));

        let packets = run(&mut stream);
        assert_eq!(packets.len(), 5);
        assert!(stream.counter() >= 44100);
        assert_eq!(stream.counter(), 50_000);

        let tb = Rational::per_second(44100).unwrap();
        for (n, packet) in packets.iter().enumerate() {
            assert_eq!(packet.pts, rescale(n as i64 * 10_000, tb, seconds(1, 1000)));
            assert_eq!(packet.stream, StreamId(1));
        }
        assert_eq!(packets.last().unwrap().pts, 907);
    }

    #[test]
    fn next_pts_grows_by_one_frame_per_step() {
        let config = MuxConfig::default();
        let mut stream = pcm_stream(codec::CodecId::PCM_F32LE, &config);

        for step in 1..=20 {
            assert!(matches!(stream.produce_one().unwrap(), Step::Produced(_)));
            assert_eq!(stream.next_pts(), step * 10_000);
            assert_eq!(stream.counter(), step * 10_000);
        }
    }

    #[test]
    fn resampled_audio_flushes_its_tail() {
        let config = MuxConfig {
            duration: seconds(1, 1),
            synth_sample_rate: Some(48000),
            ..MuxConfig::default()
        };
        let mut stream = pcm_stream(codec::CodecId::PCM_F32LE, &config);
        assert_eq!(stream.time_base(), Rational::per_second(48000).unwrap());

        let packets = run(&mut stream);

        // 50000 samples at 48 kHz end up as ceil(50000 * 44100 / 48000)
        // samples at 44.1 kHz, the last one only after the flush.
        assert_eq!(stream.counter(), 45_938);
        assert_eq!(packets.len(), 6);
        assert!(packets.windows(2).all(|w| w[0].pts + w[0].duration == w[1].pts));
    }

    #[test]
    fn matching_formats_never_open_a_converter() {
        let mut converters = MockConverterFactory::new();
        converters.expect_open_scaler().times(0);
        converters.expect_open_resampler().times(0);

        let config = MuxConfig {
            duration: seconds(1, 5),
            ..MuxConfig::default()
        };
        let mut stream = video_stream(&config, Box::new(converters));
        assert_eq!(run(&mut stream).len(), 5);
        stream.close();
    }

    #[test]
    fn different_formats_open_one_scaler() {
        let mut converters = MockConverterFactory::new();
        converters
            .expect_open_scaler()
            .times(1)
            .returning(|input, output| Ok(Box::new(PlaneScaler::new(input, output).unwrap())));

        let config = MuxConfig {
            duration: seconds(1, 5),
            pixel_format: PixelFormat::Rgb24,
            ..MuxConfig::default()
        };
        let mut stream = video_stream(&config, Box::new(converters));

        let packets = run(&mut stream);
        assert_eq!(packets.len(), 5);
        assert_eq!(packets[0].data.len(), 352 * 288 * 3);
    }

    #[test]
    fn buffered_input_needs_no_extra_pulls() {
        let pulls = Arc::new(AtomicUsize::new(0));
        let mut outputs = VecDeque::from([
            EncoderOutput::NeedsMoreInput,
            EncoderOutput::NeedsMoreInput,
            EncoderOutput::NeedsMoreInput,
            EncoderOutput::Produced(Packet {
                data: vec![1, 2, 3],
                pts: 0,
                dts: 0,
                duration: 1,
                stream: StreamId(0),
                keyframe: true,
            }),
            EncoderOutput::NeedsMoreInput,
        ]);

        let mut encoder = MockEncoder::new();
        encoder
            .expect_time_base()
            .return_const(Rational::per_second(25).unwrap());
        encoder.expect_send_video().times(4).returning(|_| Ok(()));
        let counter = Arc::clone(&pulls);
        encoder.expect_receive_packet().times(5).returning(move || {
            counter.fetch_add(1, AtomicOrdering::SeqCst);
            outputs.pop_front().expect("pulled too often")
        });

        let config = MuxConfig::default();
        let params = video_parameters(&RawVideoEncoder::descriptor(), &config).unwrap();
        let mut stream = OutputStream::open(
            StreamId(0),
            &params,
            Box::new(encoder),
            Box::new(BuiltinConverters),
            &config,
        )
        .unwrap();

        for _ in 0..3 {
            assert_eq!(stream.produce_one().unwrap(), Step::Pending);
        }
        assert_eq!(pulls.load(AtomicOrdering::SeqCst), 3);

        let Step::Produced(packet) = stream.produce_one().unwrap() else {
            panic!("expected a packet");
        };
        assert_eq!(packet.data, [1, 2, 3]);
        assert_eq!(pulls.load(AtomicOrdering::SeqCst), 5);
        assert_eq!(stream.next_pts(), 4);
    }

    #[test]
    fn extra_packets_are_returned_before_new_input() {
        let mut outputs = VecDeque::from([
            EncoderOutput::Produced(packet(0)),
            EncoderOutput::Produced(packet(1)),
            EncoderOutput::NeedsMoreInput,
        ]);

        let mut encoder = MockEncoder::new();
        encoder
            .expect_time_base()
            .return_const(Rational::per_second(25).unwrap());
        encoder.expect_send_video().times(1).returning(|_| Ok(()));
        encoder
            .expect_receive_packet()
            .times(3)
            .returning(move || outputs.pop_front().expect("pulled too often"));

        let config = MuxConfig::default();
        let params = video_parameters(&RawVideoEncoder::descriptor(), &config).unwrap();
        let mut stream = OutputStream::open(
            StreamId(0),
            &params,
            Box::new(encoder),
            Box::new(BuiltinConverters),
            &config,
        )
        .unwrap();

        assert_eq!(stream.produce_one().unwrap(), Step::Produced(packet(0)));
        assert_eq!(stream.produce_one().unwrap(), Step::Produced(packet(1)));
        assert_eq!(stream.next_pts(), 1);
    }

    fn packet(pts: i64) -> Packet {
        Packet {
            data: Vec::new(),
            pts,
            dts: pts,
            duration: 1,
            stream: StreamId(0),
            keyframe: true,
        }
    }

    #[test]
    fn encoder_failures_carry_the_stream_kind() {
        let mut encoder = MockEncoder::new();
        encoder
            .expect_time_base()
            .return_const(Rational::per_second(25).unwrap());
        encoder.expect_send_video().returning(|_| Ok(()));
        encoder
            .expect_receive_packet()
            .returning(|| EncoderOutput::Fatal(codec::EncodeError::Other("broken".to_string())));

        let config = MuxConfig::default();
        let params = video_parameters(&RawVideoEncoder::descriptor(), &config).unwrap();
        let mut stream = OutputStream::open(
            StreamId(0),
            &params,
            Box::new(encoder),
            Box::new(BuiltinConverters),
            &config,
        )
        .unwrap();

        assert!(matches!(
            stream.produce_one(),
            Err(MuxError::Encode {
                kind: MediaKind::Video,
                ..
            })
        ));
        assert_eq!(stream.encoder_state(), AdapterState::Failed);
    }
}
