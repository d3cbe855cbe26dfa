//! Encoders: what they support ([CodecDescriptor]), how they're configured
//! ([CodecParameters]) and how frames go in and packets come out
//! ([Encoder]).

mod negotiate;
mod pcm;
mod rawvideo;

use std::borrow::Cow;
use std::fmt::{self, Display, Formatter};

use crate::config::{FlagChange, Options, parse_flags};
use crate::format::{AudioFormat, ChannelLayout, MediaKind, PixelFormat, SampleFormat, VideoFormat};
use crate::frame::{AudioFrame, VideoFrame};
use crate::packet::Packet;
use crate::time::Rational;

pub use negotiate::*;
pub use pcm::PcmEncoder;
pub use rawvideo::RawVideoEncoder;

/// The name of a codec, e.g. `pcm_f32le`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CodecId(Cow<'static, str>);

impl CodecId {
    pub const PCM_F32LE: Self = Self(Cow::Borrowed("pcm_f32le"));
    pub const PCM_S16LE: Self = Self(Cow::Borrowed("pcm_s16le"));
    pub const RAWVIDEO: Self = Self(Cow::Borrowed("rawvideo"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl Display for CodecId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What an encoder supports.
///
/// An empty list means the encoder doesn't restrict that property (or didn't
/// say), not that it supports nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecDescriptor {
    pub id: CodecId,
    pub kind: MediaKind,
    pub long_name: String,
    pub sample_formats: Vec<SampleFormat>,
    pub sample_rates: Vec<u32>,
    pub channel_layouts: Vec<ChannelLayout>,
    pub pixel_formats: Vec<PixelFormat>,
    /// Whether audio frames may hold any number of samples. If not, every
    /// frame must hold exactly [Encoder::frame_size] samples.
    pub variable_frame_size: bool,
}

/// Everything needed to open an encoder, also declared to the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecParameters {
    pub codec: CodecId,
    pub bit_rate: u64,
    /// The time base frames are timestamped in when they're sent to the
    /// encoder.
    pub time_base: Rational,
    pub media: MediaParameters,
    /// Whether the container stores codec headers once for the whole stream,
    /// so the encoder should put them in [Self::extradata] rather than in
    /// the packets.
    pub global_header: bool,
    /// The codec's out-of-band setup data, taken from the opened encoder.
    pub extradata: Vec<u8>,
}

impl CodecParameters {
    pub fn kind(&self) -> MediaKind {
        match self.media {
            MediaParameters::Audio(_) => MediaKind::Audio,
            MediaParameters::Video(_) => MediaKind::Video,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaParameters {
    Audio(AudioParameters),
    Video(VideoParameters),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioParameters {
    pub format: AudioFormat,
    /// Samples per channel in every frame. Only known once the encoder has
    /// been opened.
    pub frame_size: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoParameters {
    pub format: VideoFormat,
    pub frame_rate: u32,
    /// Emit an intra frame at least this often.
    pub gop: u32,
}

/// What came out of [Encoder::receive_packet].
#[derive(Debug)]
pub enum EncoderOutput {
    /// A packet, timestamped in [Encoder::time_base].
    Produced(Packet),
    /// Nothing is ready until more input (or the end of the stream) is sent.
    NeedsMoreInput,
    /// The end of the stream was sent and every packet has been received.
    Exhausted,
    /// The encoder failed and can't be used anymore.
    Fatal(EncodeError),
}

/// An open encoder. It's closed when dropped.
///
/// # Contract
///
/// After a frame (or the end of the stream) is sent, [Encoder::receive_packet]
/// must be called until it stops returning [EncoderOutput::Produced] before
/// anything else is sent. Frames must be timestamped in
/// [Encoder::time_base] and have the format the encoder was opened with.
#[cfg_attr(test, mockall::automock)]
pub trait Encoder {
    /// The time base of the timestamps going in and coming out.
    fn time_base(&self) -> Rational;

    /// The exact number of samples every audio frame must have, or [None] if
    /// any number works.
    fn frame_size(&self) -> Option<usize>;

    fn send_audio(&mut self, frame: &AudioFrame) -> Result<(), EncodeError>;

    fn send_video(&mut self, frame: &VideoFrame) -> Result<(), EncodeError>;

    /// Signal that no more frames will be sent, so everything buffered should
    /// be flushed out.
    fn send_end_of_stream(&mut self) -> Result<(), EncodeError>;

    fn receive_packet(&mut self) -> EncoderOutput;

    /// Setup data the container needs before any packet (only produced when
    /// the encoder was opened with [CodecParameters::global_header]).
    fn extradata(&self) -> Vec<u8> {
        Vec::new()
    }
}

/// The `flags` an encoder accepts (FFmpeg's names).
const CODEC_FLAGS: &[&str] = &[
    "unaligned",
    "mv4",
    "qpel",
    "loop",
    "qscale",
    "pass1",
    "pass2",
    "gray",
    "psnr",
    "ildct",
    "low_delay",
    "global_header",
    "bitexact",
    "aic",
    "ilme",
    "cgop",
    "output_corrupt",
];

/// Consume the `flags` option (if it was given) and check that it only names
/// flags an encoder knows.
pub(crate) fn take_codec_flags(options: &mut Options) -> Result<Vec<FlagChange>, EncodeError> {
    let Some(value) = options.take("flags") else {
        return Ok(Vec::new());
    };

    let invalid = || EncodeError::InvalidOption {
        key: "flags".to_string(),
        value: value.clone(),
    };
    let changes = parse_flags(&value).map_err(|_| invalid())?;
    if changes.iter().any(|c| !CODEC_FLAGS.contains(&c.name.as_str())) {
        return Err(invalid());
    }

    Ok(changes)
}

/// Indicates that an encoder couldn't be opened or failed to encode.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("The {codec} encoder can't encode {kind}.")]
    WrongMediaKind { codec: CodecId, kind: MediaKind },
    #[error("The {codec} encoder doesn't support {what}.")]
    Unsupported { codec: CodecId, what: String },
    #[error("The option `{key}` has an invalid value `{value}`.")]
    InvalidOption { key: String, value: String },
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
    #[error("The encoder's output must be received before it can take more input.")]
    Busy,
    #[error("The encoder already received the end of the stream.")]
    AfterEndOfStream,
    #[error("The encoder asked for more input after the end of the stream.")]
    InputAfterEndOfStream,
    #[error("The encoder ran out of output before the end of the stream.")]
    ExhaustedEarly,
    #[error("The encoder can't be used after it failed.")]
    AlreadyFailed,
    #[error("{0}")]
    Other(String),
}
