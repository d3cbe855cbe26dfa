//! Containers: where finished packets are stored.

mod ebml;
mod matroska;
mod recording;

use crate::codec::{CodecId, CodecParameters};
use crate::config::{FlagChange, Options, parse_flags};
use crate::format::MediaKind;
use crate::packet::{Packet, StreamId};
use crate::time::Rational;

pub use matroska::MatroskaSink;
pub use recording::{PacketRecorder, Recording, RecordingHandle};

/// A container being written.
///
/// # Contract
///
/// Streams are declared first, then the header is written, then packets
/// (timestamped in [ContainerSink::stream_time_base]) and finally the
/// trailer. Calls out of that order fail with a [SinkError].
#[cfg_attr(test, mockall::automock)]
pub trait ContainerSink {
    /// The container's short name (e.g. `matroska`).
    fn format_name(&self) -> &'static str;

    /// The codec the container prefers for `kind`.
    fn default_codec(&self, kind: MediaKind) -> CodecId;

    /// Whether codec headers go in the container header instead of the
    /// packets. Encoders have to be told before they're opened.
    fn needs_global_header(&self) -> bool {
        false
    }

    fn declare_stream(&mut self, params: &CodecParameters) -> Result<StreamId, SinkError>;

    /// Write the header, consuming the container options (`fflags`) it
    /// understands. The final stream time bases are known afterwards.
    fn write_header(&mut self, options: &mut Options) -> Result<(), SinkError>;

    /// The time base packets for `stream` have to be in. May change when the
    /// header is written.
    fn stream_time_base(&self, stream: StreamId) -> Option<Rational>;

    /// Store a packet. Its DTS must not be before the previous one on the
    /// same stream.
    fn write_packet(&mut self, packet: Packet) -> Result<(), SinkError>;

    fn write_trailer(&mut self) -> Result<(), SinkError>;

    /// Flush everything out. Nothing can be written afterwards.
    fn close(&mut self) -> Result<(), SinkError>;
}

/// Indicates that a container couldn't be written.
#[derive(thiserror::Error, Debug)]
pub enum SinkError {
    #[error("Couldn't write to the output.")]
    Io(#[from] std::io::Error),
    #[error("The {format} container can't store `{codec}`.")]
    UnsupportedCodec { format: &'static str, codec: CodecId },
    #[error("The option `{key}` has an invalid value `{value}`.")]
    InvalidOption { key: String, value: String },
    #[error("There is no stream {0}.")]
    UnknownStream(StreamId),
    #[error("The container has no streams.")]
    NoStreams,
    #[error("Streams can't be added after the header was written.")]
    DeclareAfterHeader,
    #[error("The header was already written.")]
    HeaderAlreadyWritten,
    #[error("The header has to be written first.")]
    HeaderNotWritten,
    #[error("Nothing can be written after the trailer.")]
    AfterTrailer,
    #[error("Stream {stream} got DTS {dts} after DTS {previous}.")]
    NonMonotonicDts {
        stream: StreamId,
        previous: i64,
        dts: i64,
    },
    #[error("{0}")]
    Other(String),
}

/// The `fflags` a container accepts (FFmpeg's names).
const FORMAT_FLAGS: &[&str] = &[
    "ignidx",
    "genpts",
    "nofillin",
    "noparse",
    "igndts",
    "discardcorrupt",
    "sortdts",
    "fastseek",
    "nobuffer",
    "flush_packets",
    "bitexact",
    "shortest",
    "autobsf",
];

/// Consume the `fflags` option (if it was given) and check that it only
/// names flags a container knows.
pub(crate) fn take_format_flags(options: &mut Options) -> Result<Vec<FlagChange>, SinkError> {
    let Some(value) = options.take("fflags") else {
        return Ok(Vec::new());
    };

    let invalid = || SinkError::InvalidOption {
        key: "fflags".to_string(),
        value: value.clone(),
    };
    let changes = parse_flags(&value).map_err(|_| invalid())?;
    if changes.iter().any(|c| !FORMAT_FLAGS.contains(&c.name.as_str())) {
        return Err(invalid());
    }

    Ok(changes)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Phase {
    #[default]
    Declaring,
    Writing,
    Finished,
    Closed,
}

/// Enforces the order of [ContainerSink] calls and the per-stream DTS order.
#[derive(Debug, Default)]
pub(crate) struct Lifecycle {
    phase: Phase,
    last_dts: Vec<Option<i64>>,
}

impl Lifecycle {
    pub(crate) fn declare(&mut self) -> Result<StreamId, SinkError> {
        if self.phase != Phase::Declaring {
            return Err(SinkError::DeclareAfterHeader);
        }
        self.last_dts.push(None);
        Ok(StreamId(self.last_dts.len() - 1))
    }

    pub(crate) fn header(&mut self) -> Result<(), SinkError> {
        match self.phase {
            Phase::Declaring if self.last_dts.is_empty() => Err(SinkError::NoStreams),
            Phase::Declaring => {
                self.phase = Phase::Writing;
                Ok(())
            }
            Phase::Writing => Err(SinkError::HeaderAlreadyWritten),
            Phase::Finished | Phase::Closed => Err(SinkError::AfterTrailer),
        }
    }

    pub(crate) fn packet(&mut self, packet: &Packet) -> Result<(), SinkError> {
        match self.phase {
            Phase::Declaring => return Err(SinkError::HeaderNotWritten),
            Phase::Writing => {}
            Phase::Finished | Phase::Closed => return Err(SinkError::AfterTrailer),
        }

        let last = self
            .last_dts
            .get_mut(packet.stream.0)
            .ok_or(SinkError::UnknownStream(packet.stream))?;
        if let Some(previous) = *last
            && packet.dts < previous
        {
            return Err(SinkError::NonMonotonicDts {
                stream: packet.stream,
                previous,
                dts: packet.dts,
            });
        }
        *last = Some(packet.dts);
        Ok(())
    }

    pub(crate) fn trailer(&mut self) -> Result<(), SinkError> {
        match self.phase {
            Phase::Declaring => Err(SinkError::HeaderNotWritten),
            Phase::Writing => {
                self.phase = Phase::Finished;
                Ok(())
            }
            Phase::Finished | Phase::Closed => Err(SinkError::AfterTrailer),
        }
    }

    /// Returns whether the sink was already closed.
    pub(crate) fn close(&mut self) -> bool {
        std::mem::replace(&mut self.phase, Phase::Closed) == Phase::Closed
    }

    pub(crate) fn header_written(&self) -> bool {
        self.phase != Phase::Declaring
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(stream: usize, dts: i64) -> Packet {
        Packet {
            data: Vec::new(),
            pts: dts,
            dts,
            duration: 1,
            stream: StreamId(stream),
            keyframe: true,
        }
    }

    #[test]
    fn calls_must_come_in_order() {
        let mut lifecycle = Lifecycle::default();
        assert!(matches!(lifecycle.header(), Err(SinkError::NoStreams)));
        assert!(matches!(
            lifecycle.packet(&packet(0, 0)),
            Err(SinkError::HeaderNotWritten)
        ));

        assert_eq!(lifecycle.declare().unwrap(), StreamId(0));
        assert_eq!(lifecycle.declare().unwrap(), StreamId(1));
        lifecycle.header().unwrap();
        assert!(matches!(
            lifecycle.declare(),
            Err(SinkError::DeclareAfterHeader)
        ));
        assert!(matches!(
            lifecycle.header(),
            Err(SinkError::HeaderAlreadyWritten)
        ));

        lifecycle.packet(&packet(1, 0)).unwrap();
        assert!(matches!(
            lifecycle.packet(&packet(2, 0)),
            Err(SinkError::UnknownStream(StreamId(2)))
        ));

        lifecycle.trailer().unwrap();
        assert!(matches!(
            lifecycle.packet(&packet(0, 5)),
            Err(SinkError::AfterTrailer)
        ));
        assert!(!lifecycle.close());
        assert!(lifecycle.close());
    }

    #[test]
    fn dts_must_not_go_back_per_stream() {
        let mut lifecycle = Lifecycle::default();
        lifecycle.declare().unwrap();
        lifecycle.declare().unwrap();
        lifecycle.header().unwrap();

        lifecycle.packet(&packet(0, 10)).unwrap();
        lifecycle.packet(&packet(0, 10)).unwrap();
        // Other streams have their own order.
        lifecycle.packet(&packet(1, 3)).unwrap();
        assert!(matches!(
            lifecycle.packet(&packet(0, 9)),
            Err(SinkError::NonMonotonicDts {
                previous: 10,
                dts: 9,
                ..
            })
        ));
    }

    #[test]
    fn format_flags_are_checked() {
        let mut options = Options::from_args(["-fflags", "+bitexact-genpts"]);
        let changes = take_format_flags(&mut options).unwrap();
        assert_eq!(changes.len(), 2);
        assert_eq!(options.unused().count(), 0);

        let mut options = Options::from_args(["-fflags", "+nonsense"]);
        assert!(matches!(
            take_format_flags(&mut options),
            Err(SinkError::InvalidOption { .. })
        ));

        assert!(take_format_flags(&mut Options::new()).unwrap().is_empty());
    }
}
