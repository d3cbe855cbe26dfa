//! The errors that end a run, with enough context to say which part of the
//! pipeline failed.

use crate::codec::{CodecId, EncodeError};
use crate::convert::ConvertError;
use crate::format::MediaKind;
use crate::sink::SinkError;
use crate::time::Rational;

/// Anything that stops a run. Every component error is wrapped with the
/// stream (or operation) it happened in.
#[derive(thiserror::Error, Debug)]
pub enum MuxError {
    #[error("Invalid configuration.")]
    Config(#[from] ConfigError),
    #[error("Couldn't open the output `{path}`.")]
    OpenOutput {
        path: String,
        #[source]
        source: SinkError,
    },
    #[error("Couldn't find an encoder for `{0}`.")]
    EncoderNotFound(CodecId),
    #[error("Couldn't open the {kind} encoder `{codec}`.")]
    OpenEncoder {
        kind: MediaKind,
        codec: CodecId,
        #[source]
        source: EncodeError,
    },
    #[error("Couldn't open the {kind} converter.")]
    OpenConverter {
        kind: MediaKind,
        #[source]
        source: ConvertError,
    },
    #[error("Couldn't convert a {kind} frame.")]
    Convert {
        kind: MediaKind,
        #[source]
        source: ConvertError,
    },
    #[error("Couldn't encode a {kind} frame.")]
    Encode {
        kind: MediaKind,
        #[source]
        source: EncodeError,
    },
    #[error("Couldn't {operation}.")]
    Sink {
        operation: SinkOperation,
        #[source]
        source: SinkError,
    },
}

/// What was being done with the container when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkOperation {
    DeclareStream(MediaKind),
    WriteHeader,
    WritePacket(MediaKind),
    WriteTrailer,
    Close,
}

impl std::fmt::Display for SinkOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkOperation::DeclareStream(kind) => write!(f, "add the {kind} stream"),
            SinkOperation::WriteHeader => f.write_str("write the header"),
            SinkOperation::WritePacket(kind) => write!(f, "write a packet to the {kind} stream"),
            SinkOperation::WriteTrailer => f.write_str("write the trailer"),
            SinkOperation::Close => f.write_str("close the output"),
        }
    }
}

/// A configuration that can't produce a valid output.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("The duration must be positive (got {0} seconds).")]
    NonPositiveDuration(Rational),
    #[error("The frame rate can't be 0.")]
    ZeroFrameRate,
    #[error("The sample rate can't be 0.")]
    ZeroSampleRate,
    #[error("The audio frame size can't be 0.")]
    ZeroFrameSize,
    #[error("The `{0}` encoder has a fixed frame size but didn't say what it is.")]
    MissingFrameSize(CodecId),
    #[error(
        "The `{codec}` encoder needs exactly {frame_size} samples per frame, which \
        can't be kept up when resampling from {synth_rate} Hz to {encoder_rate} Hz."
    )]
    FixedFrameSizeWithResampling {
        codec: CodecId,
        frame_size: usize,
        synth_rate: u32,
        encoder_rate: u32,
    },
}

/// Walk an error's [source](std::error::Error::source) chain, joining every
/// message (e.g. `Couldn't encode a video frame. The encoder ...`).
pub fn report(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(err) = source {
        message.push(' ');
        message.push_str(&err.to_string());
        source = err.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_include_the_whole_chain() {
        let err = MuxError::Encode {
            kind: MediaKind::Video,
            source: EncodeError::Busy,
        };
        assert_eq!(
            report(&err),
            "Couldn't encode a video frame. The encoder's output must be received \
            before it can take more input."
        );

        let err = MuxError::Sink {
            operation: SinkOperation::WritePacket(MediaKind::Audio),
            source: SinkError::HeaderNotWritten,
        };
        assert!(report(&err).starts_with("Couldn't write a packet to the audio stream."));
    }
}
