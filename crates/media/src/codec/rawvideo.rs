use std::collections::VecDeque;

use super::{
    CodecDescriptor, CodecId, CodecParameters, EncodeError, Encoder, EncoderOutput,
    MediaParameters, take_codec_flags,
};
use crate::config::Options;
use crate::format::{MediaKind, PixelFormat, VideoFormat};
use crate::frame::{AudioFrame, VideoFrame};
use crate::packet::{Packet, StreamId};
use crate::time::Rational;

/// Uncompressed video (`rawvideo`): every packet is one frame's planes, back
/// to back without row padding.
///
/// The encoder can hold back a fixed number of frames before emitting the
/// first packet, like an encoder with lookahead. Held frames come out after
/// the end of the stream is sent.
#[derive(Debug)]
pub struct RawVideoEncoder {
    codec: CodecId,
    format: VideoFormat,
    time_base: Rational,
    delay: usize,
    queue: VecDeque<Packet>,
    ended: bool,
}

impl RawVideoEncoder {
    pub fn descriptor() -> CodecDescriptor {
        CodecDescriptor {
            id: CodecId::RAWVIDEO,
            kind: MediaKind::Video,
            long_name: "raw video".to_string(),
            sample_formats: Vec::new(),
            sample_rates: Vec::new(),
            channel_layouts: Vec::new(),
            pixel_formats: vec![
                PixelFormat::Yuv420p,
                PixelFormat::Yuv444p,
                PixelFormat::Gray8,
                PixelFormat::Rgb24,
                PixelFormat::Rgba,
            ],
            variable_frame_size: false,
        }
    }

    /// Open an encoder that holds back `delay` frames.
    pub fn open(
        params: &CodecParameters,
        options: &mut Options,
        delay: usize,
    ) -> Result<Self, EncodeError> {
        if params.codec != CodecId::RAWVIDEO {
            return Err(EncodeError::Unsupported {
                codec: params.codec.clone(),
                what: "raw video encoding".to_string(),
            });
        }
        let MediaParameters::Video(video) = params.media else {
            return Err(EncodeError::WrongMediaKind {
                codec: params.codec.clone(),
                kind: MediaKind::Audio,
            });
        };

        take_codec_flags(options)?;

        Ok(Self {
            codec: params.codec.clone(),
            format: video.format,
            time_base: params.time_base,
            delay,
            queue: VecDeque::with_capacity(delay + 1),
            ended: false,
        })
    }
}

impl Encoder for RawVideoEncoder {
    fn time_base(&self) -> Rational {
        self.time_base
    }

    fn frame_size(&self) -> Option<usize> {
        None
    }

    fn send_audio(&mut self, _frame: &AudioFrame) -> Result<(), EncodeError> {
        Err(EncodeError::WrongMediaKind {
            codec: self.codec.clone(),
            kind: MediaKind::Audio,
        })
    }

    fn send_video(&mut self, frame: &VideoFrame) -> Result<(), EncodeError> {
        if self.ended {
            return Err(EncodeError::AfterEndOfStream);
        }
        if self.queue.len() > self.delay {
            return Err(EncodeError::Busy);
        }
        if frame.format() != self.format {
            return Err(EncodeError::WrongVideoFormat {
                expected: self.format,
                actual: frame.format(),
            });
        }

        self.queue.push_back(Packet {
            data: frame.to_packed_bytes(),
            pts: frame.pts(),
            dts: frame.pts(),
            duration: 1,
            stream: StreamId(0),
            keyframe: true,
        });
        Ok(())
    }

    fn send_end_of_stream(&mut self) -> Result<(), EncodeError> {
        if self.ended {
            return Err(EncodeError::AfterEndOfStream);
        }
        self.ended = true;
        Ok(())
    }

    fn receive_packet(&mut self) -> EncoderOutput {
        if !self.ended && self.queue.len() <= self.delay {
            return EncoderOutput::NeedsMoreInput;
        }

        match self.queue.pop_front() {
            Some(packet) => EncoderOutput::Produced(packet),
            None => EncoderOutput::Exhausted,
        }
    }
}
