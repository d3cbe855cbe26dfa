use super::{
    CodecDescriptor, CodecId, CodecParameters, EncodeError, Encoder, EncoderOutput,
    MediaParameters, take_codec_flags,
};
use crate::config::Options;
use crate::format::{AudioFormat, MediaKind, SampleFormat};
use crate::frame::{AudioFrame, VideoFrame};
use crate::packet::{Packet, StreamId};
use crate::time::Rational;

/// Uncompressed little-endian PCM (`pcm_f32le` or `pcm_s16le`).
///
/// Every frame becomes exactly one packet, available right after the frame
/// was sent, so the encoder never delays anything.
#[derive(Debug)]
pub struct PcmEncoder {
    codec: CodecId,
    format: AudioFormat,
    time_base: Rational,
    pending: Option<Packet>,
    ended: bool,
}

impl PcmEncoder {
    /// What the encoder for `codec` supports, or [None] if `codec` isn't a PCM
    /// codec this encoder knows.
    pub fn descriptor(codec: &CodecId) -> Option<CodecDescriptor> {
        let (sample_format, long_name) = match codec.name() {
            "pcm_f32le" => (SampleFormat::F32, "PCM 32-bit floating point little-endian"),
            "pcm_s16le" => (SampleFormat::S16, "PCM signed 16-bit little-endian"),
            _ => return None,
        };

        Some(CodecDescriptor {
            id: codec.clone(),
            kind: MediaKind::Audio,
            long_name: long_name.to_string(),
            sample_formats: vec![sample_format],
            sample_rates: Vec::new(),
            channel_layouts: Vec::new(),
            variable_frame_size: true,
            pixel_formats: Vec::new(),
        })
    }

    pub fn open(params: &CodecParameters, options: &mut Options) -> Result<Self, EncodeError> {
        let descriptor = Self::descriptor(&params.codec).ok_or_else(|| EncodeError::Unsupported {
            codec: params.codec.clone(),
            what: "PCM encoding".to_string(),
        })?;

        let MediaParameters::Audio(audio) = params.media else {
            return Err(EncodeError::WrongMediaKind {
                codec: params.codec.clone(),
                kind: MediaKind::Video,
            });
        };
        if !descriptor
            .sample_formats
            .contains(&audio.format.sample_format)
        {
            return Err(EncodeError::Unsupported {
                codec: params.codec.clone(),
                what: format!("the {} sample format", audio.format.sample_format),
            });
        }

        // Raw samples come out the same with or without any flag.
        take_codec_flags(options)?;

        Ok(Self {
            codec: params.codec.clone(),
            format: audio.format,
            time_base: params.time_base,
            pending: None,
            ended: false,
        })
    }
}

impl Encoder for PcmEncoder {
    fn time_base(&self) -> Rational {
        self.time_base
    }

    fn frame_size(&self) -> Option<usize> {
        None
    }

    fn send_audio(&mut self, frame: &AudioFrame) -> Result<(), EncodeError> {
        if self.ended {
            return Err(EncodeError::AfterEndOfStream);
        }
        if self.pending.is_some() {
            return Err(EncodeError::Busy);
        }
        if frame.format() != self.format {
            return Err(EncodeError::WrongAudioFormat {
                expected: self.format,
                actual: frame.format(),
            });
        }

        self.pending = Some(Packet {
            data: frame.to_le_bytes(),
            pts: frame.pts(),
            dts: frame.pts(),
            duration: frame.samples() as i64,
            stream: StreamId(0),
            keyframe: true,
        });
        Ok(())
    }

    fn send_video(&mut self, _frame: &VideoFrame) -> Result<(), EncodeError> {
        Err(EncodeError::WrongMediaKind {
            codec: self.codec.clone(),
            kind: MediaKind::Video,
        })
    }

    fn send_end_of_stream(&mut self) -> Result<(), EncodeError> {
        if self.ended {
            return Err(EncodeError::AfterEndOfStream);
        }
        self.ended = true;
        Ok(())
    }

    fn receive_packet(&mut self) -> EncoderOutput {
        match self.pending.take() {
            Some(packet) => EncoderOutput::Produced(packet),
            None if self.ended => EncoderOutput::Exhausted,
            None => EncoderOutput::NeedsMoreInput,
        }
    }
}
