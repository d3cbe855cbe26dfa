//! Where encoders, converters and containers come from.

use std::path::Path;

use crate::codec::{
    CodecDescriptor, CodecId, CodecParameters, EncodeError, Encoder, PcmEncoder, RawVideoEncoder,
};
use crate::config::Options;
use crate::convert::{BuiltinConverters, ConverterFactory};
use crate::sink::{ContainerSink, MatroskaSink, SinkError};

/// Opens everything a run needs.
#[cfg_attr(test, mockall::automock)]
pub trait Backend {
    /// Open a container at `path`, picking the format from its extension.
    fn open_sink(&self, path: &Path) -> Result<Box<dyn ContainerSink>, SinkError>;

    /// What the encoder for `codec` supports, or [None] if there is none.
    fn find_encoder(&self, codec: &CodecId) -> Option<CodecDescriptor>;

    /// Open the encoder described by `descriptor`, consuming the encoder
    /// options (`flags`) it understands.
    fn open_encoder(
        &self,
        descriptor: &CodecDescriptor,
        params: &CodecParameters,
        options: &mut Options,
    ) -> Result<Box<dyn Encoder>, EncodeError>;

    fn converters(&self) -> Box<dyn ConverterFactory>;
}

/// The pure Rust backend: PCM and raw video encoders, Matroska output.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinBackend {
    video_delay: usize,
}

impl BuiltinBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the video encoder hold back `frames` frames before emitting the
    /// first packet.
    pub fn with_video_delay(mut self, frames: usize) -> Self {
        self.video_delay = frames;
        self
    }
}

impl Backend for BuiltinBackend {
    fn open_sink(&self, path: &Path) -> Result<Box<dyn ContainerSink>, SinkError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        if !matches!(extension.as_deref(), Some("mkv" | "mka")) {
            util::debug_log_warning!(
                "Could not deduce output format from file extension: using Matroska."
            );
        }
        Ok(Box::new(MatroskaSink::create(path)?))
    }

    fn find_encoder(&self, codec: &CodecId) -> Option<CodecDescriptor> {
        if *codec == CodecId::RAWVIDEO {
            return Some(RawVideoEncoder::descriptor());
        }
        PcmEncoder::descriptor(codec)
    }

    fn open_encoder(
        &self,
        descriptor: &CodecDescriptor,
        params: &CodecParameters,
        options: &mut Options,
    ) -> Result<Box<dyn Encoder>, EncodeError> {
        if descriptor.id == CodecId::RAWVIDEO {
            Ok(Box::new(RawVideoEncoder::open(params, options, self.video_delay)?))
        } else {
            Ok(Box::new(PcmEncoder::open(params, options)?))
        }
    }

    fn converters(&self) -> Box<dyn ConverterFactory> {
        Box::new(BuiltinConverters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::audio_parameters;
    use crate::config::MuxConfig;
    use crate::format::MediaKind;

    #[test]
    fn builtin_encoders() {
        let backend = BuiltinBackend::new();

        let video = backend.find_encoder(&CodecId::RAWVIDEO).unwrap();
        assert_eq!(video.kind, MediaKind::Video);
        let audio = backend.find_encoder(&CodecId::PCM_S16LE).unwrap();
        assert_eq!(audio.kind, MediaKind::Audio);
        assert_eq!(backend.find_encoder(&CodecId::new("mpeg4")), None);

        let params = audio_parameters(&audio, &MuxConfig::default()).unwrap();
        let encoder = backend
            .open_encoder(&audio, &params, &mut Options::new())
            .unwrap();
        assert_eq!(encoder.time_base(), params.time_base);
    }

    #[test]
    fn encoder_options_are_checked() {
        let backend = BuiltinBackend::new();
        let audio = backend.find_encoder(&CodecId::PCM_F32LE).unwrap();
        let params = audio_parameters(&audio, &MuxConfig::default()).unwrap();

        let mut options = Options::from_args(["-flags", "+bitexact"]);
        assert!(backend.open_encoder(&audio, &params, &mut options).is_ok());
        assert_eq!(options.unused().count(), 0);

        let mut options = Options::from_args(["-flags", "+made_up"]);
        assert!(matches!(
            backend.open_encoder(&audio, &params, &mut options),
            Err(EncodeError::InvalidOption { .. })
        ));
    }
}
