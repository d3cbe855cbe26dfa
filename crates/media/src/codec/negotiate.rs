//! Picking the parameters to open an encoder with, from what the encoder
//! supports and what the [MuxConfig] asks for.

use super::{AudioParameters, CodecDescriptor, CodecParameters, MediaParameters, VideoParameters};
use crate::config::MuxConfig;
use crate::error::ConfigError;
use crate::format::{AudioFormat, ChannelLayout, SampleFormat, VideoFormat};
use crate::time::Rational;

/// Pick `preferred` if it's supported (or nothing is listed), otherwise the
/// first supported value.
fn prefer<T: Copy + PartialEq>(supported: &[T], preferred: T) -> T {
    match supported.first() {
        Some(&first) if !supported.contains(&preferred) => first,
        _ => preferred,
    }
}

/// Parameters for an audio encoder:
///
/// - the first supported sample format (planar float if none are listed),
/// - the preferred sample rate if supported, otherwise the first supported
///   one,
/// - stereo if supported, otherwise the first supported layout.
///
/// The frame size is left open until the encoder has been opened.
pub fn audio_parameters(
    descriptor: &CodecDescriptor,
    config: &MuxConfig,
) -> Result<CodecParameters, ConfigError> {
    let sample_format = descriptor
        .sample_formats
        .first()
        .copied()
        .unwrap_or(SampleFormat::F32Planar);
    let sample_rate = prefer(&descriptor.sample_rates, config.preferred_sample_rate);
    let layout = prefer(&descriptor.channel_layouts, ChannelLayout::Stereo);

    Ok(CodecParameters {
        codec: descriptor.id.clone(),
        bit_rate: config.audio_bit_rate,
        time_base: Rational::per_second(sample_rate).ok_or(ConfigError::ZeroSampleRate)?,
        global_header: false,
        extradata: Vec::new(),
        media: MediaParameters::Audio(AudioParameters {
            format: AudioFormat {
                sample_format,
                layout,
                sample_rate,
            },
            frame_size: None,
        }),
    })
}

/// Parameters for a video encoder: the configured size, frame rate and GOP,
/// and the configured pixel format if supported (otherwise the first
/// supported one).
pub fn video_parameters(
    descriptor: &CodecDescriptor,
    config: &MuxConfig,
) -> Result<CodecParameters, ConfigError> {
    Ok(CodecParameters {
        codec: descriptor.id.clone(),
        bit_rate: config.video_bit_rate,
        time_base: Rational::per_second(config.frame_rate).ok_or(ConfigError::ZeroFrameRate)?,
        global_header: false,
        extradata: Vec::new(),
        media: MediaParameters::Video(VideoParameters {
            format: VideoFormat {
                pixel_format: prefer(&descriptor.pixel_formats, config.pixel_format),
                dimensions: config.dimensions,
            },
            frame_rate: config.frame_rate,
            gop: config.gop,
        }),
    })
}

/// How many samples every audio frame should hold: the configured size for
/// encoders that take any size, otherwise the size the (opened) encoder
/// asks for.
///
/// A fixed frame size can only be kept up if the synthesizer runs at the
/// encoder's rate, since resampling changes the number of samples per frame.
pub fn audio_frame_size(
    descriptor: &CodecDescriptor,
    format: AudioFormat,
    encoder_frame_size: Option<usize>,
    config: &MuxConfig,
) -> Result<usize, ConfigError> {
    if descriptor.variable_frame_size {
        return Ok(config.variable_frame_size);
    }

    let frame_size = match encoder_frame_size {
        Some(0) => return Err(ConfigError::ZeroFrameSize),
        Some(size) => size,
        None => return Err(ConfigError::MissingFrameSize(descriptor.id.clone())),
    };

    let synth_rate = config.synth_sample_rate.unwrap_or(format.sample_rate);
    if synth_rate != format.sample_rate {
        return Err(ConfigError::FixedFrameSizeWithResampling {
            codec: descriptor.id.clone(),
            frame_size,
            synth_rate,
            encoder_rate: format.sample_rate,
        });
    }

    Ok(frame_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CodecId;
    use crate::format::{MediaKind, PixelFormat};

    fn descriptor(kind: MediaKind) -> CodecDescriptor {
        CodecDescriptor {
            id: CodecId::new("test"),
            kind,
            long_name: "Test".to_string(),
            sample_formats: Vec::new(),
            sample_rates: Vec::new(),
            channel_layouts: Vec::new(),
            pixel_formats: Vec::new(),
            variable_frame_size: false,
        }
    }

    fn audio_format(params: CodecParameters) -> AudioFormat {
        match params.media {
            MediaParameters::Audio(audio) => audio.format,
            MediaParameters::Video(_) => panic!("expected audio parameters"),
        }
    }

    #[test]
    fn unrestricted_audio_gets_the_defaults() {
        let params = audio_parameters(&descriptor(MediaKind::Audio), &MuxConfig::default()).unwrap();

        assert_eq!(params.bit_rate, 64_000);
        assert_eq!(params.time_base, Rational::per_second(44100).unwrap());
        assert_eq!(
            audio_format(params),
            AudioFormat {
                sample_format: SampleFormat::F32Planar,
                layout: ChannelLayout::Stereo,
                sample_rate: 44100,
            }
        );
    }

    #[test]
    fn restricted_audio_falls_back_to_the_first_option() {
        let mut d = descriptor(MediaKind::Audio);
        d.sample_formats = vec![SampleFormat::S16, SampleFormat::F32];
        d.sample_rates = vec![48000, 22050];
        d.channel_layouts = vec![ChannelLayout::Mono];

        let format = audio_format(audio_parameters(&d, &MuxConfig::default()).unwrap());
        assert_eq!(format.sample_format, SampleFormat::S16);
        assert_eq!(format.sample_rate, 48000);
        assert_eq!(format.layout, ChannelLayout::Mono);

        d.sample_rates.push(44100);
        d.channel_layouts.push(ChannelLayout::Stereo);
        let format = audio_format(audio_parameters(&d, &MuxConfig::default()).unwrap());
        assert_eq!(format.sample_rate, 44100);
        assert_eq!(format.layout, ChannelLayout::Stereo);
    }

    #[test]
    fn frame_size_depends_on_the_encoder() {
        let format = AudioFormat {
            sample_format: SampleFormat::F32Planar,
            layout: ChannelLayout::Stereo,
            sample_rate: 44100,
        };
        let mut config = MuxConfig::default();
        let mut d = descriptor(MediaKind::Audio);

        d.variable_frame_size = true;
        assert_eq!(audio_frame_size(&d, format, Some(1024), &config), Ok(10_000));

        d.variable_frame_size = false;
        assert_eq!(audio_frame_size(&d, format, Some(1024), &config), Ok(1024));
        assert_eq!(
            audio_frame_size(&d, format, None, &config),
            Err(ConfigError::MissingFrameSize(CodecId::new("test")))
        );

        config.synth_sample_rate = Some(48000);
        assert!(matches!(
            audio_frame_size(&d, format, Some(1024), &config),
            Err(ConfigError::FixedFrameSizeWithResampling { .. })
        ));
    }

    #[test]
    fn video_prefers_the_configured_pixel_format() {
        let mut d = descriptor(MediaKind::Video);
        let config = MuxConfig::default();

        let params = video_parameters(&d, &config).unwrap();
        assert_eq!(params.time_base, Rational::per_second(25).unwrap());
        assert_eq!(
            params.media,
            MediaParameters::Video(VideoParameters {
                format: VideoFormat {
                    pixel_format: PixelFormat::Yuv420p,
                    dimensions: (352, 288).into(),
                },
                frame_rate: 25,
                gop: 12,
            })
        );

        d.pixel_formats = vec![PixelFormat::Rgb24, PixelFormat::Gray8];
        let params = video_parameters(&d, &config).unwrap();
        let MediaParameters::Video(video) = params.media else {
            panic!("expected video parameters");
        };
        assert_eq!(video.format.pixel_format, PixelFormat::Rgb24);
    }
}
