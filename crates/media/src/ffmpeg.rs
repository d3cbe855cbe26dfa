//! A [Backend] built on FFmpeg (through `ffmpeg-next`): its encoders, and its
//! muxers with the format guessed from the output file name.
//!
//! Frames are still synthesized and converted by this crate; they're only
//! copied into FFmpeg frames right before encoding.

use std::path::{Path, PathBuf};

#[cfg(debug_assertions)]
use std::sync::atomic::{AtomicBool, Ordering};

use ctor::ctor;

use ffmpeg::codec::capabilities::Capabilities as FFmpegCapabilities;
use ffmpeg::codec::context::Context as FFmpegCodecContext;
use ffmpeg::codec::flag::Flags as FFmpegCodecFlags;
use ffmpeg::codec::Parameters as FFmpegParameters;
use ffmpeg::encoder::Decision as FFmpegDecision;
use ffmpeg::format::Flags as FFmpegFormatFlags;
use ffmpeg::format::Pixel as FFmpegPixelFormat;
use ffmpeg::format::Sample as FFmpegSampleFormat;
use ffmpeg::format::context::Output as FFmpegOutput;
use ffmpeg::format::sample::Type as FFmpegSampleType;
use ffmpeg::frame::Audio as FFmpegAudioFrame;
use ffmpeg::frame::Video as FFmpegVideoFrame;
use ffmpeg::media::Type as FFmpegMediaType;
use ffmpeg::util::channel_layout::ChannelLayout as FFmpegChannelLayout;
use ffmpeg::util::channel_layout::ChannelLayoutMask as FFmpegChannelLayoutMask;
use ffmpeg_next as ffmpeg;

use crate::backend::Backend;
use crate::codec::{
    CodecDescriptor, CodecId, CodecParameters, EncodeError, Encoder, EncoderOutput,
    MediaParameters, take_codec_flags,
};
use crate::config::{FlagChange, Options};
use crate::convert::{BuiltinConverters, ConverterFactory};
use crate::format::{ChannelLayout, MediaKind, PixelFormat, SampleFormat};
use crate::frame::{AudioFrame, VideoFrame};
use crate::packet::{Packet, StreamId};
use crate::sink::{ContainerSink, Lifecycle, SinkError, take_format_flags};
use crate::time::Rational;

/// Opens FFmpeg muxers and encoders.
#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegBackend;

impl Backend for FfmpegBackend {
    fn open_sink(&self, path: &Path) -> Result<Box<dyn ContainerSink>, SinkError> {
        Ok(Box::new(FfmpegSink::create(path)?))
    }

    fn find_encoder(&self, codec: &CodecId) -> Option<CodecDescriptor> {
        let found = ffmpeg::encoder::find_by_name(codec.name())?;
        let variable_frame_size = found
            .capabilities()
            .contains(FFmpegCapabilities::VARIABLE_FRAME_SIZE);

        let mut descriptor = CodecDescriptor {
            id: codec.clone(),
            kind: MediaKind::Video,
            long_name: found.description().to_string(),
            sample_formats: Vec::new(),
            sample_rates: Vec::new(),
            channel_layouts: Vec::new(),
            pixel_formats: Vec::new(),
            variable_frame_size,
        };

        if let Ok(audio) = found.audio() {
            descriptor.kind = MediaKind::Audio;
            if let Some(formats) = audio.formats() {
                descriptor.sample_formats = formats.filter_map(sample_format_from).collect();
            }
            if let Some(rates) = audio.rates() {
                descriptor.sample_rates = rates.filter_map(|r| u32::try_from(r).ok()).collect();
            }
            descriptor.channel_layouts = vec![ChannelLayout::Stereo, ChannelLayout::Mono];
        } else if let Ok(video) = found.video() {
            if let Some(formats) = video.formats() {
                descriptor.pixel_formats = formats.filter_map(pixel_format_from).collect();
            }
        } else {
            return None;
        }

        Some(descriptor)
    }

    fn open_encoder(
        &self,
        descriptor: &CodecDescriptor,
        params: &CodecParameters,
        options: &mut Options,
    ) -> Result<Box<dyn Encoder>, EncodeError> {
        let codec = ffmpeg::encoder::find_by_name(descriptor.id.name()).ok_or_else(|| {
            EncodeError::Unsupported {
                codec: descriptor.id.clone(),
                what: "encoding (no such FFmpeg encoder)".to_string(),
            }
        })?;
        let dictionary = flags_dictionary("flags", &take_codec_flags(options)?);

        let mut context = FFmpegCodecContext::new_with_codec(codec);
        if params.global_header {
            context.set_flags(FFmpegCodecFlags::GLOBAL_HEADER);
        }
        let encoder = match params.media {
            MediaParameters::Video(_) => {
                let mut video = context.encoder().video().map_err(encode_error)?;
                configure_video(&mut video, params);
                let opened = video
                    .open_as_with(codec, dictionary)
                    .map_err(encode_error)?;
                FfmpegEncoder::Video(opened)
            }
            MediaParameters::Audio(_) => {
                let mut audio = context.encoder().audio().map_err(encode_error)?;
                configure_audio(&mut audio, params);
                let opened = audio
                    .open_as_with(codec, dictionary)
                    .map_err(encode_error)?;
                FfmpegEncoder::Audio(opened)
            }
        };

        util::debug_log_info!("Opened the FFmpeg encoder `{}`.", descriptor.id);
        Ok(Box::new(OpenEncoder {
            encoder,
            time_base: params.time_base,
        }))
    }

    fn converters(&self) -> Box<dyn ConverterFactory> {
        Box::new(BuiltinConverters)
    }
}

fn encode_error(err: ffmpeg::Error) -> EncodeError {
    EncodeError::Other(err.to_string())
}

fn sink_error(err: ffmpeg::Error) -> SinkError {
    SinkError::Other(err.to_string())
}

/// Turn parsed flags back into an FFmpeg dictionary (e.g. `flags=+bitexact`).
fn flags_dictionary<'a>(key: &str, flags: &[FlagChange]) -> ffmpeg::Dictionary<'a> {
    let mut dictionary = ffmpeg::Dictionary::new();
    if !flags.is_empty() {
        let value: String = flags
            .iter()
            .map(|f| format!("{}{}", if f.set { '+' } else { '-' }, f.name))
            .collect();
        dictionary.set(key, &value);
    }
    dictionary
}

fn to_ffmpeg_rational(r: Rational) -> ffmpeg::Rational {
    ffmpeg::Rational::new(r.num() as i32, r.den() as i32)
}

fn from_ffmpeg_rational(r: ffmpeg::Rational) -> Option<Rational> {
    Rational::new(r.numerator() as i64, r.denominator() as i64)
}

fn sample_format_to(format: SampleFormat) -> FFmpegSampleFormat {
    match format {
        SampleFormat::S16 => FFmpegSampleFormat::I16(FFmpegSampleType::Packed),
        SampleFormat::S16Planar => FFmpegSampleFormat::I16(FFmpegSampleType::Planar),
        SampleFormat::F32 => FFmpegSampleFormat::F32(FFmpegSampleType::Packed),
        SampleFormat::F32Planar => FFmpegSampleFormat::F32(FFmpegSampleType::Planar),
    }
}

fn sample_format_from(format: FFmpegSampleFormat) -> Option<SampleFormat> {
    Some(match format {
        FFmpegSampleFormat::I16(FFmpegSampleType::Packed) => SampleFormat::S16,
        FFmpegSampleFormat::I16(FFmpegSampleType::Planar) => SampleFormat::S16Planar,
        FFmpegSampleFormat::F32(FFmpegSampleType::Packed) => SampleFormat::F32,
        FFmpegSampleFormat::F32(FFmpegSampleType::Planar) => SampleFormat::F32Planar,
        _ => return None,
    })
}

fn pixel_format_to(format: PixelFormat) -> FFmpegPixelFormat {
    match format {
        PixelFormat::Yuv420p => FFmpegPixelFormat::YUV420P,
        PixelFormat::Yuv444p => FFmpegPixelFormat::YUV444P,
        PixelFormat::Gray8 => FFmpegPixelFormat::GRAY8,
        PixelFormat::Rgb24 => FFmpegPixelFormat::RGB24,
        PixelFormat::Rgba => FFmpegPixelFormat::RGBA,
    }
}

fn pixel_format_from(format: FFmpegPixelFormat) -> Option<PixelFormat> {
    Some(match format {
        FFmpegPixelFormat::YUV420P => PixelFormat::Yuv420p,
        FFmpegPixelFormat::YUV444P => PixelFormat::Yuv444p,
        FFmpegPixelFormat::GRAY8 => PixelFormat::Gray8,
        FFmpegPixelFormat::RGB24 => PixelFormat::Rgb24,
        FFmpegPixelFormat::RGBA => PixelFormat::Rgba,
        _ => return None,
    })
}

fn channel_layout_to(layout: ChannelLayout) -> (FFmpegChannelLayout<'static>, FFmpegChannelLayoutMask) {
    match layout {
        ChannelLayout::Mono => (FFmpegChannelLayout::MONO, FFmpegChannelLayoutMask::MONO),
        ChannelLayout::Stereo => (FFmpegChannelLayout::STEREO, FFmpegChannelLayoutMask::STEREO),
    }
}

fn configure_video(video: &mut ffmpeg::encoder::video::Video, params: &CodecParameters) {
    let MediaParameters::Video(parameters) = params.media else {
        return;
    };

    video.set_width(parameters.format.dimensions.width() as u32);
    video.set_height(parameters.format.dimensions.height() as u32);
    video.set_format(pixel_format_to(parameters.format.pixel_format));
    video.set_time_base(to_ffmpeg_rational(params.time_base));
    video.set_frame_rate(Some(ffmpeg::Rational::new(parameters.frame_rate as i32, 1)));
    video.set_gop(parameters.gop);
    video.set_bit_rate(params.bit_rate as usize);

    match params.codec.name() {
        // Exercise B-frames too.
        "mpeg2video" => video.set_max_b_frames(2),
        // The synthetic chroma moves differently from the luma, which makes
        // some macroblock coefficients overflow with the default decision.
        "mpeg1video" => video.set_mb_decision(FFmpegDecision::RateDistortion),
        _ => {}
    }
}

fn configure_audio(audio: &mut ffmpeg::encoder::audio::Audio, params: &CodecParameters) {
    let MediaParameters::Audio(parameters) = params.media else {
        return;
    };

    audio.set_rate(parameters.format.sample_rate as i32);
    audio.set_format(sample_format_to(parameters.format.sample_format));
    audio.set_ch_layout(channel_layout_to(parameters.format.layout).0);
    audio.set_time_base(to_ffmpeg_rational(params.time_base));
    audio.set_bit_rate(params.bit_rate as usize);
}

enum FfmpegEncoder {
    Audio(ffmpeg::encoder::audio::Encoder),
    Video(ffmpeg::encoder::video::Encoder),
}

/// An open FFmpeg encoder, taking this crate's frames.
struct OpenEncoder {
    encoder: FfmpegEncoder,
    time_base: Rational,
}

impl OpenEncoder {
    fn inner(&mut self) -> &mut ffmpeg::encoder::Encoder {
        match &mut self.encoder {
            FfmpegEncoder::Audio(audio) => audio,
            FfmpegEncoder::Video(video) => video,
        }
    }

    fn context(&self) -> &FFmpegCodecContext {
        match &self.encoder {
            FfmpegEncoder::Audio(audio) => audio,
            FfmpegEncoder::Video(video) => video,
        }
    }
}

impl Encoder for OpenEncoder {
    fn time_base(&self) -> Rational {
        self.time_base
    }

    fn frame_size(&self) -> Option<usize> {
        match &self.encoder {
            FfmpegEncoder::Audio(audio) => Some(audio.frame_size() as usize),
            FfmpegEncoder::Video(_) => None,
        }
    }

    fn send_audio(&mut self, frame: &AudioFrame) -> Result<(), EncodeError> {
        let format = frame.format();
        let (layout, mask) = channel_layout_to(format.layout);
        let mut ffmpeg_frame =
            FFmpegAudioFrame::new(sample_format_to(format.sample_format), frame.samples(), mask);
        ffmpeg_frame.set_ch_layout(layout);
        ffmpeg_frame.set_rate(format.sample_rate);
        ffmpeg_frame.set_pts(Some(frame.pts()));

        // `to_le_bytes` lays the planes out one after another, the same
        // planes FFmpeg allocated.
        let bytes = frame.to_le_bytes();
        let plane_count = format.sample_format.plane_count(format.layout.channels());
        for (i, plane) in bytes.chunks(bytes.len() / plane_count).enumerate() {
            ffmpeg_frame.data_mut(i)[..plane.len()].copy_from_slice(plane);
        }

        self.inner().send_frame(&ffmpeg_frame).map_err(encode_error)
    }

    fn send_video(&mut self, frame: &VideoFrame) -> Result<(), EncodeError> {
        let dimensions = frame.dimensions();
        let mut ffmpeg_frame = FFmpegVideoFrame::new(
            pixel_format_to(frame.pixel_format()),
            dimensions.width() as u32,
            dimensions.height() as u32,
        );
        ffmpeg_frame.set_pts(Some(frame.pts()));

        for (i, plane) in frame.planes().iter().enumerate() {
            let stride = ffmpeg_frame.stride(i);
            let data = ffmpeg_frame.data_mut(i);
            for y in 0..plane.rows() {
                let row = plane.row(y);
                data[y * stride..y * stride + row.len()].copy_from_slice(row);
            }
        }

        self.inner().send_frame(&ffmpeg_frame).map_err(encode_error)
    }

    fn send_end_of_stream(&mut self) -> Result<(), EncodeError> {
        self.inner().send_eof().map_err(encode_error)
    }

    fn receive_packet(&mut self) -> EncoderOutput {
        let mut packet = ffmpeg::Packet::empty();
        match self.inner().receive_packet(&mut packet) {
            Ok(()) => EncoderOutput::Produced(Packet {
                data: packet.data().unwrap_or_default().to_vec(),
                pts: packet.pts().unwrap_or(0),
                dts: packet.dts().or(packet.pts()).unwrap_or(0),
                duration: packet.duration(),
                // The adapter sets the real stream.
                stream: StreamId(0),
                keyframe: packet.is_key(),
            }),
            Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::util::error::EAGAIN => {
                EncoderOutput::NeedsMoreInput
            }
            Err(ffmpeg::Error::Eof) => EncoderOutput::Exhausted,
            Err(err) => EncoderOutput::Fatal(encode_error(err)),
        }
    }

    fn extradata(&self) -> Vec<u8> {
        // SAFETY: an open codec context owns `extradata_size` bytes at
        // `extradata` (or a null pointer).
        unsafe {
            let context = self.context().as_ptr();
            let size = (*context).extradata_size;
            if (*context).extradata.is_null() || size <= 0 {
                return Vec::new();
            }
            std::slice::from_raw_parts((*context).extradata, size as usize).to_vec()
        }
    }
}

/// Give `parameters` a copy of `extradata`, freed along with them.
fn set_extradata(parameters: &mut FFmpegParameters, extradata: &[u8]) -> Result<(), SinkError> {
    if extradata.is_empty() {
        return Ok(());
    }
    let size = i32::try_from(extradata.len())
        .map_err(|_| SinkError::Other("The codec setup data is too big.".to_string()))?;

    // SAFETY: the buffer is allocated with FFmpeg's allocator (with the
    // padding it expects) and replaces whatever the parameters held.
    unsafe {
        let parameters = parameters.as_mut_ptr();
        let padding = ffmpeg::ffi::AV_INPUT_BUFFER_PADDING_SIZE as usize;
        let data = ffmpeg::ffi::av_mallocz(extradata.len() + padding) as *mut u8;
        if data.is_null() {
            return Err(SinkError::Other(
                "Couldn't allocate the codec setup data.".to_string(),
            ));
        }
        std::ptr::copy_nonoverlapping(extradata.as_ptr(), data, extradata.len());

        ffmpeg::ffi::av_freep((&raw mut (*parameters).extradata).cast());
        (*parameters).extradata = data;
        (*parameters).extradata_size = size;
    }
    Ok(())
}

/// An FFmpeg muxer writing to a file.
pub struct FfmpegSink {
    output: FFmpegOutput,
    path: PathBuf,
    format_name: &'static str,
    lifecycle: Lifecycle,
}

impl FfmpegSink {
    /// Create the output file, guessing the container from its name (MPEG if
    /// that's not possible).
    pub fn create(path: &Path) -> Result<Self, SinkError> {
        let output = match ffmpeg::format::output(&path) {
            Ok(output) => output,
            Err(_) => {
                util::debug_log_warning!(
                    "Could not deduce output format from file extension: using MPEG."
                );
                ffmpeg::format::output_as(&path, "mpeg").map_err(sink_error)?
            }
        };

        // Muxer descriptions are static in FFmpeg as well, so this only leaks
        // a short name once per output.
        let format_name = Box::leak(output.format().name().to_string().into_boxed_str());

        Ok(Self {
            output,
            path: path.to_path_buf(),
            format_name,
            lifecycle: Lifecycle::default(),
        })
    }
}

impl ContainerSink for FfmpegSink {
    fn format_name(&self) -> &'static str {
        self.format_name
    }

    fn default_codec(&self, kind: MediaKind) -> CodecId {
        let media = match kind {
            MediaKind::Video => FFmpegMediaType::Video,
            MediaKind::Audio => FFmpegMediaType::Audio,
        };
        CodecId::new(self.output.format().codec(&self.path, media).name())
    }

    fn needs_global_header(&self) -> bool {
        self.output
            .format()
            .flags()
            .contains(FFmpegFormatFlags::GLOBAL_HEADER)
    }

    /// The stream gets the parameters the encoder was opened with, plus the
    /// setup data the opened encoder produced.
    fn declare_stream(&mut self, params: &CodecParameters) -> Result<StreamId, SinkError> {
        let codec = ffmpeg::encoder::find_by_name(params.codec.name()).ok_or_else(|| {
            SinkError::UnsupportedCodec {
                format: self.format_name,
                codec: params.codec.clone(),
            }
        })?;

        let context = FFmpegCodecContext::new_with_codec(codec);
        let mut parameters = match params.media {
            MediaParameters::Video(_) => {
                let mut video = context.encoder().video().map_err(sink_error)?;
                configure_video(&mut video, params);
                FFmpegParameters::from(&video)
            }
            MediaParameters::Audio(audio_params) => {
                let mut audio = context.encoder().audio().map_err(sink_error)?;
                configure_audio(&mut audio, params);
                if let Some(frame_size) = audio_params.frame_size {
                    audio.set_frame_size(frame_size as u32);
                }
                FFmpegParameters::from(&audio)
            }
        };
        set_extradata(&mut parameters, &params.extradata)?;

        let id = self.lifecycle.declare()?;
        let mut stream = self.output.add_stream(codec).map_err(sink_error)?;
        stream.set_time_base(to_ffmpeg_rational(params.time_base));
        stream.set_parameters(parameters);

        Ok(id)
    }

    fn write_header(&mut self, options: &mut Options) -> Result<(), SinkError> {
        let flags = take_format_flags(options)?;
        self.lifecycle.header()?;

        let unused = self
            .output
            .write_header_with(flags_dictionary("fflags", &flags))
            .map_err(sink_error)?;
        for (key, value) in unused.iter() {
            util::debug_log_warning!("The muxer ignored the option `{key}` (`{value}`).");
        }
        Ok(())
    }

    fn stream_time_base(&self, stream: StreamId) -> Option<Rational> {
        let stream = self.output.stream(stream.0)?;
        from_ffmpeg_rational(stream.time_base())
    }

    fn write_packet(&mut self, packet: Packet) -> Result<(), SinkError> {
        self.lifecycle.packet(&packet)?;

        let mut ffmpeg_packet = ffmpeg::Packet::copy(&packet.data);
        ffmpeg_packet.set_pts(Some(packet.pts));
        ffmpeg_packet.set_dts(Some(packet.dts));
        ffmpeg_packet.set_duration(packet.duration);
        ffmpeg_packet.set_stream(packet.stream.0);
        if packet.keyframe {
            ffmpeg_packet.set_flags(ffmpeg::packet::Flags::KEY);
        }

        ffmpeg_packet
            .write_interleaved(&mut self.output)
            .map_err(sink_error)
    }

    fn write_trailer(&mut self) -> Result<(), SinkError> {
        self.lifecycle.trailer()?;
        self.output.write_trailer().map_err(sink_error)
    }

    fn close(&mut self) -> Result<(), SinkError> {
        // The file itself is closed when the output context is dropped.
        if !self.lifecycle.close() {
            util::debug_log_info!("Closed the {} output.", self.format_name);
        }
        Ok(())
    }
}

/// Initializes FFmpeg. This happens when the [crate] is loaded.
///
/// You should never actually call this function.
#[ctor]
fn ffmpeg_init() {
    #[cfg(debug_assertions)]
    {
        static ALREADY_INIT: AtomicBool = AtomicBool::new(false);
        assert!(
            !ALREADY_INIT.swap(true, Ordering::SeqCst),
            "Tried to initialize FFmpeg twice. \
            THIS WOULD NOT HAVE BEEN CAUGHT IN A RELEASE BUILD."
        );
    }

    ffmpeg::init().expect("FFmpeg shouldn't fail to initialize.");
}
