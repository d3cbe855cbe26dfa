//! A whole run: open both streams, write the header, interleave packets into
//! the container until both streams are finished and write the trailer.

use std::path::Path;

use crate::backend::Backend;
use crate::codec::{self, CodecParameters, MediaParameters};
use crate::config::{MuxConfig, Options};
use crate::error::{MuxError, SinkOperation};
use crate::format::MediaKind;
use crate::scheduler::Interleaver;
use crate::sink::{ContainerSink, SinkError};
use crate::stream::OutputStream;

/// What one stream produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamSummary {
    pub packets: usize,
    pub bytes: usize,
    /// Frames (video) or samples at the encoder's rate (audio) that were
    /// encoded.
    pub encoded: i64,
}

/// What a finished run produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Summary {
    pub video: StreamSummary,
    pub audio: StreamSummary,
}

impl Summary {
    fn stream_mut(&mut self, kind: MediaKind) -> &mut StreamSummary {
        match kind {
            MediaKind::Video => &mut self.video,
            MediaKind::Audio => &mut self.audio,
        }
    }
}

/// Write a video and an audio stream to a new container at `path`.
pub fn run(
    backend: &dyn Backend,
    path: &Path,
    options: Options,
    config: &MuxConfig,
) -> Result<Summary, MuxError> {
    config.validate()?;

    let name = path.display().to_string();
    let sink = backend
        .open_sink(path)
        .map_err(|source| MuxError::OpenOutput {
            path: name.clone(),
            source,
        })?;

    write_streams(backend, sink, &name, options, config)
}

/// Write a video and an audio stream to an already opened container.
pub fn mux(
    backend: &dyn Backend,
    sink: Box<dyn ContainerSink>,
    name: &str,
    options: Options,
    config: &MuxConfig,
) -> Result<Summary, MuxError> {
    config.validate()?;
    write_streams(backend, sink, name, options, config)
}

fn sink_error(operation: SinkOperation) -> impl FnOnce(SinkError) -> MuxError {
    move |source| MuxError::Sink { operation, source }
}

fn write_streams(
    backend: &dyn Backend,
    mut sink: Box<dyn ContainerSink>,
    name: &str,
    mut options: Options,
    config: &MuxConfig,
) -> Result<Summary, MuxError> {
    util::debug_log_info!("Output #0, {}, to '{name}':", sink.format_name());
    let mut video = open_stream(backend, sink.as_mut(), MediaKind::Video, &mut options, config)?;
    let mut audio = open_stream(backend, sink.as_mut(), MediaKind::Audio, &mut options, config)?;

    sink.write_header(&mut options)
        .map_err(sink_error(SinkOperation::WriteHeader))?;
    for (key, value) in options.unused() {
        util::debug_log_warning!("Option `{key}` (set to `{value}`) was never used.");
    }

    let mut time_bases = Vec::with_capacity(2);
    for stream in [&mut video, &mut audio] {
        let time_base = sink
            .stream_time_base(stream.id())
            .ok_or(SinkError::UnknownStream(stream.id()))
            .map_err(sink_error(SinkOperation::WriteHeader))?;
        stream.set_destination(time_base);
        time_bases.push(time_base);
    }
    let (video_time_base, audio_time_base) = (time_bases[0], time_bases[1]);

    let mut summary = Summary::default();
    let mut interleaver = Interleaver::new(video, audio);
    while let Some((kind, packet)) = interleaver.next_packet()? {
        let time_base = match kind {
            MediaKind::Video => video_time_base,
            MediaKind::Audio => audio_time_base,
        };
        util::debug_log_info!("{}", packet.describe(time_base));

        let stream = summary.stream_mut(kind);
        stream.packets += 1;
        stream.bytes += packet.data.len();

        sink.write_packet(packet)
            .map_err(sink_error(SinkOperation::WritePacket(kind)))?;
    }

    sink.write_trailer()
        .map_err(sink_error(SinkOperation::WriteTrailer))?;

    let (video, audio) = interleaver.into_inner();
    summary.video.encoded = video.counter();
    summary.audio.encoded = audio.counter();
    video.close();
    audio.close();

    sink.close().map_err(sink_error(SinkOperation::Close))?;
    Ok(summary)
}

/// Find, configure and open the encoder the container wants for `kind` and
/// declare its stream.
fn open_stream(
    backend: &dyn Backend,
    sink: &mut dyn ContainerSink,
    kind: MediaKind,
    options: &mut Options,
    config: &MuxConfig,
) -> Result<OutputStream, MuxError> {
    let codec = sink.default_codec(kind);
    let descriptor = backend
        .find_encoder(&codec)
        .ok_or_else(|| MuxError::EncoderNotFound(codec.clone()))?;

    let mut params = match kind {
        MediaKind::Video => codec::video_parameters(&descriptor, config)?,
        MediaKind::Audio => codec::audio_parameters(&descriptor, config)?,
    };
    params.global_header = sink.needs_global_header();
    let encoder = backend
        .open_encoder(&descriptor, &params, options)
        .map_err(|source| MuxError::OpenEncoder {
            kind,
            codec: codec.clone(),
            source,
        })?;

    if let MediaParameters::Audio(audio) = &mut params.media {
        audio.frame_size = Some(codec::audio_frame_size(
            &descriptor,
            audio.format,
            encoder.frame_size(),
            config,
        )?);
    }

    params.extradata = encoder.extradata();

    let id = sink
        .declare_stream(&params)
        .map_err(sink_error(SinkOperation::DeclareStream(kind)))?;
    util::debug_log_info!("    Stream #0:{id}: {}", describe(kind, &params));

    OutputStream::open(id, &params, encoder, backend.converters(), config)
}

/// A one-line description of a stream (`Video: rawvideo, yuv420p, ...`).
fn describe(kind: MediaKind, params: &CodecParameters) -> String {
    let kind = match kind {
        MediaKind::Video => "Video",
        MediaKind::Audio => "Audio",
    };
    let details = match params.media {
        MediaParameters::Video(video) => format!(
            "{}, {}, {} fps",
            video.format.pixel_format, video.format.dimensions, video.frame_rate
        ),
        MediaParameters::Audio(audio) => format!(
            "{} Hz, {}, {}",
            audio.format.sample_rate, audio.format.layout, audio.format.sample_format
        ),
    };
    format!(
        "{kind}: {}, {details}, {} kb/s",
        params.codec,
        params.bit_rate / 1000
    )
}
