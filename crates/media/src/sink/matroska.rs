use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::Path;

use byteorder::{BigEndian, WriteBytesExt};

use super::ebml::{self, *};
use super::{ContainerSink, Lifecycle, SinkError, take_format_flags};
use crate::codec::{CodecId, CodecParameters, MediaParameters};
use crate::config::Options;
use crate::format::{MediaKind, PixelFormat, SampleFormat};
use crate::packet::{Packet, StreamId};
use crate::time::Rational;

/// Every timestamp in the file is in milliseconds.
const TIMESTAMP_SCALE_NS: u64 = 1_000_000;
const TIME_BASE: Rational = match Rational::new(1, 1000) {
    Some(time_base) => time_base,
    None => Rational::ONE,
};
/// Start a new cluster once a block would be this far (in milliseconds) from
/// the cluster's timestamp.
const CLUSTER_SPAN: i64 = 1000;

const APP_NAME: &str = concat!("muxgen-", env!("CARGO_PKG_VERSION"));

struct Track {
    params: CodecParameters,
    codec_id: &'static str,
}

struct Cluster {
    size_pos: u64,
    timestamp: i64,
}

/// Writes a Matroska file holding PCM audio and uncompressed video.
///
/// Packets are written as they come, in clusters of about a second. The
/// sizes and the duration that aren't known up front are patched in by the
/// trailer, so the writer has to be seekable.
pub struct MatroskaSink<W: Write + Seek> {
    writer: W,
    lifecycle: Lifecycle,
    tracks: Vec<Track>,
    segment_size_pos: u64,
    duration_pos: u64,
    cluster: Option<Cluster>,
    /// The end of the latest packet, in milliseconds.
    end: i64,
}

impl MatroskaSink<BufWriter<File>> {
    pub fn create(path: &Path) -> Result<Self, SinkError> {
        Ok(Self::new(BufWriter::new(File::create(path)?)))
    }
}

impl<W: Write + Seek> MatroskaSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            lifecycle: Lifecycle::default(),
            tracks: Vec::new(),
            segment_size_pos: 0,
            duration_pos: 0,
            cluster: None,
            end: 0,
        }
    }

    /// Get the writer back (after [ContainerSink::close]).
    pub fn into_inner(self) -> W {
        self.writer
    }

    fn codec_id(params: &CodecParameters) -> Result<&'static str, SinkError> {
        let unsupported = || SinkError::UnsupportedCodec {
            format: "matroska",
            codec: params.codec.clone(),
        };

        match (params.codec.name(), params.media) {
            ("pcm_f32le", MediaParameters::Audio(audio))
                if audio.format.sample_format == SampleFormat::F32 =>
            {
                Ok("A_PCM/FLOAT/IEEE")
            }
            ("pcm_s16le", MediaParameters::Audio(audio))
                if audio.format.sample_format == SampleFormat::S16 =>
            {
                Ok("A_PCM/INT/LIT")
            }
            ("rawvideo", MediaParameters::Video(_)) => Ok("V_UNCOMPRESSED"),
            _ => Err(unsupported()),
        }
    }

    /// The FourCC describing the pixel layout of `V_UNCOMPRESSED` frames.
    fn colour_space(pixel_format: PixelFormat) -> [u8; 4] {
        match pixel_format {
            PixelFormat::Yuv420p => *b"I420",
            PixelFormat::Yuv444p => *b"444P",
            PixelFormat::Gray8 => *b"Y800",
            PixelFormat::Rgb24 => [b'R', b'G', b'B', 24],
            PixelFormat::Rgba => *b"RGBA",
        }
    }

    fn write_ebml_header(&mut self) -> Result<(), SinkError> {
        let mut header = Vec::new();
        write_uint(&mut header, EBML_VERSION, 1)?;
        write_uint(&mut header, EBML_READ_VERSION, 1)?;
        write_uint(&mut header, EBML_MAX_ID_LENGTH, 4)?;
        write_uint(&mut header, EBML_MAX_SIZE_LENGTH, 8)?;
        write_str(&mut header, DOC_TYPE, "matroska")?;
        write_uint(&mut header, DOC_TYPE_VERSION, 4)?;
        write_uint(&mut header, DOC_TYPE_READ_VERSION, 2)?;
        write_binary(&mut self.writer, EBML, &header)?;
        Ok(())
    }

    fn write_info(&mut self, bitexact: bool) -> Result<(), SinkError> {
        let app = if bitexact { "muxgen" } else { APP_NAME };

        let mut info = Vec::new();
        write_uint(&mut info, TIMESTAMP_SCALE, TIMESTAMP_SCALE_NS)?;
        write_str(&mut info, MUXING_APP, app)?;
        write_str(&mut info, WRITING_APP, app)?;
        write_float(&mut info, DURATION, 0.0)?;

        write_binary(&mut self.writer, INFO, &info)?;
        // The duration is the last thing in the element.
        self.duration_pos = self.writer.stream_position()? - 8;
        Ok(())
    }

    fn track_entry(number: u64, track: &Track) -> Result<Vec<u8>, SinkError> {
        let mut entry = Vec::new();
        write_uint(&mut entry, TRACK_NUMBER, number)?;
        write_uint(&mut entry, TRACK_UID, number)?;
        write_uint(&mut entry, FLAG_LACING, 0)?;
        write_str(&mut entry, CODEC_ID, track.codec_id)?;

        match track.params.media {
            MediaParameters::Video(video) => {
                write_uint(&mut entry, TRACK_TYPE, 1)?;
                write_uint(
                    &mut entry,
                    DEFAULT_DURATION,
                    1_000_000_000 / video.frame_rate.max(1) as u64,
                )?;

                let mut settings = Vec::new();
                write_uint(&mut settings, PIXEL_WIDTH, video.format.dimensions.width() as u64)?;
                write_uint(&mut settings, PIXEL_HEIGHT, video.format.dimensions.height() as u64)?;
                write_binary(
                    &mut settings,
                    COLOUR_SPACE,
                    &Self::colour_space(video.format.pixel_format),
                )?;
                write_binary(&mut entry, VIDEO, &settings)?;
            }
            MediaParameters::Audio(audio) => {
                write_uint(&mut entry, TRACK_TYPE, 2)?;

                let mut settings = Vec::new();
                write_float(&mut settings, SAMPLING_FREQUENCY, audio.format.sample_rate as f64)?;
                write_uint(&mut settings, CHANNELS, audio.format.layout.channels() as u64)?;
                write_uint(
                    &mut settings,
                    BIT_DEPTH,
                    audio.format.sample_format.bytes_per_sample() as u64 * 8,
                )?;
                write_binary(&mut entry, AUDIO, &settings)?;
            }
        }

        Ok(entry)
    }

    fn write_tracks(&mut self) -> Result<(), SinkError> {
        let mut tracks = Vec::new();
        for (index, track) in self.tracks.iter().enumerate() {
            write_binary(&mut tracks, TRACK_ENTRY, &Self::track_entry(index as u64 + 1, track)?)?;
        }
        write_binary(&mut self.writer, TRACKS, &tracks)?;
        Ok(())
    }

    fn close_cluster(&mut self) -> Result<(), SinkError> {
        if let Some(cluster) = self.cluster.take() {
            ebml::end_master(&mut self.writer, cluster.size_pos)?;
        }
        Ok(())
    }

    /// The cluster a block at `timestamp` goes in, starting a new one if the
    /// block's offset wouldn't fit.
    fn cluster_for(&mut self, timestamp: i64) -> Result<i64, SinkError> {
        if let Some(cluster) = &self.cluster {
            let offset = timestamp - cluster.timestamp;
            if offset < CLUSTER_SPAN && offset >= i16::MIN as i64 {
                return Ok(cluster.timestamp);
            }
        }

        self.close_cluster()?;
        let size_pos = ebml::start_master(&mut self.writer, CLUSTER)?;
        write_uint(&mut self.writer, TIMESTAMP, timestamp.max(0) as u64)?;
        self.cluster = Some(Cluster {
            size_pos,
            timestamp: timestamp.max(0),
        });
        Ok(timestamp.max(0))
    }
}

impl<W: Write + Seek> ContainerSink for MatroskaSink<W> {
    fn format_name(&self) -> &'static str {
        "matroska"
    }

    fn default_codec(&self, kind: MediaKind) -> CodecId {
        match kind {
            MediaKind::Video => CodecId::RAWVIDEO,
            MediaKind::Audio => CodecId::PCM_F32LE,
        }
    }

    fn declare_stream(&mut self, params: &CodecParameters) -> Result<StreamId, SinkError> {
        let codec_id = Self::codec_id(params)?;
        let id = self.lifecycle.declare()?;
        self.tracks.push(Track {
            params: params.clone(),
            codec_id,
        });
        Ok(id)
    }

    fn write_header(&mut self, options: &mut Options) -> Result<(), SinkError> {
        let bitexact = take_format_flags(options)?
            .iter()
            .fold(false, |bitexact, change| {
                if change.name == "bitexact" {
                    change.set
                } else {
                    bitexact
                }
            });
        self.lifecycle.header()?;

        self.write_ebml_header()?;
        self.segment_size_pos = ebml::start_master(&mut self.writer, SEGMENT)?;
        self.write_info(bitexact)?;
        self.write_tracks()?;
        Ok(())
    }

    fn stream_time_base(&self, stream: StreamId) -> Option<Rational> {
        let track = self.tracks.get(stream.0)?;
        Some(if self.lifecycle.header_written() {
            TIME_BASE
        } else {
            track.params.time_base
        })
    }

    fn write_packet(&mut self, packet: Packet) -> Result<(), SinkError> {
        self.lifecycle.packet(&packet)?;

        let cluster = self.cluster_for(packet.pts)?;
        let mut block = Vec::with_capacity(packet.data.len() + 4);
        ebml::write_size(&mut block, packet.stream.0 as u64 + 1)?;
        block.write_i16::<BigEndian>((packet.pts - cluster) as i16)?;
        block.write_u8(if packet.keyframe { 0x80 } else { 0 })?;
        block.extend_from_slice(&packet.data);
        write_binary(&mut self.writer, SIMPLE_BLOCK, &block)?;

        self.end = self.end.max(packet.pts + packet.duration);
        Ok(())
    }

    fn write_trailer(&mut self) -> Result<(), SinkError> {
        self.lifecycle.trailer()?;

        self.close_cluster()?;
        ebml::patch_float(&mut self.writer, self.duration_pos, self.end as f64)?;
        ebml::end_master(&mut self.writer, self.segment_size_pos)?;
        self.writer.flush()?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        if !self.lifecycle.close() {
            self.writer.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::codec::{AudioParameters, VideoParameters};
    use crate::format::{AudioFormat, ChannelLayout, VideoFormat};

    fn video_params() -> CodecParameters {
        CodecParameters {
            codec: CodecId::RAWVIDEO,
            bit_rate: 400_000,
            time_base: Rational::per_second(25).unwrap(),
            global_header: false,
            extradata: Vec::new(),
            media: MediaParameters::Video(VideoParameters {
                format: VideoFormat {
                    pixel_format: PixelFormat::Yuv420p,
                    dimensions: (4, 2).into(),
                },
                frame_rate: 25,
                gop: 12,
            }),
        }
    }

    fn audio_params(codec: CodecId, sample_format: SampleFormat) -> CodecParameters {
        CodecParameters {
            codec,
            bit_rate: 64_000,
            time_base: Rational::per_second(44100).unwrap(),
            global_header: false,
            extradata: Vec::new(),
            media: MediaParameters::Audio(AudioParameters {
                format: AudioFormat {
                    sample_format,
                    layout: ChannelLayout::Stereo,
                    sample_rate: 44100,
                },
                frame_size: Some(10_000),
            }),
        }
    }

    fn packet(stream: usize, pts: i64, duration: i64, data: &[u8]) -> Packet {
        Packet {
            data: data.to_vec(),
            pts,
            dts: pts,
            duration,
            stream: StreamId(stream),
            keyframe: true,
        }
    }

    fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
        haystack.windows(needle.len()).position(|w| w == needle)
    }

    fn count(haystack: &[u8], needle: &[u8]) -> usize {
        haystack.windows(needle.len()).filter(|w| *w == needle).count()
    }

    /// Write a video and an audio stream with `packets` in between.
    fn mux(options: &mut Options, packets: Vec<Packet>) -> Vec<u8> {
        let mut sink = MatroskaSink::new(Cursor::new(Vec::new()));
        assert_eq!(sink.declare_stream(&video_params()).unwrap(), StreamId(0));
        assert_eq!(
            sink.declare_stream(&audio_params(CodecId::PCM_F32LE, SampleFormat::F32))
                .unwrap(),
            StreamId(1)
        );
        sink.write_header(options).unwrap();
        for packet in packets {
            sink.write_packet(packet).unwrap();
        }
        sink.write_trailer().unwrap();
        sink.close().unwrap();
        sink.into_inner().into_inner()
    }

    #[test]
    fn the_time_base_is_milliseconds_after_the_header() {
        let mut sink = MatroskaSink::new(Cursor::new(Vec::new()));
        let id = sink.declare_stream(&video_params()).unwrap();
        assert_eq!(sink.stream_time_base(id), Some(Rational::per_second(25).unwrap()));

        sink.write_header(&mut Options::new()).unwrap();
        assert_eq!(sink.stream_time_base(id), Some(Rational::new(1, 1000).unwrap()));
        assert_eq!(sink.stream_time_base(StreamId(1)), None);
    }

    #[test]
    fn file_layout() {
        let file = mux(
            &mut Options::new(),
            vec![
                packet(0, 0, 40, &[1; 12]),
                packet(1, 0, 227, &[2; 8]),
                packet(0, 40, 40, &[3; 12]),
            ],
        );

        assert_eq!(&file[..4], [0x1A, 0x45, 0xDF, 0xA3]);
        assert!(find(&file, b"matroska").is_some());
        assert!(find(&file, b"V_UNCOMPRESSED").is_some());
        assert!(find(&file, b"A_PCM/FLOAT/IEEE").is_some());
        assert!(find(&file, b"I420").is_some());

        // The segment spans the rest of the file.
        let segment = find(&file, &[0x18, 0x53, 0x80, 0x67]).unwrap();
        let size = u64::from_be_bytes(file[segment + 4..segment + 12].try_into().unwrap());
        assert_eq!(size >> 56, 0x01);
        assert_eq!((size & ((1 << 56) - 1)) as usize, file.len() - segment - 12);

        // The duration is the end of the last packet (227 ms).
        let duration = find(&file, &[0x44, 0x89, 0x88]).unwrap() + 3;
        let duration = f64::from_be_bytes(file[duration..duration + 8].try_into().unwrap());
        assert_eq!(duration, 227.0);

        // Second video block: track 1, 40 ms into the cluster, keyframe.
        let mut block = vec![0xA3, 0x80 | 16, 0x81, 0x00, 40, 0x80];
        block.extend([3; 12]);
        assert!(find(&file, &block).is_some());
        assert_eq!(count(&file, &[0x1F, 0x43, 0xB6, 0x75]), 1);
    }

    #[test]
    fn clusters_span_about_a_second() {
        let packets = (0..10).map(|n| packet(0, n * 400, 400, &[0; 12])).collect();
        let file = mux(&mut Options::new(), packets);

        // 0, 400, 800 | 1200, 1600, 2000 | 2400, 2800, 3200 | 3600
        assert_eq!(count(&file, &[0x1F, 0x43, 0xB6, 0x75]), 4);
    }

    #[test]
    fn bitexact_drops_the_version() {
        let file = mux(&mut Options::new(), Vec::new());
        assert!(find(&file, APP_NAME.as_bytes()).is_some());

        let mut options = Options::from_args(["-fflags", "+bitexact"]);
        let file = mux(&mut options, Vec::new());
        assert!(find(&file, APP_NAME.as_bytes()).is_none());
        assert!(find(&file, b"muxgen").is_some());
        assert_eq!(options.unused().count(), 0);
    }

    #[test]
    fn unsupported_codecs_are_rejected() {
        let mut sink = MatroskaSink::new(Cursor::new(Vec::new()));
        assert!(matches!(
            sink.declare_stream(&audio_params(CodecId::new("aac"), SampleFormat::F32Planar)),
            Err(SinkError::UnsupportedCodec { .. })
        ));
        assert!(matches!(
            sink.declare_stream(&audio_params(CodecId::PCM_S16LE, SampleFormat::F32)),
            Err(SinkError::UnsupportedCodec { .. })
        ));
        sink.declare_stream(&audio_params(CodecId::PCM_S16LE, SampleFormat::S16))
            .unwrap();
    }

    #[test]
    fn packets_need_the_header_and_ordered_dts() {
        let mut sink = MatroskaSink::new(Cursor::new(Vec::new()));
        sink.declare_stream(&video_params()).unwrap();
        assert!(matches!(
            sink.write_packet(packet(0, 0, 40, &[])),
            Err(SinkError::HeaderNotWritten)
        ));

        sink.write_header(&mut Options::new()).unwrap();
        sink.write_packet(packet(0, 40, 40, &[])).unwrap();
        assert!(matches!(
            sink.write_packet(packet(0, 0, 40, &[])),
            Err(SinkError::NonMonotonicDts { .. })
        ));
    }
}
