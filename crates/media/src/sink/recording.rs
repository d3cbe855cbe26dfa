use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{ContainerSink, Lifecycle, SinkError, take_format_flags};
use crate::codec::{CodecId, CodecParameters};
use crate::config::Options;
use crate::format::MediaKind;
use crate::packet::{Packet, StreamId};
use crate::time::Rational;

/// Everything a [PacketRecorder] was given.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recording {
    pub streams: Vec<CodecParameters>,
    pub time_bases: Vec<Rational>,
    pub packets: Vec<Packet>,
    pub header_written: bool,
    pub trailer_written: bool,
    pub closed: bool,
}

impl Recording {
    /// The packets of one stream, in the order they were written.
    pub fn stream_packets(&self, stream: StreamId) -> impl Iterator<Item = &Packet> {
        self.packets.iter().filter(move |p| p.stream == stream)
    }
}

/// A shared view of what a [PacketRecorder] recorded, usable after the
/// recorder itself was moved away (e.g. into a pipeline).
#[derive(Debug, Clone, Default)]
pub struct RecordingHandle(Arc<Mutex<Recording>>);

impl RecordingHandle {
    pub fn lock(&self) -> MutexGuard<'_, Recording> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A copy of the current recording.
    pub fn snapshot(&self) -> Recording {
        self.lock().clone()
    }
}

/// A container that keeps everything in memory instead of writing a file.
///
/// Packets are checked the same way a real container checks them. Every
/// stream gets the time base it was declared with, unless one is forced with
/// [PacketRecorder::with_time_base].
#[derive(Debug, Default)]
pub struct PacketRecorder {
    recording: RecordingHandle,
    lifecycle: Lifecycle,
    forced_time_base: Option<Rational>,
    global_header: bool,
}

impl PacketRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Switch every stream to `time_base` when the header is written.
    pub fn with_time_base(mut self, time_base: Rational) -> Self {
        self.forced_time_base = Some(time_base);
        self
    }

    /// Ask encoders to keep their headers out of the packets, like MP4 does.
    pub fn with_global_header(mut self) -> Self {
        self.global_header = true;
        self
    }

    pub fn handle(&self) -> RecordingHandle {
        self.recording.clone()
    }
}

impl ContainerSink for PacketRecorder {
    fn format_name(&self) -> &'static str {
        "recording"
    }

    fn default_codec(&self, kind: MediaKind) -> CodecId {
        match kind {
            MediaKind::Video => CodecId::RAWVIDEO,
            MediaKind::Audio => CodecId::PCM_S16LE,
        }
    }

    fn needs_global_header(&self) -> bool {
        self.global_header
    }

    fn declare_stream(&mut self, params: &CodecParameters) -> Result<StreamId, SinkError> {
        let id = self.lifecycle.declare()?;
        let mut recording = self.recording.lock();
        recording.streams.push(params.clone());
        recording.time_bases.push(params.time_base);
        Ok(id)
    }

    fn write_header(&mut self, options: &mut Options) -> Result<(), SinkError> {
        take_format_flags(options)?;
        self.lifecycle.header()?;

        let mut recording = self.recording.lock();
        if let Some(time_base) = self.forced_time_base {
            recording.time_bases.fill(time_base);
        }
        recording.header_written = true;
        Ok(())
    }

    fn stream_time_base(&self, stream: StreamId) -> Option<Rational> {
        self.recording.lock().time_bases.get(stream.0).copied()
    }

    fn write_packet(&mut self, packet: Packet) -> Result<(), SinkError> {
        self.lifecycle.packet(&packet)?;
        self.recording.lock().packets.push(packet);
        Ok(())
    }

    fn write_trailer(&mut self) -> Result<(), SinkError> {
        self.lifecycle.trailer()?;
        self.recording.lock().trailer_written = true;
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        self.lifecycle.close();
        self.recording.lock().closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{MediaParameters, VideoParameters};
    use crate::format::{PixelFormat, VideoFormat};

    #[test]
    fn the_handle_sees_everything() {
        let mut recorder = PacketRecorder::new().with_time_base(Rational::new(1, 90_000).unwrap());
        let handle = recorder.handle();

        let params = CodecParameters {
            codec: CodecId::RAWVIDEO,
            bit_rate: 0,
            time_base: Rational::per_second(25).unwrap(),
            global_header: false,
            extradata: Vec::new(),
            media: MediaParameters::Video(VideoParameters {
                format: VideoFormat {
                    pixel_format: PixelFormat::Gray8,
                    dimensions: (2, 2).into(),
                },
                frame_rate: 25,
                gop: 1,
            }),
        };
        let id = recorder.declare_stream(&params).unwrap();
        assert_eq!(recorder.stream_time_base(id), Some(Rational::per_second(25).unwrap()));

        recorder.write_header(&mut Options::new()).unwrap();
        assert_eq!(recorder.stream_time_base(id), Some(Rational::new(1, 90_000).unwrap()));

        let packet = Packet {
            data: vec![1, 2, 3, 4],
            pts: 3600,
            dts: 3600,
            duration: 3600,
            stream: id,
            keyframe: true,
        };
        recorder.write_packet(packet.clone()).unwrap();
        recorder.write_trailer().unwrap();
        drop(recorder);

        let recording = handle.snapshot();
        assert!(recording.header_written && recording.trailer_written);
        assert!(!recording.closed);
        assert_eq!(recording.stream_packets(id).collect::<Vec<_>>(), [&packet]);
    }
}
