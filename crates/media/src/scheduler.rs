//! Decides which stream advances next so packets reach the container in
//! presentation order.

use std::cmp::Ordering;

use crate::error::MuxError;
use crate::format::MediaKind;
use crate::packet::Packet;
use crate::stream::Step;
use crate::time::{Rational, compare};

/// Something that produces packets one step at a time, with a clock saying
/// when its next frame starts.
#[cfg_attr(test, mockall::automock)]
pub trait PacketSource {
    fn kind(&self) -> MediaKind;

    /// When the next frame starts, in [Self::time_base].
    fn next_pts(&self) -> i64;

    /// The time base of the source's clock.
    fn time_base(&self) -> Rational;

    /// The time base the timestamps of produced packets are in.
    fn packet_time_base(&self) -> Rational;

    fn is_finished(&self) -> bool;

    fn produce_one(&mut self) -> Result<Step, MuxError>;
}

/// A source and the packet it produced that hasn't been emitted yet.
struct Lane<S> {
    source: S,
    head: Option<Packet>,
}

impl<S: PacketSource> Lane<S> {
    fn new(source: S) -> Self {
        Self { source, head: None }
    }

    /// Whether the source has to be advanced before anything is known about
    /// its next packet.
    fn needs_input(&self) -> bool {
        self.head.is_none() && !self.source.is_finished()
    }

    /// Whether the source will never emit anything again.
    fn is_drained(&self) -> bool {
        self.head.is_none() && self.source.is_finished()
    }
}

/// Interleaves one video and one audio [PacketSource].
///
/// Sources are advanced one step at a time: a source whose next packet isn't
/// known yet is advanced first, and if both are in that position the one
/// whose next frame starts first goes (compared exactly, video winning ties).
/// Finished sources are never advanced again.
///
/// A produced packet is held until the other source's next packet is known
/// too (or the other source is finished), and the earlier of the two is
/// emitted. Encoders that buffer frames emit packets older than their
/// source's clock, so the clocks alone can't order the output.
pub struct Interleaver<V, A> {
    video: Lane<V>,
    audio: Lane<A>,
}

impl<V: PacketSource, A: PacketSource> Interleaver<V, A> {
    pub fn new(video: V, audio: A) -> Self {
        Self {
            video: Lane::new(video),
            audio: Lane::new(audio),
        }
    }

    pub fn into_inner(self) -> (V, A) {
        if self.video.head.is_some() || self.audio.head.is_some() {
            util::debug_log_warning!("Dropped packets that were never emitted.");
        }
        (self.video.source, self.audio.source)
    }

    pub fn is_finished(&self) -> bool {
        self.video.is_drained() && self.audio.is_drained()
    }

    /// Which held packet can be emitted now, if any.
    fn ready(&self) -> Option<MediaKind> {
        match (&self.video.head, &self.audio.head) {
            (Some(video), Some(audio)) => {
                let order = compare(
                    video.pts,
                    self.video.source.packet_time_base(),
                    audio.pts,
                    self.audio.source.packet_time_base(),
                );
                Some(match order {
                    Ordering::Greater => MediaKind::Audio,
                    Ordering::Less | Ordering::Equal => MediaKind::Video,
                })
            }
            (Some(_), None) if self.audio.source.is_finished() => Some(MediaKind::Video),
            (None, Some(_)) if self.video.source.is_finished() => Some(MediaKind::Audio),
            _ => None,
        }
    }

    /// Which source should advance next, or [None] if neither needs to.
    pub fn pick(&self) -> Option<MediaKind> {
        match (self.video.needs_input(), self.audio.needs_input()) {
            (false, false) => None,
            (true, false) => Some(MediaKind::Video),
            (false, true) => Some(MediaKind::Audio),
            (true, true) => {
                let order = compare(
                    self.video.source.next_pts(),
                    self.video.source.time_base(),
                    self.audio.source.next_pts(),
                    self.audio.source.time_base(),
                );
                Some(match order {
                    Ordering::Greater => MediaKind::Audio,
                    Ordering::Less | Ordering::Equal => MediaKind::Video,
                })
            }
        }
    }

    /// Advance the sources until a packet can be emitted. Returns [None] once
    /// both sources are finished and every packet was emitted.
    pub fn next_packet(&mut self) -> Result<Option<(MediaKind, Packet)>, MuxError> {
        loop {
            if let Some(kind) = self.ready() {
                let head = match kind {
                    MediaKind::Video => self.video.head.take(),
                    MediaKind::Audio => self.audio.head.take(),
                };
                if let Some(packet) = head {
                    return Ok(Some((kind, packet)));
                }
            }

            let Some(kind) = self.pick() else {
                return Ok(None);
            };
            let (step, head) = match kind {
                MediaKind::Video => (self.video.source.produce_one()?, &mut self.video.head),
                MediaKind::Audio => (self.audio.source.produce_one()?, &mut self.audio.head),
            };
            if let Step::Produced(packet) = step {
                *head = Some(packet);
            }
        }
    }
}
