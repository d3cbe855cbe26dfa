//! Compressed [Packet]s, on their way from an encoder to a container.

use std::fmt::{self, Display, Formatter};

use crate::time::{self, Rational};

/// Identifies a stream inside one container (its declaration index).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StreamId(pub usize);

impl Display for StreamId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One unit of encoded data.
///
/// `pts`, `dts` and `duration` are all in the same time base, which is not
/// stored in the packet: an encoder emits packets in its own time base and
/// [Packet::rescale] moves them into the container stream's time base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub data: Vec<u8>,
    pub pts: i64,
    pub dts: i64,
    pub duration: i64,
    pub stream: StreamId,
    pub keyframe: bool,
}

impl Packet {
    /// Move every timestamp from time base `from` to time base `to`.
    pub fn rescale(&mut self, from: Rational, to: Rational) {
        if from == to {
            return;
        }

        self.pts = time::rescale(self.pts, from, to);
        self.dts = time::rescale(self.dts, from, to);
        self.duration = time::rescale(self.duration, from, to);
    }

    /// A one-line description of the packet's timing, with the timestamps
    /// also written out as seconds (`time_base` is the packet's time base).
    pub fn describe(&self, time_base: Rational) -> String {
        format!(
            "pts:{} pts_time:{} dts:{} dts_time:{} duration:{} duration_time:{} stream_index:{}",
            self.pts,
            time::seconds_string(self.pts, time_base),
            self.dts,
            time::seconds_string(self.dts, time_base),
            self.duration,
            time::seconds_string(self.duration, time_base),
            self.stream,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(pts: i64, duration: i64) -> Packet {
        Packet {
            data: vec![1, 2, 3],
            pts,
            dts: pts,
            duration,
            stream: StreamId(1),
            keyframe: true,
        }
    }

    #[test]
    fn rescaling_moves_every_timestamp() {
        let mut p = packet(40000, 10000);
        p.rescale(
            Rational::per_second(44100).unwrap(),
            Rational::new(1, 1000).unwrap(),
        );

        assert_eq!((p.pts, p.dts, p.duration), (907, 907, 227));
        assert_eq!(p.data, [1, 2, 3]);
    }

    #[test]
    fn description_matches_the_log_format() {
        let p = packet(2, 1);
        assert_eq!(
            p.describe(Rational::per_second(25).unwrap()),
            "pts:2 pts_time:0.08 dts:2 dts_time:0.08 duration:1 duration_time:0.04 stream_index:1"
        );
    }
}
