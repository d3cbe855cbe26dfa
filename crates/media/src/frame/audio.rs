use crate::format::{AudioFormat, ChannelLayout, SampleFormat};

/// A buffer of audio samples with a fixed [AudioFormat].
///
/// A frame has a *capacity* (how many samples per channel are allocated) and
/// a *length* (how many of those are valid). Only the first
/// [AudioFrame::samples] samples of each channel are ever read.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    format: AudioFormat,
    samples: usize,
    capacity: usize,
    pts: i64,
    planes: Planes,
}

#[derive(Debug, Clone, PartialEq)]
enum Planes {
    S16(Vec<Vec<i16>>),
    F32(Vec<Vec<f32>>),
}

impl AudioFrame {
    /// Allocate a silent frame that can hold `capacity` samples per channel.
    /// All `capacity` samples start out valid.
    pub fn new(format: AudioFormat, capacity: usize) -> Self {
        let channels = format.layout.channels();
        let plane_count = format.sample_format.plane_count(channels);
        let plane_len = capacity * (channels / plane_count);

        let planes = if format.sample_format.is_float() {
            Planes::F32(vec![vec![0.0; plane_len]; plane_count])
        } else {
            Planes::S16(vec![vec![0; plane_len]; plane_count])
        };

        Self {
            format,
            samples: capacity,
            capacity,
            pts: 0,
            planes,
        }
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn sample_format(&self) -> SampleFormat {
        self.format.sample_format
    }

    pub fn layout(&self) -> ChannelLayout {
        self.format.layout
    }

    pub fn sample_rate(&self) -> u32 {
        self.format.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.format.layout.channels()
    }

    /// The number of valid samples per channel.
    pub fn samples(&self) -> usize {
        self.samples
    }

    /// The number of samples per channel that fit without reallocating.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The presentation timestamp, in whatever time base the frame's consumer
    /// expects.
    pub fn pts(&self) -> i64 {
        self.pts
    }

    pub fn set_pts(&mut self, pts: i64) {
        self.pts = pts;
    }

    /// Make sure at least `capacity` samples per channel fit. Existing samples
    /// are kept; this never shrinks the frame.
    pub fn reserve(&mut self, capacity: usize) {
        if capacity <= self.capacity {
            return;
        }

        let per_plane = self.channels() / self.plane_count();
        match &mut self.planes {
            Planes::S16(planes) => planes
                .iter_mut()
                .for_each(|p| p.resize(capacity * per_plane, 0)),
            Planes::F32(planes) => planes
                .iter_mut()
                .for_each(|p| p.resize(capacity * per_plane, 0.0)),
        }
        self.capacity = capacity;
    }

    /// Set how many samples per channel are valid.
    ///
    /// # Panics
    ///
    /// Panics if `samples` is greater than [Self::capacity].
    pub fn set_samples(&mut self, samples: usize) {
        assert!(
            samples <= self.capacity,
            "Can't use {samples} samples of a frame with room for {}.",
            self.capacity,
        );
        self.samples = samples;
    }

    fn plane_count(&self) -> usize {
        self.format.sample_format.plane_count(self.channels())
    }

    /// Where sample `index` of `channel` lives (plane, offset).
    fn locate(&self, channel: usize, index: usize) -> (usize, usize) {
        if self.format.sample_format.is_planar() {
            (channel, index)
        } else {
            (0, index * self.channels() + channel)
        }
    }

    /// Read sample `index` of `channel`, normalized to `[-1.0, 1.0]`.
    pub fn sample(&self, channel: usize, index: usize) -> f32 {
        let (plane, offset) = self.locate(channel, index);
        match &self.planes {
            Planes::S16(planes) => planes[plane][offset] as f32 / 32768.0,
            Planes::F32(planes) => planes[plane][offset],
        }
    }

    /// Write sample `index` of `channel` from a value in `[-1.0, 1.0]`
    /// (clamped).
    pub fn set_sample(&mut self, channel: usize, index: usize, value: f32) {
        let (plane, offset) = self.locate(channel, index);
        let value = value.clamp(-1.0, 1.0);
        match &mut self.planes {
            Planes::S16(planes) => {
                planes[plane][offset] = (value * 32768.0).round().clamp(-32768.0, 32767.0) as i16
            }
            Planes::F32(planes) => planes[plane][offset] = value,
        }
    }

    /// The planes of a signed 16-bit frame, or [None] for float frames.
    pub fn s16_planes_mut(&mut self) -> Option<&mut [Vec<i16>]> {
        match &mut self.planes {
            Planes::S16(planes) => Some(planes),
            Planes::F32(_) => None,
        }
    }

    /// The valid samples as little-endian bytes, plane after plane.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let per_plane = self.samples * (self.channels() / self.plane_count());
        let mut bytes =
            Vec::with_capacity(per_plane * self.plane_count() * self.sample_format().bytes_per_sample());

        match &self.planes {
            Planes::S16(planes) => planes
                .iter()
                .flat_map(|p| &p[..per_plane])
                .for_each(|s| bytes.extend_from_slice(&s.to_le_bytes())),
            Planes::F32(planes) => planes
                .iter()
                .flat_map(|p| &p[..per_plane])
                .for_each(|s| bytes.extend_from_slice(&s.to_le_bytes())),
        }

        bytes
    }
}
