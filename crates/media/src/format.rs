//! The vocabulary used to describe raw media: what kind of stream something
//! is, how audio samples are laid out and how video pixels are laid out.

mod dimensions;

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

pub use dimensions::*;

/// Whether a stream carries audio or video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Video,
    Audio,
}

impl Display for MediaKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
        })
    }
}

/// How a single audio sample is stored.
///
/// Interleaved formats keep every channel in one plane (`LRLRLR...`), planar
/// formats have one plane per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleFormat {
    /// Signed 16-bit, interleaved.
    S16,
    /// Signed 16-bit, planar.
    S16Planar,
    /// 32-bit float in `[-1.0, 1.0]`, interleaved.
    F32,
    /// 32-bit float in `[-1.0, 1.0]`, planar.
    F32Planar,
}

impl SampleFormat {
    pub const fn is_planar(self) -> bool {
        matches!(self, SampleFormat::S16Planar | SampleFormat::F32Planar)
    }

    pub const fn is_float(self) -> bool {
        matches!(self, SampleFormat::F32 | SampleFormat::F32Planar)
    }

    pub const fn bytes_per_sample(self) -> usize {
        if self.is_float() { 4 } else { 2 }
    }

    /// The number of planes a frame with `channels` channels needs.
    pub const fn plane_count(self, channels: usize) -> usize {
        if self.is_planar() { channels } else { 1 }
    }

    /// The name FFmpeg uses for this format (e.g. `fltp`).
    pub const fn name(self) -> &'static str {
        match self {
            SampleFormat::S16 => "s16",
            SampleFormat::S16Planar => "s16p",
            SampleFormat::F32 => "flt",
            SampleFormat::F32Planar => "fltp",
        }
    }
}

impl Display for SampleFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which speakers an audio stream has.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelLayout {
    Mono,
    Stereo,
}

impl ChannelLayout {
    pub const fn channels(self) -> usize {
        match self {
            ChannelLayout::Mono => 1,
            ChannelLayout::Stereo => 2,
        }
    }
}

impl Display for ChannelLayout {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChannelLayout::Mono => "mono",
            ChannelLayout::Stereo => "stereo",
        })
    }
}

/// How the pixels of a video frame are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    /// Planar Y, Cb, Cr with chroma at half width and half height.
    #[default]
    Yuv420p,
    /// Planar Y, Cb, Cr, all at full resolution.
    Yuv444p,
    /// A single luma plane.
    Gray8,
    /// Packed 8-bit R, G, B.
    Rgb24,
    /// Packed 8-bit R, G, B, A.
    Rgba,
}

impl PixelFormat {
    /// The size (in pixels) and bytes per pixel of every plane of a frame with
    /// this format and `dimensions`.
    pub fn planes(self, dimensions: Dimensions) -> Vec<(Dimensions, usize)> {
        match self {
            PixelFormat::Yuv420p => {
                let chroma = dimensions.halved();
                vec![(dimensions, 1), (chroma, 1), (chroma, 1)]
            }
            PixelFormat::Yuv444p => vec![(dimensions, 1); 3],
            PixelFormat::Gray8 => vec![(dimensions, 1)],
            PixelFormat::Rgb24 => vec![(dimensions, 3)],
            PixelFormat::Rgba => vec![(dimensions, 4)],
        }
    }

    /// The name FFmpeg uses for this format (e.g. `yuv420p`).
    pub const fn name(self) -> &'static str {
        match self {
            PixelFormat::Yuv420p => "yuv420p",
            PixelFormat::Yuv444p => "yuv444p",
            PixelFormat::Gray8 => "gray",
            PixelFormat::Rgb24 => "rgb24",
            PixelFormat::Rgba => "rgba",
        }
    }
}

impl Display for PixelFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Everything needed to interpret the samples of an audio frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AudioFormat {
    pub sample_format: SampleFormat,
    pub layout: ChannelLayout,
    pub sample_rate: u32,
}

impl Display for AudioFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} Hz {} {}", self.sample_rate, self.layout, self.sample_format)
    }
}

/// Everything needed to interpret the pixels of a video frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VideoFormat {
    pub pixel_format: PixelFormat,
    pub dimensions: Dimensions,
}

impl Display for VideoFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.pixel_format, self.dimensions)
    }
}
