use crate::format::{Dimensions, PixelFormat, VideoFormat};

/// Rows of every [Plane] start on a multiple of this many bytes.
pub const ROW_ALIGNMENT: usize = 32;

/// One plane of a [VideoFrame]: `rows` rows of `row_bytes` meaningful bytes,
/// each row starting `stride` bytes after the previous one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plane {
    data: Vec<u8>,
    stride: usize,
    row_bytes: usize,
    rows: usize,
}

impl Plane {
    fn new(dimensions: Dimensions, bytes_per_pixel: usize) -> Self {
        let row_bytes = dimensions.width() * bytes_per_pixel;
        let stride = row_bytes.next_multiple_of(ROW_ALIGNMENT);

        Self {
            data: vec![0; stride * dimensions.height()],
            stride,
            row_bytes,
            rows: dimensions.height(),
        }
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn row_bytes(&self) -> usize {
        self.row_bytes
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    /// The meaningful bytes of row `y` (without the padding).
    pub fn row(&self, y: usize) -> &[u8] {
        let start = y * self.stride;
        &self.data[start..start + self.row_bytes]
    }

    /// The meaningful bytes of row `y` (without the padding).
    pub fn row_mut(&mut self, y: usize) -> &mut [u8] {
        let start = y * self.stride;
        &mut self.data[start..start + self.row_bytes]
    }
}

/// A buffer of pixels with a fixed [VideoFormat], stored as [Plane]s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    format: VideoFormat,
    planes: Vec<Plane>,
    pts: i64,
}

impl VideoFrame {
    /// Allocate a zeroed frame.
    pub fn new(format: VideoFormat) -> Self {
        let planes = format
            .pixel_format
            .planes(format.dimensions)
            .into_iter()
            .map(|(dimensions, bytes_per_pixel)| Plane::new(dimensions, bytes_per_pixel))
            .collect();

        Self {
            format,
            planes,
            pts: 0,
        }
    }

    pub fn format(&self) -> VideoFormat {
        self.format
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.format.pixel_format
    }

    pub fn dimensions(&self) -> Dimensions {
        self.format.dimensions
    }

    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    pub fn planes_mut(&mut self) -> &mut [Plane] {
        &mut self.planes
    }

    /// The presentation timestamp, in whatever time base the frame's consumer
    /// expects.
    pub fn pts(&self) -> i64 {
        self.pts
    }

    pub fn set_pts(&mut self, pts: i64) {
        self.pts = pts;
    }

    /// Every plane's rows back to back with the row padding removed.
    pub fn to_packed_bytes(&self) -> Vec<u8> {
        let len = self.planes.iter().map(|p| p.row_bytes * p.rows).sum();
        let mut bytes = Vec::with_capacity(len);

        for plane in &self.planes {
            for y in 0..plane.rows {
                bytes.extend_from_slice(plane.row(y));
            }
        }

        bytes
    }
}
