use super::{ConvertError, Scaler};
use crate::format::{PixelFormat, VideoFormat};
use crate::frame::VideoFrame;

/// A [Scaler] that picks the nearest source pixel (no filtering) and converts
/// planar YUV sources to any [PixelFormat], using BT.601 (limited range) for
/// RGB targets.
#[derive(Debug, Clone)]
pub struct PlaneScaler {
    input: VideoFormat,
    output: VideoFormat,
}

impl PlaneScaler {
    pub fn new(input: VideoFormat, output: VideoFormat) -> Result<Self, ConvertError> {
        match input.pixel_format {
            PixelFormat::Yuv420p | PixelFormat::Yuv444p => Ok(Self { input, output }),
            _ => Err(ConvertError::UnsupportedSource(input)),
        }
    }

    /// Map output pixel `(x, y)` of an output plane with `(width, height)`
    /// pixels to a full-resolution source pixel.
    fn source_pixel(&self, x: usize, y: usize, width: usize, height: usize) -> (usize, usize) {
        let (out_w, out_h) = (self.output.dimensions.width(), self.output.dimensions.height());
        let (in_w, in_h) = (self.input.dimensions.width(), self.input.dimensions.height());

        let full_x = x * out_w / width;
        let full_y = y * out_h / height;
        (full_x * in_w / out_w, full_y * in_h / out_h)
    }

    /// Read plane `plane` of `input` at full-resolution source pixel `(x, y)`.
    fn fetch(&self, input: &VideoFrame, plane: usize, x: usize, y: usize) -> u8 {
        let (in_w, in_h) = (self.input.dimensions.width(), self.input.dimensions.height());
        let plane = &input.planes()[plane];
        plane.row(y * plane.rows() / in_h)[x * plane.row_bytes() / in_w]
    }

    fn yuv(&self, input: &VideoFrame, x: usize, y: usize) -> (u8, u8, u8) {
        (
            self.fetch(input, 0, x, y),
            self.fetch(input, 1, x, y),
            self.fetch(input, 2, x, y),
        )
    }
}

/// BT.601 limited range YCbCr to RGB, in 8.8 fixed point.
fn yuv_to_rgb((y, cb, cr): (u8, u8, u8)) -> [u8; 3] {
    let c = y as i32 - 16;
    let d = cb as i32 - 128;
    let e = cr as i32 - 128;

    let clamp = |v: i32| ((v + 128) >> 8).clamp(0, 255) as u8;
    [
        clamp(298 * c + 409 * e),
        clamp(298 * c - 100 * d - 208 * e),
        clamp(298 * c + 516 * d),
    ]
}

impl Scaler for PlaneScaler {
    fn scale(&mut self, input: &VideoFrame, output: &mut VideoFrame) -> Result<(), ConvertError> {
        if input.format() != self.input {
            return Err(ConvertError::WrongVideoFormat {
                expected: self.input,
                actual: input.format(),
            });
        }
        if output.format() != self.output {
            return Err(ConvertError::WrongVideoFormat {
                expected: self.output,
                actual: output.format(),
            });
        }

        let pixel_format = self.output.pixel_format;
        for (p, plane) in output.planes_mut().iter_mut().enumerate() {
            let bytes_per_pixel = match pixel_format {
                PixelFormat::Rgb24 => 3,
                PixelFormat::Rgba => 4,
                _ => 1,
            };
            let (width, height) = (plane.row_bytes() / bytes_per_pixel, plane.rows());

            for y in 0..height {
                let row = plane.row_mut(y);
                for x in 0..width {
                    let (sx, sy) = self.source_pixel(x, y, width, height);
                    let pixel = &mut row[x * bytes_per_pixel..(x + 1) * bytes_per_pixel];

                    match pixel_format {
                        PixelFormat::Yuv420p | PixelFormat::Yuv444p | PixelFormat::Gray8 => {
                            pixel[0] = self.fetch(input, p, sx, sy)
                        }
                        PixelFormat::Rgb24 => {
                            pixel.copy_from_slice(&yuv_to_rgb(self.yuv(input, sx, sy)))
                        }
                        PixelFormat::Rgba => {
                            pixel[..3].copy_from_slice(&yuv_to_rgb(self.yuv(input, sx, sy)));
                            pixel[3] = u8::MAX;
                        }
                    }
                }
            }
        }

        Ok(())
    }
}
