//! Deterministic generators for raw audio and video.
//!
//! Both generators are pure functions of a frame index: asking for the same
//! index twice always gives the same samples/pixels, and any index can be
//! generated without generating the ones before it. Neither ever runs out;
//! deciding when a stream ends is up to the caller.

use std::f64::consts::TAU;

use serde::{Deserialize, Serialize};

use crate::frame::{AudioFrame, VideoFrame};

/// The test tone: a sine sweep starting at `frequency` Hz that rises by
/// `frequency` Hz every second.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tone {
    /// The starting frequency, in Hz.
    pub frequency: f64,
    /// The peak amplitude, on the signed 16-bit scale.
    pub amplitude: f64,
}

impl Default for Tone {
    fn default() -> Self {
        Self {
            frequency: 110.0,
            amplitude: 10000.0,
        }
    }
}

/// Generates the [Tone] as signed 16-bit samples, identical on every channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioSynth {
    /// Phase increment of the first sample, in radians.
    tincr: f64,
    /// How much the phase increment grows with every sample.
    tincr2: f64,
    amplitude: f64,
}

impl AudioSynth {
    pub fn new(sample_rate: u32, tone: Tone) -> Self {
        let tincr = TAU * tone.frequency / sample_rate as f64;
        Self {
            tincr,
            tincr2: tincr / sample_rate as f64,
            amplitude: tone.amplitude,
        }
    }

    /// The phase (in radians) of sample `n`.
    ///
    /// Sample `n` is reached after `n` increments of `tincr + k * tincr2` for
    /// `k` in `0..n`, which sums to `n * tincr + tincr2 * n * (n - 1) / 2`.
    pub fn phase(&self, n: u64) -> f64 {
        let n = n as f64;
        n * self.tincr + self.tincr2 * (n * (n - 1.0) / 2.0)
    }

    /// Sample `n` (truncated toward zero).
    pub fn sample(&self, n: u64) -> i16 {
        (self.phase(n).sin() * self.amplitude) as i16
    }

    /// Fill every valid sample of `frame` (on every channel), starting at
    /// sample `first`.
    pub fn fill(&self, frame: &mut AudioFrame, first: u64) {
        for i in 0..frame.samples() {
            let value = self.sample(first + i as u64) as f32 / 32768.0;
            for channel in 0..frame.channels() {
                frame.set_sample(channel, i, value);
            }
        }
    }
}

/// Generates a moving gradient.
///
/// The luma plane is `(x + y + 3i) mod 256`. If the frame has chroma planes,
/// Cb is `(128 + y + 2i) mod 256` and Cr is `(64 + x + 5i) mod 256`, with `x`
/// and `y` in the chroma plane's own coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VideoSynth;

impl VideoSynth {
    /// Fill `frame` with frame number `index` of the pattern.
    pub fn fill(&self, frame: &mut VideoFrame, index: i64) {
        let pixel = |base: i64, x: usize, y: usize, x_scale: i64, y_scale: i64, i_scale: i64| {
            (base + x as i64 * x_scale + y as i64 * y_scale + index * i_scale).rem_euclid(256) as u8
        };

        let planes = frame.planes_mut();
        let (luma, chroma) = planes.split_at_mut(1);

        let luma = &mut luma[0];
        for y in 0..luma.rows() {
            for (x, value) in luma.row_mut(y).iter_mut().enumerate() {
                *value = pixel(0, x, y, 1, 1, 3);
            }
        }

        if let [cb, cr] = chroma {
            for y in 0..cb.rows() {
                for (x, value) in cb.row_mut(y).iter_mut().enumerate() {
                    *value = pixel(128, x, y, 0, 1, 2);
                }
                for (x, value) in cr.row_mut(y).iter_mut().enumerate() {
                    *value = pixel(64, x, y, 1, 0, 5);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{AudioFormat, ChannelLayout, PixelFormat, SampleFormat, VideoFormat};

    fn s16_stereo(samples: usize) -> AudioFrame {
        AudioFrame::new(
            AudioFormat {
                sample_format: SampleFormat::S16,
                layout: ChannelLayout::Stereo,
                sample_rate: 44100,
            },
            samples,
        )
    }

    fn yuv420p() -> VideoFrame {
        VideoFrame::new(VideoFormat {
            pixel_format: PixelFormat::Yuv420p,
            dimensions: (352, 288).into(),
        })
    }

    #[test]
    fn closed_form_phase_matches_accumulation() {
        let synth = AudioSynth::new(44100, Tone::default());

        let mut t = 0.0;
        let mut tincr = synth.tincr;
        for n in 0..5000 {
            assert!((synth.phase(n) - t).abs() < 1e-7, "sample {n}");
            t += tincr;
            tincr += synth.tincr2;
        }
    }

    #[test]
    fn audio_is_deterministic_and_addressable() {
        let synth = AudioSynth::new(44100, Tone::default());

        let mut whole = s16_stereo(2000);
        synth.fill(&mut whole, 0);

        let mut second_half = s16_stereo(1000);
        synth.fill(&mut second_half, 1000);

        let mut again = s16_stereo(1000);
        synth.fill(&mut again, 1000);

        assert_eq!(second_half, again);
        for i in 0..1000 {
            assert_eq!(whole.sample(0, 1000 + i), second_half.sample(0, i));
            assert_eq!(second_half.sample(0, i), second_half.sample(1, i));
        }
    }

    #[test]
    fn audio_starts_silent_and_stays_in_range() {
        let synth = AudioSynth::new(44100, Tone::default());
        assert_eq!(synth.sample(0), 0);
        assert!((0..44100).all(|n| synth.sample(n).abs() <= 10000));
        assert!((0..44100).any(|n| synth.sample(n) > 9990));
    }

    #[test]
    fn video_pattern() {
        let mut frame = yuv420p();
        VideoSynth.fill(&mut frame, 2);

        let planes = frame.planes();
        assert_eq!(planes[0].row(0)[0], 6);
        assert_eq!(planes[0].row(10)[20], 36);
        assert_eq!(planes[0].row(200)[300], ((200 + 300 + 6) % 256) as u8);
        assert_eq!(planes[1].row(5)[100], 128 + 5 + 4);
        assert_eq!(planes[2].row(100)[7], 64 + 7 + 10);
    }

    #[test]
    fn video_is_deterministic() {
        let mut a = yuv420p();
        let mut b = yuv420p();
        VideoSynth.fill(&mut a, 41);
        VideoSynth.fill(&mut b, 3);
        VideoSynth.fill(&mut b, 41);
        assert_eq!(a, b);
    }
}
