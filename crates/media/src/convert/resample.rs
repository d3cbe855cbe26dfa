use super::{ConvertError, Resampler};
use crate::format::{AudioFormat, ChannelLayout};
use crate::frame::AudioFrame;

/// A [Resampler] that interpolates linearly between neighbouring input
/// samples.
///
/// Output sample `k` sits at input position `k * in_rate / out_rate`. The
/// position is kept as an exact fraction, so no matter how many frames go
/// through, output sample `k` is always computed from the same two input
/// samples.
#[derive(Debug, Clone)]
pub struct LinearResampler {
    input: AudioFormat,
    output: AudioFormat,
    /// Input samples that are still needed, one [Vec] per output channel.
    pending: Vec<Vec<f32>>,
    /// The index (in the whole input) of the first pending sample.
    first: u64,
    /// The index (in the whole output) of the next sample to write.
    produced: u64,
}

impl LinearResampler {
    pub fn new(input: AudioFormat, output: AudioFormat) -> Result<Self, ConvertError> {
        if input.sample_rate == 0 || output.sample_rate == 0 {
            return Err(ConvertError::ZeroSampleRate);
        }

        Ok(Self {
            input,
            output,
            pending: vec![Vec::new(); output.layout.channels()],
            first: 0,
            produced: 0,
        })
    }

    fn in_rate(&self) -> u128 {
        self.input.sample_rate as u128
    }

    fn out_rate(&self) -> u128 {
        self.output.sample_rate as u128
    }

    /// One past the index (in the whole input) of the last pending sample.
    fn end(&self) -> u64 {
        self.first + self.pending[0].len() as u64
    }

    /// Where output sample `k` sits in the input, as a whole index and a
    /// fraction of the way to the next index (`remainder / out_rate`).
    fn position(&self, k: u64) -> (u64, u128) {
        let scaled = k as u128 * self.in_rate();
        ((scaled / self.out_rate()) as u64, scaled % self.out_rate())
    }

    /// Read input sample `index` for output `channel`, mixing or duplicating
    /// channels as needed.
    fn read(input: &AudioFrame, output_layout: ChannelLayout, channel: usize, index: usize) -> f32 {
        match (input.layout(), output_layout) {
            (ChannelLayout::Stereo, ChannelLayout::Mono) => {
                (input.sample(0, index) + input.sample(1, index)) / 2.0
            }
            (ChannelLayout::Mono, _) => input.sample(0, index),
            _ => input.sample(channel, index),
        }
    }

    /// Write as many output samples as the pending input allows. At the end of
    /// the input the last sample is held to finish the final interpolation.
    fn produce(&mut self, output: &mut AudioFrame, at_end: bool) -> usize {
        let end = self.end();
        let mut written = 0;

        while written < output.capacity() {
            let (index, remainder) = self.position(self.produced);
            let next_needed = if remainder == 0 { index } else { index + 1 };
            if index >= end || (next_needed >= end && !at_end) {
                break;
            }

            let local = (index - self.first) as usize;
            let fraction = remainder as f32 / self.out_rate() as f32;

            for (channel, pending) in self.pending.iter().enumerate() {
                let a = pending[local];
                let b = pending.get(local + 1).copied().unwrap_or(a);
                output.set_sample(channel, written, a + (b - a) * fraction);
            }

            self.produced += 1;
            written += 1;
        }

        // Drop the input that no future output sample can reach.
        let (keep_from, _) = self.position(self.produced);
        let drop = keep_from.clamp(self.first, end) - self.first;
        for pending in &mut self.pending {
            pending.drain(..drop as usize);
        }
        self.first += drop;

        output.set_samples(written);
        written
    }

    fn check_output(&self, output: &AudioFrame) -> Result<(), ConvertError> {
        if output.format() != self.output {
            return Err(ConvertError::WrongAudioFormat {
                expected: self.output,
                actual: output.format(),
            });
        }
        Ok(())
    }
}

impl Resampler for LinearResampler {
    fn delay(&self, base_rate: u32) -> i64 {
        // Pending input measured from the position of the next output sample,
        // as a fraction with denominator `out_rate`.
        let pending = (self.end() as u128 * self.out_rate())
            .saturating_sub(self.produced as u128 * self.in_rate());
        let denominator = self.out_rate() * self.in_rate();

        (pending * base_rate as u128).div_ceil(denominator) as i64
    }

    fn convert(
        &mut self,
        input: &AudioFrame,
        output: &mut AudioFrame,
    ) -> Result<usize, ConvertError> {
        if input.format() != self.input {
            return Err(ConvertError::WrongAudioFormat {
                expected: self.input,
                actual: input.format(),
            });
        }
        self.check_output(output)?;

        for (channel, pending) in self.pending.iter_mut().enumerate() {
            pending.extend(
                (0..input.samples()).map(|i| Self::read(input, self.output.layout, channel, i)),
            );
        }

        Ok(self.produce(output, false))
    }

    fn flush(&mut self, output: &mut AudioFrame) -> Result<usize, ConvertError> {
        self.check_output(output)?;
        Ok(self.produce(output, true))
    }
}
