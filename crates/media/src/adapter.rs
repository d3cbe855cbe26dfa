//! The send/drain state machine around one [Encoder].

use std::collections::VecDeque;

use crate::codec::{EncodeError, Encoder, EncoderOutput};
use crate::frame::{AudioFrame, VideoFrame};
use crate::packet::{Packet, StreamId};
use crate::time::Rational;

/// Where an [EncoderAdapter] is in its cycle.
///
/// ```text
/// Idle --submit(frame)--> Fed --drain--> Draining --needs input--> Idle
/// Idle --submit(end)--> EndOfStream --drain--> Draining --exhausted--> Exhausted
/// (any failure) --> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdapterState {
    /// Ready for input.
    Idle,
    /// A frame was sent; output has to be drained.
    Fed,
    /// Output is being pulled.
    Draining,
    /// The end of the stream was sent; the last output has to be drained.
    EndOfStream,
    /// Everything was drained after the end of the stream. Nothing more will
    /// ever come out.
    Exhausted,
    /// The encoder failed and must not be used again.
    Failed,
}

/// What gets sent to the encoder.
#[derive(Debug, Clone, Copy)]
pub enum Input<'a> {
    Audio(&'a AudioFrame),
    Video(&'a VideoFrame),
    EndOfStream,
}

/// Why a [EncoderAdapter::drain] stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Drained {
    /// The encoder wants more input before it can output anything else.
    NeedsMoreInput,
    /// The encoder is finished for good.
    Exhausted,
}

/// Owns one open [Encoder], enforces the order of operations on it and moves
/// every packet it emits into the destination (container stream) time base.
pub struct EncoderAdapter {
    encoder: Box<dyn Encoder>,
    stream: StreamId,
    source: Rational,
    destination: Rational,
    state: AdapterState,
}

impl EncoderAdapter {
    /// Wrap `encoder`, stamping its packets with `stream`. Packets keep the
    /// encoder's time base until [Self::set_destination] is called.
    pub fn new(encoder: Box<dyn Encoder>, stream: StreamId) -> Self {
        let source = encoder.time_base();
        Self {
            encoder,
            stream,
            source,
            destination: source,
            state: AdapterState::Idle,
        }
    }

    pub fn state(&self) -> AdapterState {
        self.state
    }

    /// The time base of timestamps going into the encoder.
    pub fn time_base(&self) -> Rational {
        self.source
    }

    pub fn destination(&self) -> Rational {
        self.destination
    }

    /// Set the time base that emitted packets get rescaled into.
    pub fn set_destination(&mut self, time_base: Rational) {
        self.destination = time_base;
    }

    pub fn frame_size(&self) -> Option<usize> {
        self.encoder.frame_size()
    }

    /// Send a frame or the end of the stream. Only valid while
    /// [AdapterState::Idle].
    pub fn submit(&mut self, input: Input<'_>) -> Result<(), EncodeError> {
        match self.state {
            AdapterState::Idle => {}
            AdapterState::Fed | AdapterState::Draining => return Err(EncodeError::Busy),
            AdapterState::EndOfStream | AdapterState::Exhausted => {
                return Err(EncodeError::AfterEndOfStream);
            }
            AdapterState::Failed => return Err(EncodeError::AlreadyFailed),
        }

        let (result, next) = match input {
            Input::Audio(frame) => (self.encoder.send_audio(frame), AdapterState::Fed),
            Input::Video(frame) => (self.encoder.send_video(frame), AdapterState::Fed),
            Input::EndOfStream => (self.encoder.send_end_of_stream(), AdapterState::EndOfStream),
        };

        self.state = if result.is_ok() {
            next
        } else {
            AdapterState::Failed
        };
        result
    }

    /// Pull packets into `out` until the encoder needs more input or is
    /// exhausted.
    ///
    /// Asking for more input after the end of the stream, running out before
    /// the end of the stream and any encoder failure are all errors.
    pub fn drain(&mut self, out: &mut VecDeque<Packet>) -> Result<Drained, EncodeError> {
        let ended = match self.state {
            AdapterState::Fed => false,
            AdapterState::EndOfStream => true,
            AdapterState::Idle => return Ok(Drained::NeedsMoreInput),
            AdapterState::Exhausted => return Ok(Drained::Exhausted),
            AdapterState::Draining | AdapterState::Failed => {
                return Err(EncodeError::AlreadyFailed);
            }
        };
        self.state = AdapterState::Draining;

        loop {
            let failure = match self.encoder.receive_packet() {
                EncoderOutput::Produced(mut packet) => {
                    packet.rescale(self.source, self.destination);
                    packet.stream = self.stream;
                    out.push_back(packet);
                    continue;
                }
                EncoderOutput::NeedsMoreInput if !ended => {
                    self.state = AdapterState::Idle;
                    return Ok(Drained::NeedsMoreInput);
                }
                EncoderOutput::Exhausted if ended => {
                    self.state = AdapterState::Exhausted;
                    return Ok(Drained::Exhausted);
                }
                EncoderOutput::NeedsMoreInput => EncodeError::InputAfterEndOfStream,
                EncoderOutput::Exhausted => EncodeError::ExhaustedEarly,
                EncoderOutput::Fatal(err) => err,
            };

            self.state = AdapterState::Failed;
            return Err(failure);
        }
    }

    /// Close the encoder.
    pub fn close(self) {
        drop(self.encoder);
    }
}
