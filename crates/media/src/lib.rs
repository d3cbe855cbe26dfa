//! This library contains all of the functionality for generating, encoding
//! and muxing media.
//!
//! A run ([pipeline::run]) synthesizes a video and an audio stream, encodes
//! them and interleaves the packets into a container in presentation order.

pub mod adapter;
pub mod backend;
pub mod codec;
pub mod config;
pub mod convert;
pub mod error;
pub mod format;
pub mod frame;
pub mod packet;
pub mod pipeline;
pub mod scheduler;
pub mod sink;
pub mod stream;
pub mod synth;
pub mod time;

#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;

pub use error::MuxError;
