//! Owned buffers of raw (uncompressed) media: [AudioFrame]s and
//! [VideoFrame]s.
//!
//! Frames are allocated once per stream and reused for every frame the stream
//! produces, so constructors allocate and everything else only overwrites.

mod audio;
mod video;

pub use audio::*;
pub use video::*;
