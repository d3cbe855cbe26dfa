//! Small helpers shared by the `media` library and the `muxgen` binary.

pub mod debug_log;
