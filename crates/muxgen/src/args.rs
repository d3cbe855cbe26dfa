//! Contains [Args], which are parsed command-line flags.

use std::path::PathBuf;

use clap::Parser;

/// Parsed command line arguments.
#[derive(Parser, Debug, Clone, PartialEq, Eq, Hash)]
#[command(
    about = "Generate a synthetic audio and video stream and mux them into a file.",
    long_about = "Generate a synthetic audio and video stream and mux them into a file. \
        The output format is guessed from the file extension."
)]
pub struct Args {
    /// Where to write the output.
    pub output: PathBuf,

    /// Options passed on to the encoders and the muxer as `-key value` pairs.
    /// Only `-flags` (encoders) and `-fflags` (muxer) are used.
    #[arg(num_args(0..), trailing_var_arg = true, allow_hyphen_values = true)]
    pub options: Vec<String>,

    /// A JSON file with settings that replace the defaults (duration, frame
    /// rate, dimensions, ...).
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[cfg(feature = "ffmpeg")]
    /// Encode and mux with FFmpeg instead of the built-in backend.
    #[arg(long)]
    pub ffmpeg: bool,

    #[cfg(debug_assertions)]
    /// Disable debug logging. This option only exists if `debug_assertions` are
    /// enabled.
    #[arg(long)]
    pub no_debug_logging: bool,

    #[cfg(debug_assertions)]
    /// Enable debug error log panics. This option only exists if
    /// `debug_assertions` are enabled.
    #[arg(long, conflicts_with = "no_debug_logging")]
    pub debug_error_log_panics: bool,
}
