mod args;
mod settings;

use std::process::ExitCode;

use clap::Parser;
use clap::error::ErrorKind;

use media::backend::{Backend, BuiltinBackend};
use media::config::Options;
use media::error::{MuxError, report};

use args::Args;
use settings::SettingsError;

/// Anything that ends the program with a failure.
#[derive(thiserror::Error, Debug)]
enum AppError {
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    Mux(#[from] MuxError),
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            // Usage problems print the usage and exit with 1 like any other
            // failure (clap would use 2).
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
        }
    };

    #[cfg(debug_assertions)]
    {
        use util::debug_log;
        if args.no_debug_logging {
            debug_log::disable();
        } else if args.debug_error_log_panics {
            debug_log::panic_on_errors::enable();
        }
    }

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            util::debug_log_error!("The run failed: {e:?}");
            eprintln!("{}", report(&e));
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), AppError> {
    let config = settings::load(args.config.as_deref())?;
    let options = Options::from_args(&args.options);

    let backend = backend(args);
    let summary = media::pipeline::run(backend.as_ref(), &args.output, options, &config)?;

    util::debug_log_info!(
        "Wrote {} video packets ({} bytes) and {} audio packets ({} bytes).",
        summary.video.packets,
        summary.video.bytes,
        summary.audio.packets,
        summary.audio.bytes,
    );
    Ok(())
}

fn backend(args: &Args) -> Box<dyn Backend> {
    #[cfg(feature = "ffmpeg")]
    if args.ffmpeg {
        return Box::new(media::ffmpeg::FfmpegBackend);
    }

    let _ = args;
    Box::new(BuiltinBackend::new())
}
