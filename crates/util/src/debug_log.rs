//! Contains tools for debug-mode logging.
//!
//! Logging cannot be enabled when `cfg!(debug_assertions)` is false, otherwise
//! it's enabled by default. Release builds of the muxer are silent apart from
//! the final error message (if any).
//!
//! Every entry is one line with a level tag followed by an indented line
//! saying where (source location) and when (UTC, RFC 3339) it was logged:
//!
//! ```text
//! DEBUG LOG [INFO]: pts:0 pts_time:0 dts:0 dts_time:0 duration:40 ...
//!     at crates/media/src/pipeline.rs:120:9 (2026-10-18T09:30:12.5Z)
//! ```

pub mod panic_on_errors;

use std::panic::Location;
#[cfg(debug_assertions)]
use std::sync::atomic::{AtomicBool, Ordering};

use time::{OffsetDateTime, format_description::well_known::Rfc3339};

/// Log some info to stdout if both `cfg!(debug_assertions)` and [enabled] are
/// true.
#[macro_export]
macro_rules! debug_log_info {
    ($($arg:tt)*) => {{
        #[cfg(debug_assertions)]
        if $crate::debug_log::enabled() {
            ::std::println!(
                "{}",
                $crate::debug_log::entry(
                    $crate::debug_log::Level::Info,
                    ::std::io::IsTerminal::is_terminal(&::std::io::stdout()),
                    &format!($($arg)*),
                ),
            );
        }
    }};
}

/// Log a warning to stderr if both `cfg!(debug_assertions)` and [enabled] are
/// true.
#[macro_export]
macro_rules! debug_log_warning {
    ($($arg:tt)*) => {{
        #[cfg(debug_assertions)]
        if $crate::debug_log::enabled() {
            ::std::eprintln!(
                "{}",
                $crate::debug_log::entry(
                    $crate::debug_log::Level::Warning,
                    ::std::io::IsTerminal::is_terminal(&::std::io::stderr()),
                    &format!($($arg)*),
                ),
            );
        }
    }};
}

/// Log an error to stderr if both `cfg!(debug_assertions)` and [enabled] are
/// true. Panics afterwards if [panic_on_errors::enabled] is true.
#[macro_export]
macro_rules! debug_log_error {
    ($($arg:tt)*) => {{
        #[cfg(debug_assertions)]
        if $crate::debug_log::enabled() {
            ::std::eprintln!(
                "{}",
                $crate::debug_log::entry(
                    $crate::debug_log::Level::Error,
                    ::std::io::IsTerminal::is_terminal(&::std::io::stderr()),
                    &format!($($arg)*),
                ),
            );

            if $crate::debug_log::panic_on_errors::enabled() {
                panic!("Panicking on error logging enabled.");
            }
        }
    }};
}

/// The severity of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    Info,
    Warning,
    Error,
}

impl Level {
    fn tag(self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Warning => "WARNING",
            Level::Error => "ERROR",
        }
    }

    fn color(self) -> &'static str {
        match self {
            Level::Info => "\x1b[35m",
            Level::Warning => "\x1b[33m",
            Level::Error => "\x1b[31m",
        }
    }
}

/// Whether logging is enabled or not.
///
/// Logging cannot be enabled when `cfg!(debug_assertions)` is false, otherwise
/// it's enabled by default.
#[inline(always)]
pub fn enabled() -> bool {
    #[cfg(not(debug_assertions))]
    #[inline(always)]
    fn enabled_impl() -> bool {
        false
    }

    #[cfg(debug_assertions)]
    #[inline(always)]
    fn enabled_impl() -> bool {
        ENABLED.load(Ordering::Relaxed)
    }

    enabled_impl()
}

/// Disable logging.
#[inline(always)]
pub fn disable() {
    #[cfg(debug_assertions)]
    ENABLED.store(false, Ordering::Relaxed);
}

/// Enable logging.
///
/// Trying to manually enable logging when `cfg!(debug_assertions)` is false
/// will result in the program panicking.
#[inline(always)]
pub fn enable() {
    #[cfg(not(debug_assertions))]
    panic!("Debug logging cannot be enabled.");

    #[cfg(debug_assertions)]
    ENABLED.store(true, Ordering::Relaxed);
}

/// Format one log entry for `message`, with terminal colors if `colored`.
///
/// This function gets called by the debug log macros (e.g. [debug_log_info])
/// and generally shouldn't be called directly.
#[track_caller]
pub fn entry(level: Level, colored: bool, message: &str) -> String {
    let (blue, color, reset) = if colored {
        ("\x1b[34m", level.color(), "\x1b[0m")
    } else {
        ("", "", "")
    };

    let loc = Location::caller();
    let when = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|e| format!("unknown time: {e}"));

    format!(
        "{blue}DEBUG LOG{reset} [{color}{}{reset}]: {message}\n\
        \tat {blue}{}:{}:{}{reset} ({when})",
        level.tag(),
        loc.file(),
        loc.line(),
        loc.column(),
    )
}

#[cfg(debug_assertions)]
static ENABLED: AtomicBool = AtomicBool::new(true);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_name_their_level_and_location() {
        let line = entry(Level::Warning, false, "option `foo` not found");

        assert!(line.starts_with("DEBUG LOG [WARNING]: option `foo` not found\n"));
        assert!(line.contains("debug_log.rs:"));
        assert!(!line.contains('\x1b'));
    }
}
