//! FFmpeg library setup and log level configuration.
//!
//! FFmpeg has its own internal logging system, separate from the Rust
//! [`log`](https://crates.io/crates/log) crate. By default it prints warnings
//! and errors to stderr, which is noisy inside a long-running service. This
//! module wraps FFmpeg's log-level API so callers can tune that output without
//! importing `ffmpeg-next` directly, and owns the one-time library
//! initialisation used by [`LibraryBackend`](crate::LibraryBackend).
//!
//! # Example
//!
//! ```no_run
//! use gopslice::FfmpegLogLevel;
//!
//! gopslice::set_ffmpeg_log_level(FfmpegLogLevel::Error);
//! let level: FfmpegLogLevel = "warning".parse().unwrap();
//! assert_eq!(level, FfmpegLogLevel::Warning);
//! ```
//!
//! # Note
//!
//! This controls **FFmpeg's own console output**, not the Rust-side
//! diagnostic messages emitted via the `log` crate, and has no effect on the
//! external tools driven by [`CommandBackend`](crate::CommandBackend).

use std::path::Path;
use std::str::FromStr;

use ffmpeg_next::util::log::Level;

use crate::error::GopError;

/// FFmpeg internal log verbosity level.
///
/// # Ordering (most verbose → most quiet)
///
/// `Trace` > `Debug` > `Verbose` > `Info` > `Warning` > `Error` > `Fatal` > `Panic` > `Quiet`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FfmpegLogLevel {
    /// Print no output at all.
    Quiet,
    /// Only log conditions the process cannot recover from.
    Panic,
    /// Only log unrecoverable errors.
    Fatal,
    /// Log recoverable errors.
    Error,
    /// Log warnings (default FFmpeg level).
    Warning,
    /// Log informational messages.
    Info,
    /// Log verbose informational messages.
    Verbose,
    /// Log debugging messages.
    Debug,
    /// Extremely verbose tracing output.
    Trace,
}

impl FfmpegLogLevel {
    fn to_ffmpeg_level(self) -> Level {
        match self {
            FfmpegLogLevel::Quiet => Level::Quiet,
            FfmpegLogLevel::Panic => Level::Panic,
            FfmpegLogLevel::Fatal => Level::Fatal,
            FfmpegLogLevel::Error => Level::Error,
            FfmpegLogLevel::Warning => Level::Warning,
            FfmpegLogLevel::Info => Level::Info,
            FfmpegLogLevel::Verbose => Level::Verbose,
            FfmpegLogLevel::Debug => Level::Debug,
            FfmpegLogLevel::Trace => Level::Trace,
        }
    }

    fn from_ffmpeg_level(level: Level) -> Self {
        match level {
            Level::Quiet => FfmpegLogLevel::Quiet,
            Level::Panic => FfmpegLogLevel::Panic,
            Level::Fatal => FfmpegLogLevel::Fatal,
            Level::Error => FfmpegLogLevel::Error,
            Level::Warning => FfmpegLogLevel::Warning,
            Level::Info => FfmpegLogLevel::Info,
            Level::Verbose => FfmpegLogLevel::Verbose,
            Level::Debug => FfmpegLogLevel::Debug,
            Level::Trace => FfmpegLogLevel::Trace,
        }
    }

    /// The `-loglevel` argument understood by the `ffmpeg` and `ffprobe`
    /// command-line tools.
    pub fn as_cli_arg(self) -> &'static str {
        match self {
            FfmpegLogLevel::Quiet => "quiet",
            FfmpegLogLevel::Panic => "panic",
            FfmpegLogLevel::Fatal => "fatal",
            FfmpegLogLevel::Error => "error",
            FfmpegLogLevel::Warning => "warning",
            FfmpegLogLevel::Info => "info",
            FfmpegLogLevel::Verbose => "verbose",
            FfmpegLogLevel::Debug => "debug",
            FfmpegLogLevel::Trace => "trace",
        }
    }
}

impl FromStr for FfmpegLogLevel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "quiet" => Ok(FfmpegLogLevel::Quiet),
            "panic" => Ok(FfmpegLogLevel::Panic),
            "fatal" => Ok(FfmpegLogLevel::Fatal),
            "error" => Ok(FfmpegLogLevel::Error),
            "warning" | "warn" => Ok(FfmpegLogLevel::Warning),
            "info" => Ok(FfmpegLogLevel::Info),
            "verbose" => Ok(FfmpegLogLevel::Verbose),
            "debug" => Ok(FfmpegLogLevel::Debug),
            "trace" => Ok(FfmpegLogLevel::Trace),
            other => Err(format!("unknown FFmpeg log level: {other}")),
        }
    }
}

/// Set the FFmpeg internal log verbosity level.
///
/// This controls what the linked FFmpeg libraries print to stderr. It does
/// **not** affect Rust-side `log` crate output.
pub fn set_ffmpeg_log_level(level: FfmpegLogLevel) {
    ffmpeg_next::util::log::set_level(level.to_ffmpeg_level());
}

/// Get the current FFmpeg internal log verbosity level.
///
/// Returns `None` if the current level does not map to a known variant.
pub fn get_ffmpeg_log_level() -> Option<FfmpegLogLevel> {
    ffmpeg_next::util::log::get_level()
        .ok()
        .map(FfmpegLogLevel::from_ffmpeg_level)
}

/// Initialise the FFmpeg libraries (idempotent).
///
/// Failure is reported as a probe failure of `path`, the file that needed the
/// libraries.
pub(crate) fn initialize(path: &Path) -> Result<(), GopError> {
    ffmpeg_next::init().map_err(|error| GopError::Probe {
        path: path.to_path_buf(),
        diagnostic: format!("FFmpeg initialisation failed: {error}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_aliases_case_insensitively() {
        assert_eq!("WARN".parse::<FfmpegLogLevel>(), Ok(FfmpegLogLevel::Warning));
        assert_eq!("quiet".parse::<FfmpegLogLevel>(), Ok(FfmpegLogLevel::Quiet));
        assert!("loud".parse::<FfmpegLogLevel>().is_err());
    }

    #[test]
    fn cli_argument_round_trips_through_parse() {
        for level in [
            FfmpegLogLevel::Quiet,
            FfmpegLogLevel::Error,
            FfmpegLogLevel::Trace,
        ] {
            assert_eq!(level.as_cli_arg().parse::<FfmpegLogLevel>(), Ok(level));
        }
    }
}
