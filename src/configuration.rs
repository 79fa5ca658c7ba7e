//! Service configuration.
//!
//! [`ServerConfiguration`] is a builder that carries directories, time
//! limits, retention, and operational hooks (progress, cancellation) into the
//! indexer, extractor and [`SegmentService`](crate::SegmentService) at
//! construction. Nothing is read from ambient global state.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use gopslice::{CancellationToken, ServerConfiguration};
//!
//! let token = CancellationToken::new();
//! let configuration = ServerConfiguration::new("/srv/videos", "/srv/segments")
//!     .with_probe_timeout(Some(Duration::from_secs(120)))
//!     .with_extraction_timeout(Some(Duration::from_secs(30)))
//!     .with_retention(Duration::from_secs(15 * 60))
//!     .with_cancellation(token.clone());
//! ```

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::ffmpeg::FfmpegLogLevel;
use crate::progress::{CancellationToken, NoOpProgress, ProgressCallback};

/// Default limit for keyframe listing and frame counting.
const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Default limit for a single stream copy.
const DEFAULT_EXTRACTION_TIMEOUT: Duration = Duration::from_secs(2 * 60);

/// Default age after which extracted segments are purged.
const DEFAULT_RETENTION: Duration = Duration::from_secs(60 * 60);

/// Configuration for a [`SegmentService`](crate::SegmentService) and its
/// components.
///
/// All fields have defaults except the two directories.
#[derive(Clone)]
pub struct ServerConfiguration {
    /// Read-only directory holding source videos.
    pub(crate) input_directory: PathBuf,
    /// Directory extracted segments are written to.
    pub(crate) output_directory: PathBuf,
    /// Limit for keyframe listing and frame counting. `None` disables it.
    pub(crate) probe_timeout: Option<Duration>,
    /// Limit for one extraction. `None` disables it.
    pub(crate) extraction_timeout: Option<Duration>,
    /// Age after which extracted segments are eligible for purging.
    pub(crate) retention: Duration,
    /// Container extension for extracted segments. `None` reuses the
    /// source file's extension.
    pub(crate) output_extension: Option<String>,
    /// FFmpeg console verbosity applied when a library backend is created.
    pub(crate) ffmpeg_log_level: Option<FfmpegLogLevel>,
    /// Progress callback. Defaults to a no-op.
    pub(crate) progress: Arc<dyn ProgressCallback>,
    /// Cancellation token. `None` means never cancelled.
    pub(crate) cancellation: Option<CancellationToken>,
    /// How often to fire the progress callback (every N segments).
    pub(crate) batch_size: u64,
}

impl Debug for ServerConfiguration {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ServerConfiguration")
            .field("input_directory", &self.input_directory)
            .field("output_directory", &self.output_directory)
            .field("probe_timeout", &self.probe_timeout)
            .field("extraction_timeout", &self.extraction_timeout)
            .field("retention", &self.retention)
            .field("output_extension", &self.output_extension)
            .field("has_cancellation", &self.cancellation.is_some())
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

impl ServerConfiguration {
    /// Create a configuration reading sources from `input_directory` and
    /// writing segments to `output_directory`.
    ///
    /// Defaults: 10 minute probe limit, 2 minute extraction limit, 1 hour
    /// retention, source extension for outputs, no progress callback, no
    /// cancellation, batch size 1.
    pub fn new<P1: AsRef<Path>, P2: AsRef<Path>>(input_directory: P1, output_directory: P2) -> Self {
        Self {
            input_directory: input_directory.as_ref().to_path_buf(),
            output_directory: output_directory.as_ref().to_path_buf(),
            probe_timeout: Some(DEFAULT_PROBE_TIMEOUT),
            extraction_timeout: Some(DEFAULT_EXTRACTION_TIMEOUT),
            retention: DEFAULT_RETENTION,
            output_extension: None,
            ffmpeg_log_level: None,
            progress: Arc::new(NoOpProgress),
            cancellation: None,
            batch_size: 1,
        }
    }

    /// Set the limit for keyframe listing and frame counting.
    #[must_use]
    pub fn with_probe_timeout(mut self, limit: Option<Duration>) -> Self {
        self.probe_timeout = limit;
        self
    }

    /// Set the limit for a single extraction.
    #[must_use]
    pub fn with_extraction_timeout(mut self, limit: Option<Duration>) -> Self {
        self.extraction_timeout = limit;
        self
    }

    /// Set how long extracted segments are kept before
    /// [`purge_expired`](crate::SegmentService::purge_expired) removes them.
    #[must_use]
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Force a container extension (without the dot) for extracted segments.
    #[must_use]
    pub fn with_output_extension(mut self, extension: &str) -> Self {
        self.output_extension = Some(extension.trim_start_matches('.').to_string());
        self
    }

    /// Set FFmpeg's own console verbosity.
    #[must_use]
    pub fn with_ffmpeg_log_level(mut self, level: FfmpegLogLevel) -> Self {
        self.ffmpeg_log_level = Some(level);
        self
    }

    /// Attach a progress callback, fired while listing groups.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// Attach a cancellation token.
    ///
    /// When the token is cancelled, in-flight probes and copies stop and
    /// return [`GopError::Cancelled`](crate::GopError::Cancelled).
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Set how often the progress callback fires. Clamped to a minimum of 1.
    #[must_use]
    pub fn with_batch_size(mut self, size: u64) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// The source directory.
    pub fn input_directory(&self) -> &Path {
        &self.input_directory
    }

    /// The segment output directory.
    pub fn output_directory(&self) -> &Path {
        &self.output_directory
    }

    /// The configured retention period.
    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Returns `true` if cancellation has been requested.
    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(|token| token.is_cancelled())
    }
}
