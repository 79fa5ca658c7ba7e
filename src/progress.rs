//! Progress reporting, cancellation, and time limits.
//!
//! This module provides [`ProgressCallback`] for monitoring long-running
//! group listings, [`CancellationToken`] for cooperative cancellation, and
//! [`Deadline`], which every backend call checks so that probing or copying a
//! malformed file cannot run unboundedly.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use gopslice::{
//!     CancellationToken, GopError, ProgressCallback, ProgressInfo, SegmentService,
//!     ServerConfiguration,
//! };
//!
//! struct PrintProgress;
//!
//! impl ProgressCallback for PrintProgress {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         if let Some(pct) = info.percentage {
//!             println!("[{:?}] {pct:.1}% complete", info.operation);
//!         }
//!     }
//! }
//!
//! let configuration = ServerConfiguration::new("videos", "segments")
//!     .with_progress(Arc::new(PrintProgress))
//!     .with_cancellation(CancellationToken::new());
//! let service = SegmentService::with_library_backend(configuration);
//! let groups = service.list_groups("CoolVideo.mp4")?;
//! # Ok::<(), GopError>(())
//! ```

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::{Duration, Instant};

use crate::error::GopError;

/// The kind of operation currently in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum OperationType {
    /// Listing keyframes.
    Indexing,
    /// Counting every frame of the video stream.
    FrameCounting,
    /// Stream-copying a group of pictures into its own file.
    Extraction,
}

/// A snapshot of progress through a multi-segment operation.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// What kind of work is being performed.
    pub operation: OperationType,
    /// How many segments have been processed so far.
    pub current: u64,
    /// Total segments expected, if known ahead of time.
    pub total: Option<u64>,
    /// Completion percentage (0.0 – 100.0), if `total` is known.
    pub percentage: Option<f32>,
    /// Wall-clock time elapsed since the operation started.
    pub elapsed: Duration,
    /// Estimated time remaining, based on current throughput.
    pub estimated_remaining: Option<Duration>,
    /// The segment that was just completed.
    pub current_segment: Option<usize>,
}

/// Trait for receiving progress updates.
///
/// Implementations must be [`Send`] and [`Sync`] because a service may be
/// shared between request threads.
///
/// Progress callbacks observe but cannot halt the operation. Use
/// [`CancellationToken`] for cooperative cancellation.
pub trait ProgressCallback: Send + Sync {
    /// Called at regular intervals during an operation.
    fn on_progress(&self, info: &ProgressInfo);
}

/// Discards all progress notifications. The default callback.
pub(crate) struct NoOpProgress;

impl ProgressCallback for NoOpProgress {
    fn on_progress(&self, _info: &ProgressInfo) {}
}

/// Cooperative cancellation token backed by an [`AtomicBool`].
///
/// Clone this token and share it between threads; call
/// [`cancel`](CancellationToken::cancel) from any thread to stop the
/// associated work. Backends check it between packets or while waiting on a
/// child process.
///
/// # Example
///
/// ```
/// use gopslice::CancellationToken;
///
/// let token = CancellationToken::new();
/// assert!(!token.is_cancelled());
///
/// token.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new, non-cancelled token.
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request cancellation.
    ///
    /// All clones of this token will observe the cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Check whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Time limit and cancellation state for a single backend call.
///
/// A deadline is created when the call starts; [`check`](Deadline::check)
/// returns [`GopError::TimedOut`] once the limit is exceeded and
/// [`GopError::Cancelled`] once the token fires.
#[derive(Debug, Clone)]
pub struct Deadline {
    operation: OperationType,
    started: Instant,
    limit: Option<Duration>,
    cancellation: Option<CancellationToken>,
}

impl Deadline {
    /// Start a deadline for `operation`. `None` means no time limit.
    pub fn start(
        operation: OperationType,
        limit: Option<Duration>,
        cancellation: Option<CancellationToken>,
    ) -> Self {
        Self {
            operation,
            started: Instant::now(),
            limit,
            cancellation,
        }
    }

    /// A deadline that never expires and cannot be cancelled.
    pub fn unbounded(operation: OperationType) -> Self {
        Self::start(operation, None, None)
    }

    /// The operation this deadline guards.
    pub fn operation(&self) -> OperationType {
        self.operation
    }

    /// Time left before the limit, or `None` when unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.limit
            .map(|limit| limit.saturating_sub(self.started.elapsed()))
    }

    /// Fail if the limit has passed or cancellation was requested.
    pub fn check(&self) -> Result<(), GopError> {
        if self
            .cancellation
            .as_ref()
            .is_some_and(|token| token.is_cancelled())
        {
            return Err(GopError::Cancelled);
        }
        if let Some(limit) = self.limit {
            if self.started.elapsed() >= limit {
                return Err(GopError::TimedOut {
                    operation: self.operation,
                    limit,
                });
            }
        }
        Ok(())
    }
}

/// Tracks progress timing and emits callbacks.
pub(crate) struct ProgressTracker {
    callback: Arc<dyn ProgressCallback>,
    operation: OperationType,
    total: Option<u64>,
    current: u64,
    batch_size: u64,
    start_time: Instant,
    items_since_last_report: u64,
}

impl ProgressTracker {
    pub(crate) fn new(
        callback: Arc<dyn ProgressCallback>,
        operation: OperationType,
        total: Option<u64>,
        batch_size: u64,
    ) -> Self {
        Self {
            callback,
            operation,
            total,
            current: 0,
            batch_size: batch_size.max(1),
            start_time: Instant::now(),
            items_since_last_report: 0,
        }
    }

    /// Record one completed segment and fire the callback if the batch
    /// threshold is reached.
    pub(crate) fn advance(&mut self, segment: Option<usize>) {
        self.current += 1;
        self.items_since_last_report += 1;

        if self.items_since_last_report >= self.batch_size {
            self.report(segment);
            self.items_since_last_report = 0;
        }
    }

    /// Unconditionally emit a final progress report.
    pub(crate) fn finish(&mut self) {
        self.report(None);
    }

    fn report(&self, segment: Option<usize>) {
        let elapsed = self.start_time.elapsed();

        let percentage = self
            .total
            .filter(|&t| t > 0)
            .map(|t| (self.current as f32 / t as f32) * 100.0);

        let estimated_remaining = if self.current > 0 {
            self.total.map(|t| {
                let remaining = t.saturating_sub(self.current);
                let per_item = elapsed / self.current as u32;
                per_item * remaining as u32
            })
        } else {
            None
        };

        let info = ProgressInfo {
            operation: self.operation,
            current: self.current,
            total: self.total,
            percentage,
            elapsed,
            estimated_remaining,
            current_segment: segment,
        };

        self.callback.on_progress(&info);
    }
}
