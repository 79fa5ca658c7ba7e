//! Media backends: the narrow seam between segmentation logic and the
//! tools that actually read and write video.
//!
//! A [`MediaBackend`] answers three questions about a file: where its
//! keyframes are, how many frames it has, and how to stream-copy a run of
//! frames into a new file. Two implementations ship with the crate:
//!
//! - [`LibraryBackend`] drives the linked FFmpeg libraries in-process via
//!   `ffmpeg-next`.
//! - [`CommandBackend`] drives the `ffprobe` and `ffmpeg` command-line tools
//!   as child processes.
//!
//! The indexer, resolver and extractor only ever see the trait, so swapping
//! one for the other (or for a scripted test double) changes nothing above
//! this module.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::GopError;
use crate::keyframe::KeyframeRecord;
use crate::progress::Deadline;

pub mod command;
pub mod library;
mod process;

pub use command::CommandBackend;
pub use library::LibraryBackend;

/// One stream-copy job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyRequest {
    /// Source video.
    pub input: PathBuf,
    /// File to create or overwrite.
    pub output: PathBuf,
    /// Presentation time of the segment's keyframe, used for input seeking.
    pub seek: Duration,
    /// Exact number of video frames to emit.
    pub frame_count: u64,
}

/// Probe and copy operations a segmentation backend must provide.
///
/// Every method receives a [`Deadline`] and must return
/// [`GopError::TimedOut`] or [`GopError::Cancelled`] promptly once
/// [`Deadline::check`] fails.
pub trait MediaBackend: Send + Sync {
    /// List the I-frames of the first video stream, in decode order.
    ///
    /// A valid file with no I-frames yields an empty vector. A file that
    /// cannot be parsed, or has no video stream, yields
    /// [`GopError::Probe`].
    fn probe_keyframes(
        &self,
        path: &Path,
        deadline: &Deadline,
    ) -> Result<Vec<KeyframeRecord>, GopError>;

    /// Count every frame of the first video stream. May require a full
    /// decode pass.
    fn count_frames(&self, path: &Path, deadline: &Deadline) -> Result<u64, GopError>;

    /// Input-seek to `request.seek` and copy exactly `request.frame_count`
    /// video frames into `request.output` without re-encoding.
    ///
    /// Failures are reported as [`GopError::Extraction`] carrying the
    /// tool's diagnostic text.
    fn copy_segment(&self, request: &CopyRequest, deadline: &Deadline) -> Result<(), GopError>;
}

impl<B: MediaBackend + ?Sized> MediaBackend for std::sync::Arc<B> {
    fn probe_keyframes(
        &self,
        path: &Path,
        deadline: &Deadline,
    ) -> Result<Vec<KeyframeRecord>, GopError> {
        (**self).probe_keyframes(path, deadline)
    }

    fn count_frames(&self, path: &Path, deadline: &Deadline) -> Result<u64, GopError> {
        (**self).count_frames(path, deadline)
    }

    fn copy_segment(&self, request: &CopyRequest, deadline: &Deadline) -> Result<(), GopError> {
        (**self).copy_segment(request, deadline)
    }
}

impl MediaBackend for Box<dyn MediaBackend> {
    fn probe_keyframes(
        &self,
        path: &Path,
        deadline: &Deadline,
    ) -> Result<Vec<KeyframeRecord>, GopError> {
        (**self).probe_keyframes(path, deadline)
    }

    fn count_frames(&self, path: &Path, deadline: &Deadline) -> Result<u64, GopError> {
        (**self).count_frames(path, deadline)
    }

    fn copy_segment(&self, request: &CopyRequest, deadline: &Deadline) -> Result<(), GopError> {
        (**self).copy_segment(request, deadline)
    }
}

/// A seek target in whole microseconds, rounded up.
///
/// Input seeking lands on the last keyframe at or before the target; rounding
/// up keeps a keyframe's own timestamp from falling just short of it and
/// landing on the previous group.
pub(crate) fn seek_micros(seek: Duration) -> i64 {
    let micros = seek.as_nanos().div_ceil(1_000);
    i64::try_from(micros).unwrap_or(i64::MAX)
}
