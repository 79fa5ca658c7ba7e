//! Error types for the `gopslice` crate.
//!
//! This module defines [`GopError`], the unified error type returned by every
//! fallible operation in the crate. Variants carry the probe or copy tool's
//! own diagnostic text where one exists, so a request boundary can report the
//! failure without any additional logging.

use std::{io::Error as IoError, path::PathBuf, time::Duration};

use ffmpeg_next::Error as FfmpegError;
use serde_json::Error as JsonError;
use thiserror::Error;

use crate::progress::OperationType;

/// The unified error type for all `gopslice` operations.
///
/// None of these are fatal to a long-running host: each one is scoped to the
/// single request that produced it.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GopError {
    /// The probing tool could not parse the source (missing file, no video
    /// stream, unsupported or corrupt media).
    #[error("Failed to probe {path}: {diagnostic}")]
    Probe {
        /// Source file that was probed.
        path: PathBuf,
        /// Diagnostic text reported by the probe.
        diagnostic: String,
    },

    /// The source parsed correctly but contains no keyframes, so it cannot
    /// be segmented.
    #[error("No keyframes found in {path}; no segments available")]
    EmptyIndex {
        /// Source file that was indexed.
        path: PathBuf,
    },

    /// The requested segment does not exist.
    #[error("Segment {segment_index} is out of range (video has {segment_count} segments)")]
    SegmentOutOfRange {
        /// The zero-based segment index that was requested.
        segment_index: usize,
        /// The number of segments (keyframes) in the index.
        segment_count: usize,
    },

    /// The resolved frame span is empty or inverted.
    #[error(
        "Segment {segment_index} resolves to an empty span (start frame {start_frame}, next boundary {boundary})"
    )]
    Resolution {
        /// The segment being resolved.
        segment_index: usize,
        /// Decode index of the segment's keyframe.
        start_frame: u64,
        /// Exclusive boundary the span was computed against.
        boundary: u64,
    },

    /// Keyframe records are not in strictly increasing decode order.
    #[error("Keyframe index is malformed at record {position}: decode index {decode_index} does not follow {previous}")]
    MalformedIndex {
        /// Position of the offending record.
        position: usize,
        /// Decode index of the offending record.
        decode_index: u64,
        /// Decode index of the record before it.
        previous: u64,
    },

    /// The stream-copy step failed. The output file has been discarded.
    #[error("Failed to extract segment to {output}: {diagnostic}")]
    Extraction {
        /// Output path that was being written.
        output: PathBuf,
        /// Diagnostic text reported by the copy step.
        diagnostic: String,
    },

    /// The video identifier is not a plain file name inside the input
    /// directory.
    #[error("Invalid video identifier: {0:?}")]
    InvalidVideoId(String),

    /// A path handed back for deletion is not a segment owned by the store.
    #[error("Not an extracted segment: {0}")]
    NotASegment(PathBuf),

    /// An external tool could not be started.
    #[error("Failed to launch {program}: {reason}")]
    ToolUnavailable {
        /// Program that was executed.
        program: String,
        /// Underlying reason the launch failed.
        reason: String,
    },

    /// The operation exceeded its configured time limit.
    #[error("{operation:?} timed out after {limit:?}")]
    TimedOut {
        /// The operation that was running.
        operation: OperationType,
        /// The configured limit.
        limit: Duration,
    },

    /// The operation was cancelled via a [`CancellationToken`](crate::CancellationToken).
    #[error("Operation cancelled")]
    Cancelled,

    /// An error originating from the FFmpeg libraries.
    #[error("FFmpeg error: {0}")]
    FfmpegError(String),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    IoError(#[from] IoError),

    /// Probe output could not be parsed as JSON.
    #[error("JSON error: {0}")]
    JsonError(#[from] JsonError),
}

impl From<FfmpegError> for GopError {
    fn from(error: FfmpegError) -> Self {
        GopError::FfmpegError(error.to_string())
    }
}

impl GopError {
    /// Returns `true` for conditions that mean "nothing to serve" rather than
    /// a failure: an empty keyframe index.
    pub fn is_empty_index(&self) -> bool {
        matches!(self, GopError::EmptyIndex { .. })
    }

    /// Returns `true` for errors caused by the request itself (bad id or
    /// segment index) rather than by the media or the tools.
    pub fn is_request_error(&self) -> bool {
        matches!(
            self,
            GopError::SegmentOutOfRange { .. } | GopError::InvalidVideoId(_)
        )
    }
}
