//! Segment resolution: from a keyframe index and a segment number to an
//! exact frame span.
//!
//! Segment `i` starts at keyframe `i` and runs up to, but not including,
//! keyframe `i + 1`. The last segment runs to the end of the stream, which
//! is only known after counting every frame, so the count is requested
//! lazily and only for that segment.
//!
//! # Example
//!
//! ```
//! use std::path::Path;
//!
//! use gopslice::{GopError, KeyframeIndex, KeyframeRecord, PresentationTime, resolve_span_with};
//!
//! let index = KeyframeIndex::new(vec![
//!     KeyframeRecord::new(0, PresentationTime::Unknown),
//!     KeyframeRecord::new(50, PresentationTime::Unknown),
//! ])?;
//!
//! let first = resolve_span_with(&index, 0, Path::new("clip.mp4"), || unreachable!())?;
//! assert_eq!((first.span.start_frame, first.span.end_frame), (0, 49));
//!
//! let last = resolve_span_with(&index, 1, Path::new("clip.mp4"), || Ok(80))?;
//! assert_eq!(last.span.frame_count, 30);
//! # Ok::<(), GopError>(())
//! ```

use std::path::Path;

use serde::Serialize;

use crate::backend::MediaBackend;
use crate::error::GopError;
use crate::indexer::KeyframeIndexer;
use crate::keyframe::{KeyframeIndex, PresentationTime};

/// The frames one segment owns.
///
/// Both ends are inclusive: the segment is frames `start_frame..=end_frame`
/// in decode order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FrameSpan {
    /// Decode index of the segment's keyframe.
    pub start_frame: u64,
    /// Decode index of the segment's last frame: one before the next
    /// keyframe, or the final frame of the stream.
    pub end_frame: u64,
    /// Number of frames in the segment. Always at least 1.
    pub frame_count: u64,
}

impl FrameSpan {
    /// Build the span `[start_frame, boundary)`.
    fn up_to(start_frame: u64, boundary: u64) -> Self {
        Self {
            start_frame,
            end_frame: boundary - 1,
            frame_count: boundary - start_frame,
        }
    }

    /// The first frame after the span: the next keyframe, or the total frame
    /// count for the last segment.
    pub fn end_exclusive(&self) -> u64 {
        self.end_frame + 1
    }

    /// Returns `true` if `frame` falls inside the span.
    pub fn contains(&self, frame: u64) -> bool {
        (self.start_frame..=self.end_frame).contains(&frame)
    }
}

/// A resolved segment: its frames plus display timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedSegment {
    /// Zero-based segment index.
    pub segment_index: usize,
    /// The frames to copy.
    pub span: FrameSpan,
    /// Presentation time of the segment's keyframe, also the seek target.
    pub timestamp_begin: PresentationTime,
    /// Presentation time of the next keyframe, or
    /// [`PresentationTime::End`] for the last segment. For display only.
    pub timestamp_end: PresentationTime,
}

/// Resolve segment `segment_index` of `index`, calling `total_frames` only
/// when it is the last segment.
///
/// `path` is used for error reporting only.
///
/// # Errors
///
/// - [`GopError::EmptyIndex`] if `index` has no keyframes.
/// - [`GopError::SegmentOutOfRange`] if `segment_index >= index.len()`.
/// - [`GopError::Resolution`] if the span would hold no frames.
/// - Any error returned by `total_frames`.
pub fn resolve_span_with<F>(
    index: &KeyframeIndex,
    segment_index: usize,
    path: &Path,
    total_frames: F,
) -> Result<ResolvedSegment, GopError>
where
    F: FnOnce() -> Result<u64, GopError>,
{
    if index.is_empty() {
        return Err(GopError::EmptyIndex {
            path: path.to_path_buf(),
        });
    }

    let record = index
        .get(segment_index)
        .ok_or(GopError::SegmentOutOfRange {
            segment_index,
            segment_count: index.len(),
        })?;
    let next = index.get(segment_index + 1);

    let start_frame = record.decode_index;
    let boundary = match next {
        Some(next) => next.decode_index,
        None => total_frames()?,
    };

    if boundary <= start_frame {
        return Err(GopError::Resolution {
            segment_index,
            start_frame,
            boundary,
        });
    }

    let span = FrameSpan::up_to(start_frame, boundary);
    log::debug!(
        "Segment {segment_index} spans frames {}..={} ({} frames)",
        span.start_frame,
        span.end_frame,
        span.frame_count
    );

    Ok(ResolvedSegment {
        segment_index,
        span,
        timestamp_begin: record.presentation_time,
        timestamp_end: next
            .map(|next| next.presentation_time)
            .unwrap_or(PresentationTime::End),
    })
}

/// Resolve segment `segment_index` of `index`, asking `indexer` for the
/// total frame count of `path` when it is the last segment.
///
/// # Errors
///
/// See [`resolve_span_with`].
pub fn resolve_span<B: MediaBackend>(
    indexer: &KeyframeIndexer<B>,
    index: &KeyframeIndex,
    segment_index: usize,
    path: &Path,
) -> Result<ResolvedSegment, GopError> {
    resolve_span_with(index, segment_index, path, || {
        indexer.total_frame_count(path)
    })
}
