//! Request-level operations: the entry point a host (an HTTP handler, the
//! CLI, a job runner) calls into.
//!
//! [`SegmentService`] ties the indexer, resolver, extractor and segment
//! store together. Each call is an independent, synchronous unit of work:
//! index, then resolve, then extract. The service holds no per-request
//! state, so one instance can be shared by reference across threads.
//!
//! # Example
//!
//! ```no_run
//! use gopslice::{GopError, SegmentService, ServerConfiguration};
//!
//! let service = SegmentService::with_command_backend(
//!     ServerConfiguration::new("videos", "segments"),
//! );
//!
//! let segment = service.fetch_group("CoolVideo.mp4", 0)?;
//! println!("{} ({} frames)", segment.path.display(), segment.span.frame_count);
//! # Ok::<(), GopError>(())
//! ```

use std::path::{Component, Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::Serialize;

use crate::backend::{CommandBackend, LibraryBackend, MediaBackend};
use crate::configuration::ServerConfiguration;
use crate::error::GopError;
use crate::extractor::SegmentExtractor;
use crate::indexer::KeyframeIndexer;
use crate::keyframe::{GroupStatistics, KeyframeIndex, PresentationTime};
use crate::progress::{OperationType, ProgressTracker};
use crate::resolver::{FrameSpan, ResolvedSegment, resolve_span};
use crate::store::SegmentStore;

/// One extracted group of pictures, as listed for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupOfPictures {
    /// 1-based position for display.
    pub display_index: usize,
    /// Start of the group.
    pub timestamp_begin: PresentationTime,
    /// Start of the next group, or `end`.
    pub timestamp_end: PresentationTime,
    /// The extracted, playable file.
    pub output_path: PathBuf,
    /// The frames the file holds.
    pub span: FrameSpan,
}

/// A single extracted segment.
///
/// The path is only handed out after a successful copy; it stays valid
/// until [`SegmentService::remove_segment`] or
/// [`SegmentService::purge_expired`] deletes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedSegment {
    /// The extracted, playable file.
    pub path: PathBuf,
    /// Zero-based segment index.
    pub segment_index: usize,
    /// Start of the segment.
    pub timestamp_begin: PresentationTime,
    /// Start of the next segment, or `end`.
    pub timestamp_end: PresentationTime,
    /// The frames the file holds.
    pub span: FrameSpan,
}

impl From<ExtractedSegment> for GroupOfPictures {
    fn from(segment: ExtractedSegment) -> Self {
        Self {
            display_index: segment.segment_index + 1,
            timestamp_begin: segment.timestamp_begin,
            timestamp_end: segment.timestamp_end,
            output_path: segment.path,
            span: segment.span,
        }
    }
}

/// Keyframe indexing, segment resolution and extraction for the videos in
/// one input directory.
#[derive(Debug)]
pub struct SegmentService<B> {
    configuration: ServerConfiguration,
    indexer: KeyframeIndexer<B>,
    extractor: SegmentExtractor<B>,
    store: SegmentStore,
}

impl SegmentService<LibraryBackend> {
    /// A service using the linked FFmpeg libraries.
    pub fn with_library_backend(configuration: ServerConfiguration) -> Self {
        let mut backend = LibraryBackend::new();
        if let Some(level) = configuration.ffmpeg_log_level {
            backend = backend.with_log_level(level);
        }
        Self::new(backend, configuration)
    }
}

impl SegmentService<CommandBackend> {
    /// A service running `ffprobe` and `ffmpeg` from `PATH`.
    pub fn with_command_backend(configuration: ServerConfiguration) -> Self {
        let mut backend = CommandBackend::new();
        if let Some(level) = configuration.ffmpeg_log_level {
            backend = backend.with_log_level(level);
        }
        Self::new(backend, configuration)
    }
}

impl<B: MediaBackend + Clone> SegmentService<B> {
    /// Create a service over `backend`.
    pub fn new(backend: B, configuration: ServerConfiguration) -> Self {
        Self {
            indexer: KeyframeIndexer::new(backend.clone(), &configuration),
            extractor: SegmentExtractor::new(backend, &configuration),
            store: SegmentStore::new(
                &configuration.output_directory,
                configuration.output_extension.clone(),
            ),
            configuration,
        }
    }
}

impl<B: MediaBackend> SegmentService<B> {
    /// The configuration this service was built with.
    pub fn configuration(&self) -> &ServerConfiguration {
        &self.configuration
    }

    /// The store extracted segments are written to.
    pub fn store(&self) -> &SegmentStore {
        &self.store
    }

    /// Map a video identifier to its file in the input directory.
    ///
    /// # Errors
    ///
    /// Returns [`GopError::InvalidVideoId`] unless `video_id` is a single
    /// plain file name (no separators, no `.` or `..`).
    pub fn source_path(&self, video_id: &str) -> Result<PathBuf, GopError> {
        let mut components = Path::new(video_id).components();
        let plain = matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(name)), None) if name == video_id
        );
        if !plain || video_id.contains(['/', '\\', '\0']) {
            return Err(GopError::InvalidVideoId(video_id.to_string()));
        }
        Ok(self.configuration.input_directory.join(video_id))
    }

    /// Extract every group of pictures of `video_id`, in order.
    ///
    /// Runs one extraction per keyframe and reports progress through the
    /// configured callback. If any group fails, the files already written for
    /// this call are removed and the error is returned.
    ///
    /// # Errors
    ///
    /// [`GopError::EmptyIndex`] when the video has no keyframes, plus any
    /// indexing, resolution or extraction error.
    pub fn list_groups(&self, video_id: &str) -> Result<Vec<GroupOfPictures>, GopError> {
        let mut groups: Vec<GroupOfPictures> = Vec::new();
        let result = self.for_each_group(video_id, |group| {
            groups.push(group);
            Ok(())
        });

        if let Err(error) = result {
            for group in &groups {
                if let Err(cleanup) = self.store.remove(&group.output_path) {
                    log::warn!("Could not remove {}: {cleanup}", group.output_path.display());
                }
            }
            return Err(error);
        }
        Ok(groups)
    }

    /// Extract the groups of pictures of `video_id` one at a time, handing
    /// each to `callback` as soon as its file is written.
    ///
    /// Unlike [`list_groups`](Self::list_groups), files already handed to
    /// `callback` are left in place when a later group fails. Returning an
    /// error from `callback` stops the iteration.
    pub fn for_each_group<F>(&self, video_id: &str, mut callback: F) -> Result<(), GopError>
    where
        F: FnMut(GroupOfPictures) -> Result<(), GopError>,
    {
        let source = self.source_path(video_id)?;
        let index = self.indexer.list_keyframes(&source)?;
        if index.is_empty() {
            return Err(GopError::EmptyIndex { path: source });
        }

        log::info!("Extracting {} groups of {video_id}", index.len());
        let mut tracker = ProgressTracker::new(
            self.configuration.progress.clone(),
            OperationType::Extraction,
            Some(index.len() as u64),
            self.configuration.batch_size,
        );

        for segment_index in 0..index.len() {
            if self.configuration.is_cancelled() {
                return Err(GopError::Cancelled);
            }
            let segment = self.extract_segment(video_id, &source, &index, segment_index)?;
            callback(segment.into())?;
            tracker.advance(Some(segment_index));
        }
        tracker.finish();

        Ok(())
    }

    /// The raw keyframe list of `video_id`.
    ///
    /// An empty index is a valid, reportable result here.
    pub fn keyframe_detail(&self, video_id: &str) -> Result<KeyframeIndex, GopError> {
        let source = self.source_path(video_id)?;
        self.indexer.list_keyframes(&source)
    }

    /// Extract the group of pictures starting at keyframe `segment_index`.
    ///
    /// # Errors
    ///
    /// [`GopError::SegmentOutOfRange`] (before any extraction or frame
    /// counting) when `segment_index` is past the last keyframe,
    /// [`GopError::EmptyIndex`] when there are no keyframes, plus any
    /// indexing, resolution or extraction error.
    pub fn fetch_group(
        &self,
        video_id: &str,
        segment_index: usize,
    ) -> Result<ExtractedSegment, GopError> {
        let source = self.source_path(video_id)?;
        let index = self.indexer.list_keyframes(&source)?;
        self.extract_segment(video_id, &source, &index, segment_index)
    }

    /// Group size statistics for `video_id`. Always counts frames.
    pub fn statistics(&self, video_id: &str) -> Result<GroupStatistics, GopError> {
        let source = self.source_path(video_id)?;
        let index = self.indexer.list_keyframes(&source)?;
        let total_frames = self.indexer.total_frame_count(&source)?;
        Ok(index.statistics(total_frames))
    }

    /// Delete extracted segments older than the configured retention.
    pub fn purge_expired(&self) -> Result<usize, GopError> {
        self.store
            .purge_expired(self.configuration.retention, SystemTime::now())
    }

    /// Delete one extracted segment.
    pub fn remove_segment(&self, segment: &ExtractedSegment) -> Result<(), GopError> {
        self.store.remove(&segment.path)
    }

    fn extract_segment(
        &self,
        video_id: &str,
        source: &Path,
        index: &KeyframeIndex,
        segment_index: usize,
    ) -> Result<ExtractedSegment, GopError> {
        let ResolvedSegment {
            span,
            timestamp_begin,
            timestamp_end,
            ..
        } = resolve_span(&self.indexer, index, segment_index, source)?;

        let seek = match timestamp_begin.seek_target() {
            Some(seek) => seek,
            None if span.start_frame == 0 => Duration::ZERO,
            None => {
                return Err(GopError::Probe {
                    path: source.to_path_buf(),
                    diagnostic: format!(
                        "keyframe at frame {} has no presentation timestamp to seek to",
                        span.start_frame
                    ),
                });
            }
        };

        let path = self.store.allocate(video_id, segment_index)?;
        self.extractor.extract(source, &path, seek, &span)?;
        log::debug!("Segment {segment_index} of {video_id} written to {}", path.display());

        Ok(ExtractedSegment {
            path,
            segment_index,
            timestamp_begin,
            timestamp_end,
            span,
        })
    }
}
