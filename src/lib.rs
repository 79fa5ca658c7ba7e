//! # gopslice
//!
//! Slice videos at keyframe boundaries: index the I-frames of a video, resolve
//! each group of pictures (GOP) to an exact frame span, and stream-copy it
//! into a standalone, independently playable file without re-encoding.
//!
//! Probing and copying go through a [`MediaBackend`]. Two are provided:
//! [`LibraryBackend`] drives the FFmpeg libraries in-process via
//! [`ffmpeg-next`](https://crates.io/crates/ffmpeg-next), and
//! [`CommandBackend`] runs the `ffprobe` and `ffmpeg` executables.
//!
//! ## Quick Start
//!
//! ### List Keyframes
//!
//! ```no_run
//! use gopslice::{SegmentService, ServerConfiguration};
//!
//! let service = SegmentService::with_library_backend(
//!     ServerConfiguration::new("videos", "segments"),
//! );
//! for record in &service.keyframe_detail("CoolVideo.mp4").unwrap() {
//!     println!("{} @ {}", record.decode_index, record.presentation_time);
//! }
//! ```
//!
//! ### Extract One Group of Pictures
//!
//! ```no_run
//! use gopslice::{SegmentService, ServerConfiguration};
//!
//! let service = SegmentService::with_library_backend(
//!     ServerConfiguration::new("videos", "segments"),
//! );
//! let segment = service.fetch_group("CoolVideo.mp4", 3).unwrap();
//! println!("{} holds {} frames", segment.path.display(), segment.span.frame_count);
//! ```
//!
//! ### Extract Every Group
//!
//! ```no_run
//! use gopslice::{SegmentService, ServerConfiguration};
//!
//! let service = SegmentService::with_command_backend(
//!     ServerConfiguration::new("videos", "segments"),
//! );
//! for group in service.list_groups("CoolVideo.mp4").unwrap() {
//!     println!(
//!         "#{} {} - {} -> {}",
//!         group.display_index,
//!         group.timestamp_begin,
//!         group.timestamp_end,
//!         group.output_path.display()
//!     );
//! }
//! ```
//!
//! ## Features
//!
//! - **Keyframe indexing**: decode order positions and presentation times of
//!   every I-frame, without decoding
//! - **Exact spans**: segment `i` runs from keyframe `i` up to keyframe
//!   `i + 1`; the last one to the end of the stream
//! - **Copy-only extraction**: input-seek to the keyframe and copy exactly
//!   the span's frames; a failed copy never leaves a file behind
//! - **Collision-free outputs**: every extraction gets a fresh file name
//! - **Time limits & cancellation**: every probe and copy is bounded
//! - **Progress**: per-group callbacks while listing groups
//! - **Retention**: purge extracted segments past a configured age
//!
//! ### Optional Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `async` | `GroupStream` and `SegmentFuture` for async use via Tokio |
//! | `full` | Enables all of the above |
//!
//! ## Requirements
//!
//! [`LibraryBackend`] needs the FFmpeg development libraries at build time.
//! [`CommandBackend`] needs `ffprobe` and `ffmpeg` on `PATH` at run time.

pub mod backend;
pub mod configuration;
pub mod error;
pub mod extractor;
pub mod ffmpeg;
pub mod indexer;
pub mod keyframe;
pub mod progress;
pub mod resolver;
pub mod service;
pub mod store;
#[cfg(feature = "async")]
pub mod stream;

pub use backend::{CommandBackend, CopyRequest, LibraryBackend, MediaBackend};
pub use configuration::ServerConfiguration;
pub use error::GopError;
pub use extractor::SegmentExtractor;
pub use ffmpeg::{FfmpegLogLevel, get_ffmpeg_log_level, set_ffmpeg_log_level};
pub use indexer::KeyframeIndexer;
pub use keyframe::{GroupStatistics, KeyframeIndex, KeyframeRecord, PresentationTime};
pub use progress::{CancellationToken, Deadline, OperationType, ProgressCallback, ProgressInfo};
pub use resolver::{FrameSpan, ResolvedSegment, resolve_span, resolve_span_with};
pub use service::{ExtractedSegment, GroupOfPictures, SegmentService};
pub use store::{SegmentStore, segment_file_name};
#[cfg(feature = "async")]
pub use stream::{GroupStream, SegmentFuture};
