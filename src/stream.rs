//! Async access to a [`SegmentService`].
//!
//! This module provides [`GroupStream`] for receiving extracted groups of
//! pictures as they are written, and [`SegmentFuture`] for fetching one
//! segment without blocking the async runtime.
//!
//! Both types use `tokio::task::spawn_blocking` internally: probing and
//! copying happen on a dedicated blocking thread while results are sent back
//! through a bounded channel.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use tokio_stream::StreamExt;
//!
//! use gopslice::{GopError, SegmentService, ServerConfiguration};
//!
//! # async fn example() -> Result<(), GopError> {
//! let service = Arc::new(SegmentService::with_command_backend(
//!     ServerConfiguration::new("videos", "segments"),
//! ));
//!
//! let mut stream = service.group_stream("CoolVideo.mp4");
//! while let Some(group) = stream.next().await {
//!     let group = group?;
//!     println!("{} {}", group.display_index, group.output_path.display());
//! }
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::mpsc::Receiver;
use tokio::task::JoinHandle;
use tokio_stream::Stream;

use crate::backend::MediaBackend;
use crate::error::GopError;
use crate::service::{ExtractedSegment, GroupOfPictures, SegmentService};
use crate::store::SegmentStore;

/// Bounded-channel capacity for [`GroupStream`].
const CHANNEL_CAPACITY: usize = 4;

/// Groups of pictures extracted by a background thread, in order.
///
/// Dropping the stream closes the channel, which stops the background
/// thread before it extracts the next group. Groups that were extracted but
/// never received are deleted.
pub struct GroupStream {
    receiver: Receiver<Result<GroupOfPictures, GopError>>,
    store: SegmentStore,
    #[allow(dead_code)]
    handle: JoinHandle<()>,
}

impl Drop for GroupStream {
    fn drop(&mut self) {
        self.receiver.close();
        while let Ok(item) = self.receiver.try_recv() {
            if let Ok(group) = item {
                discard(&self.store, &group.output_path);
            }
        }
    }
}

fn discard(store: &SegmentStore, path: &Path) {
    if let Err(error) = store.remove(path) {
        log::warn!("Could not remove undelivered {}: {error}", path.display());
    }
}

impl Stream for GroupStream {
    type Item = Result<GroupOfPictures, GopError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

/// A future that resolves to one extracted segment.
pub struct SegmentFuture {
    handle: JoinHandle<Result<ExtractedSegment, GopError>>,
}

impl Future for SegmentFuture {
    type Output = Result<ExtractedSegment, GopError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.handle)
            .poll(cx)
            .map(|result| result.unwrap_or_else(|_| Err(GopError::Cancelled)))
    }
}

impl<B: MediaBackend + 'static> SegmentService<B> {
    /// Like [`for_each_group`](Self::for_each_group), delivering groups
    /// through a [`GroupStream`].
    ///
    /// Must be called from within a Tokio runtime.
    pub fn group_stream(self: Arc<Self>, video_id: &str) -> GroupStream {
        let (sender, receiver) = tokio::sync::mpsc::channel(CHANNEL_CAPACITY);
        let video_id = video_id.to_string();
        let store = self.store().clone();

        let handle = tokio::task::spawn_blocking(move || {
            let result = self.for_each_group(&video_id, |group| {
                let path = group.output_path.clone();
                sender.blocking_send(Ok(group)).map_err(|_| {
                    discard(self.store(), &path);
                    GopError::Cancelled
                })
            });
            if let Err(error) = result {
                // The receiver may have been dropped.
                let _ = sender.blocking_send(Err(error));
            }
        });

        GroupStream {
            receiver,
            store,
            handle,
        }
    }

    /// Like [`fetch_group`](Self::fetch_group), running on a blocking
    /// thread.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn fetch_group_async(self: Arc<Self>, video_id: &str, segment_index: usize) -> SegmentFuture {
        let video_id = video_id.to_string();
        let handle =
            tokio::task::spawn_blocking(move || self.fetch_group(&video_id, segment_index));
        SegmentFuture { handle }
    }
}
