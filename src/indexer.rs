//! Keyframe indexing.
//!
//! [`KeyframeIndexer`] wraps a [`MediaBackend`] with the configured probe
//! time limit and cancellation token. It produces a [`KeyframeIndex`] and, on
//! demand only, the total frame count, which is much more expensive because
//! counting frames generally means decoding all of them.

use std::path::Path;
use std::time::Duration;

use crate::backend::MediaBackend;
use crate::configuration::ServerConfiguration;
use crate::error::GopError;
use crate::keyframe::KeyframeIndex;
use crate::progress::{CancellationToken, Deadline, OperationType};

/// Lists keyframes and counts frames through a backend.
#[derive(Debug, Clone)]
pub struct KeyframeIndexer<B> {
    backend: B,
    timeout: Option<Duration>,
    cancellation: Option<CancellationToken>,
}

impl<B: MediaBackend> KeyframeIndexer<B> {
    /// Create an indexer using the probe limit and cancellation token from
    /// `configuration`.
    pub fn new(backend: B, configuration: &ServerConfiguration) -> Self {
        Self {
            backend,
            timeout: configuration.probe_timeout,
            cancellation: configuration.cancellation.clone(),
        }
    }

    /// The backend this indexer probes with.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn deadline(&self, operation: OperationType) -> Deadline {
        Deadline::start(operation, self.timeout, self.cancellation.clone())
    }

    /// List the keyframes of `path` in decode order.
    ///
    /// A valid file with no I-frames yields an empty index; use
    /// [`KeyframeIndex::is_empty`] to tell "no segmentation possible" apart
    /// from a probe failure.
    ///
    /// # Errors
    ///
    /// Returns [`GopError::Probe`] if the file cannot be parsed or has no
    /// video stream, [`GopError::MalformedIndex`] if the probe reports
    /// keyframes out of order, or [`GopError::TimedOut`] /
    /// [`GopError::Cancelled`].
    pub fn list_keyframes<P: AsRef<Path>>(&self, path: P) -> Result<KeyframeIndex, GopError> {
        let path = path.as_ref();
        log::debug!("Listing keyframes of {}", path.display());

        let deadline = self.deadline(OperationType::Indexing);
        let records = self.backend.probe_keyframes(path, &deadline)?;
        let index = KeyframeIndex::new(records)?;

        if index.is_empty() {
            log::info!("{} contains no keyframes", path.display());
        } else {
            log::debug!("{} has {} keyframes", path.display(), index.len());
        }
        Ok(index)
    }

    /// Count every frame of the video stream in `path`.
    ///
    /// Only the last segment's resolution needs this, so it is never run
    /// eagerly.
    ///
    /// # Errors
    ///
    /// Same as [`list_keyframes`](KeyframeIndexer::list_keyframes).
    pub fn total_frame_count<P: AsRef<Path>>(&self, path: P) -> Result<u64, GopError> {
        let path = path.as_ref();
        log::debug!("Counting frames of {}", path.display());

        let deadline = self.deadline(OperationType::FrameCounting);
        self.backend.count_frames(path, &deadline)
    }
}
