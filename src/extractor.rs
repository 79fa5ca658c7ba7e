//! Copy-only extraction of a resolved segment.
//!
//! [`SegmentExtractor::extract`] hands one [`CopyRequest`] to the backend and
//! makes its outcome binary: either the output file is complete, or the call
//! fails and whatever was written is deleted.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use crate::backend::{CopyRequest, MediaBackend};
use crate::configuration::ServerConfiguration;
use crate::error::GopError;
use crate::progress::{CancellationToken, Deadline, OperationType};
use crate::resolver::FrameSpan;

/// Stream-copies frame spans into standalone files through a backend.
#[derive(Debug, Clone)]
pub struct SegmentExtractor<B> {
    backend: B,
    timeout: Option<Duration>,
    cancellation: Option<CancellationToken>,
}

impl<B: MediaBackend> SegmentExtractor<B> {
    /// Create an extractor using the extraction limit and cancellation
    /// token from `configuration`.
    pub fn new(backend: B, configuration: &ServerConfiguration) -> Self {
        Self {
            backend,
            timeout: configuration.extraction_timeout,
            cancellation: configuration.cancellation.clone(),
        }
    }

    /// Copy `span` of `path` into `output_path` without re-encoding.
    ///
    /// `seek` must be the presentation time of the span's keyframe: the
    /// copy input-seeks there, which lands exactly on `span.start_frame`,
    /// then emits `span.frame_count` frames. An existing `output_path` is
    /// overwritten; its parent directory is created if missing.
    ///
    /// # Errors
    ///
    /// Returns [`GopError::Extraction`] with the copy tool's diagnostic if
    /// the copy fails, or [`GopError::TimedOut`] / [`GopError::Cancelled`].
    /// In every error case `output_path` has been removed.
    pub fn extract<P1: AsRef<Path>, P2: AsRef<Path>>(
        &self,
        path: P1,
        output_path: P2,
        seek: Duration,
        span: &FrameSpan,
    ) -> Result<(), GopError> {
        let output_path = output_path.as_ref();
        let request = CopyRequest {
            input: path.as_ref().to_path_buf(),
            output: output_path.to_path_buf(),
            seek,
            frame_count: span.frame_count,
        };

        if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let deadline = Deadline::start(
            OperationType::Extraction,
            self.timeout,
            self.cancellation.clone(),
        );
        log::debug!(
            "Extracting frames {}..={} of {} to {}",
            span.start_frame,
            span.end_frame,
            request.input.display(),
            output_path.display()
        );

        let result = self
            .backend
            .copy_segment(&request, &deadline)
            .and_then(|()| {
                if output_path.is_file() {
                    Ok(())
                } else {
                    Err(GopError::Extraction {
                        output: output_path.to_path_buf(),
                        diagnostic: "copy reported success but wrote no file".to_string(),
                    })
                }
            });

        if let Err(error) = &result {
            log::warn!("Extraction to {} failed: {error}", output_path.display());
            discard(output_path);
        }
        result
    }
}

/// Remove a partially written output.
fn discard(output_path: &Path) {
    match fs::remove_file(output_path) {
        Ok(()) => log::debug!("Removed partial output {}", output_path.display()),
        Err(error) if error.kind() == ErrorKind::NotFound => {}
        Err(error) => log::warn!(
            "Could not remove partial output {}: {error}",
            output_path.display()
        ),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Mutex;

    use super::*;
    use crate::keyframe::KeyframeRecord;

    /// Writes a file, then fails or succeeds as told.
    struct WritingBackend {
        fail: bool,
        requests: Mutex<Vec<CopyRequest>>,
    }

    impl MediaBackend for WritingBackend {
        fn probe_keyframes(
            &self,
            _path: &Path,
            _deadline: &Deadline,
        ) -> Result<Vec<KeyframeRecord>, GopError> {
            Ok(Vec::new())
        }

        fn count_frames(&self, _path: &Path, _deadline: &Deadline) -> Result<u64, GopError> {
            Ok(0)
        }

        fn copy_segment(&self, request: &CopyRequest, _deadline: &Deadline) -> Result<(), GopError> {
            self.requests.lock().unwrap().push(request.clone());
            fs::write(&request.output, b"partial")?;
            if self.fail {
                Err(GopError::Extraction {
                    output: request.output.clone(),
                    diagnostic: "Invalid data found when processing input".to_string(),
                })
            } else {
                Ok(())
            }
        }
    }

    fn span() -> FrameSpan {
        FrameSpan {
            start_frame: 50,
            end_frame: 119,
            frame_count: 70,
        }
    }

    fn extractor(fail: bool) -> SegmentExtractor<WritingBackend> {
        SegmentExtractor::new(
            WritingBackend {
                fail,
                requests: Mutex::new(Vec::new()),
            },
            &ServerConfiguration::new("in", "out"),
        )
    }

    #[test]
    fn passes_seek_and_frame_count_through() {
        let directory = tempfile::tempdir().unwrap();
        let output = directory.path().join("nested").join("segment.mp4");
        let extractor = extractor(false);

        extractor
            .extract("in/clip.mp4", &output, Duration::from_secs(2), &span())
            .unwrap();

        assert!(output.is_file());
        let requests = extractor.backend.requests.lock().unwrap();
        assert_eq!(
            requests[0],
            CopyRequest {
                input: PathBuf::from("in/clip.mp4"),
                output: output.clone(),
                seek: Duration::from_secs(2),
                frame_count: 70,
            }
        );
    }

    #[test]
    fn failed_copy_removes_partial_output() {
        let directory = tempfile::tempdir().unwrap();
        let output = directory.path().join("segment.mp4");

        let result = extractor(true).extract("in/clip.mp4", &output, Duration::ZERO, &span());

        match result {
            Err(GopError::Extraction { diagnostic, .. }) => {
                assert!(diagnostic.contains("Invalid data"));
            }
            other => panic!("expected extraction error, got {other:?}"),
        }
        assert!(!output.exists());
    }

    #[test]
    fn cancelled_before_start_still_cleans_up() {
        let directory = tempfile::tempdir().unwrap();
        let output = directory.path().join("segment.mp4");
        fs::write(&output, b"stale").unwrap();

        let token = CancellationToken::new();
        token.cancel();

        struct Checking;
        impl MediaBackend for Checking {
            fn probe_keyframes(
                &self,
                _path: &Path,
                _deadline: &Deadline,
            ) -> Result<Vec<KeyframeRecord>, GopError> {
                Ok(Vec::new())
            }
            fn count_frames(&self, _path: &Path, _deadline: &Deadline) -> Result<u64, GopError> {
                Ok(0)
            }
            fn copy_segment(&self, _request: &CopyRequest, deadline: &Deadline) -> Result<(), GopError> {
                deadline.check()
            }
        }

        let configuration = ServerConfiguration::new("in", "out").with_cancellation(token);
        let result = SegmentExtractor::new(Checking, &configuration).extract(
            "in/clip.mp4",
            &output,
            Duration::ZERO,
            &span(),
        );
        assert!(matches!(result, Err(GopError::Cancelled)));
        assert!(!output.exists());
    }
}
