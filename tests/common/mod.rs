//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use gopslice::{
    CopyRequest, Deadline, GopError, KeyframeRecord, MediaBackend, PresentationTime,
    SegmentService, ServerConfiguration,
};
use tempfile::TempDir;

pub const VIDEO: &str = "CoolVideo.mp4";

/// Milliseconds per frame of the scripted 25 fps stream.
pub const FRAME_MILLIS: u64 = 40;

pub fn sample_video_path() -> &'static str {
    "tests/fixtures/sample_video.mp4"
}

pub fn fixture_available() -> bool {
    Path::new(sample_video_path()).exists()
}

pub fn tools_available() -> bool {
    ["ffprobe", "ffmpeg"].iter().all(|program| {
        Command::new(program)
            .arg("-version")
            .output()
            .is_ok_and(|output| output.status.success())
    })
}

/// An in-memory backend with a fixed keyframe layout.
///
/// Copies write a small text file instead of media and every call is
/// counted, so tests can assert what the service did and did not run.
#[derive(Debug)]
pub struct ScriptedBackend {
    keyframes: Result<Vec<u64>, String>,
    total_frames: u64,
    fail_copy_call: Option<usize>,
    pub probe_calls: AtomicUsize,
    pub count_calls: AtomicUsize,
    pub copy_calls: AtomicUsize,
    pub requests: Mutex<Vec<CopyRequest>>,
}

impl ScriptedBackend {
    pub fn new(keyframes: &[u64], total_frames: u64) -> Self {
        Self {
            keyframes: Ok(keyframes.to_vec()),
            total_frames,
            fail_copy_call: None,
            probe_calls: AtomicUsize::new(0),
            count_calls: AtomicUsize::new(0),
            copy_calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A backend whose probe fails with `diagnostic`.
    pub fn unprobeable(diagnostic: &str) -> Self {
        Self {
            keyframes: Err(diagnostic.to_string()),
            ..Self::new(&[], 0)
        }
    }

    /// Make the `call`-th copy (zero-based) fail after writing a partial file.
    pub fn failing_copy(mut self, call: usize) -> Self {
        self.fail_copy_call = Some(call);
        self
    }

    pub fn probes(&self) -> usize {
        self.probe_calls.load(Ordering::SeqCst)
    }

    pub fn counts(&self) -> usize {
        self.count_calls.load(Ordering::SeqCst)
    }

    pub fn copies(&self) -> usize {
        self.copy_calls.load(Ordering::SeqCst)
    }
}

pub fn time_of(decode_index: u64) -> Duration {
    Duration::from_millis(decode_index * FRAME_MILLIS)
}

/// Raw fields in the shape `ffprobe -show_frames` prints them.
pub fn probe_fields(decode_index: u64) -> serde_json::Map<String, serde_json::Value> {
    let mut fields = serde_json::Map::new();
    fields.insert("pict_type".into(), "I".into());
    fields.insert("coded_picture_number".into(), decode_index.into());
    fields.insert("pkt_pos".into(), (48 + decode_index * 1000).to_string().into());
    fields.insert("width".into(), 1280.into());
    fields
}

impl MediaBackend for ScriptedBackend {
    fn probe_keyframes(
        &self,
        path: &Path,
        deadline: &Deadline,
    ) -> Result<Vec<KeyframeRecord>, GopError> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        deadline.check()?;
        match &self.keyframes {
            Ok(positions) => Ok(positions
                .iter()
                .map(|&position| {
                    KeyframeRecord::new(position, PresentationTime::At(time_of(position)))
                        .with_probe_fields(probe_fields(position))
                })
                .collect()),
            Err(diagnostic) => Err(GopError::Probe {
                path: path.to_path_buf(),
                diagnostic: diagnostic.clone(),
            }),
        }
    }

    fn count_frames(&self, _path: &Path, deadline: &Deadline) -> Result<u64, GopError> {
        self.count_calls.fetch_add(1, Ordering::SeqCst);
        deadline.check()?;
        Ok(self.total_frames)
    }

    fn copy_segment(&self, request: &CopyRequest, deadline: &Deadline) -> Result<(), GopError> {
        let call = self.copy_calls.fetch_add(1, Ordering::SeqCst);
        deadline.check()?;
        self.requests.lock().unwrap().push(request.clone());

        fs::write(
            &request.output,
            format!("{} frames from {:?}", request.frame_count, request.seek),
        )?;

        if self.fail_copy_call == Some(call) {
            return Err(GopError::Extraction {
                output: request.output.clone(),
                diagnostic: "Conversion failed!".to_string(),
            });
        }
        Ok(())
    }
}

/// A service over `backend` with fresh input and output directories.
pub struct Harness {
    pub backend: Arc<ScriptedBackend>,
    pub service: SegmentService<Arc<ScriptedBackend>>,
    pub input: TempDir,
    pub output: TempDir,
}

impl Harness {
    pub fn new(backend: ScriptedBackend) -> Self {
        Self::with(backend, |configuration| configuration)
    }

    pub fn with<F>(backend: ScriptedBackend, configure: F) -> Self
    where
        F: FnOnce(ServerConfiguration) -> ServerConfiguration,
    {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        fs::write(input.path().join(VIDEO), b"source").unwrap();

        let backend = Arc::new(backend);
        let configuration = configure(ServerConfiguration::new(input.path(), output.path()));
        let service = SegmentService::new(Arc::clone(&backend), configuration);

        Self {
            backend,
            service,
            input,
            output,
        }
    }

    /// Every file currently in the output directory.
    pub fn outputs(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = fs::read_dir(self.output.path())
            .map(|entries| {
                entries
                    .filter_map(|entry| entry.ok().map(|entry| entry.path()))
                    .collect()
            })
            .unwrap_or_default();
        files.sort();
        files
    }
}

/// Keyframe layout with segment 8 at frame 800 and segment 9 at 900.
pub const TEN_KEYFRAMES: [u64; 10] = [0, 50, 120, 200, 300, 400, 500, 650, 800, 900];
