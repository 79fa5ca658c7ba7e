//! End-to-end tests against a real video with both backends.
//!
//! Tests require fixture files from `tests/fixtures/generate_fixtures.sh`
//! and return early when they are absent. The command backend tests also
//! need `ffprobe` and `ffmpeg` on `PATH`.

mod common;

use std::path::Path;

use common::{fixture_available, sample_video_path, tools_available};
use gopslice::{
    CommandBackend, FfmpegLogLevel, GopError, KeyframeIndexer, LibraryBackend, MediaBackend,
    SegmentService, ServerConfiguration,
};

const FIXTURE: &str = "sample_video.mp4";

fn configuration(output: &Path) -> ServerConfiguration {
    let input = Path::new(sample_video_path())
        .parent()
        .expect("fixture directory");
    ServerConfiguration::new(input, output).with_ffmpeg_log_level(FfmpegLogLevel::Error)
}

fn check_keyframes<B: MediaBackend + Clone>(service: &SegmentService<B>) {
    let index = service.keyframe_detail(FIXTURE).expect("keyframes");
    assert!(!index.is_empty(), "expected at least one keyframe");
    assert_eq!(index.get(0).unwrap().decode_index, 0, "stream should open on a keyframe");
}

fn check_groups_cover_stream<B: MediaBackend + Clone>(
    service: &SegmentService<B>,
    indexer: &KeyframeIndexer<B>,
) {
    let total = indexer
        .total_frame_count(sample_video_path())
        .expect("frame count");
    let groups = service.list_groups(FIXTURE).expect("groups");

    assert_eq!(groups.last().unwrap().span.end_exclusive(), total);
    assert_eq!(groups.iter().map(|g| g.span.frame_count).sum::<u64>(), total);
    for group in &groups {
        let size = std::fs::metadata(&group.output_path).expect("output").len();
        assert!(size > 0, "{} is empty", group.output_path.display());
    }
}

// ── Library backend ────────────────────────────────────────────────

#[test]
fn library_lists_keyframes() {
    if !fixture_available() {
        return;
    }
    let output = tempfile::tempdir().unwrap();
    let service = SegmentService::with_library_backend(configuration(output.path()));
    check_keyframes(&service);
}

#[test]
fn library_groups_cover_stream() {
    if !fixture_available() {
        return;
    }
    let output = tempfile::tempdir().unwrap();
    let configuration = configuration(output.path());
    let indexer = KeyframeIndexer::new(LibraryBackend::new(), &configuration);
    let service = SegmentService::with_library_backend(configuration);
    check_groups_cover_stream(&service, &indexer);
}

#[test]
fn library_extracted_segment_reindexes_from_zero() {
    if !fixture_available() {
        return;
    }
    let output = tempfile::tempdir().unwrap();
    let configuration = configuration(output.path());
    let indexer = KeyframeIndexer::new(LibraryBackend::new(), &configuration);
    let service = SegmentService::with_library_backend(configuration);

    let last = service.keyframe_detail(FIXTURE).expect("keyframes").len() - 1;
    let segment = service.fetch_group(FIXTURE, last).expect("fetch");

    let copied = indexer.list_keyframes(&segment.path).expect("segment keyframes");
    assert_eq!(copied.get(0).unwrap().decode_index, 0);
    assert_eq!(
        indexer.total_frame_count(&segment.path).expect("segment frames"),
        segment.span.frame_count
    );
}

#[test]
fn library_missing_file_is_a_probe_error() {
    if !fixture_available() {
        return;
    }
    let output = tempfile::tempdir().unwrap();
    let service = SegmentService::with_library_backend(configuration(output.path()));
    let result = service.keyframe_detail("does_not_exist.mp4");
    assert!(matches!(result, Err(GopError::Probe { .. })), "{result:?}");
}

// ── Command backend ────────────────────────────────────────────────

#[test]
fn command_lists_keyframes() {
    if !fixture_available() || !tools_available() {
        return;
    }
    let output = tempfile::tempdir().unwrap();
    let service = SegmentService::with_command_backend(configuration(output.path()));
    check_keyframes(&service);
}

#[test]
fn command_groups_cover_stream() {
    if !fixture_available() || !tools_available() {
        return;
    }
    let output = tempfile::tempdir().unwrap();
    let configuration = configuration(output.path());
    let indexer = KeyframeIndexer::new(CommandBackend::new(), &configuration);
    let service = SegmentService::with_command_backend(configuration);
    check_groups_cover_stream(&service, &indexer);
}

#[test]
fn backends_agree_on_keyframe_positions() {
    if !fixture_available() || !tools_available() {
        return;
    }
    let configuration = ServerConfiguration::new(".", ".");
    let library = KeyframeIndexer::new(LibraryBackend::new(), &configuration)
        .list_keyframes(sample_video_path())
        .expect("library keyframes");
    let command = KeyframeIndexer::new(CommandBackend::new(), &configuration)
        .list_keyframes(sample_video_path())
        .expect("command keyframes");

    let positions = |index: &gopslice::KeyframeIndex| {
        index.iter().map(|r| r.decode_index).collect::<Vec<_>>()
    };
    assert_eq!(positions(&library), positions(&command));
}

#[test]
fn command_reports_missing_file() {
    if !tools_available() {
        return;
    }
    let output = tempfile::tempdir().unwrap();
    let service = SegmentService::with_command_backend(configuration(output.path()));
    match service.keyframe_detail("does_not_exist.mp4") {
        Err(GopError::Probe { diagnostic, .. }) => assert!(!diagnostic.is_empty()),
        other => panic!("expected a probe error, got {other:?}"),
    }
}

// ── Sources without video ──────────────────────────────────────────

fn audio_only_configuration(output: &Path) -> Option<ServerConfiguration> {
    Path::new("tests/fixtures/audio_only.m4a")
        .exists()
        .then(|| configuration(output))
}

#[test]
fn library_rejects_audio_only_source() {
    let output = tempfile::tempdir().unwrap();
    let Some(configuration) = audio_only_configuration(output.path()) else {
        return;
    };
    let service = SegmentService::with_library_backend(configuration);
    match service.list_groups("audio_only.m4a") {
        Err(GopError::Probe { diagnostic, .. }) => assert!(diagnostic.contains("video")),
        other => panic!("expected a probe error, got {other:?}"),
    }
    assert!(std::fs::read_dir(output.path()).unwrap().next().is_none());
}

#[test]
fn command_rejects_audio_only_source() {
    let output = tempfile::tempdir().unwrap();
    let Some(configuration) = audio_only_configuration(output.path()) else {
        return;
    };
    if !tools_available() {
        return;
    }
    let service = SegmentService::with_command_backend(configuration);
    match service.list_groups("audio_only.m4a") {
        Err(GopError::Probe { diagnostic, .. }) => assert!(diagnostic.contains("video")),
        other => panic!("expected a probe error, got {other:?}"),
    }
}
