//! Backend that drives the `ffprobe` and `ffmpeg` command-line tools.
//!
//! Keyframes come from `ffprobe -show_frames` filtered to picture type `I`;
//! the frame count from `ffprobe -count_frames`; segments from
//! `ffmpeg -ss <t> -i <input> -frames:v <n> -c copy`, with `-ss` placed
//! before `-i` so the tool input-seeks to the keyframe instead of decoding
//! from the start.
//!
//! `-ss` is measured from the container's `start_time`, the earliest start
//! of any stream, so keyframe timestamps are made relative to that origin
//! rather than to the video stream's own start.
//!
//! Every invocation checks the tool's exit status and surfaces its stderr.

use std::ffi::OsString;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::backend::process::{self, ToolOutput};
use crate::backend::{CopyRequest, MediaBackend, seek_micros};
use crate::error::GopError;
use crate::ffmpeg::FfmpegLogLevel;
use crate::keyframe::{KeyframeRecord, PresentationTime};
use crate::progress::Deadline;

/// Backend that runs `ffprobe` and `ffmpeg` as child processes.
///
/// # Example
///
/// ```no_run
/// use gopslice::CommandBackend;
///
/// let backend = CommandBackend::new()
///     .with_ffprobe("/opt/ffmpeg/bin/ffprobe")
///     .with_ffmpeg("/opt/ffmpeg/bin/ffmpeg");
/// ```
#[derive(Debug, Clone)]
pub struct CommandBackend {
    ffprobe: String,
    ffmpeg: String,
    log_level: FfmpegLogLevel,
}

impl Default for CommandBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct FrameReport {
    #[serde(default)]
    frames: Vec<ProbedFrame>,
    #[serde(default)]
    streams: Vec<ProbedStream>,
    format: Option<ProbedFormat>,
}

/// One entry of `-show_frames`, kept whole so it can be handed back as-is.
#[derive(Debug, Deserialize)]
struct ProbedFrame {
    #[serde(flatten)]
    fields: Map<String, Value>,
}

impl ProbedFrame {
    fn text(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    fn pts(&self) -> Option<i64> {
        self.fields.get("pts").and_then(Value::as_i64)
    }
}

#[derive(Debug, Deserialize)]
struct ProbedStream {
    nb_read_frames: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbedFormat {
    start_time: Option<String>,
}

fn parse_seconds(value: Option<&str>) -> Option<f64> {
    value
        .and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|seconds| seconds.is_finite())
}

impl CommandBackend {
    /// Use `ffprobe` and `ffmpeg` from `PATH`, logging errors only.
    pub fn new() -> Self {
        Self {
            ffprobe: "ffprobe".to_string(),
            ffmpeg: "ffmpeg".to_string(),
            log_level: FfmpegLogLevel::Error,
        }
    }

    /// Use a specific `ffprobe` executable.
    #[must_use]
    pub fn with_ffprobe(mut self, program: &str) -> Self {
        self.ffprobe = program.to_string();
        self
    }

    /// Use a specific `ffmpeg` executable.
    #[must_use]
    pub fn with_ffmpeg(mut self, program: &str) -> Self {
        self.ffmpeg = program.to_string();
        self
    }

    /// Set the tools' `-loglevel`. Their stderr becomes the diagnostic
    /// payload of probe and extraction errors, so anything quieter than
    /// `error` hides failure reasons.
    #[must_use]
    pub fn with_log_level(mut self, level: FfmpegLogLevel) -> Self {
        self.log_level = level;
        self
    }

    fn probe(&self, path: &Path, args: &[&str], deadline: &Deadline) -> Result<ToolOutput, GopError> {
        let mut command: Vec<OsString> = vec!["-v".into(), self.log_level.as_cli_arg().into()];
        command.extend(args.iter().map(OsString::from));
        command.extend(["-of".into(), "json".into(), path.as_os_str().to_os_string()]);

        let output = process::run(&self.ffprobe, command, deadline)?;
        if !output.status.success() {
            return Err(GopError::Probe {
                path: path.to_path_buf(),
                diagnostic: output.diagnostic(),
            });
        }
        Ok(output)
    }

    /// Arguments for a stream copy of `request`.
    pub(crate) fn copy_arguments(&self, request: &CopyRequest) -> Vec<OsString> {
        vec![
            "-hide_banner".into(),
            "-nostdin".into(),
            "-loglevel".into(),
            self.log_level.as_cli_arg().into(),
            "-y".into(),
            // Before -i: input seeking.
            "-ss".into(),
            seek_argument(request.seek).into(),
            "-i".into(),
            request.input.as_os_str().to_os_string(),
            "-map".into(),
            "0:v:0".into(),
            "-frames:v".into(),
            request.frame_count.to_string().into(),
            "-c".into(),
            "copy".into(),
            request.output.as_os_str().to_os_string(),
        ]
    }
}

/// Format a seek target for `-ss`, rounded up to whole microseconds.
pub(crate) fn seek_argument(seek: Duration) -> String {
    let micros = seek_micros(seek);
    format!("{}.{:06}", micros / 1_000_000, micros % 1_000_000)
}

fn no_video_stream(path: &Path) -> GopError {
    GopError::Probe {
        path: path.to_path_buf(),
        diagnostic: "no video stream found".to_string(),
    }
}

/// Turn an `ffprobe -show_frames` report into keyframe records.
///
/// Frame positions are ordinals in the report, which is the order the copy
/// tool counts `-frames:v` in. Timestamps are offsets from the container
/// start, which is what `-ss` adds its argument to.
fn parse_keyframes(path: &Path, stdout: &[u8]) -> Result<Vec<KeyframeRecord>, GopError> {
    let report: FrameReport = serde_json::from_slice(stdout)?;
    report.streams.first().ok_or_else(|| no_video_stream(path))?;
    let origin = report
        .format
        .as_ref()
        .and_then(|format| parse_seconds(format.start_time.as_deref()))
        .unwrap_or(0.0);

    let keyframes = report
        .frames
        .into_iter()
        .enumerate()
        .filter(|(_, frame)| frame.text("pict_type") == Some("I"))
        .map(|(position, frame)| {
            let raw_time = frame
                .text("best_effort_timestamp_time")
                .or(frame.text("pts_time"))
                .unwrap_or("N/A");
            let presentation_time = match parse_seconds(Some(raw_time)) {
                Some(seconds) => {
                    PresentationTime::At(Duration::from_secs_f64((seconds - origin).max(0.0)))
                }
                None => PresentationTime::Unknown,
            };
            KeyframeRecord {
                decode_index: position as u64,
                presentation_time,
                pts: frame.pts(),
                picture_type: 'I',
                probe_fields: frame.fields,
            }
        })
        .collect();

    Ok(keyframes)
}

/// Read `nb_read_frames` from an `ffprobe -count_frames` report.
fn parse_frame_count(path: &Path, stdout: &[u8]) -> Result<u64, GopError> {
    let report: FrameReport = serde_json::from_slice(stdout)?;
    let stream = report.streams.first().ok_or_else(|| no_video_stream(path))?;
    stream
        .nb_read_frames
        .as_deref()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .ok_or_else(|| GopError::Probe {
            path: path.to_path_buf(),
            diagnostic: "ffprobe did not report a frame count".to_string(),
        })
}

impl MediaBackend for CommandBackend {
    fn probe_keyframes(
        &self,
        path: &Path,
        deadline: &Deadline,
    ) -> Result<Vec<KeyframeRecord>, GopError> {
        log::debug!("Running {} for keyframes of {}", self.ffprobe, path.display());
        let output = self.probe(
            path,
            &[
                "-select_streams",
                "v:0",
                "-show_entries",
                "frame:stream=start_time:format=start_time",
            ],
            deadline,
        )?;
        parse_keyframes(path, &output.stdout)
    }

    fn count_frames(&self, path: &Path, deadline: &Deadline) -> Result<u64, GopError> {
        log::debug!("Running {} to count frames of {}", self.ffprobe, path.display());
        let output = self.probe(
            path,
            &[
                "-select_streams",
                "v:0",
                "-count_frames",
                "-show_entries",
                "stream=nb_read_frames",
            ],
            deadline,
        )?;
        parse_frame_count(path, &output.stdout)
    }

    fn copy_segment(&self, request: &CopyRequest, deadline: &Deadline) -> Result<(), GopError> {
        let arguments = self.copy_arguments(request);
        log::debug!("Running {} {:?}", self.ffmpeg, arguments);

        let output = process::run(&self.ffmpeg, arguments, deadline)?;
        if !output.status.success() {
            return Err(GopError::Extraction {
                output: request.output.clone(),
                diagnostic: output.diagnostic(),
            });
        }
        Ok(())
    }
}
