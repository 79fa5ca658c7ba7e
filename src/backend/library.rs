//! In-process backend built on the linked FFmpeg libraries.
//!
//! Keyframes are found by reading packets without decoding; the frame count
//! decodes the whole video stream; segments are copied packet by packet into
//! a new container, the same way a lossless remux works, but starting at a
//! seeked keyframe and stopping after an exact number of frames.

use std::path::Path;
use std::time::Duration;

use ffmpeg_next::{
    codec::{Id, context::Context as CodecContext},
    ffi::AV_NOPTS_VALUE,
    format::context::Input,
    frame::Video as VideoFrame,
    media::Type,
    Error as FfmpegError, Packet, Rational,
};
use serde_json::{Map, Value};

use crate::backend::{CopyRequest, MediaBackend, seek_micros};
use crate::error::GopError;
use crate::ffmpeg::{FfmpegLogLevel, initialize, set_ffmpeg_log_level};
use crate::keyframe::{KeyframeRecord, PresentationTime};
use crate::progress::Deadline;

/// Backend that drives `ffmpeg-next` in the calling thread.
///
/// # Example
///
/// ```no_run
/// use gopslice::{FfmpegLogLevel, LibraryBackend};
///
/// let backend = LibraryBackend::new().with_log_level(FfmpegLogLevel::Error);
/// ```
#[derive(Debug, Clone, Default)]
pub struct LibraryBackend {
    _private: (),
}

impl LibraryBackend {
    /// Create a backend. FFmpeg itself is initialised lazily, on first use.
    pub fn new() -> Self {
        Self { _private: () }
    }

    /// Set FFmpeg's console verbosity for the whole process.
    #[must_use]
    pub fn with_log_level(self, level: FfmpegLogLevel) -> Self {
        set_ffmpeg_log_level(level);
        self
    }
}

/// Open `path` and locate its best video stream.
fn open_video(path: &Path) -> Result<(Input, usize), GopError> {
    initialize(path)?;

    let input_context = ffmpeg_next::format::input(&path).map_err(|error| GopError::Probe {
        path: path.to_path_buf(),
        diagnostic: error.to_string(),
    })?;

    let video_stream_index = input_context
        .streams()
        .best(Type::Video)
        .map(|stream| stream.index())
        .ok_or_else(|| GopError::Probe {
            path: path.to_path_buf(),
            diagnostic: "no video stream found".to_string(),
        })?;

    Ok((input_context, video_stream_index))
}

/// The stream's start timestamp, or zero when the container does not set
/// one.
fn stream_start(input_context: &Input, stream_index: usize) -> i64 {
    input_context
        .stream(stream_index)
        .map(|stream| stream.start_time())
        .filter(|&start| start != AV_NOPTS_VALUE)
        .unwrap_or(0)
}

fn pts_to_duration(pts: i64, time_base: Rational) -> Duration {
    let seconds =
        pts as f64 * time_base.numerator() as f64 / time_base.denominator().max(1) as f64;
    Duration::from_secs_f64(seconds.max(0.0))
}

/// The demuxer's view of a keyframe packet, named as `ffprobe` names them.
fn packet_fields(packet: &Packet, time_base: Rational) -> Map<String, Value> {
    let mut fields = Map::new();
    fields.insert("media_type".to_string(), Value::from("video"));
    fields.insert("key_frame".to_string(), Value::from(1));
    fields.insert("pts".to_string(), Value::from(packet.pts()));
    fields.insert("pkt_dts".to_string(), Value::from(packet.dts()));
    fields.insert("duration".to_string(), Value::from(packet.duration()));
    fields.insert("pkt_pos".to_string(), Value::from(packet.position().to_string()));
    fields.insert("pkt_size".to_string(), Value::from(packet.size().to_string()));
    fields.insert(
        "time_base".to_string(),
        Value::from(format!("{}/{}", time_base.numerator(), time_base.denominator())),
    );
    fields
}

impl MediaBackend for LibraryBackend {
    fn probe_keyframes(
        &self,
        path: &Path,
        deadline: &Deadline,
    ) -> Result<Vec<KeyframeRecord>, GopError> {
        let (mut input_context, video_stream_index) = open_video(path)?;
        log::debug!(
            "Scanning keyframes of {} (stream={})",
            path.display(),
            video_stream_index
        );

        let time_base = input_context
            .stream(video_stream_index)
            .map(|stream| stream.time_base())
            .ok_or_else(|| GopError::Probe {
                path: path.to_path_buf(),
                diagnostic: "video stream disappeared".to_string(),
            })?;
        let start = stream_start(&input_context, video_stream_index);

        let mut keyframes: Vec<KeyframeRecord> = Vec::new();
        let mut video_packet_count: u64 = 0;

        let mut packet = Packet::empty();
        loop {
            deadline.check()?;
            match packet.read(&mut input_context) {
                Ok(()) => {
                    if packet.stream() != video_stream_index {
                        continue;
                    }

                    if packet.is_key() {
                        let pts = packet.pts();
                        let presentation_time = pts
                            .map(|p| PresentationTime::At(pts_to_duration(p - start, time_base)))
                            .unwrap_or(PresentationTime::Unknown);

                        keyframes.push(KeyframeRecord {
                            decode_index: video_packet_count,
                            presentation_time,
                            pts,
                            picture_type: 'I',
                            probe_fields: packet_fields(&packet, time_base),
                        });
                    }

                    video_packet_count += 1;
                }
                Err(FfmpegError::Eof) => break,
                Err(error) => {
                    return Err(GopError::Probe {
                        path: path.to_path_buf(),
                        diagnostic: error.to_string(),
                    });
                }
            }
        }

        log::debug!(
            "Found {} keyframes among {} video packets",
            keyframes.len(),
            video_packet_count
        );
        Ok(keyframes)
    }

    fn count_frames(&self, path: &Path, deadline: &Deadline) -> Result<u64, GopError> {
        let (mut input_context, video_stream_index) = open_video(path)?;
        let probe_error = |error: FfmpegError| GopError::Probe {
            path: path.to_path_buf(),
            diagnostic: error.to_string(),
        };

        let parameters = input_context
            .stream(video_stream_index)
            .map(|stream| stream.parameters())
            .ok_or_else(|| GopError::Probe {
                path: path.to_path_buf(),
                diagnostic: "video stream disappeared".to_string(),
            })?;
        let mut decoder = CodecContext::from_parameters(parameters)
            .and_then(|context| context.decoder().video())
            .map_err(probe_error)?;

        let mut decoded_frame = VideoFrame::empty();
        let mut frame_count: u64 = 0;

        for (stream, packet) in input_context.packets() {
            deadline.check()?;
            if stream.index() != video_stream_index {
                continue;
            }

            decoder.send_packet(&packet).map_err(probe_error)?;
            while decoder.receive_frame(&mut decoded_frame).is_ok() {
                frame_count += 1;
            }
        }

        decoder.send_eof().map_err(probe_error)?;
        while decoder.receive_frame(&mut decoded_frame).is_ok() {
            frame_count += 1;
        }

        log::debug!("Decoded {frame_count} frames from {}", path.display());
        Ok(frame_count)
    }

    fn copy_segment(&self, request: &CopyRequest, deadline: &Deadline) -> Result<(), GopError> {
        let extraction_error = |error: FfmpegError| GopError::Extraction {
            output: request.output.clone(),
            diagnostic: error.to_string(),
        };

        let (mut input_context, video_stream_index) =
            open_video(&request.input).map_err(|error| GopError::Extraction {
                output: request.output.clone(),
                diagnostic: error.to_string(),
            })?;

        let (input_time_base, parameters) = input_context
            .stream(video_stream_index)
            .map(|stream| (stream.time_base(), stream.parameters()))
            .ok_or_else(|| GopError::Extraction {
                output: request.output.clone(),
                diagnostic: "video stream disappeared".to_string(),
            })?;

        // Keyframe timestamps are relative to the stream start; seeking is
        // absolute, in AV_TIME_BASE (microseconds).
        let start = stream_start(&input_context, video_stream_index);
        let start_micros = seek_micros(pts_to_duration(start, input_time_base));
        let target = seek_micros(request.seek).saturating_add(start_micros);

        log::debug!(
            "Copying {} frames of {} from {:?} (seek target {target}us) to {}",
            request.frame_count,
            request.input.display(),
            request.seek,
            request.output.display()
        );

        input_context
            .seek(target, ..target)
            .map_err(extraction_error)?;

        let mut output_context =
            ffmpeg_next::format::output(&request.output).map_err(extraction_error)?;

        let mut output_stream = output_context
            .add_stream(ffmpeg_next::encoder::find(Id::None))
            .map_err(extraction_error)?;
        output_stream.set_parameters(parameters);
        // Reset codec tag to let the muxer choose.
        unsafe {
            (*output_stream.parameters().as_mut_ptr()).codec_tag = 0;
        }

        output_context.write_header().map_err(extraction_error)?;
        let output_time_base = output_context
            .stream(0)
            .map(|stream| stream.time_base())
            .ok_or_else(|| GopError::Extraction {
                output: request.output.clone(),
                diagnostic: "output stream missing after header".to_string(),
            })?;

        let mut copied: u64 = 0;
        let mut origin: Option<i64> = None;

        for (stream, mut packet) in input_context.packets() {
            deadline.check()?;
            if stream.index() != video_stream_index {
                continue;
            }

            // The demuxer may hand back a packet or two before the keyframe
            // the seek resolved to.
            if origin.is_none() && !packet.is_key() {
                continue;
            }
            let offset = *origin.get_or_insert_with(|| {
                packet.dts().or(packet.pts()).unwrap_or(0)
            });

            packet.set_pts(packet.pts().map(|pts| pts - offset));
            packet.set_dts(packet.dts().map(|dts| dts - offset));
            packet.set_stream(0);
            packet.rescale_ts(input_time_base, output_time_base);
            packet.set_position(-1);
            packet
                .write_interleaved(&mut output_context)
                .map_err(extraction_error)?;

            copied += 1;
            if copied >= request.frame_count {
                break;
            }
        }

        output_context.write_trailer().map_err(extraction_error)?;

        if copied < request.frame_count {
            return Err(GopError::Extraction {
                output: request.output.clone(),
                diagnostic: format!(
                    "stream ended after {copied} of {} frames",
                    request.frame_count
                ),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_fields_use_ffprobe_names() {
        let mut packet = Packet::copy(&[0u8; 16]);
        packet.set_pts(Some(3003));
        packet.set_dts(None);

        let fields = packet_fields(&packet, Rational::new(1, 30000));

        assert_eq!(fields["pts"], 3003);
        assert!(fields["pkt_dts"].is_null());
        assert_eq!(fields["pkt_size"], "16");
        assert_eq!(fields["time_base"], "1/30000");
    }
}
