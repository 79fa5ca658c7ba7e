//! Keyframe records and the per-file keyframe index.
//!
//! A [`KeyframeIndex`] is the ordered list of I-frames found in a video
//! stream, in decode order. It is the input to segment resolution: each
//! record starts one group of pictures.
//!
//! # Example
//!
//! ```no_run
//! use gopslice::{GopError, KeyframeIndexer, LibraryBackend, ServerConfiguration};
//!
//! let configuration = ServerConfiguration::new("videos", "segments");
//! let indexer = KeyframeIndexer::new(LibraryBackend::new(), &configuration);
//! let index = indexer.list_keyframes("videos/CoolVideo.mp4")?;
//! println!("{} groups of pictures", index.len());
//! for record in index.iter() {
//!     println!("frame {} at {}", record.decode_index, record.presentation_time);
//! }
//! # Ok::<(), GopError>(())
//! ```

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::time::Duration;

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::GopError;

/// Best-effort display timestamp of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentationTime {
    /// A known timestamp, relative to the start of the file.
    At(Duration),
    /// The probe reported no timestamp for this frame.
    Unknown,
    /// Sentinel used as the end of the last group of pictures.
    End,
}

impl PresentationTime {
    /// Parse a decimal-seconds timestamp as printed by `ffprobe`
    /// (`"4.004000"`). `"N/A"`, empty and negative values map to
    /// [`PresentationTime::Unknown`].
    pub fn from_seconds_str(value: &str) -> Self {
        match value.trim().parse::<f64>() {
            Ok(seconds) if seconds.is_finite() && seconds >= 0.0 => {
                PresentationTime::At(Duration::from_secs_f64(seconds))
            }
            _ => PresentationTime::Unknown,
        }
    }

    /// The timestamp to input-seek to, if there is one.
    pub fn seek_target(&self) -> Option<Duration> {
        match self {
            PresentationTime::At(duration) => Some(*duration),
            PresentationTime::Unknown | PresentationTime::End => None,
        }
    }
}

impl Display for PresentationTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            PresentationTime::At(duration) => write!(f, "{:.6}", duration.as_secs_f64()),
            PresentationTime::Unknown => f.write_str("unknown"),
            PresentationTime::End => f.write_str("end"),
        }
    }
}

impl Serialize for PresentationTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One I-frame found while probing, in decode order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyframeRecord {
    /// Zero-based position of this frame among all video frames.
    pub decode_index: u64,
    /// Best-effort presentation timestamp.
    pub presentation_time: PresentationTime,
    /// Raw presentation timestamp in the stream's time base, if known.
    pub pts: Option<i64>,
    /// Picture type reported by the probe.
    pub picture_type: char,
    /// Fields of the frame exactly as the backend reported them
    /// (`pkt_pos`, `pkt_size`, `coded_picture_number`, ...).
    pub probe_fields: Map<String, Value>,
}

impl KeyframeRecord {
    /// An I-frame record at `decode_index`, with no raw probe fields.
    pub fn new(decode_index: u64, presentation_time: PresentationTime) -> Self {
        Self {
            decode_index,
            presentation_time,
            pts: None,
            picture_type: 'I',
            probe_fields: Map::new(),
        }
    }

    /// Attach the raw fields the probe reported for this frame.
    #[must_use]
    pub fn with_probe_fields(mut self, probe_fields: Map<String, Value>) -> Self {
        self.probe_fields = probe_fields;
        self
    }
}

/// Ordered keyframe list for one source file.
///
/// Decode indices are strictly increasing. An empty index is a valid probe
/// result; the segmentation operations reject it with
/// [`GopError::EmptyIndex`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct KeyframeIndex {
    records: Vec<KeyframeRecord>,
}

impl KeyframeIndex {
    /// Build an index, checking that decode indices strictly increase.
    ///
    /// # Errors
    ///
    /// Returns [`GopError::MalformedIndex`] at the first record that does not
    /// follow its predecessor.
    pub fn new(records: Vec<KeyframeRecord>) -> Result<Self, GopError> {
        for (position, pair) in records.windows(2).enumerate() {
            if pair[1].decode_index <= pair[0].decode_index {
                return Err(GopError::MalformedIndex {
                    position: position + 1,
                    decode_index: pair[1].decode_index,
                    previous: pair[0].decode_index,
                });
            }
        }
        Ok(Self { records })
    }

    /// Number of keyframes, which is also the number of segments.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` when the file has no keyframes.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The record at `position`, if any.
    pub fn get(&self, position: usize) -> Option<&KeyframeRecord> {
        self.records.get(position)
    }

    /// Iterate over the records in decode order.
    pub fn iter(&self) -> std::slice::Iter<'_, KeyframeRecord> {
        self.records.iter()
    }

    /// Borrow the records as a slice.
    pub fn records(&self) -> &[KeyframeRecord] {
        &self.records
    }

    /// Consume the index, returning its records.
    pub fn into_records(self) -> Vec<KeyframeRecord> {
        self.records
    }

    /// Group-of-pictures size statistics, given the stream's total frame
    /// count.
    ///
    /// The i-th size is the number of frames from keyframe i up to keyframe
    /// i+1, or to the end of the stream for the last group.
    pub fn statistics(&self, total_frames: u64) -> GroupStatistics {
        let sizes: Vec<u64> = self
            .records
            .iter()
            .enumerate()
            .map(|(i, record)| {
                let end = self
                    .records
                    .get(i + 1)
                    .map(|next| next.decode_index)
                    .unwrap_or(total_frames);
                end.saturating_sub(record.decode_index)
            })
            .collect();

        let average_group_size = if sizes.is_empty() {
            0.0
        } else {
            sizes.iter().sum::<u64>() as f64 / sizes.len() as f64
        };

        GroupStatistics {
            min_group_size: sizes.iter().copied().min().unwrap_or(0),
            max_group_size: sizes.iter().copied().max().unwrap_or(0),
            average_group_size,
            group_sizes: sizes,
            total_frames,
        }
    }
}

impl<'a> IntoIterator for &'a KeyframeIndex {
    type Item = &'a KeyframeRecord;
    type IntoIter = std::slice::Iter<'a, KeyframeRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Summary of the group-of-pictures structure of a stream.
#[derive(Debug, Clone, Serialize)]
pub struct GroupStatistics {
    /// Size in frames of each group.
    pub group_sizes: Vec<u64>,
    /// Average group size.
    pub average_group_size: f64,
    /// Smallest group.
    pub min_group_size: u64,
    /// Largest group.
    pub max_group_size: u64,
    /// Total frames in the stream.
    pub total_frames: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_at(positions: &[u64]) -> KeyframeIndex {
        KeyframeIndex::new(
            positions
                .iter()
                .map(|&p| KeyframeRecord::new(p, PresentationTime::At(Duration::from_secs(p))))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn rejects_non_increasing_decode_indices() {
        let records = vec![
            KeyframeRecord::new(0, PresentationTime::Unknown),
            KeyframeRecord::new(30, PresentationTime::Unknown),
            KeyframeRecord::new(30, PresentationTime::Unknown),
        ];
        match KeyframeIndex::new(records) {
            Err(GopError::MalformedIndex {
                position,
                decode_index,
                previous,
            }) => {
                assert_eq!(position, 2);
                assert_eq!(decode_index, 30);
                assert_eq!(previous, 30);
            }
            other => panic!("expected MalformedIndex, got {other:?}"),
        }
    }

    #[test]
    fn parses_ffprobe_timestamps() {
        assert_eq!(
            PresentationTime::from_seconds_str("4.004000"),
            PresentationTime::At(Duration::from_secs_f64(4.004))
        );
        assert_eq!(
            PresentationTime::from_seconds_str("N/A"),
            PresentationTime::Unknown
        );
        assert_eq!(
            PresentationTime::from_seconds_str("-0.5"),
            PresentationTime::Unknown
        );
    }

    #[test]
    fn displays_sentinels() {
        assert_eq!(PresentationTime::End.to_string(), "end");
        assert_eq!(PresentationTime::Unknown.to_string(), "unknown");
        assert_eq!(
            PresentationTime::At(Duration::from_millis(1500)).to_string(),
            "1.500000"
        );
    }

    #[test]
    fn statistics_use_total_for_last_group() {
        let stats = index_at(&[0, 50, 120]).statistics(200);
        assert_eq!(stats.group_sizes, vec![50, 70, 80]);
        assert_eq!(stats.min_group_size, 50);
        assert_eq!(stats.max_group_size, 80);
        assert!((stats.average_group_size - 200.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn serializes_as_plain_list() {
        let json = serde_json::to_value(index_at(&[0, 25])).unwrap();
        let records = json.as_array().expect("array");
        assert_eq!(records.len(), 2);
        assert_eq!(records[1]["decode_index"], 25);
        assert_eq!(records[1]["presentation_time"], "25.000000");
        assert_eq!(records[0]["picture_type"], "I");
        assert!(records[0]["probe_fields"].as_object().expect("object").is_empty());
    }

    #[test]
    fn raw_fields_serialize_verbatim() {
        let mut fields = Map::new();
        fields.insert("pkt_pos".to_string(), Value::from("48"));
        fields.insert("coded_picture_number".to_string(), Value::from(0));
        let record = KeyframeRecord::new(0, PresentationTime::Unknown).with_probe_fields(fields);

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["probe_fields"]["pkt_pos"], "48");
        assert_eq!(json["probe_fields"]["coded_picture_number"], 0);
        assert_eq!(json["presentation_time"], "unknown");
    }
}
