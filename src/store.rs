//! Output naming and lifecycle of extracted segments.
//!
//! Every extraction gets a fresh file name carrying a random token, so two
//! requests for the same segment, even at the same instant, never write the
//! same path. Files are named
//!
//! ```text
//! gop.<video stem>.<segment index>.<uuid>.<extension>
//! ```
//!
//! and only files matching that pattern are ever deleted by
//! [`SegmentStore::purge_expired`] or [`SegmentStore::remove`].

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use uuid::Uuid;

use crate::error::GopError;

const PREFIX: &str = "gop";

/// Extension used when neither the configuration nor the source supplies
/// one.
const FALLBACK_EXTENSION: &str = "mp4";

/// Build the file name of one extracted segment.
///
/// Characters outside `[A-Za-z0-9._-]` in the video's stem are replaced with
/// `_`. The function is pure: the same inputs always give the same name.
///
/// ```
/// use uuid::Uuid;
///
/// let token = Uuid::nil();
/// assert_eq!(
///     gopslice::segment_file_name("Cool Video.mp4", 3, &token, "mp4"),
///     "gop.Cool_Video.3.00000000-0000-0000-0000-000000000000.mp4"
/// );
/// ```
pub fn segment_file_name(video_id: &str, segment_index: usize, token: &Uuid, extension: &str) -> String {
    let stem = Path::new(video_id)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{PREFIX}.{stem}.{segment_index}.{}.{extension}", token.hyphenated())
}

/// Returns `true` if `name` was produced by [`segment_file_name`].
pub(crate) fn is_segment_file_name(name: &str) -> bool {
    let mut parts = name.rsplitn(4, '.');
    let (Some(extension), Some(token), Some(index), Some(rest)) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    !extension.is_empty()
        && Uuid::parse_str(token).is_ok()
        && index.parse::<usize>().is_ok()
        && rest.starts_with(PREFIX)
        && rest[PREFIX.len()..].starts_with('.')
}

/// The output directory and the segments in it.
#[derive(Debug, Clone)]
pub struct SegmentStore {
    directory: PathBuf,
    extension: Option<String>,
}

impl SegmentStore {
    /// Create a store writing into `directory`. `extension` forces the
    /// container of every segment; `None` keeps the source's.
    pub fn new<P: AsRef<Path>>(directory: P, extension: Option<String>) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
            extension,
        }
    }

    /// The directory segments are written to.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Reserve a new, unique output path for `segment_index` of `video_id`,
    /// creating the directory if needed. The file itself is not created.
    pub fn allocate(&self, video_id: &str, segment_index: usize) -> Result<PathBuf, GopError> {
        fs::create_dir_all(&self.directory)?;

        let extension = self
            .extension
            .clone()
            .or_else(|| {
                Path::new(video_id)
                    .extension()
                    .map(|extension| extension.to_string_lossy().into_owned())
            })
            .unwrap_or_else(|| FALLBACK_EXTENSION.to_string());

        let name = segment_file_name(video_id, segment_index, &Uuid::new_v4(), &extension);
        Ok(self.directory.join(name))
    }

    /// Delete segments last modified at least `max_age` before `now`.
    ///
    /// Returns the number of files removed. Files that vanish or cannot be
    /// removed mid-scan are skipped.
    pub fn purge_expired(&self, max_age: Duration, now: SystemTime) -> Result<usize, GopError> {
        let entries = match fs::read_dir(&self.directory) {
            Ok(entries) => entries,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(0),
            Err(error) => return Err(error.into()),
        };

        let mut removed = 0;
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            if !is_segment_file_name(&name.to_string_lossy()) {
                continue;
            }

            let metadata = match entry.metadata() {
                Ok(metadata) if metadata.is_file() => metadata,
                _ => continue,
            };
            let age = metadata
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .unwrap_or(Duration::ZERO);
            if age < max_age {
                continue;
            }

            match fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(error) if error.kind() == ErrorKind::NotFound => {}
                Err(error) => {
                    log::warn!("Could not purge {}: {error}", entry.path().display());
                }
            }
        }

        if removed > 0 {
            log::info!("Purged {removed} expired segments from {}", self.directory.display());
        }
        Ok(removed)
    }

    /// Delete one segment previously returned by this store.
    ///
    /// # Errors
    ///
    /// Returns [`GopError::NotASegment`] if `path` is not a segment file
    /// directly inside the store's directory.
    pub fn remove<P: AsRef<Path>>(&self, path: P) -> Result<(), GopError> {
        let path = path.as_ref();
        let owned = path.parent() == Some(self.directory.as_path())
            && path
                .file_name()
                .is_some_and(|name| is_segment_file_name(&name.to_string_lossy()));
        if !owned {
            return Err(GopError::NotASegment(path.to_path_buf()));
        }

        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_is_pure_and_sanitised() {
        let token = Uuid::parse_str("67e55044-10b1-426f-9247-bb680e5fe0c8").unwrap();
        let first = segment_file_name("../Holiday (2023).mov", 7, &token, "mov");
        let second = segment_file_name("../Holiday (2023).mov", 7, &token, "mov");
        assert_eq!(first, second);
        assert_eq!(first, "gop.Holiday__2023_.7.67e55044-10b1-426f-9247-bb680e5fe0c8.mov");
        assert!(is_segment_file_name(&first));
    }

    #[test]
    fn distinct_tokens_give_distinct_names() {
        let a = segment_file_name("a.mp4", 0, &Uuid::new_v4(), "mp4");
        let b = segment_file_name("a.mp4", 0, &Uuid::new_v4(), "mp4");
        assert_ne!(a, b);
    }

    #[test]
    fn recognises_only_segment_names() {
        assert!(!is_segment_file_name("CoolVideo.mp4"));
        assert!(!is_segment_file_name("gop.a.0.not-a-uuid.mp4"));
        assert!(!is_segment_file_name("gopher.0.67e55044-10b1-426f-9247-bb680e5fe0c8.mp4"));
        assert!(is_segment_file_name(
            "gop.a.b.12.67e55044-10b1-426f-9247-bb680e5fe0c8.mkv"
        ));
    }

    #[test]
    fn allocate_uses_source_extension_unless_forced() {
        let directory = tempfile::tempdir().unwrap();
        let store = SegmentStore::new(directory.path().join("segments"), None);
        let path = store.allocate("clip.webm", 2).unwrap();
        assert_eq!(path.extension().unwrap(), "webm");
        assert!(directory.path().join("segments").is_dir());

        let forced = SegmentStore::new(directory.path(), Some("mkv".to_string()));
        assert_eq!(forced.allocate("clip.webm", 2).unwrap().extension().unwrap(), "mkv");
        assert_eq!(store.allocate("clip", 0).unwrap().extension().unwrap(), "mp4");
    }

    #[test]
    fn purge_removes_only_old_segments() {
        let directory = tempfile::tempdir().unwrap();
        let store = SegmentStore::new(directory.path(), None);
        let segment = store.allocate("clip.mp4", 0).unwrap();
        fs::write(&segment, b"data").unwrap();
        let unrelated = directory.path().join("notes.txt");
        fs::write(&unrelated, b"keep").unwrap();

        let now = SystemTime::now();
        assert_eq!(store.purge_expired(Duration::from_secs(3600), now).unwrap(), 0);
        assert!(segment.exists());

        let later = now + Duration::from_secs(7200);
        assert_eq!(store.purge_expired(Duration::from_secs(3600), later).unwrap(), 1);
        assert!(!segment.exists());
        assert!(unrelated.exists());
    }

    #[test]
    fn purge_of_missing_directory_is_a_no_op() {
        let directory = tempfile::tempdir().unwrap();
        let store = SegmentStore::new(directory.path().join("absent"), None);
        assert_eq!(store.purge_expired(Duration::ZERO, SystemTime::now()).unwrap(), 0);
    }

    #[test]
    fn remove_refuses_foreign_paths() {
        let directory = tempfile::tempdir().unwrap();
        let store = SegmentStore::new(directory.path(), None);
        let foreign = directory.path().join("CoolVideo.mp4");
        fs::write(&foreign, b"source").unwrap();
        assert!(matches!(store.remove(&foreign), Err(GopError::NotASegment(_))));
        assert!(foreign.exists());

        let segment = store.allocate("CoolVideo.mp4", 1).unwrap();
        fs::write(&segment, b"data").unwrap();
        store.remove(&segment).unwrap();
        assert!(!segment.exists());
    }
}
