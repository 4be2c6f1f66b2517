//! The `.trashinfo` record of the freedesktop.org Trash specification.

use crate::errors::CoreError;
use crate::helpers::{parse_trash_datetime, TRASHINFO_TIME_FORMAT};
use chrono::{DateTime, FixedOffset, Offset, Utc};
use std::ffi::OsString;
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::path::{Component, Path, PathBuf};

pub const TRASH_INFO_HEADER: &str = "[Trash Info]";

/// Builds the serialized metadata record of one trashed entry. Pure, no I/O.
#[derive(Debug, Clone, Default)]
pub struct TrashInfoBuilder {
    path: Option<PathBuf>,
    deleted_at: Option<DateTime<Utc>>,
    offset: Option<FixedOffset>,
}

impl TrashInfoBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_removing_date_time(mut self, deleted_at: DateTime<Utc>) -> Self {
        self.deleted_at = Some(deleted_at);
        self
    }

    /// Offset used to render the deletion date as local time. UTC if unset.
    pub fn with_local_offset(mut self, offset: FixedOffset) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn build(&self) -> crate::Result<String> {
        let path = self
            .path
            .as_deref()
            .ok_or_else(|| CoreError::InvalidPath(PathBuf::new()))?;
        if !path.is_absolute() {
            return Err(CoreError::InvalidPath(path.to_path_buf()));
        }
        let deleted_at = self.deleted_at.unwrap_or_else(Utc::now);
        let offset = self.offset.unwrap_or_else(|| Utc.fix());
        let local = deleted_at.with_timezone(&offset);

        Ok(format!(
            "{TRASH_INFO_HEADER}\nPath={}\nDeletionDate={}\n",
            encode_path(path),
            local.format(TRASHINFO_TIME_FORMAT)
        ))
    }
}

/// A parsed metadata record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrashInfo {
    /// Decoded `Path` value. May be relative to the volume root when the
    /// record was written by another implementation.
    pub path: PathBuf,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl TrashInfo {
    /// Parses a record. The header and a `Path` key are mandatory; an
    /// unparseable `DeletionDate` is tolerated.
    pub fn parse(source: &Path, contents: &str) -> crate::Result<Self> {
        let mut lines = contents.lines().map(str::trim).filter(|l| !l.is_empty());
        if lines.next() != Some(TRASH_INFO_HEADER) {
            return Err(CoreError::corrupt(source, "missing [Trash Info] header"));
        }

        let mut path = None;
        let mut deleted_at = None;
        for line in lines {
            if line.starts_with('[') {
                break;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            match key.trim() {
                "Path" if path.is_none() => path = Some(decode_path(value.trim())),
                "DeletionDate" if deleted_at.is_none() => {
                    deleted_at = parse_trash_datetime(value);
                    if deleted_at.is_none() {
                        tracing::warn!("unparseable DeletionDate in {}: {}", source.display(), value);
                    }
                }
                _ => {}
            }
        }

        let path = path.ok_or_else(|| CoreError::corrupt(source, "missing Path key"))?;
        if path.as_os_str().is_empty() {
            return Err(CoreError::corrupt(source, "empty Path value"));
        }
        Ok(Self { path, deleted_at })
    }

    /// Absolute original location, resolving relative values against the
    /// volume root.
    pub fn original_path(&self, volume_root: &Path) -> PathBuf {
        if self.path.is_absolute() {
            self.path.clone()
        } else {
            volume_root.join(&self.path)
        }
    }
}

/// Percent-encodes every component of an absolute path, keeping the `/`
/// separators.
pub fn encode_path(path: &Path) -> String {
    let mut encoded = String::new();
    for component in path.components() {
        match component {
            Component::RootDir => {}
            Component::Normal(part) => {
                encoded.push('/');
                encoded.push_str(&urlencoding::encode_binary(part.as_bytes()));
            }
            Component::CurDir => encoded.push_str("/."),
            Component::ParentDir => encoded.push_str("/.."),
            Component::Prefix(prefix) => encoded.push_str(&prefix.as_os_str().to_string_lossy()),
        }
    }
    if encoded.is_empty() {
        encoded.push('/');
    }
    encoded
}

/// Reverses [`encode_path`]. Works on bytes since paths need not be UTF-8.
pub fn decode_path(value: &str) -> PathBuf {
    PathBuf::from(OsString::from_vec(
        urlencoding::decode_binary(value.as_bytes()).into_owned(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn instant() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 17, 8, 30, 5).unwrap()
    }

    #[test]
    fn builds_the_documented_format() {
        let text = TrashInfoBuilder::new()
            .with_file_path("/home/u/file.txt")
            .with_removing_date_time(instant())
            .build()
            .unwrap();
        assert_eq!(
            text,
            "[Trash Info]\nPath=/home/u/file.txt\nDeletionDate=2024-05-17T08:30:05\n"
        );
    }

    #[test]
    fn deletion_date_is_rendered_in_local_time() {
        let text = TrashInfoBuilder::new()
            .with_file_path("/a")
            .with_removing_date_time(instant())
            .with_local_offset(FixedOffset::east_opt(2 * 3600).unwrap())
            .build()
            .unwrap();
        assert!(text.contains("DeletionDate=2024-05-17T10:30:05\n"));
    }

    #[test]
    fn reserved_characters_are_percent_encoded() {
        let text = TrashInfoBuilder::new()
            .with_file_path("/home/u/my file%#?.txt")
            .with_removing_date_time(instant())
            .build()
            .unwrap();
        assert!(text.contains("Path=/home/u/my%20file%25%23%3F.txt\n"));
    }

    #[test]
    fn paths_round_trip() {
        for original in [
            "/home/u/plain.txt",
            "/home/u/with space/and+plus & ampersand",
            "/home/u/ünïcødé/日本語.md",
            "/home/u/100%/a=b;c",
        ] {
            let text = TrashInfoBuilder::new()
                .with_file_path(original)
                .with_removing_date_time(instant())
                .build()
                .unwrap();
            let info = TrashInfo::parse(Path::new("x.trashinfo"), &text).unwrap();
            assert_eq!(info.path, PathBuf::from(original));
        }
    }

    #[test]
    fn relative_paths_are_rejected() {
        let err = TrashInfoBuilder::new()
            .with_file_path("relative/file")
            .build()
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidPath(_)));
    }

    #[test]
    fn parse_requires_header_and_path() {
        let source = Path::new("x.trashinfo");
        assert!(matches!(
            TrashInfo::parse(source, "Path=/a\nDeletionDate=2024-01-01T00:00:00\n"),
            Err(CoreError::CorruptMetadata { .. })
        ));
        assert!(matches!(
            TrashInfo::parse(source, "[Trash Info]\nDeletionDate=2024-01-01T00:00:00\n"),
            Err(CoreError::CorruptMetadata { .. })
        ));
        assert!(TrashInfo::parse(source, "").is_err());
    }

    #[test]
    fn parse_tolerates_a_bad_date_and_resolves_relative_paths() {
        let info = TrashInfo::parse(
            Path::new("x.trashinfo"),
            "[Trash Info]\nPath=photos/a%20b.jpg\nDeletionDate=garbage\n",
        )
        .unwrap();
        assert_eq!(info.deleted_at, None);
        assert_eq!(
            info.original_path(Path::new("/mnt/data")),
            PathBuf::from("/mnt/data/photos/a b.jpg")
        );
    }
}
