//! Shared utility helpers for naming, timestamps and display.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

/// File extension used by trash info files.
pub const TRASHINFO_EXTENSION: &str = ".trashinfo";

/// Deletion date format used by Trash info metadata.
pub const TRASHINFO_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Builds the `n`-th candidate name for `file_name`: the name itself for
/// `n <= 1`, otherwise `stem (n).ext`. Dot files and names without an
/// extension get the suffix appended at the end.
pub fn build_unique_basename(file_name: &str, n: u64) -> String {
    if n <= 1 {
        return file_name.to_string();
    }

    let path = Path::new(file_name);
    match (path.file_stem().and_then(|v| v.to_str()), path.extension().and_then(|v| v.to_str())) {
        (Some(stem), Some(ext)) if !stem.is_empty() => format!("{stem} ({n}).{ext}"),
        _ => format!("{file_name} ({n})"),
    }
}

/// Name of the info record paired with a stored file name.
pub fn trashinfo_name(stored_name: &str) -> String {
    format!("{stored_name}{TRASHINFO_EXTENSION}")
}

/// Parses a `DeletionDate` value (local wall-clock time) into UTC.
pub fn parse_trash_datetime(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value.trim(), TRASHINFO_TIME_FORMAT)
        .ok()
        .and_then(|naive| Local.from_local_datetime(&naive).earliest())
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|| DateTime::parse_from_rfc3339(value.trim()).ok().map(|dt| dt.with_timezone(&Utc)))
}

/// Human readable size rendering.
pub fn print_size(bytes: u64) -> String {
    const SUFFIXES: [&str; 5] = ["B", "K", "M", "G", "T"];
    let mut value = bytes as f64;
    let mut idx = 0usize;

    while value >= 1024.0 && idx < SUFFIXES.len() - 1 {
        value /= 1024.0;
        idx += 1;
    }

    if idx == 0 {
        format!("{:.0} {}", value, SUFFIXES[idx])
    } else {
        format!("{:.1} {}", value, SUFFIXES[idx])
    }
}

/// Resolves `.` and `..` segments without touching the filesystem.
/// Returns `None` for relative paths and for paths escaping the root.
pub fn lexical_absolute(path: &Path) -> Option<PathBuf> {
    if !path.is_absolute() {
        return None;
    }

    let mut parts: Vec<OsString> = Vec::new();
    for component in path.components() {
        match component {
            Component::RootDir | Component::Prefix(_) | Component::CurDir => {}
            Component::ParentDir => {
                parts.pop()?;
            }
            Component::Normal(part) => parts.push(part.to_owned()),
        }
    }

    let mut normalized = PathBuf::from("/");
    normalized.extend(parts);
    Some(normalized)
}
