use crate::errors::CoreError;
use crate::fs::FileSystem;
use crate::helpers::build_unique_basename;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Upper bound for `name (n).ext` probing.
const MAX_SUFFIX: u64 = 100_000;

/// What to do when the target name is already taken.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConflictResolution {
    /// Leave both entries alone and report a `Conflict` outcome.
    #[default]
    Prompt,
    Overwrite,
    Skip,
    RenameWithSuffix,
}

/// Batch wide resolution plus per-source overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConflictPolicy {
    pub default: ConflictResolution,
    pub overrides: HashMap<PathBuf, ConflictResolution>,
}

impl ConflictPolicy {
    pub fn new(default: ConflictResolution) -> Self {
        Self {
            default,
            overrides: HashMap::new(),
        }
    }

    pub fn with_override(mut self, source: impl Into<PathBuf>, resolution: ConflictResolution) -> Self {
        self.overrides.insert(source.into(), resolution);
        self
    }

    pub fn resolution_for(&self, source: &Path) -> ConflictResolution {
        self.overrides.get(source).copied().unwrap_or(self.default)
    }
}

/// First `name`, `name (2).ext`, `name (3).ext`, ... not present in `dir`.
pub fn next_free_name(fs: &dyn FileSystem, dir: &Path, name: &str) -> crate::Result<PathBuf> {
    (1..=MAX_SUFFIX)
        .map(|n| dir.join(build_unique_basename(name, n)))
        .find(|candidate| !fs.exists(candidate))
        .ok_or_else(|| CoreError::NameConflict(dir.join(name)))
}

/// Hidden sibling of `path` where an entry being overwritten is parked
/// until its replacement is complete.
pub fn aside_name(fs: &dyn FileSystem, path: &Path) -> crate::Result<PathBuf> {
    let (Some(dir), Some(name)) = (path.parent(), path.file_name()) else {
        return Err(CoreError::InvalidPath(path.to_path_buf()));
    };
    let name = name.to_string_lossy();
    (1..=MAX_SUFFIX)
        .map(|n| dir.join(format!(".{name}.replaced-{n}")))
        .find(|candidate| !fs.exists(candidate))
        .ok_or_else(|| CoreError::NameConflict(path.to_path_buf()))
}
