//! Discovery of trash entries by pairing `files` with `info`.

use crate::fs::{entry_size, FileSystem};
use crate::helpers::TRASHINFO_EXTENSION;
use crate::models::{OrphanedEntry, TrashDirectory, TrashEntry, TrashListItem};
use crate::trash::info::TrashInfo;
use std::collections::BTreeSet;
use std::ffi::{OsStr, OsString};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Entries of a set of trash directories.
///
/// Nothing is read until iteration; every call to [`TrashListing::iter`]
/// rescans the directories, so a listing can be reused after the trash
/// changed.
#[derive(Clone)]
pub struct TrashListing {
    fs: Arc<dyn FileSystem>,
    dirs: Vec<TrashDirectory>,
}

impl TrashListing {
    pub(crate) fn new(fs: Arc<dyn FileSystem>, dirs: Vec<TrashDirectory>) -> Self {
        Self { fs, dirs }
    }

    pub fn directories(&self) -> &[TrashDirectory] {
        &self.dirs
    }

    pub fn iter(&self) -> TrashListingIter {
        TrashListingIter {
            fs: self.fs.clone(),
            dirs: self.dirs.clone().into_iter(),
            current: None,
        }
    }

    /// Restorable entries only.
    pub fn entries(&self) -> Vec<TrashEntry> {
        self.iter()
            .filter_map(|item| match item {
                TrashListItem::Entry(entry) => Some(entry),
                TrashListItem::Orphaned(_) => None,
            })
            .collect()
    }

    /// Halves of entries whose partner is missing or unreadable.
    pub fn orphans(&self) -> Vec<OrphanedEntry> {
        self.iter()
            .filter_map(|item| match item {
                TrashListItem::Orphaned(orphan) => Some(orphan),
                TrashListItem::Entry(_) => None,
            })
            .collect()
    }
}

impl IntoIterator for &TrashListing {
    type Item = TrashListItem;
    type IntoIter = TrashListingIter;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub struct TrashListingIter {
    fs: Arc<dyn FileSystem>,
    dirs: std::vec::IntoIter<TrashDirectory>,
    current: Option<DirScan>,
}

struct DirScan {
    dir: TrashDirectory,
    infos: std::vec::IntoIter<PathBuf>,
    /// Stored names not claimed by any record yet.
    unpaired: BTreeSet<OsString>,
    leftovers: Option<std::collections::btree_set::IntoIter<OsString>>,
}

impl Iterator for TrashListingIter {
    type Item = TrashListItem;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(scan) = self.current.as_mut() {
                if let Some(item) = scan.next(self.fs.as_ref()) {
                    return Some(item);
                }
                self.current = None;
            }

            let dir = self.dirs.next()?;
            self.current = DirScan::open(self.fs.as_ref(), dir);
        }
    }
}

impl DirScan {
    fn open(fs: &dyn FileSystem, dir: TrashDirectory) -> Option<Self> {
        let mut infos = if fs.is_dir(&dir.info_dir) {
            match fs.list_dir(&dir.info_dir) {
                Ok(infos) => infos,
                Err(err) => {
                    tracing::warn!("cannot read {}: {}", dir.info_dir.display(), err);
                    return None;
                }
            }
        } else {
            Vec::new()
        };
        infos.sort();

        let unpaired = if fs.is_dir(&dir.files_dir) {
            match fs.list_dir(&dir.files_dir) {
                Ok(files) => files
                    .iter()
                    .filter_map(|file| file.file_name().map(OsStr::to_os_string))
                    .collect(),
                Err(err) => {
                    tracing::warn!("cannot read {}: {}", dir.files_dir.display(), err);
                    BTreeSet::new()
                }
            }
        } else {
            BTreeSet::new()
        };

        Some(Self {
            dir,
            infos: infos.into_iter(),
            unpaired,
            leftovers: None,
        })
    }

    fn next(&mut self, fs: &dyn FileSystem) -> Option<TrashListItem> {
        for info_path in self.infos.by_ref() {
            let Some(name) = stored_name(&info_path) else {
                tracing::debug!("ignoring {}", info_path.display());
                continue;
            };
            self.unpaired.remove(&name);
            return Some(pair(fs, &self.dir, name, info_path));
        }

        let leftovers = self
            .leftovers
            .get_or_insert_with(|| std::mem::take(&mut self.unpaired).into_iter());
        let name = leftovers.next()?;
        let trashed_path = self.dir.files_dir.join(&name);
        tracing::debug!("stored file without record: {}", trashed_path.display());
        Some(TrashListItem::Orphaned(OrphanedEntry {
            name: name.to_string_lossy().into_owned(),
            trashed_path: Some(trashed_path),
            info_path: None,
            trash_dir: self.dir.path.clone(),
            reason: "missing metadata record".to_string(),
        }))
    }
}

/// Stored file name for `<name>.trashinfo`.
fn stored_name(info_path: &Path) -> Option<OsString> {
    let file_name = info_path.file_name()?.as_bytes();
    let name = file_name.strip_suffix(TRASHINFO_EXTENSION.as_bytes())?;
    (!name.is_empty()).then(|| OsStr::from_bytes(name).to_os_string())
}

fn pair(fs: &dyn FileSystem, dir: &TrashDirectory, name: OsString, info_path: PathBuf) -> TrashListItem {
    let trashed_path = dir.files_dir.join(&name);
    let stored_exists = fs.exists(&trashed_path);
    let orphan = |reason: String| {
        tracing::debug!("orphaned trash entry {}: {}", info_path.display(), reason);
        TrashListItem::Orphaned(OrphanedEntry {
            name: name.to_string_lossy().into_owned(),
            trashed_path: stored_exists.then(|| trashed_path.clone()),
            info_path: Some(info_path.clone()),
            trash_dir: dir.path.clone(),
            reason,
        })
    };

    let info = match fs
        .read_to_string(&info_path)
        .and_then(|contents| TrashInfo::parse(&info_path, &contents))
    {
        Ok(info) => info,
        Err(err) => return orphan(err.to_string()),
    };
    if !stored_exists {
        return orphan("missing stored file".to_string());
    }

    let volume_root = dir.mount_point.as_deref().unwrap_or_else(|| Path::new("/"));
    TrashListItem::Entry(TrashEntry {
        name: name.to_string_lossy().into_owned(),
        original_path: info.original_path(volume_root),
        size_bytes: entry_size(fs, &trashed_path).ok(),
        trashed_path,
        info_path,
        trash_dir: dir.path.clone(),
        deleted_at: info.deleted_at,
    })
}
