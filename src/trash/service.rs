use crate::env::{Clock, Environment, EnvironmentContext};
use crate::errors::CoreError;
use crate::fs::{remove_entry, FileSystem};
use crate::helpers::{build_unique_basename, lexical_absolute, trashinfo_name};
use crate::models::{BatchReport, OrphanedEntry, OutcomeStatus, SkipReason, TrashDirectory, TrashEntry, TrashListItem};
use crate::ops::conflict::ConflictPolicy;
use crate::ops::progress::{OperationChannel, OperationKind};
use crate::ops::{run_batch, BatchItem, OperationsEngine, Transfer};
use crate::trash::dirs::TrashDirectoryResolver;
use crate::trash::info::TrashInfoBuilder;
use crate::trash::listing::TrashListing;
use crate::trash::DirectoryLocks;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError};

/// Upper bound for disambiguated names inside one trash directory.
const MAX_TRASH_SUFFIX: u64 = 100_000;

/// Moves entries into the trash and back out of it.
#[derive(Clone)]
pub struct TrashCan {
    engine: OperationsEngine,
    resolver: TrashDirectoryResolver,
    environment: Arc<dyn Environment>,
    clock: Arc<dyn Clock>,
    locks: Arc<DirectoryLocks>,
}

impl TrashCan {
    pub fn new(engine: OperationsEngine, environment: Arc<dyn Environment>, clock: Arc<dyn Clock>) -> Self {
        let resolver = TrashDirectoryResolver::new(engine.file_system().clone(), engine.volumes().clone());
        Self {
            engine,
            resolver,
            environment,
            clock,
            locks: Arc::default(),
        }
    }

    pub fn resolver(&self) -> &TrashDirectoryResolver {
        &self.resolver
    }

    /// Reads user id and home directory as they are right now.
    pub fn context(&self) -> crate::Result<EnvironmentContext> {
        EnvironmentContext::from_environment(self.environment.as_ref())
    }

    /// Moves every path into the trash of its volume.
    ///
    /// Fails as a whole only when the environment lacks the user id or the
    /// home directory; everything else is a per-path outcome.
    pub async fn move_to_trash(&self, paths: Vec<PathBuf>, channel: OperationChannel) -> crate::Result<BatchReport> {
        let trash = self.clone();
        tokio::task::spawn_blocking(move || {
            let ctx = trash.context()?;
            Ok(run_batch(OperationKind::Trash, paths, &channel, |index, path| {
                let status = trash.trash_one(index, &path, &ctx, &channel);
                (path, status)
            }))
        })
        .await?
    }

    /// Moves trashed entries back to their original location and drops
    /// their records.
    pub async fn restore(&self, entries: Vec<TrashEntry>, channel: OperationChannel) -> crate::Result<BatchReport> {
        let trash = self.clone();
        Ok(tokio::task::spawn_blocking(move || {
            run_batch(OperationKind::Restore, entries, &channel, |index, entry| {
                let status = trash.restore_one(index, &entry, &channel);
                (entry.trashed_path, status)
            })
        })
        .await?)
    }

    /// Permanently deletes trashed entries with their records.
    pub async fn purge(&self, entries: Vec<TrashEntry>, channel: OperationChannel) -> crate::Result<BatchReport> {
        let trash = self.clone();
        Ok(tokio::task::spawn_blocking(move || {
            run_batch(OperationKind::Purge, entries, &channel, |_, entry| {
                let status = trash.purge_pair(Some(&entry.trashed_path), Some(&entry.info_path));
                (entry.trashed_path, status)
            })
        })
        .await?)
    }

    /// Permanently deletes whatever half of each orphan exists.
    pub async fn purge_orphans(&self, volume_root: &Path, channel: OperationChannel) -> crate::Result<BatchReport> {
        let trash = self.clone();
        let volume_root = volume_root.to_path_buf();
        tokio::task::spawn_blocking(move || {
            let orphans = trash.list_entries(&volume_root)?.orphans();
            Ok(run_batch(OperationKind::Purge, orphans, &channel, |_, orphan| {
                let status = trash.purge_pair(orphan.trashed_path.as_deref(), orphan.info_path.as_deref());
                (orphan.source_path(), status)
            }))
        })
        .await?
    }

    /// Permanently deletes everything in the user's trash directories on
    /// `volume_root`, orphans included.
    pub async fn empty_trash(&self, volume_root: &Path, channel: OperationChannel) -> crate::Result<BatchReport> {
        let trash = self.clone();
        let volume_root = volume_root.to_path_buf();
        tokio::task::spawn_blocking(move || {
            let items: Vec<TrashListItem> = trash.list_entries(&volume_root)?.iter().collect();
            Ok(run_batch(OperationKind::Purge, items, &channel, |_, item| match item {
                TrashListItem::Entry(entry) => {
                    let status = trash.purge_pair(Some(&entry.trashed_path), Some(&entry.info_path));
                    (entry.trashed_path, status)
                }
                TrashListItem::Orphaned(orphan) => {
                    let status = trash.purge_pair(orphan.trashed_path.as_deref(), orphan.info_path.as_deref());
                    (orphan.source_path(), status)
                }
            }))
        })
        .await?
    }

    /// Trash entries of the current user on `volume_root`. Only the trash
    /// directories are looked up here, which touches the disk, so async callers
    /// should run it off their executor thread. Nothing inside them is read
    /// before the listing is iterated.
    pub fn list_entries(&self, volume_root: &Path) -> crate::Result<TrashListing> {
        let ctx = self.context()?;
        let dirs = self.resolver.existing(volume_root, &ctx)?;
        Ok(TrashListing::new(self.engine.file_system().clone(), dirs))
    }

    /// Trash entries of the current user on every mounted volume, the home
    /// trash first.
    pub fn list_all_entries(&self) -> crate::Result<TrashListing> {
        let ctx = self.context()?;
        let volumes = self.engine.volumes();

        let mut roots = vec![volumes.root_for(&ctx.data_home)?];
        for volume in volumes.list_volumes()? {
            if !roots.contains(&volume.root_directory) {
                roots.push(volume.root_directory);
            }
        }

        let mut dirs: Vec<TrashDirectory> = Vec::new();
        for root in roots {
            match self.resolver.existing(&root, &ctx) {
                Ok(found) => {
                    for dir in found {
                        if !dirs.iter().any(|known| known.path == dir.path) {
                            dirs.push(dir);
                        }
                    }
                }
                Err(err) => tracing::debug!("skipping trash of {}: {}", root.display(), err),
            }
        }
        Ok(TrashListing::new(self.engine.file_system().clone(), dirs))
    }

    fn fs(&self) -> &dyn FileSystem {
        self.engine.file_system().as_ref()
    }

    fn trash_one(&self, index: usize, path: &Path, ctx: &EnvironmentContext, channel: &OperationChannel) -> OutcomeStatus {
        let Some(path) = lexical_absolute(path) else {
            return OutcomeStatus::Failed(CoreError::InvalidPath(path.to_path_buf()));
        };
        let Some(base_name) = path.file_name().map(|name| name.to_string_lossy().into_owned()) else {
            return OutcomeStatus::Failed(CoreError::InvalidPath(path));
        };
        if !self.fs().exists(&path) {
            return OutcomeStatus::Skipped(SkipReason::MissingPath(path));
        }

        let volume_root = match self.engine.volumes().root_for(&path) {
            Ok(root) => root,
            Err(err) => return OutcomeStatus::Failed(err),
        };
        if self.resolver.is_inside_trash(&path, &volume_root, ctx) {
            return OutcomeStatus::Skipped(SkipReason::AlreadyTrashed(path));
        }
        let dir = match self.resolver.resolve(&volume_root, ctx) {
            Ok(dir) => dir,
            Err(err) => return OutcomeStatus::Failed(err),
        };

        let now = self.clock.now();
        let record = match TrashInfoBuilder::new()
            .with_file_path(&path)
            .with_removing_date_time(now)
            .with_local_offset(self.clock.local_offset(now))
            .build()
        {
            Ok(record) => record,
            Err(err) => return OutcomeStatus::Failed(err),
        };

        let lock = self.locks.for_dir(&dir.path);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let (stored, info_path) = match self.claim_name(&dir, &base_name, &record) {
            Ok(claimed) => claimed,
            Err(err) => return OutcomeStatus::Failed(err),
        };

        let status = self.engine.transfer_one(
            Transfer::Move,
            index,
            &path,
            &stored,
            &ConflictPolicy::default(),
            channel,
        );
        match &status {
            OutcomeStatus::Succeeded { .. } => {
                tracing::info!("trashed {} as {}", path.display(), stored.display());
            }
            // The copy in the trash stays paired with its record.
            OutcomeStatus::Failed(CoreError::CrossDeviceFallbackPartialFailure { .. }) => {}
            _ => self.roll_back(&stored, &info_path),
        }
        status
    }

    /// Undoes a claimed name after a failed move. Whatever part of the entry
    /// reached `files` goes first; the record is only dropped once nothing
    /// is left for it to describe.
    fn roll_back(&self, stored: &Path, info_path: &Path) {
        tracing::debug!("rolling back {}", info_path.display());
        if self.fs().exists(stored) {
            if let Err(err) = remove_entry(self.fs(), stored) {
                tracing::warn!(
                    "could not remove partial {}, keeping its record: {}",
                    stored.display(),
                    err
                );
                return;
            }
        }
        if let Err(err) = self.fs().remove_file(info_path) {
            tracing::warn!("could not roll back {}: {}", info_path.display(), err);
        }
    }

    /// Picks the first name free in both `files` and `info` and writes the
    /// record under it. The record is created exclusively, so a name taken
    /// by another process moves on to the next candidate.
    fn claim_name(&self, dir: &TrashDirectory, base_name: &str, record: &str) -> crate::Result<(PathBuf, PathBuf)> {
        for n in 1..=MAX_TRASH_SUFFIX {
            let candidate = build_unique_basename(base_name, n);
            let stored = dir.files_dir.join(&candidate);
            if self.fs().exists(&stored) {
                continue;
            }

            let info_path = dir.info_dir.join(trashinfo_name(&candidate));
            match self.fs().write_new(&info_path, record) {
                Ok(()) => return Ok((stored, info_path)),
                Err(err) if err.is_already_exists() => continue,
                Err(err) => return Err(err),
            }
        }
        Err(CoreError::NameConflict(dir.files_dir.join(base_name)))
    }

    fn restore_one(&self, index: usize, entry: &TrashEntry, channel: &OperationChannel) -> OutcomeStatus {
        let lock = self.locks.for_dir(&entry.trash_dir);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        if !self.fs().exists(&entry.trashed_path) {
            return OutcomeStatus::Skipped(SkipReason::MissingPath(entry.trashed_path.clone()));
        }
        let original = &entry.original_path;
        let Some(parent) = original.parent() else {
            return OutcomeStatus::Failed(CoreError::InvalidPath(original.clone()));
        };
        if !self.fs().is_dir(parent) {
            return OutcomeStatus::Failed(CoreError::DestinationMissing(parent.to_path_buf()));
        }
        if self.fs().exists(original) {
            return OutcomeStatus::Failed(CoreError::NameConflict(original.clone()));
        }

        let status = self.engine.transfer_one(
            Transfer::Move,
            index,
            &entry.trashed_path,
            original,
            &ConflictPolicy::default(),
            channel,
        );
        if status.is_success() {
            if let Err(err) = self.fs().remove_file(&entry.info_path) {
                tracing::warn!("restored {} but kept its record: {}", original.display(), err);
            }
            tracing::info!("restored {}", original.display());
        }
        status
    }

    /// Deletes a stored file and its record, either of which may be gone.
    fn purge_pair(&self, stored: Option<&Path>, info_path: Option<&Path>) -> OutcomeStatus {
        let status = match stored {
            Some(stored) => match self.engine.delete_one(stored) {
                OutcomeStatus::Skipped(SkipReason::MissingPath(_)) => OutcomeStatus::Succeeded { destination: None },
                other => other,
            },
            None => OutcomeStatus::Succeeded { destination: None },
        };
        if !status.is_success() {
            return status;
        }

        if let Some(info_path) = info_path {
            match self.fs().remove_file(info_path) {
                Ok(()) => {}
                Err(err) if err.is_not_found() => {}
                Err(err) => return OutcomeStatus::Failed(err),
            }
        }
        status
    }
}

impl BatchItem for TrashEntry {
    fn source_path(&self) -> PathBuf {
        self.trashed_path.clone()
    }
}

impl BatchItem for OrphanedEntry {
    fn source_path(&self) -> PathBuf {
        self.trashed_path
            .clone()
            .or_else(|| self.info_path.clone())
            .unwrap_or_else(|| self.trash_dir.join(&self.name))
    }
}

impl BatchItem for TrashListItem {
    fn source_path(&self) -> PathBuf {
        match self {
            Self::Entry(entry) => entry.source_path(),
            Self::Orphaned(orphan) => orphan.source_path(),
        }
    }
}
