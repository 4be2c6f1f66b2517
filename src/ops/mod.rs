//! The file operations engine: copy, move, rename and permanent delete.
//!
//! Every batch walks its paths one by one, in request order, on a blocking
//! worker. One path failing never stops its siblings; only errors that no
//! path could survive abort a batch.

pub mod conflict;
pub mod progress;

use crate::config::EngineConfig;
use crate::errors::CoreError;
use crate::fs::{entry_size, remove_entry, FileSystem};
use crate::helpers::lexical_absolute;
use crate::models::{BatchReport, OutcomeStatus, SkipReason};
use crate::volume::VolumeResolver;
use conflict::{aside_name, next_free_name, ConflictPolicy, ConflictResolution};
use progress::{OperationChannel, OperationKind, ProgressEvent};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Sources to copy or move into one destination directory.
#[derive(Debug, Clone)]
pub struct OperationRequest {
    pub sources: Vec<PathBuf>,
    pub destination: PathBuf,
    pub conflicts: ConflictPolicy,
}

impl OperationRequest {
    pub fn new(sources: impl IntoIterator<Item = impl Into<PathBuf>>, destination: impl Into<PathBuf>) -> Self {
        Self {
            sources: sources.into_iter().map(Into::into).collect(),
            destination: destination.into(),
            conflicts: ConflictPolicy::default(),
        }
    }

    /// Resolution applied to every conflict of the batch.
    pub fn resolve_conflicts_with(mut self, resolution: ConflictResolution) -> Self {
        self.conflicts.default = resolution;
        self
    }

    /// Resolution for one source, overriding the batch wide one.
    pub fn resolve_item_with(mut self, source: impl Into<PathBuf>, resolution: ConflictResolution) -> Self {
        self.conflicts.overrides.insert(source.into(), resolution);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transfer {
    Copy,
    Move,
}

impl Transfer {
    fn kind(self) -> OperationKind {
        match self {
            Self::Copy => OperationKind::Copy,
            Self::Move => OperationKind::Move,
        }
    }
}

#[derive(Clone)]
pub struct OperationsEngine {
    fs: Arc<dyn FileSystem>,
    volumes: VolumeResolver,
    config: EngineConfig,
}

impl OperationsEngine {
    pub fn new(fs: Arc<dyn FileSystem>, volumes: VolumeResolver, config: EngineConfig) -> Self {
        Self { fs, volumes, config }
    }

    pub fn file_system(&self) -> &Arc<dyn FileSystem> {
        &self.fs
    }

    pub fn volumes(&self) -> &VolumeResolver {
        &self.volumes
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Copies every source into `request.destination`, keeping base names.
    pub async fn copy(&self, request: OperationRequest, channel: OperationChannel) -> crate::Result<BatchReport> {
        self.spawn_request(Transfer::Copy, request, channel).await
    }

    /// Moves every source into `request.destination`. Renames within a
    /// volume, copies and deletes across volumes.
    pub async fn move_to(&self, request: OperationRequest, channel: OperationChannel) -> crate::Result<BatchReport> {
        self.spawn_request(Transfer::Move, request, channel).await
    }

    /// Copies explicit `(source, target path)` pairs.
    pub async fn copy_entries(
        &self,
        pairs: Vec<(PathBuf, PathBuf)>,
        policy: ConflictPolicy,
        channel: OperationChannel,
    ) -> crate::Result<BatchReport> {
        let engine = self.clone();
        Ok(tokio::task::spawn_blocking(move || engine.run_transfer(Transfer::Copy, pairs, &policy, &channel)).await?)
    }

    /// Moves explicit `(source, target path)` pairs.
    pub async fn move_entries(
        &self,
        pairs: Vec<(PathBuf, PathBuf)>,
        policy: ConflictPolicy,
        channel: OperationChannel,
    ) -> crate::Result<BatchReport> {
        let engine = self.clone();
        Ok(tokio::task::spawn_blocking(move || engine.run_transfer(Transfer::Move, pairs, &policy, &channel)).await?)
    }

    /// Renames one entry inside its directory. Returns the new path.
    pub async fn rename(&self, path: impl Into<PathBuf>, new_name: impl Into<String>) -> crate::Result<PathBuf> {
        let engine = self.clone();
        let (path, new_name) = (path.into(), new_name.into());
        tokio::task::spawn_blocking(move || engine.rename_blocking(&path, &new_name)).await?
    }

    /// Permanently removes every source, recursively for directories.
    pub async fn delete(&self, sources: Vec<PathBuf>, channel: OperationChannel) -> crate::Result<BatchReport> {
        let engine = self.clone();
        Ok(tokio::task::spawn_blocking(move || engine.run_delete(OperationKind::Delete, sources, &channel)).await?)
    }

    async fn spawn_request(
        &self,
        transfer: Transfer,
        request: OperationRequest,
        channel: OperationChannel,
    ) -> crate::Result<BatchReport> {
        let engine = self.clone();
        tokio::task::spawn_blocking(move || {
            let destination = lexical_absolute(&request.destination)
                .ok_or_else(|| CoreError::InvalidPath(request.destination.clone()))?;
            if !engine.fs.is_dir(&destination) {
                return Err(CoreError::DestinationMissing(destination));
            }

            let pairs = request
                .sources
                .iter()
                .map(|source| {
                    let target = match source.file_name() {
                        Some(name) => destination.join(name),
                        None => destination.clone(),
                    };
                    (source.clone(), target)
                })
                .collect();
            Ok(engine.run_transfer(transfer, pairs, &request.conflicts, &channel))
        })
        .await?
    }

    pub(crate) fn run_transfer(
        &self,
        transfer: Transfer,
        pairs: Vec<(PathBuf, PathBuf)>,
        policy: &ConflictPolicy,
        channel: &OperationChannel,
    ) -> BatchReport {
        run_batch(transfer.kind(), pairs, channel, |index, (source, target)| {
            let status = self.transfer_one(transfer, index, &source, &target, policy, channel);
            (source, status)
        })
    }

    /// Copies or moves one entry to `target`, applying the conflict policy.
    pub(crate) fn transfer_one(
        &self,
        transfer: Transfer,
        index: usize,
        source: &Path,
        target: &Path,
        policy: &ConflictPolicy,
        channel: &OperationChannel,
    ) -> OutcomeStatus {
        let (source, target) = match (lexical_absolute(source), lexical_absolute(target)) {
            (Some(source), Some(target)) if source.file_name().is_some() => (source, target),
            (Some(_), Some(target)) => return OutcomeStatus::Failed(CoreError::InvalidPath(target)),
            _ => return OutcomeStatus::Failed(CoreError::InvalidPath(source.to_path_buf())),
        };

        if !self.fs.exists(&source) {
            return OutcomeStatus::Skipped(SkipReason::MissingPath(source));
        }
        let Some(parent) = target.parent().map(Path::to_path_buf) else {
            return OutcomeStatus::Failed(CoreError::InvalidPath(target));
        };
        if !self.fs.is_dir(&parent) {
            return OutcomeStatus::Failed(CoreError::DestinationMissing(parent));
        }
        if transfer == Transfer::Move && source == target {
            return OutcomeStatus::Skipped(SkipReason::SourceIsDestination(source));
        }
        if target != source && target.starts_with(&source) {
            return OutcomeStatus::Failed(CoreError::InvalidPath(target));
        }

        let mut displaced = None;
        let target = if self.fs.exists(&target) {
            match policy.resolution_for(&source) {
                ConflictResolution::Prompt => return OutcomeStatus::Conflict { existing: target },
                ConflictResolution::Skip => return OutcomeStatus::Skipped(SkipReason::ConflictSkipped(target)),
                ConflictResolution::Overwrite => {
                    if source == target {
                        return OutcomeStatus::Skipped(SkipReason::SourceIsDestination(source));
                    }
                    if source.starts_with(&target) {
                        return OutcomeStatus::Failed(CoreError::InvalidPath(target));
                    }
                    let aside = match aside_name(self.fs.as_ref(), &target)
                        .and_then(|aside| self.fs.rename(&target, &aside).map(|()| aside))
                    {
                        Ok(aside) => aside,
                        Err(err) => return OutcomeStatus::Failed(err),
                    };
                    tracing::debug!("overwriting {}, old entry parked at {}", target.display(), aside.display());
                    displaced = Some(aside);
                    target
                }
                ConflictResolution::RenameWithSuffix => {
                    let name = target
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    match next_free_name(self.fs.as_ref(), &parent, &name) {
                        Ok(free) => free,
                        Err(err) => return OutcomeStatus::Failed(err),
                    }
                }
            }
        } else {
            target
        };

        let result = match transfer {
            Transfer::Copy => self.copy_top_level(index, &source, &target, channel),
            Transfer::Move => self.move_top_level(index, &source, &target, channel),
        };
        if let Some(aside) = displaced {
            self.settle_overwrite(&target, &aside, &result);
        }
        match result {
            Ok(()) => OutcomeStatus::Succeeded {
                destination: Some(target),
            },
            Err(err) => OutcomeStatus::from_error(err),
        }
    }

    /// Drops the parked entry once its replacement is in place, or puts it
    /// back when the replacement did not complete.
    fn settle_overwrite(&self, target: &Path, aside: &Path, result: &crate::Result<()>) {
        let replaced = matches!(
            result,
            Ok(()) | Err(CoreError::CrossDeviceFallbackPartialFailure { .. })
        );
        if replaced {
            if let Err(err) = remove_entry(self.fs.as_ref(), aside) {
                tracing::warn!("could not remove replaced entry {}: {}", aside.display(), err);
            }
            return;
        }

        if self.fs.exists(target) {
            if let Err(err) = remove_entry(self.fs.as_ref(), target) {
                tracing::warn!(
                    "could not remove incomplete {}, previous entry kept at {}: {}",
                    target.display(),
                    aside.display(),
                    err
                );
                return;
            }
        }
        match self.fs.rename(aside, target) {
            Ok(()) => tracing::debug!("restored {} after a failed overwrite", target.display()),
            Err(err) => tracing::warn!(
                "previous entry of {} kept at {}: {}",
                target.display(),
                aside.display(),
                err
            ),
        }
    }

    fn move_top_level(&self, index: usize, source: &Path, target: &Path, channel: &OperationChannel) -> crate::Result<()> {
        let parent = target.parent().unwrap_or(target);
        if self.volumes.are_same_volume(source, parent)? {
            match self.fs.rename(source, target) {
                Ok(()) => return Ok(()),
                Err(err) if err.is_cross_device() => {
                    tracing::debug!("rename across devices, falling back to copy: {}", source.display());
                }
                Err(err) => return Err(err),
            }
        } else {
            tracing::debug!(
                "{} and {} are on different volumes, copying",
                source.display(),
                parent.display()
            );
        }

        self.copy_top_level(index, source, target, channel)?;
        remove_entry(self.fs.as_ref(), source).map_err(|cause| {
            tracing::warn!(
                "{} was copied to {} but could not be removed: {}",
                source.display(),
                target.display(),
                cause
            );
            CoreError::CrossDeviceFallbackPartialFailure {
                source_path: source.to_path_buf(),
                copied_to: target.to_path_buf(),
                cause: Box::new(cause),
            }
        })
    }

    /// Copies one request entry. A cancelled file copy removes the partial
    /// file; a cancelled directory copy stays in place.
    fn copy_top_level(&self, index: usize, source: &Path, target: &Path, channel: &OperationChannel) -> crate::Result<()> {
        let total = entry_size(self.fs.as_ref(), source)?;
        self.ensure_free_space(target, total)?;

        let mut copied = 0;
        let result = self.copy_entry(source, target, index, total, &mut copied, channel);
        if matches!(result, Err(CoreError::Cancelled)) && !self.fs.is_dir(source) && self.fs.exists(target) {
            if let Err(err) = self.fs.remove_file(target) {
                tracing::warn!("could not remove partial copy {}: {}", target.display(), err);
            }
        }
        result
    }

    fn ensure_free_space(&self, target: &Path, required: u64) -> crate::Result<()> {
        if !self.config.check_free_space || required == 0 {
            return Ok(());
        }

        let available = match self
            .volumes
            .root_for(target)
            .and_then(|root| self.volumes.free_space(&root))
        {
            Ok(available) => available,
            Err(err) => {
                tracing::debug!("free space of {} unknown: {}", target.display(), err);
                return Ok(());
            }
        };
        if required > available {
            return Err(CoreError::InsufficientSpace {
                path: target.to_path_buf(),
                required: Some(required),
                available: Some(available),
            });
        }
        Ok(())
    }

    fn copy_entry(
        &self,
        source: &Path,
        target: &Path,
        index: usize,
        total: u64,
        copied: &mut u64,
        channel: &OperationChannel,
    ) -> crate::Result<()> {
        channel.checkpoint()?;
        let metadata = self.fs.symlink_metadata(source)?;

        if metadata.file_type().is_symlink() {
            let link = self.fs.read_link(source)?;
            return self.fs.symlink(&link, target);
        }

        if metadata.is_dir() {
            self.fs.create_dir(target)?;
            let mut children = self.fs.list_dir(source)?;
            children.sort();
            for child in children {
                let Some(name) = child.file_name() else {
                    continue;
                };
                self.copy_entry(&child, &target.join(name), index, total, copied, channel)?;
            }
            if let Err(err) = self.fs.set_permissions(target, metadata.permissions()) {
                tracing::warn!("could not copy permissions to {}: {}", target.display(), err);
            }
            return Ok(());
        }

        let mut reader = self.fs.open_reader(source)?;
        let mut writer = self.fs.create_writer(target)?;
        let mut buffer = vec![0u8; self.config.copy_chunk_size.max(1)];
        loop {
            channel.checkpoint()?;
            let read = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(read) => read,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(CoreError::io(source, err)),
            };
            writer
                .write_all(&buffer[..read])
                .map_err(|err| CoreError::io(target, err))?;
            *copied += read as u64;
            channel.emit(ProgressEvent::BytesCopied {
                index,
                copied: *copied,
                total,
            });
        }
        writer.flush().map_err(|err| CoreError::io(target, err))?;
        drop(writer);

        if let Err(err) = self.fs.set_permissions(target, metadata.permissions()) {
            tracing::warn!("could not copy permissions to {}: {}", target.display(), err);
        }
        Ok(())
    }

    pub(crate) fn rename_blocking(&self, path: &Path, new_name: &str) -> crate::Result<PathBuf> {
        if new_name.is_empty() || new_name == "." || new_name == ".." || new_name.contains(['/', '\0']) {
            return Err(CoreError::InvalidName(new_name.to_string()));
        }

        let path = lexical_absolute(path).ok_or_else(|| CoreError::InvalidPath(path.to_path_buf()))?;
        if !self.fs.exists(&path) {
            return Err(CoreError::InvalidPath(path));
        }
        let parent = path
            .parent()
            .filter(|_| path.file_name().is_some())
            .ok_or_else(|| CoreError::InvalidPath(path.clone()))?;

        let target = parent.join(new_name);
        if target == path {
            return Ok(target);
        }
        if self.fs.exists(&target) {
            return Err(CoreError::NameConflict(target));
        }

        self.fs.rename(&path, &target)?;
        tracing::info!("renamed {} to {}", path.display(), target.display());
        Ok(target)
    }

    pub(crate) fn run_delete(&self, kind: OperationKind, sources: Vec<PathBuf>, channel: &OperationChannel) -> BatchReport {
        run_batch(kind, sources, channel, |_, source| {
            let status = self.delete_one(&source);
            (source, status)
        })
    }

    pub(crate) fn delete_one(&self, source: &Path) -> OutcomeStatus {
        let Some(path) = lexical_absolute(source).filter(|p| p.file_name().is_some()) else {
            return OutcomeStatus::Failed(CoreError::InvalidPath(source.to_path_buf()));
        };
        if !self.fs.exists(&path) {
            return OutcomeStatus::Skipped(SkipReason::MissingPath(path));
        }
        match remove_entry(self.fs.as_ref(), &path) {
            Ok(()) => OutcomeStatus::Succeeded { destination: None },
            Err(err) => OutcomeStatus::Failed(err),
        }
    }
}

/// Drives one batch: items run in order, each reporting the path it stands
/// for and its outcome. The first item to observe a cancellation reports
/// `Cancelled`, every later one `NotStarted`.
pub(crate) fn run_batch<T>(
    kind: OperationKind,
    items: Vec<T>,
    channel: &OperationChannel,
    mut step: impl FnMut(usize, T) -> (PathBuf, OutcomeStatus),
) -> BatchReport
where
    T: BatchItem,
{
    channel.emit(ProgressEvent::BatchStarted {
        kind,
        total: items.len(),
    });

    let mut report = BatchReport::default();
    let mut cancel_reported = false;
    for (index, item) in items.into_iter().enumerate() {
        if channel.is_cancelled() {
            let status = if cancel_reported {
                OutcomeStatus::NotStarted
            } else {
                cancel_reported = true;
                OutcomeStatus::Cancelled
            };
            let source = item.source_path();
            log_outcome(kind, &source, &status);
            report.push(source, status);
            continue;
        }

        channel.emit(ProgressEvent::PathStarted {
            index,
            source: item.source_path(),
        });
        let (source, status) = step(index, item);
        cancel_reported |= matches!(status, OutcomeStatus::Cancelled);
        log_outcome(kind, &source, &status);
        channel.emit(ProgressEvent::PathFinished {
            index,
            source: source.clone(),
            status: status.label(),
        });
        report.push(source, status);
    }

    channel.emit(ProgressEvent::BatchFinished {
        kind,
        succeeded: report.succeeded(),
        total: report.len(),
    });
    report
}

/// Anything a batch can be made of.
pub(crate) trait BatchItem {
    fn source_path(&self) -> PathBuf;
}

impl BatchItem for PathBuf {
    fn source_path(&self) -> PathBuf {
        self.clone()
    }
}

impl BatchItem for (PathBuf, PathBuf) {
    fn source_path(&self) -> PathBuf {
        self.0.clone()
    }
}

fn log_outcome(kind: OperationKind, source: &Path, status: &OutcomeStatus) {
    match status {
        OutcomeStatus::Succeeded { destination: Some(destination) } => {
            tracing::info!("{:?} {} -> {}", kind, source.display(), destination.display())
        }
        OutcomeStatus::Succeeded { destination: None } => tracing::info!("{:?} {}", kind, source.display()),
        OutcomeStatus::Failed(err) => tracing::warn!("{:?} {} failed: {}", kind, source.display(), err),
        other => tracing::debug!("{:?} {}: {}", kind, source.display(), other.label()),
    }
}
