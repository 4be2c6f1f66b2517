//! Choice of the trash directory for a volume.
//!
//! The chain is fixed by the freedesktop.org Trash specification:
//! 1. the home trash, `$XDG_DATA_HOME/Trash`, for the volume holding it;
//! 2. `$topdir/.Trash/$uid` when `$topdir/.Trash` is a real, sticky directory;
//! 3. `$topdir/.Trash-$uid`, created on demand.

use crate::env::EnvironmentContext;
use crate::fs::FileSystem;
use crate::models::TrashDirectory;
use crate::volume::VolumeResolver;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Mode of every directory the trash creates.
pub const TRASH_DIR_MODE: u32 = 0o700;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SharedTrashValidity {
    Valid,
    Missing,
    Symlink,
    NotSticky,
}

#[derive(Clone)]
pub struct TrashDirectoryResolver {
    fs: Arc<dyn FileSystem>,
    volumes: VolumeResolver,
}

impl TrashDirectoryResolver {
    pub fn new(fs: Arc<dyn FileSystem>, volumes: VolumeResolver) -> Self {
        Self { fs, volumes }
    }

    /// True when `volume_root` holds the home trash.
    pub fn is_home_volume(&self, volume_root: &Path, ctx: &EnvironmentContext) -> crate::Result<bool> {
        Ok(self.volumes.root_for(&ctx.data_home)? == volume_root)
    }

    /// Evaluates the chain for `volume_root` without creating anything.
    pub fn locate(&self, volume_root: &Path, ctx: &EnvironmentContext) -> crate::Result<TrashDirectory> {
        if self.is_home_volume(volume_root, ctx)? {
            tracing::debug!("{} holds the home trash", volume_root.display());
            return Ok(TrashDirectory::new(ctx.home_trash()).with_mount_point(volume_root.to_path_buf()));
        }

        let shared = shared_trash_root(volume_root);
        match self.shared_trash_validity(&shared) {
            SharedTrashValidity::Valid => {
                let path = shared.join(ctx.uid.to_string());
                tracing::debug!("using shared trash {}", path.display());
                return Ok(TrashDirectory::new(path).with_mount_point(volume_root.to_path_buf()));
            }
            SharedTrashValidity::Missing => {}
            invalid => tracing::warn!(
                "ignoring shared trash {}: {:?}",
                shared.display(),
                invalid
            ),
        }

        let path = user_trash_root(volume_root, ctx.uid);
        tracing::debug!("using per-user trash {}", path.display());
        Ok(TrashDirectory::new(path).with_mount_point(volume_root.to_path_buf()))
    }

    /// Evaluates the chain and makes sure both subdirectories exist.
    pub fn resolve(&self, volume_root: &Path, ctx: &EnvironmentContext) -> crate::Result<TrashDirectory> {
        let dir = self.locate(volume_root, ctx)?;
        self.ensure(&dir)?;
        Ok(dir)
    }

    /// Creates `info` and `files` (and missing parents) owner-only.
    pub fn ensure(&self, dir: &TrashDirectory) -> crate::Result<()> {
        for sub in [&dir.info_dir, &dir.files_dir] {
            if !self.fs.is_dir(sub) {
                tracing::info!("creating trash directory {}", sub.display());
                self.fs.create_dir_all_with_mode(sub, TRASH_DIR_MODE)?;
            }
        }
        Ok(())
    }

    /// Every existing trash directory of the current user on `volume_root`,
    /// for listing and emptying. Nothing is created.
    pub fn existing(&self, volume_root: &Path, ctx: &EnvironmentContext) -> crate::Result<Vec<TrashDirectory>> {
        let mut found = Vec::new();
        let mount = volume_root.to_path_buf();

        if self.is_home_volume(volume_root, ctx)? {
            found.push(TrashDirectory::new(ctx.home_trash()).with_mount_point(mount.clone()));
        }

        let shared = shared_trash_root(volume_root);
        if self.shared_trash_validity(&shared) == SharedTrashValidity::Valid {
            found.push(TrashDirectory::new(shared.join(ctx.uid.to_string())).with_mount_point(mount.clone()));
        }

        found.push(TrashDirectory::new(user_trash_root(volume_root, ctx.uid)).with_mount_point(mount));

        Ok(found
            .into_iter()
            .filter(|dir| self.fs.is_dir(&dir.path))
            .collect())
    }

    /// True when `path` is one of the user's trash directories on
    /// `volume_root` or lies below one.
    pub fn is_inside_trash(&self, path: &Path, volume_root: &Path, ctx: &EnvironmentContext) -> bool {
        [
            ctx.home_trash(),
            shared_trash_root(volume_root).join(ctx.uid.to_string()),
            user_trash_root(volume_root, ctx.uid),
        ]
        .iter()
        .any(|trash| path.starts_with(trash))
    }

    pub fn shared_trash_validity(&self, shared: &Path) -> SharedTrashValidity {
        if !self.fs.exists(shared) {
            SharedTrashValidity::Missing
        } else if self.fs.is_symlink(shared) {
            SharedTrashValidity::Symlink
        } else if !self.fs.is_sticky_dir(shared) {
            SharedTrashValidity::NotSticky
        } else {
            SharedTrashValidity::Valid
        }
    }
}

fn shared_trash_root(volume_root: &Path) -> PathBuf {
    volume_root.join(".Trash")
}

fn user_trash_root(volume_root: &Path, uid: u32) -> PathBuf {
    volume_root.join(format!(".Trash-{uid}"))
}
