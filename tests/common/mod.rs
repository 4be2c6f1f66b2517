#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use fileops_core::prelude::*;
use std::collections::HashMap;
use std::fs::{Metadata, Permissions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

pub const UID: u32 = 42;

pub fn deletion_instant() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 17, 8, 30, 5).unwrap()
}

/// A temporary tree with two volumes: `root` holding the home directory
/// and `foreign` mounted below it.
pub struct Sandbox {
    pub tmp: TempDir,
    pub root: PathBuf,
    pub home: PathBuf,
    pub foreign: PathBuf,
}

impl Sandbox {
    pub fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().to_path_buf();
        let home = root.join("home/u");
        let foreign = root.join("mnt/data");
        std::fs::create_dir_all(&home).unwrap();
        std::fs::create_dir_all(&foreign).unwrap();
        Self {
            tmp,
            root,
            home,
            foreign,
        }
    }

    pub fn write(&self, path: &Path, contents: &[u8]) -> PathBuf {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, contents).unwrap();
        path.to_path_buf()
    }

    pub fn environment(&self) -> HashMap<String, String> {
        HashMap::from([
            ("UID".to_string(), UID.to_string()),
            ("HOME".to_string(), self.home.display().to_string()),
        ])
    }

    pub fn drives(&self) -> StaticDrives {
        StaticDrives::new([PathBuf::from("/"), self.root.clone(), self.foreign.clone()])
    }

    pub fn home_trash(&self) -> PathBuf {
        self.home.join(".local/share/Trash")
    }

    pub fn engine(&self) -> OperationsEngine {
        self.engine_with(Arc::new(RealFileSystem), self.drives())
    }

    pub fn engine_with(&self, fs: Arc<dyn FileSystem>, drives: StaticDrives) -> OperationsEngine {
        let volumes = VolumeResolver::new(Arc::new(drives), fs.clone());
        OperationsEngine::new(fs, volumes, EngineConfig::default().with_chunk_size(4))
    }

    pub fn trash(&self) -> TrashCan {
        self.trash_with(self.engine(), self.environment())
    }

    pub fn trash_with(&self, engine: OperationsEngine, environment: HashMap<String, String>) -> TrashCan {
        TrashCan::new(
            engine,
            Arc::new(environment),
            Arc::new(FixedClock::utc(deletion_instant())),
        )
    }
}

/// Real filesystem with hooks for failure injection.
#[derive(Default)]
pub struct HookedFs {
    inner: RealFileSystem,
    /// Removal of anything below this path fails with permission denied.
    pub protected: Option<PathBuf>,
    /// Cancels the token when the n-th (0 based) file is opened for reading.
    pub cancel_on_open: Option<(usize, CancellationToken)>,
    /// Cancels the token once the n-th (0 based) copied entry is finalized.
    pub cancel_on_finish: Option<(usize, CancellationToken)>,
    /// Opening anything below this path for reading fails with permission denied.
    pub unreadable: Option<PathBuf>,
    /// Every rename fails as if crossing devices.
    pub cross_device_renames: bool,
    opens: AtomicUsize,
    finishes: AtomicUsize,
    pub opened: Mutex<Vec<PathBuf>>,
}

impl HookedFs {
    pub fn protecting(path: impl Into<PathBuf>) -> Self {
        Self {
            protected: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn cancelling_at(open: usize, token: CancellationToken) -> Self {
        Self {
            cancel_on_open: Some((open, token)),
            ..Self::default()
        }
    }

    pub fn cancelling_after(finished: usize, token: CancellationToken) -> Self {
        Self {
            cancel_on_finish: Some((finished, token)),
            ..Self::default()
        }
    }

    pub fn unreadable(path: impl Into<PathBuf>) -> Self {
        Self {
            unreadable: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn with_cross_device_renames(mut self) -> Self {
        self.cross_device_renames = true;
        self
    }

    fn guard_removal(&self, path: &Path) -> fileops_core::Result<()> {
        match &self.protected {
            Some(protected) if path.starts_with(protected) => Err(CoreError::io(
                path,
                io::Error::from(io::ErrorKind::PermissionDenied),
            )),
            _ => Ok(()),
        }
    }
}

impl FileSystem for HookedFs {
    fn metadata(&self, path: &Path) -> fileops_core::Result<Metadata> {
        self.inner.metadata(path)
    }

    fn symlink_metadata(&self, path: &Path) -> fileops_core::Result<Metadata> {
        self.inner.symlink_metadata(path)
    }

    fn create_dir_all_with_mode(&self, path: &Path, mode: u32) -> fileops_core::Result<()> {
        self.inner.create_dir_all_with_mode(path, mode)
    }

    fn create_dir(&self, path: &Path) -> fileops_core::Result<()> {
        self.inner.create_dir(path)
    }

    fn write_new(&self, path: &Path, content: &str) -> fileops_core::Result<()> {
        self.inner.write_new(path, content)
    }

    fn read_to_string(&self, path: &Path) -> fileops_core::Result<String> {
        self.inner.read_to_string(path)
    }

    fn open_reader(&self, path: &Path) -> fileops_core::Result<Box<dyn Read + Send>> {
        let n = self.opens.fetch_add(1, Ordering::SeqCst);
        self.opened.lock().unwrap().push(path.to_path_buf());
        if let Some((at, token)) = &self.cancel_on_open {
            if n == *at {
                token.cancel();
            }
        }
        if matches!(&self.unreadable, Some(unreadable) if path.starts_with(unreadable)) {
            return Err(CoreError::io(path, io::Error::from(io::ErrorKind::PermissionDenied)));
        }
        self.inner.open_reader(path)
    }

    fn create_writer(&self, path: &Path) -> fileops_core::Result<Box<dyn Write + Send>> {
        self.inner.create_writer(path)
    }

    fn remove_file(&self, path: &Path) -> fileops_core::Result<()> {
        self.guard_removal(path)?;
        self.inner.remove_file(path)
    }

    fn remove_dir_all(&self, path: &Path) -> fileops_core::Result<()> {
        self.guard_removal(path)?;
        self.inner.remove_dir_all(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> fileops_core::Result<()> {
        if self.cross_device_renames {
            return Err(CoreError::io(from, io::Error::from_raw_os_error(libc::EXDEV)));
        }
        self.inner.rename(from, to)
    }

    fn list_dir(&self, path: &Path) -> fileops_core::Result<Vec<PathBuf>> {
        self.inner.list_dir(path)
    }

    fn read_link(&self, path: &Path) -> fileops_core::Result<PathBuf> {
        self.inner.read_link(path)
    }

    fn symlink(&self, target: &Path, link: &Path) -> fileops_core::Result<()> {
        self.inner.symlink(target, link)
    }

    fn set_permissions(&self, path: &Path, permissions: Permissions) -> fileops_core::Result<()> {
        let result = self.inner.set_permissions(path, permissions);
        let n = self.finishes.fetch_add(1, Ordering::SeqCst);
        if let Some((at, token)) = &self.cancel_on_finish {
            if n == *at {
                token.cancel();
            }
        }
        result
    }
}
