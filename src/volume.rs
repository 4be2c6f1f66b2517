//! Path to volume resolution on top of the mount table.

use crate::errors::CoreError;
use crate::fs::FileSystem;
use crate::helpers::lexical_absolute;
use crate::models::{SpaceStats, Volume};
use std::ffi::CString;
use std::fs;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Drive enumeration.
pub trait DriveService: Send + Sync {
    /// Root directories of all mounted volumes.
    fn mount_points(&self) -> crate::Result<Vec<PathBuf>>;

    /// Space accounting of the volume mounted at `root`.
    fn space(&self, root: &Path) -> crate::Result<SpaceStats>;
}

/// Mount table of the running system, read from `/proc/self/mounts`.
#[derive(Debug, Default, Clone)]
pub struct MountTable {
    overrides: Option<Vec<PathBuf>>,
}

impl MountTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `volumes` instead of the kernel's mount table.
    pub fn with_volumes(volumes: Vec<PathBuf>) -> Self {
        Self {
            overrides: Some(volumes),
        }
    }
}

impl DriveService for MountTable {
    fn mount_points(&self) -> crate::Result<Vec<PathBuf>> {
        if let Some(volumes) = &self.overrides {
            return Ok(volumes.clone());
        }

        let content = match fs::read_to_string("/proc/self/mounts") {
            Ok(content) => content,
            Err(err) => {
                tracing::debug!("mount table unavailable, assuming a single root: {}", err);
                return Ok(vec![PathBuf::from("/")]);
            }
        };

        let mut points: Vec<PathBuf> = Vec::new();
        for line in content.lines() {
            let mut fields = line.split_whitespace();
            let _device = fields.next();
            let mountpoint = match fields.next() {
                Some(mp) => PathBuf::from(unescape_mountpoint(mp)),
                None => continue,
            };
            if !points.contains(&mountpoint) {
                points.push(mountpoint);
            }
        }
        Ok(points)
    }

    fn space(&self, root: &Path) -> crate::Result<SpaceStats> {
        statvfs(root)
    }
}

fn statvfs(path: &Path) -> crate::Result<SpaceStats> {
    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| CoreError::InvalidPath(path.to_path_buf()))?;
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
    if rc != 0 {
        return Err(CoreError::io(path, std::io::Error::last_os_error()));
    }

    let fragment = stat.f_frsize as u64;
    Ok(SpaceStats {
        total_bytes: (stat.f_blocks as u64).saturating_mul(fragment),
        free_bytes: (stat.f_bavail as u64).saturating_mul(fragment),
    })
}

/// Decodes the octal escapes (`\040` for space, ...) of `/proc/mounts`.
pub fn unescape_mountpoint(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() && is_octal(&bytes[i + 1..i + 4]) {
            let byte = (bytes[i + 1] - b'0') << 6 | (bytes[i + 2] - b'0') << 3 | (bytes[i + 3] - b'0');
            decoded.push(byte);
            i += 4;
        } else {
            decoded.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8_lossy(&decoded).into_owned()
}

fn is_octal(digits: &[u8]) -> bool {
    digits.len() == 3 && digits[0] <= b'3' && digits.iter().all(|d| (b'0'..=b'7').contains(d))
}

/// Fixed drive table, for tests and for callers that already know their
/// volumes.
#[derive(Debug, Clone, Default)]
pub struct StaticDrives {
    pub volumes: Vec<(PathBuf, SpaceStats)>,
}

impl StaticDrives {
    pub fn new(roots: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        let volumes = roots
            .into_iter()
            .map(|root| {
                (
                    root.into(),
                    SpaceStats {
                        total_bytes: u64::MAX,
                        free_bytes: u64::MAX,
                    },
                )
            })
            .collect();
        Self { volumes }
    }

    pub fn with_space(mut self, root: impl Into<PathBuf>, space: SpaceStats) -> Self {
        let root = root.into();
        self.volumes.retain(|(r, _)| *r != root);
        self.volumes.push((root, space));
        self
    }
}

impl DriveService for StaticDrives {
    fn mount_points(&self) -> crate::Result<Vec<PathBuf>> {
        Ok(self.volumes.iter().map(|(root, _)| root.clone()).collect())
    }

    fn space(&self, root: &Path) -> crate::Result<SpaceStats> {
        self.volumes
            .iter()
            .find(|(r, _)| r == root)
            .map(|(_, space)| *space)
            .ok_or_else(|| CoreError::InvalidPath(root.to_path_buf()))
    }
}

/// Maps paths to the volumes holding them.
#[derive(Clone)]
pub struct VolumeResolver {
    drives: Arc<dyn DriveService>,
    fs: Arc<dyn FileSystem>,
}

impl VolumeResolver {
    pub fn new(drives: Arc<dyn DriveService>, fs: Arc<dyn FileSystem>) -> Self {
        Self { drives, fs }
    }

    /// Root directory of the volume holding `path`.
    ///
    /// Paths that do not exist yet are resolved through their nearest
    /// existing ancestor; the deepest mount point above that ancestor wins.
    pub fn root_for(&self, path: &Path) -> crate::Result<PathBuf> {
        let invalid = || CoreError::InvalidPath(path.to_path_buf());
        let normalized = lexical_absolute(path).ok_or_else(invalid)?;

        let existing = normalized
            .ancestors()
            .find(|ancestor| self.fs.exists(ancestor))
            .ok_or_else(invalid)?;

        let mount_points = self.drives.mount_points()?;
        existing
            .ancestors()
            .find(|ancestor| mount_points.iter().any(|mp| mp.as_path() == *ancestor))
            .map(Path::to_path_buf)
            .ok_or_else(invalid)
    }

    /// Volume holding `path`, with fresh space statistics.
    pub fn volume_for(&self, path: &Path) -> crate::Result<Volume> {
        let root = self.root_for(path)?;
        self.describe(root)
    }

    pub fn are_same_volume(&self, a: &Path, b: &Path) -> crate::Result<bool> {
        Ok(self.root_for(a)? == self.root_for(b)?)
    }

    /// All mounted volumes. Volumes whose space cannot be queried are
    /// skipped.
    pub fn list_volumes(&self) -> crate::Result<Vec<Volume>> {
        let mut volumes = Vec::new();
        for root in self.drives.mount_points()? {
            match self.describe(root.clone()) {
                Ok(volume) => volumes.push(volume),
                Err(err) => tracing::debug!("skipping volume {}: {}", root.display(), err),
            }
        }
        Ok(volumes)
    }

    /// Fresh free space of the volume mounted at `root`.
    pub fn free_space(&self, root: &Path) -> crate::Result<u64> {
        Ok(self.drives.space(root)?.free_bytes)
    }

    fn describe(&self, root: PathBuf) -> crate::Result<Volume> {
        let space = self.drives.space(&root)?;
        let name = root
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| root.display().to_string());
        Ok(Volume {
            name,
            root_directory: root,
            total_space_bytes: space.total_bytes,
            free_space_bytes: space.free_bytes,
        })
    }
}
