use crate::errors::CoreError;
use std::fs::{self, Metadata, OpenOptions, Permissions};
use std::io::{self, Read, Write};
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use std::path::{Path, PathBuf};

/// Mask for the sticky bit, see inode(7).
pub const STICKY_BIT: u32 = 0o1000;

/// Filesystem abstraction boundary for the engine and the trash can.
///
/// Keeping this trait narrow makes it easy to write deterministic tests and
/// to inject failures (a source that cannot be removed, a copy that gets
/// cancelled halfway) without touching a real disk in odd ways.
pub trait FileSystem: Send + Sync {
    /// Returns true when path exists. Broken symlinks count as existing.
    fn exists(&self, path: &Path) -> bool {
        self.symlink_metadata(path).is_ok()
    }

    /// Returns true when path is a directory (following symlinks).
    fn is_dir(&self, path: &Path) -> bool {
        self.metadata(path).map(|m| m.is_dir()).unwrap_or(false)
    }

    /// Returns true when path itself is a symlink.
    fn is_symlink(&self, path: &Path) -> bool {
        self.symlink_metadata(path)
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false)
    }

    /// Returns true when path is a real directory with the sticky bit set.
    fn is_sticky_dir(&self, path: &Path) -> bool {
        self.symlink_metadata(path)
            .map(|m| m.is_dir() && m.permissions().mode() & STICKY_BIT == STICKY_BIT)
            .unwrap_or(false)
    }

    /// Reads file metadata.
    fn metadata(&self, path: &Path) -> crate::Result<Metadata>;

    /// Reads symlink metadata.
    fn symlink_metadata(&self, path: &Path) -> crate::Result<Metadata>;

    /// Creates a directory and missing parents, each with the given mode.
    fn create_dir_all_with_mode(&self, path: &Path, mode: u32) -> crate::Result<()>;

    /// Creates a single directory. Fails when it already exists.
    fn create_dir(&self, path: &Path) -> crate::Result<()>;

    /// Creates a new file and writes UTF-8 text to it. Fails when the file
    /// already exists.
    fn write_new(&self, path: &Path, content: &str) -> crate::Result<()>;

    /// Reads UTF-8 text.
    fn read_to_string(&self, path: &Path) -> crate::Result<String>;

    /// Opens a file for streaming reads.
    fn open_reader(&self, path: &Path) -> crate::Result<Box<dyn Read + Send>>;

    /// Creates (or truncates) a file for streaming writes.
    fn create_writer(&self, path: &Path) -> crate::Result<Box<dyn Write + Send>>;

    /// Removes a file or a symlink.
    fn remove_file(&self, path: &Path) -> crate::Result<()>;

    /// Removes a directory and everything below it.
    fn remove_dir_all(&self, path: &Path) -> crate::Result<()>;

    /// Renames/moves a path.
    fn rename(&self, from: &Path, to: &Path) -> crate::Result<()>;

    /// Lists directory children as concrete paths.
    fn list_dir(&self, path: &Path) -> crate::Result<Vec<PathBuf>>;

    fn read_link(&self, path: &Path) -> crate::Result<PathBuf>;

    fn symlink(&self, target: &Path, link: &Path) -> crate::Result<()>;

    fn set_permissions(&self, path: &Path, permissions: Permissions) -> crate::Result<()>;
}

/// Default filesystem implementation backed by `std::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn metadata(&self, path: &Path) -> crate::Result<Metadata> {
        fs::metadata(path).map_err(|err| CoreError::io(path, err))
    }

    fn symlink_metadata(&self, path: &Path) -> crate::Result<Metadata> {
        fs::symlink_metadata(path).map_err(|err| CoreError::io(path, err))
    }

    fn create_dir_all_with_mode(&self, path: &Path, mode: u32) -> crate::Result<()> {
        fs::DirBuilder::new()
            .recursive(true)
            .mode(mode)
            .create(path)
            .map_err(|err| CoreError::io(path, err))
    }

    fn create_dir(&self, path: &Path) -> crate::Result<()> {
        fs::create_dir(path).map_err(|err| CoreError::io(path, err))
    }

    fn write_new(&self, path: &Path, content: &str) -> crate::Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|err| CoreError::io(path, err))?;
        file.write_all(content.as_bytes())
            .and_then(|_| file.sync_all())
            .map_err(|err| CoreError::io(path, err))
    }

    fn read_to_string(&self, path: &Path) -> crate::Result<String> {
        fs::read_to_string(path).map_err(|err| CoreError::io(path, err))
    }

    fn open_reader(&self, path: &Path) -> crate::Result<Box<dyn Read + Send>> {
        let file = fs::File::open(path).map_err(|err| CoreError::io(path, err))?;
        Ok(Box::new(file))
    }

    fn create_writer(&self, path: &Path) -> crate::Result<Box<dyn Write + Send>> {
        let file = fs::File::create(path).map_err(|err| CoreError::io(path, err))?;
        Ok(Box::new(file))
    }

    fn remove_file(&self, path: &Path) -> crate::Result<()> {
        fs::remove_file(path).map_err(|err| CoreError::io(path, err))
    }

    fn remove_dir_all(&self, path: &Path) -> crate::Result<()> {
        fs::remove_dir_all(path).map_err(|err| CoreError::io(path, err))
    }

    fn rename(&self, from: &Path, to: &Path) -> crate::Result<()> {
        fs::rename(from, to).map_err(|err| CoreError::io(from, err))
    }

    fn list_dir(&self, path: &Path) -> crate::Result<Vec<PathBuf>> {
        fs::read_dir(path)
            .map_err(|err| CoreError::io(path, err))?
            .map(|entry| entry.map(|v| v.path()))
            .collect::<Result<Vec<PathBuf>, io::Error>>()
            .map_err(|err| CoreError::io(path, err))
    }

    fn read_link(&self, path: &Path) -> crate::Result<PathBuf> {
        fs::read_link(path).map_err(|err| CoreError::io(path, err))
    }

    fn symlink(&self, target: &Path, link: &Path) -> crate::Result<()> {
        std::os::unix::fs::symlink(target, link).map_err(|err| CoreError::io(link, err))
    }

    fn set_permissions(&self, path: &Path, permissions: Permissions) -> crate::Result<()> {
        fs::set_permissions(path, permissions).map_err(|err| CoreError::io(path, err))
    }
}

/// Removes whatever sits at `path`: a file, a symlink or a whole directory.
pub fn remove_entry(fs: &dyn FileSystem, path: &Path) -> crate::Result<()> {
    let metadata = fs.symlink_metadata(path)?;
    if metadata.is_dir() {
        fs.remove_dir_all(path)
    } else {
        fs.remove_file(path)
    }
}

/// Total size in bytes of a file or of everything below a directory.
/// Symlinks count as zero.
pub fn entry_size(fs: &dyn FileSystem, path: &Path) -> crate::Result<u64> {
    let metadata = fs.symlink_metadata(path)?;
    if metadata.file_type().is_symlink() {
        return Ok(0);
    }
    if !metadata.is_dir() {
        return Ok(metadata.len());
    }

    let mut total = 0;
    for child in fs.list_dir(path)? {
        total += entry_size(fs, &child)?;
    }
    Ok(total)
}
