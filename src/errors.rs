use std::{io, path::PathBuf};

/// Error type shared by the operations engine, the volume resolver and the
/// trash can service.
#[derive(thiserror::Error, Debug)]
pub enum CoreError {
    /// File system I/O failure.
    #[error("I/O error while accessing {0}")]
    Io(PathBuf, #[source] io::Error),

    /// The path is not absolute, has no usable file name, or no ancestor of it
    /// resolves to a mounted volume.
    #[error("invalid path: {0}")]
    InvalidPath(PathBuf),

    /// A new entry name is empty or contains a path separator.
    #[error("invalid name: {0:?}")]
    InvalidName(String),

    /// The target name is already taken.
    #[error("an entry already exists at {0}")]
    NameConflict(PathBuf),

    /// The directory an entry should land in does not exist.
    #[error("destination directory does not exist: {0}")]
    DestinationMissing(PathBuf),

    #[error("permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// Either the pre-copy check failed, with both figures known, or the
    /// OS reported a full volume partway through, with neither.
    #[error("not enough free space on the volume holding {path}{}", shortfall(.required, .available))]
    InsufficientSpace {
        path: PathBuf,
        required: Option<u64>,
        available: Option<u64>,
    },

    /// Cross-volume move copied the source but could not remove it. Both the
    /// source and the copy exist afterwards.
    #[error("{source_path} was copied to {copied_to} but could not be removed")]
    CrossDeviceFallbackPartialFailure {
        source_path: PathBuf,
        copied_to: PathBuf,
        #[source]
        cause: Box<CoreError>,
    },

    /// No numeric user id is available, so no trash directory can be chosen.
    #[error("missing user identifier in environment: {0}")]
    MissingEnvironmentIdentifier(String),

    /// The home directory is not set, so the home trash cannot be located.
    #[error("missing home directory in environment")]
    MissingHomeDirectory,

    /// A trash info record could not be parsed.
    #[error("corrupt trash metadata in {path}: {reason}")]
    CorruptMetadata { path: PathBuf, reason: String },

    /// The caller cancelled the running batch.
    #[error("operation cancelled")]
    Cancelled,

    /// A blocking worker panicked or was aborted.
    #[error("background task failed")]
    BackgroundTask(#[from] tokio::task::JoinError),
}

impl CoreError {
    /// Wraps an I/O error, lifting the conditions callers react to into
    /// their own variants.
    pub fn io(path: impl Into<PathBuf>, error: io::Error) -> Self {
        let path = path.into();
        if error.kind() == io::ErrorKind::PermissionDenied {
            return Self::PermissionDenied(path);
        }
        if error.raw_os_error() == Some(libc::ENOSPC) {
            return Self::InsufficientSpace {
                path,
                required: None,
                available: None,
            };
        }
        Self::Io(path, error)
    }

    pub fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CorruptMetadata {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Errors no path of a batch can recover from. They abort the batch
    /// instead of becoming a per-path outcome.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::MissingEnvironmentIdentifier(_) | Self::MissingHomeDirectory
        )
    }

    /// True when the underlying OS error reports a rename across devices.
    pub fn is_cross_device(&self) -> bool {
        matches!(self, Self::Io(_, err) if err.raw_os_error() == Some(libc::EXDEV))
    }

    /// True when the underlying OS error reports an existing target.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::Io(_, err) if err.kind() == io::ErrorKind::AlreadyExists)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Io(_, err) if err.kind() == io::ErrorKind::NotFound)
    }
}

fn shortfall(required: &Option<u64>, available: &Option<u64>) -> String {
    match (required, available) {
        (Some(required), Some(available)) => format!(" ({required} bytes required, {available} available)"),
        _ => String::new(),
    }
}

/// Shared result alias for the core crate.
pub type Result<T> = std::result::Result<T, CoreError>;
