//! File operations core of a file manager: copy, move, rename, permanent
//! delete and a freedesktop.org compatible trash can.
//!
//! All collaborators (filesystem, environment, clock, drive enumeration)
//! are injected as trait objects so front ends and tests can swap them.

pub mod config;
pub mod env;
pub mod errors;
pub mod fs;
pub mod helpers;
pub mod models;
pub mod ops;
pub mod trash;
pub mod volume;

pub use config::EngineConfig;
pub use env::{Clock, Environment, EnvironmentContext, FixedClock, ProcessEnvironment, SystemClock};
pub use errors::{CoreError, Result};
pub use fs::{FileSystem, RealFileSystem};
pub use helpers::{
    build_unique_basename,
    parse_trash_datetime,
    print_size,
    TRASHINFO_EXTENSION,
    TRASHINFO_TIME_FORMAT,
};
pub use models::{
    BatchReport,
    ExitStatusLike,
    OrphanedEntry,
    OutcomeStatus,
    PathOutcome,
    SkipReason,
    SpaceStats,
    TrashDirectory,
    TrashEntry,
    TrashListItem,
    Volume,
};
pub use ops::conflict::{ConflictPolicy, ConflictResolution};
pub use ops::progress::{OperationChannel, OperationKind, ProgressEvent};
pub use ops::{OperationRequest, OperationsEngine};
pub use trash::{TrashCan, TrashInfoBuilder, TrashListing};
pub use volume::{DriveService, MountTable, StaticDrives, VolumeResolver};

/// Re-export the stable API surface for front ends.
pub mod prelude {
    pub use crate::{
        config::EngineConfig,
        env::*,
        errors::{CoreError, Result},
        fs::{FileSystem, RealFileSystem},
        helpers::*,
        models::*,
        ops::{conflict::*, progress::*, OperationRequest, OperationsEngine},
        trash::{TrashCan, TrashDirectoryResolver, TrashInfo, TrashInfoBuilder, TrashListing},
        volume::*,
    };
}
