use crate::errors::CoreError;
use chrono::{DateTime, Utc};
use std::path::PathBuf;

/// Snapshot of a mounted volume. Re-queried on demand, never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Volume {
    pub name: String,
    pub root_directory: PathBuf,
    pub total_space_bytes: u64,
    pub free_space_bytes: u64,
}

/// Space accounting of a filesystem.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpaceStats {
    pub total_bytes: u64,
    pub free_bytes: u64,
}

/// An `info`/`files` directory pair of one trash can.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrashDirectory {
    pub path: PathBuf,
    pub files_dir: PathBuf,
    pub info_dir: PathBuf,
    pub mount_point: Option<PathBuf>,
}

impl TrashDirectory {
    pub fn new(path: PathBuf) -> Self {
        Self {
            files_dir: path.join("files"),
            info_dir: path.join("info"),
            path,
            mount_point: None,
        }
    }

    pub fn with_mount_point(mut self, mount_point: PathBuf) -> Self {
        self.mount_point = Some(mount_point);
        self
    }
}

/// A stored file paired with a readable metadata record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrashEntry {
    /// Name inside `files`, possibly disambiguated.
    pub name: String,
    pub original_path: PathBuf,
    pub trashed_path: PathBuf,
    pub info_path: PathBuf,
    pub trash_dir: PathBuf,
    pub size_bytes: Option<u64>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Half of a trash entry whose other half is missing or unreadable.
/// Never restorable, only purgeable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrphanedEntry {
    pub name: String,
    /// Stored file, when it exists.
    pub trashed_path: Option<PathBuf>,
    /// Metadata record, when it exists.
    pub info_path: Option<PathBuf>,
    pub trash_dir: PathBuf,
    pub reason: String,
}

/// Item produced while scanning a trash directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrashListItem {
    Entry(TrashEntry),
    Orphaned(OrphanedEntry),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The source does not exist (anymore).
    MissingPath(PathBuf),
    /// The source already lives inside a trash directory.
    AlreadyTrashed(PathBuf),
    /// The caller chose to skip a conflicting entry.
    ConflictSkipped(PathBuf),
    /// Source and destination are the same entry.
    SourceIsDestination(PathBuf),
}

/// Result of one path of a batch.
#[derive(Debug)]
pub enum OutcomeStatus {
    Succeeded { destination: Option<PathBuf> },
    Skipped(SkipReason),
    /// A same-named entry exists and the policy asks the caller to decide.
    /// Nothing was written.
    Conflict { existing: PathBuf },
    Failed(CoreError),
    /// The path was in flight when cancellation was observed.
    Cancelled,
    /// Cancellation happened before the path was reached.
    NotStarted,
}

impl OutcomeStatus {
    pub fn from_error(error: CoreError) -> Self {
        match error {
            CoreError::Cancelled => Self::Cancelled,
            other => Self::Failed(other),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Succeeded { .. } => "succeeded",
            Self::Skipped(_) => "skipped",
            Self::Conflict { .. } => "conflict",
            Self::Failed(_) => "failed",
            Self::Cancelled => "cancelled",
            Self::NotStarted => "not started",
        }
    }
}

#[derive(Debug)]
pub struct PathOutcome {
    pub source: PathBuf,
    pub status: OutcomeStatus,
}

impl PathOutcome {
    pub fn new(source: PathBuf, status: OutcomeStatus) -> Self {
        Self { source, status }
    }
}

/// Per-path outcomes of a batch, in request order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<PathOutcome>,
}

impl BatchReport {
    pub fn push(&mut self, source: PathBuf, status: OutcomeStatus) {
        self.outcomes.push(PathOutcome::new(source, status));
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn count(&self, predicate: impl Fn(&OutcomeStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| predicate(&o.status)).count()
    }

    pub fn succeeded(&self) -> usize {
        self.count(OutcomeStatus::is_success)
    }

    pub fn all_succeeded(&self) -> bool {
        self.succeeded() == self.outcomes.len()
    }

    pub fn conflicts(&self) -> impl Iterator<Item = &PathOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, OutcomeStatus::Conflict { .. }))
    }
}

/// Coarse process exit status for front ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatusLike {
    Ok,
    Warning,
    Error,
}

impl ExitStatusLike {
    pub fn as_code(self) -> u8 {
        match self {
            Self::Ok => 0,
            Self::Warning => 2,
            Self::Error => 1,
        }
    }

    /// Any failure is an error, skips and conflicts only warn.
    pub fn from_report(report: &BatchReport) -> Self {
        let failed = report.count(|s| {
            matches!(
                s,
                OutcomeStatus::Failed(_) | OutcomeStatus::Cancelled | OutcomeStatus::NotStarted
            )
        });
        if failed > 0 {
            Self::Error
        } else if report.all_succeeded() {
            Self::Ok
        } else {
            Self::Warning
        }
    }
}
