//! The trash can: reversible deletion following the freedesktop.org Trash
//! specification.

pub mod dirs;
pub mod info;
pub mod listing;
pub mod service;

pub use dirs::{SharedTrashValidity, TrashDirectoryResolver, TRASH_DIR_MODE};
pub use info::{TrashInfo, TrashInfoBuilder, TRASH_INFO_HEADER};
pub use listing::{TrashListing, TrashListingIter};
pub use service::TrashCan;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// One mutex per trash directory. Name allocation, record write and move
/// happen under it so concurrent batches never pick the same name.
#[derive(Debug, Default)]
pub(crate) struct DirectoryLocks {
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl DirectoryLocks {
    pub(crate) fn for_dir(&self, dir: &Path) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(dir.to_path_buf()).or_default().clone()
    }
}
