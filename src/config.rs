use crate::env::Environment;
use std::path::PathBuf;

/// Default size of one read/write step when copying file contents.
pub const DEFAULT_COPY_CHUNK_SIZE: usize = 1024 * 1024;

/// Tunables of the operations engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Bytes copied between two cancellation checks.
    pub copy_chunk_size: usize,
    /// Compare the size of a copy against the free space of the target
    /// volume before writing anything.
    pub check_free_space: bool,
    /// Replaces the mount table when set (`TRASH_VOLUMES`).
    pub trash_volumes: Option<Vec<PathBuf>>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            copy_chunk_size: DEFAULT_COPY_CHUNK_SIZE,
            check_free_space: true,
            trash_volumes: None,
        }
    }
}

impl EngineConfig {
    pub fn from_environment(environment: &dyn Environment) -> Self {
        let mut config = Self::default();

        if let Some(volumes) = environment.var("TRASH_VOLUMES") {
            let volumes: Vec<PathBuf> = volumes
                .split(':')
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .collect();
            if !volumes.is_empty() {
                config.trash_volumes = Some(volumes);
            }
        }

        match environment
            .var("FILEOPS_COPY_CHUNK_SIZE")
            .map(|v| v.trim().parse::<usize>())
        {
            Some(Ok(size)) if size > 0 => config.copy_chunk_size = size,
            Some(_) => tracing::warn!("ignoring invalid FILEOPS_COPY_CHUNK_SIZE"),
            None => {}
        }

        config
    }

    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.copy_chunk_size = size.max(1);
        self
    }
}
