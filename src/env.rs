//! Process environment, user identity and wall clock, behind traits so the
//! trash can be exercised against synthetic environments.

use crate::errors::CoreError;
use chrono::{DateTime, FixedOffset, Local, Offset, TimeZone, Utc};
use std::collections::HashMap;
use std::path::PathBuf;

/// Read access to named environment variables.
pub trait Environment: Send + Sync {
    fn var(&self, name: &str) -> Option<String>;

    /// Numeric id of the current user. Read from `UID`.
    fn user_id(&self) -> Option<u32> {
        self.var("UID").and_then(|uid| uid.trim().parse().ok())
    }
}

/// The environment of the running process.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnvironment;

impl Environment for ProcessEnvironment {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|value| !value.is_empty())
    }

    /// Shells rarely export `UID`, so the process falls back to asking the
    /// kernel for the effective uid.
    fn user_id(&self) -> Option<u32> {
        if let Some(uid) = self.var("UID").and_then(|uid| uid.trim().parse().ok()) {
            return Some(uid);
        }
        let uid = unsafe { libc::geteuid() };
        tracing::debug!("UID is not exported, using the effective uid {}", uid);
        Some(uid)
    }
}

impl Environment for HashMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).filter(|value| !value.is_empty()).cloned()
    }
}

/// Snapshot of the per-user state the trash needs, read at call time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentContext {
    pub home: PathBuf,
    pub data_home: PathBuf,
    pub uid: u32,
}

impl EnvironmentContext {
    pub fn from_environment(environment: &dyn Environment) -> crate::Result<Self> {
        let uid = environment
            .user_id()
            .ok_or_else(|| CoreError::MissingEnvironmentIdentifier("UID".to_string()))?;
        let home = environment
            .var("HOME")
            .map(PathBuf::from)
            .ok_or(CoreError::MissingHomeDirectory)?;
        let data_home = environment
            .var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| home.join(".local").join("share"));

        Ok(Self { home, data_home, uid })
    }

    /// Root of the home trash, `$XDG_DATA_HOME/Trash`.
    pub fn home_trash(&self) -> PathBuf {
        self.data_home.join("Trash")
    }
}

/// Source of the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Offset of local time at `at`, used to render deletion dates.
    fn local_offset(&self, at: DateTime<Utc>) -> FixedOffset;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn local_offset(&self, at: DateTime<Utc>) -> FixedOffset {
        Local.offset_from_utc_datetime(&at.naive_utc()).fix()
    }
}

/// A clock frozen at one instant and offset.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    pub now: DateTime<Utc>,
    pub offset: FixedOffset,
}

impl FixedClock {
    pub fn utc(now: DateTime<Utc>) -> Self {
        Self {
            now,
            offset: Utc.fix(),
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now
    }

    fn local_offset(&self, _at: DateTime<Utc>) -> FixedOffset {
        self.offset
    }
}
