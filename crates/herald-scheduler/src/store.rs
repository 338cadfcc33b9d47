//! File-based job store.
//! The whole JobSet is one pretty-printed JSON document, replaced atomically
//! on every save (write temp file, fsync, rename).

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::SchedulerError;
use crate::job::JobSet;

const FILE_NAME: &str = "scheduled_messages.json";

/// Durable storage for the JobSet.
#[derive(Debug, Clone)]
pub struct JobStore {
    path: PathBuf,
}

impl JobStore {
    /// Store `scheduled_messages.json` inside `dir`.
    pub fn new(dir: &Path) -> Self {
        Self {
            path: dir.join(FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Take the exclusive advisory lock on this store. Only one process may
    /// hold it; the lock is released when the returned guard is dropped.
    pub fn lock(&self) -> Result<StoreLock, SchedulerError> {
        let lock_path = self.sibling_path(".lock");
        if let Some(parent) = lock_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|e| self.io_error(e))?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(StoreLock { _file: file }),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                Err(SchedulerError::StoreLocked {
                    path: self.path.clone(),
                })
            }
            Err(e) => Err(self.io_error(e)),
        }
    }

    /// Load the JobSet. A missing file is initialized to an empty set;
    /// an unparseable one is an error, never silently replaced.
    pub fn load(&self) -> Result<JobSet, SchedulerError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let empty = JobSet::new();
                self.save(&empty)?;
                tracing::info!("📂 Initialized empty job store at {}", self.path.display());
                return Ok(empty);
            }
            Err(e) => return Err(self.io_error(e)),
        };

        serde_json::from_slice(&bytes).map_err(|source| SchedulerError::StorageCorrupt {
            path: self.path.clone(),
            source,
        })
    }

    /// Replace the stored JobSet. Readers see either the old or the new
    /// document, never a partial one.
    pub fn save(&self, jobs: &JobSet) -> Result<(), SchedulerError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }

        let json = serde_json::to_vec_pretty(jobs)
            .map_err(|e| self.io_error(std::io::Error::other(e)))?;

        let tmp = self.tmp_path();
        let written = File::create(&tmp).and_then(|mut file| {
            file.write_all(&json)?;
            file.sync_all()
        });
        if let Err(e) = written.and_then(|()| std::fs::rename(&tmp, &self.path)) {
            let _ = std::fs::remove_file(&tmp);
            return Err(self.io_error(e));
        }

        tracing::debug!("💾 Saved {} jobs to {}", jobs.len(), self.path.display());
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        self.sibling_path(".tmp")
    }

    fn sibling_path(&self, suffix: &str) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| FILE_NAME.into());
        name.push(suffix);
        self.path.with_file_name(name)
    }

    fn io_error(&self, source: std::io::Error) -> SchedulerError {
        SchedulerError::Persistence {
            path: self.path.clone(),
            source,
        }
    }
}

/// Held for as long as a process owns the store. Dropping it closes the
/// lock file, which releases the lock.
#[derive(Debug)]
pub struct StoreLock {
    _file: File,
}
