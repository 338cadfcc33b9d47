//! Scheduler error taxonomy.

use std::path::PathBuf;

use chrono::NaiveDateTime;

use crate::job::JobStatus;

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("Invalid datetime format '{input}', expected YYYY-MM-DD HH:MM:SS: {reason}")]
    InvalidTimeFormat { input: String, reason: String },

    #[error("Cannot schedule messages in the past ({requested})")]
    PastScheduling { requested: NaiveDateTime },

    #[error("Recipient must not be empty")]
    EmptyRecipient,

    #[error("Job store {} is corrupt: {source}", path.display())]
    StorageCorrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to persist job store {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No scheduled message with id '{0}'")]
    JobNotFound(String),

    #[error("Scheduled message '{id}' is already {status}")]
    NotPending { id: String, status: JobStatus },

    #[error("Job store {} is in use by another herald process", path.display())]
    StoreLocked { path: PathBuf },
}
