//! Job definitions: the data model for scheduled messages.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::SchedulerError;

/// Fixed textual format of a target time. No timezone, local time.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse a caller-supplied target time.
/// The whole string must match; chrono alone would skip leading whitespace.
pub fn parse_target_time(text: &str) -> Result<NaiveDateTime, SchedulerError> {
    if text.trim() != text {
        return Err(SchedulerError::InvalidTimeFormat {
            input: text.to_string(),
            reason: "surrounding whitespace".into(),
        });
    }
    NaiveDateTime::parse_from_str(text, TIME_FORMAT).map_err(|e| {
        SchedulerError::InvalidTimeFormat {
            input: text.to_string(),
            reason: e.to_string(),
        }
    })
}

/// Serde adapter for `YYYY-MM-DD HH:MM:SS` timestamps.
pub mod time_format {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::TIME_FORMAT;

    pub fn serialize<S: Serializer>(time: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&time.format(TIME_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveDateTime::parse_from_str(&raw, TIME_FORMAT).map_err(serde::de::Error::custom)
    }
}

/// Delivery status. `Sent` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Sent,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Sent => write!(f, "sent"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "sent" => Ok(Self::Sent),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown status '{other}'")),
        }
    }
}

/// A scheduled message. The recipient is the key it is stored under.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Job {
    /// Stable identifier. Empty only for records written before ids existed.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// Delivered verbatim.
    #[serde(rename = "message")]
    pub payload: String,
    #[serde(rename = "scheduled_time", with = "time_format")]
    pub target_time: NaiveDateTime,
    pub status: JobStatus,
    /// Set only when `status == Failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Job {
    /// Create a new pending job with a fresh id.
    pub fn pending(payload: &str, target_time: NaiveDateTime) -> Self {
        Self {
            id: new_job_id(),
            payload: payload.to_string(),
            target_time,
            status: JobStatus::Pending,
            error: None,
        }
    }

    pub fn is_due(&self, now: NaiveDateTime) -> bool {
        self.status == JobStatus::Pending && self.target_time <= now
    }

    /// `pending → sent`. Returns false (and changes nothing) otherwise.
    pub fn mark_sent(&mut self) -> bool {
        if self.status != JobStatus::Pending {
            return false;
        }
        self.status = JobStatus::Sent;
        self.error = None;
        true
    }

    /// `pending → failed`, recording the reason verbatim.
    pub fn mark_failed(&mut self, reason: impl Into<String>) -> bool {
        if self.status != JobStatus::Pending {
            return false;
        }
        self.status = JobStatus::Failed;
        self.error = Some(reason.into());
        true
    }
}

fn new_job_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// A due job captured at the start of a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueJob {
    pub id: String,
    pub recipient: String,
    pub payload: String,
}

/// Read-only view of a job together with its recipient.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct JobView {
    pub id: String,
    pub recipient: String,
    #[serde(rename = "message")]
    pub payload: String,
    #[serde(rename = "scheduled_time", with = "time_format")]
    pub target_time: NaiveDateTime,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobView {
    fn new(recipient: &str, job: &Job) -> Self {
        Self {
            id: job.id.clone(),
            recipient: recipient.to_string(),
            payload: job.payload.clone(),
            target_time: job.target_time,
            status: job.status,
            error: job.error.clone(),
        }
    }
}

/// All jobs, grouped by recipient. Order within a recipient is insertion
/// order and is the order jobs are scanned in.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct JobSet {
    by_recipient: BTreeMap<String, Vec<Job>>,
}

impl JobSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of jobs across all recipients.
    pub fn len(&self) -> usize {
        self.by_recipient.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn count_with_status(&self, status: JobStatus) -> usize {
        self.iter().filter(|(_, job)| job.status == status).count()
    }

    pub fn recipients(&self) -> impl Iterator<Item = &str> {
        self.by_recipient.keys().map(String::as_str)
    }

    pub fn jobs_for(&self, recipient: &str) -> &[Job] {
        self.by_recipient
            .get(recipient)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Append a job to the end of the recipient's sequence.
    pub fn push(&mut self, recipient: &str, job: Job) {
        self.by_recipient
            .entry(recipient.to_string())
            .or_default()
            .push(job);
    }

    /// Every job in scan order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Job)> {
        self.by_recipient
            .iter()
            .flat_map(|(recipient, jobs)| jobs.iter().map(move |job| (recipient.as_str(), job)))
    }

    pub fn find(&self, id: &str) -> Option<(&str, &Job)> {
        self.iter().find(|(_, job)| job.id == id)
    }

    pub fn find_mut(&mut self, id: &str) -> Option<&mut Job> {
        self.by_recipient
            .values_mut()
            .flat_map(|jobs| jobs.iter_mut())
            .find(|job| job.id == id)
    }

    pub fn view(&self, id: &str) -> Option<JobView> {
        self.find(id).map(|(recipient, job)| JobView::new(recipient, job))
    }

    /// Views of all jobs, or of one recipient's jobs, in scan order.
    pub fn views(&self, recipient: Option<&str>) -> Vec<JobView> {
        match recipient {
            Some(r) => self.jobs_for(r).iter().map(|job| JobView::new(r, job)).collect(),
            None => self.iter().map(|(r, job)| JobView::new(r, job)).collect(),
        }
    }

    /// Remove a job by id. Recipients left without jobs are dropped.
    pub fn remove(&mut self, id: &str) -> Option<(String, Job)> {
        let (recipient, index) = self.by_recipient.iter().find_map(|(recipient, jobs)| {
            jobs.iter()
                .position(|job| job.id == id)
                .map(|index| (recipient.clone(), index))
        })?;
        let jobs = self.by_recipient.get_mut(&recipient)?;
        let job = jobs.remove(index);
        if jobs.is_empty() {
            self.by_recipient.remove(&recipient);
        }
        Some((recipient, job))
    }

    /// Pending jobs whose target time has been reached, in scan order.
    pub fn due(&self, now: NaiveDateTime) -> Vec<DueJob> {
        self.iter()
            .filter(|(_, job)| job.is_due(now))
            .map(|(recipient, job)| DueJob {
                id: job.id.clone(),
                recipient: recipient.to_string(),
                payload: job.payload.clone(),
            })
            .collect()
    }

    /// Give an id to every job that lacks one. Returns how many were assigned.
    pub fn backfill_ids(&mut self) -> usize {
        let mut assigned = 0;
        for job in self.by_recipient.values_mut().flatten() {
            if job.id.is_empty() {
                job.id = new_job_id();
                assigned += 1;
            }
        }
        assigned
    }

    /// Drop terminal jobs whose target time is before `cutoff`.
    pub fn prune_terminal_before(&mut self, cutoff: NaiveDateTime) -> usize {
        let before = self.len();
        for jobs in self.by_recipient.values_mut() {
            jobs.retain(|job| !(job.status.is_terminal() && job.target_time < cutoff));
        }
        self.by_recipient.retain(|_, jobs| !jobs.is_empty());
        before - self.len()
    }
}
