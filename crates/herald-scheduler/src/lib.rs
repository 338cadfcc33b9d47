//! # Herald Scheduler
//!
//! Persistent scheduled-message queue. Jobs are stored as one JSON document
//! grouped by recipient, and a polling loop delivers due jobs through a
//! [`DeliveryPort`](herald_core::DeliveryPort).
//!
//! A [`Scheduler`] owns its store exclusively through an advisory file lock,
//! so only one process at a time can change the queue.
//!
//! ## Architecture
//! ```text
//! Scheduler::open
//!   └── JobStore::lock (exclusive) → load
//!
//! submit(recipient, message, "YYYY-MM-DD HH:MM:SS")
//!   └── validate → append pending → JobStore::save (temp + rename)
//!
//! Scheduler::run (tokio interval, every 30s)
//!   └── tick: due pending jobs, in insertion order
//!         ├── DeliveryPort::deliver (with timeout)
//!         ├── ok  → sent   → save
//!         └── err → failed → save
//! ```

pub mod clock;
pub mod engine;
pub mod error;
pub mod job;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock, Ticker};
pub use engine::{JobHandle, Scheduler, SchedulerHandle, SchedulerOptions, TickReport};
pub use error::SchedulerError;
pub use job::{DueJob, Job, JobSet, JobStatus, JobView, TIME_FORMAT, parse_target_time};
pub use store::{JobStore, StoreLock};
