//! End-to-end behaviour of the scheduled-message queue: the delivery loop,
//! restarts, external corruption and storage failures.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use herald_core::{DeliveryPort, HeraldError};
use herald_scheduler::{
    JobStatus, JobStore, ManualClock, Scheduler, SchedulerError, SchedulerOptions,
    parse_target_time,
};
use tokio::sync::Notify;

#[derive(Default)]
struct RecordingPort {
    calls: Mutex<Vec<(String, String)>>,
}

impl RecordingPort {
    fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeliveryPort for RecordingPort {
    fn name(&self) -> &str {
        "recording"
    }

    async fn deliver(&self, recipient: &str, payload: &str) -> herald_core::Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push((recipient.to_string(), payload.to_string()));
        Ok(())
    }
}

/// Blocks each delivery until released, so a test can act mid-delivery.
#[derive(Default)]
struct GatedPort {
    started: Notify,
    release: Notify,
}

#[async_trait]
impl DeliveryPort for GatedPort {
    fn name(&self) -> &str {
        "gated"
    }

    async fn deliver(&self, _recipient: &str, _payload: &str) -> herald_core::Result<()> {
        self.started.notify_one();
        self.release.notified().await;
        Err(HeraldError::Channel("released".into()))
    }
}

fn at(text: &str) -> NaiveDateTime {
    parse_target_time(text).unwrap()
}

fn open(
    dir: &std::path::Path,
    port: Arc<dyn DeliveryPort>,
    clock: Arc<ManualClock>,
    poll_interval: Duration,
) -> Arc<Scheduler> {
    let options = SchedulerOptions {
        poll_interval,
        ..Default::default()
    };
    Arc::new(Scheduler::open(JobStore::new(dir), port, clock, options).unwrap())
}

async fn wait_for_status(scheduler: &Scheduler, id: &str, status: JobStatus) {
    for _ in 0..200 {
        if scheduler.get(id).await.map(|j| j.status) == Some(status) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {id} never reached {status}");
}

#[tokio::test]
async fn test_loop_delivers_due_message_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let port = Arc::new(RecordingPort::default());
    let clock = Arc::new(ManualClock::new(at("2026-10-16 08:00:00")));
    let scheduler = open(dir.path(), port.clone(), clock.clone(), Duration::from_millis(20));

    let job = scheduler
        .submit("123", "take your meds", "2026-10-16 08:00:01")
        .await
        .unwrap();
    let handle = scheduler.clone().spawn();

    // Two polling intervals of virtual time.
    clock.advance(Duration::from_secs(2));
    wait_for_status(&scheduler, &job.id, JobStatus::Sent).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    handle.shutdown().await;

    assert_eq!(
        port.calls(),
        [("123".to_string(), "take your meds".to_string())]
    );
    let stored = JobStore::new(dir.path()).load().unwrap();
    assert_eq!(stored.jobs_for("123")[0].status, JobStatus::Sent);
}

#[tokio::test]
async fn test_same_recipient_jobs_delivered_in_submission_order() {
    let dir = tempfile::tempdir().unwrap();
    let port = Arc::new(RecordingPort::default());
    let clock = Arc::new(ManualClock::new(at("2026-10-16 08:00:00")));
    let scheduler = open(dir.path(), port.clone(), clock.clone(), Duration::from_secs(30));

    scheduler.submit("7", "second by time", "2026-10-16 08:05:00").await.unwrap();
    scheduler.submit("7", "first by time", "2026-10-16 08:01:00").await.unwrap();
    scheduler.submit("7", "not yet", "2026-10-16 09:00:00").await.unwrap();
    clock.advance(Duration::from_secs(600));

    let report = scheduler.tick().await;
    assert_eq!(report.sent, 2);
    let payloads: Vec<_> = port.calls().into_iter().map(|(_, p)| p).collect();
    assert_eq!(payloads, ["second by time", "first by time"]);
}

#[tokio::test]
async fn test_jobs_survive_restart_with_stable_ids() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(at("2026-10-16 08:00:00")));
    let first = open(
        dir.path(),
        Arc::new(RecordingPort::default()),
        clock.clone(),
        Duration::from_secs(30),
    );
    let job = first.submit("55", "hello again", "2026-10-16 08:10:00").await.unwrap();
    drop(first);

    let port = Arc::new(RecordingPort::default());
    let second = open(dir.path(), port.clone(), clock.clone(), Duration::from_secs(30));
    let view = second.get(&job.id).await.unwrap();
    assert_eq!(view.status, JobStatus::Pending);
    assert_eq!(view.target_time, at("2026-10-16 08:10:00"));

    clock.advance(Duration::from_secs(900));
    second.tick().await;
    assert_eq!(port.calls(), [("55".to_string(), "hello again".to_string())]);
}

#[tokio::test]
async fn test_external_corruption_is_not_masked() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(at("2026-10-16 08:00:00")));
    let scheduler = open(
        dir.path(),
        Arc::new(RecordingPort::default()),
        clock,
        Duration::from_secs(30),
    );
    scheduler.submit("1", "x", "2026-10-17 00:00:00").await.unwrap();

    let store = JobStore::new(dir.path());
    std::fs::write(store.path(), b"\x00\x01garbage").unwrap();
    assert!(matches!(
        store.load(),
        Err(SchedulerError::StorageCorrupt { .. })
    ));
}

#[tokio::test]
async fn test_cancel_during_delivery_is_not_resurrected() {
    let dir = tempfile::tempdir().unwrap();
    let port = Arc::new(GatedPort::default());
    let clock = Arc::new(ManualClock::new(at("2026-10-16 08:00:00")));
    let scheduler = open(dir.path(), port.clone(), clock.clone(), Duration::from_secs(30));
    let job = scheduler.submit("9", "slow", "2026-10-16 08:00:30").await.unwrap();
    clock.advance(Duration::from_secs(60));

    let ticking = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.tick().await })
    };
    port.started.notified().await;

    // The set is not locked while a delivery is in flight.
    scheduler.cancel(&job.id).await.unwrap();
    port.release.notify_one();

    let report = ticking.await.unwrap();
    assert_eq!(report.skipped, 1);
    assert_eq!(report.failed, 0);
    assert!(scheduler.get(&job.id).await.is_none());
    assert!(JobStore::new(dir.path()).load().unwrap().is_empty());
}

#[tokio::test]
async fn test_persistence_failure_is_retried_without_redelivery() {
    let dir = tempfile::tempdir().unwrap();
    let port = Arc::new(RecordingPort::default());
    let clock = Arc::new(ManualClock::new(at("2026-10-16 08:00:00")));
    let scheduler = open(dir.path(), port.clone(), clock.clone(), Duration::from_secs(30));
    let job = scheduler.submit("3", "ping", "2026-10-16 08:00:10").await.unwrap();
    clock.advance(Duration::from_secs(20));

    // A non-empty directory where the store file lives makes the rename fail.
    let path = scheduler.store().path().to_path_buf();
    std::fs::remove_file(&path).unwrap();
    std::fs::create_dir(&path).unwrap();
    std::fs::write(path.join("blocker"), "x").unwrap();

    let report = scheduler.tick().await;
    assert!(report.aborted);
    assert_eq!(report.sent, 1);
    assert_eq!(scheduler.get(&job.id).await.unwrap().status, JobStatus::Sent);

    let report = scheduler.tick().await;
    assert!(report.aborted);
    assert_eq!(report.sent, 0);

    std::fs::remove_dir_all(&path).unwrap();
    let report = scheduler.tick().await;
    assert!(!report.aborted);
    assert_eq!(port.calls().len(), 1);
    let stored = JobStore::new(dir.path()).load().unwrap();
    assert_eq!(stored.jobs_for("3")[0].status, JobStatus::Sent);
}

#[tokio::test]
async fn test_concurrent_submissions_while_loop_runs() {
    let dir = tempfile::tempdir().unwrap();
    let port = Arc::new(RecordingPort::default());
    let clock = Arc::new(ManualClock::new(at("2026-10-16 08:00:00")));
    let scheduler = open(dir.path(), port.clone(), clock, Duration::from_millis(5));
    let handle = scheduler.clone().spawn();

    let mut tasks = Vec::new();
    for i in 0..20 {
        let scheduler = scheduler.clone();
        tasks.push(tokio::spawn(async move {
            scheduler
                .submit(&format!("user-{}", i % 3), &format!("msg {i}"), "2026-10-17 08:00:00")
                .await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }
    handle.shutdown().await;

    let stored = JobStore::new(dir.path()).load().unwrap();
    assert_eq!(stored.len(), 20);
    assert_eq!(stored, scheduler.snapshot().await);
    assert!(port.calls().is_empty());
}

#[tokio::test]
async fn test_shutdown_stops_loop() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(at("2026-10-16 08:00:00")));
    let scheduler = open(
        dir.path(),
        Arc::new(RecordingPort::default()),
        clock,
        Duration::from_secs(3600),
    );
    let handle = scheduler.spawn();
    tokio::time::timeout(Duration::from_secs(5), handle.shutdown())
        .await
        .expect("loop should stop promptly");
}

#[tokio::test]
async fn test_second_process_cannot_overwrite_running_loop() {
    let dir = tempfile::tempdir().unwrap();
    let port = Arc::new(RecordingPort::default());
    let clock = Arc::new(ManualClock::new(at("2026-10-16 08:00:00")));
    let daemon = open(dir.path(), port.clone(), clock.clone(), Duration::from_secs(30));
    let first = daemon.submit("1", "from daemon", "2026-10-16 08:00:05").await.unwrap();

    let cli = Scheduler::open(
        JobStore::new(dir.path()),
        Arc::new(RecordingPort::default()),
        clock.clone(),
        SchedulerOptions::default(),
    );
    assert!(matches!(cli, Err(SchedulerError::StoreLocked { .. })));

    clock.advance(Duration::from_secs(10));
    assert_eq!(daemon.tick().await.sent, 1);
    drop(daemon);

    let cli = open(dir.path(), Arc::new(RecordingPort::default()), clock, Duration::from_secs(30));
    let second = cli.submit("2", "from cli", "2026-10-17 08:00:00").await.unwrap();

    let stored = JobStore::new(dir.path()).load().unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored.find(&first.id).unwrap().1.status, JobStatus::Sent);
    assert!(stored.find(&second.id).is_some());
}
