//! Shared harness for scheduler loop tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use eventide_core::{EventId, EventSchedule, EventSnapshot, SchedulerConfig};
use eventide_scheduler::{ChangeHistory, MemoryDirectory, SchedulerEngine, TokioClock, status};

pub fn anchor() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 11, 2, 8, 0, 0).unwrap()
}

pub fn at(secs: i64) -> DateTime<Utc> {
    anchor() + chrono::Duration::seconds(secs)
}

pub struct Harness {
    pub dir: Arc<MemoryDirectory>,
    pub history: Arc<ChangeHistory>,
    pub engine: Arc<SchedulerEngine>,
}

pub fn harness(config: SchedulerConfig) -> Harness {
    let dir = Arc::new(MemoryDirectory::new());
    let history = Arc::new(ChangeHistory::new());
    let engine = Arc::new(SchedulerEngine::with_parts(
        dir.clone(),
        history.clone(),
        Arc::new(TokioClock::new(anchor())),
        config,
    ));
    Harness {
        dir,
        history,
        engine,
    }
}

/// Snapshot whose stored lifecycle matches its schedule at `now`.
pub fn settled(id: &str, schedule: EventSchedule, now: DateTime<Utc>) -> EventSnapshot {
    let lifecycle = status::calculate(&schedule, now);
    EventSnapshot::new(id, schedule).with_lifecycle(lifecycle)
}

pub fn occurrence(start: i64, end: i64) -> EventSchedule {
    EventSchedule {
        occurrence_start: Some(at(start)),
        occurrence_end: Some(at(end)),
        ..Default::default()
    }
}

/// Poll the history until `id` has a recorded change; returns the elapsed
/// (tokio) time, or `None` once `limit` passes.
pub async fn wait_for_change(
    history: &ChangeHistory,
    id: &EventId,
    limit: Duration,
) -> Option<Duration> {
    let started = tokio::time::Instant::now();
    while started.elapsed() <= limit {
        if !history.for_event(id).await.is_empty() {
            return Some(started.elapsed());
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
    None
}
