//! Triggers: pending `(time, event, kind)` obligations to re-evaluate an event.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use eventide_core::{EventId, EventSnapshot, TriggerKind};
use serde::Serialize;

/// A single scheduled re-evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Trigger {
    /// Per-insertion id, for log correlation only.
    pub trigger_id: u64,
    pub time: DateTime<Utc>,
    pub event_id: EventId,
    pub kind: TriggerKind,
}

/// Monotonic trigger id source.
#[derive(Debug)]
pub struct TriggerIds(AtomicU64);

impl TriggerIds {
    pub fn new() -> Self {
        Self(AtomicU64::new(1))
    }

    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for TriggerIds {
    fn default() -> Self {
        Self::new()
    }
}

/// One trigger per timestamp of `snapshot` that is strictly after `now`.
pub fn derive_triggers(
    snapshot: &EventSnapshot,
    now: DateTime<Utc>,
    ids: &TriggerIds,
) -> Vec<Trigger> {
    TriggerKind::ALL
        .into_iter()
        .filter_map(|kind| {
            let time = snapshot.schedule.get(kind)?;
            (time > now).then(|| Trigger {
                trigger_id: ids.next(),
                time,
                event_id: snapshot.id.clone(),
                kind,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use eventide_core::EventSchedule;

    #[test]
    fn test_only_future_fields_derive_triggers() {
        let now = Utc.with_ymd_and_hms(2026, 4, 1, 12, 0, 0).unwrap();
        let schedule = EventSchedule {
            registration_start: Some(now - Duration::hours(1)),
            registration_end: Some(now),
            occurrence_start: Some(now + Duration::hours(2)),
            occurrence_end: Some(now + Duration::hours(3)),
            ..Default::default()
        };
        let snap = EventSnapshot::new("evt", schedule);
        let ids = TriggerIds::new();

        let triggers = derive_triggers(&snap, now, &ids);
        let kinds: Vec<_> = triggers.iter().map(|t| t.kind).collect();
        assert_eq!(kinds, vec![TriggerKind::OccurrenceStart, TriggerKind::OccurrenceEnd]);
        assert!(triggers.iter().all(|t| t.event_id.as_str() == "evt"));
        assert_ne!(triggers[0].trigger_id, triggers[1].trigger_id);
    }

    #[test]
    fn test_empty_schedule_derives_nothing() {
        let snap = EventSnapshot::new("draft", EventSchedule::default());
        assert!(derive_triggers(&snap, Utc::now(), &TriggerIds::new()).is_empty());
    }
}
