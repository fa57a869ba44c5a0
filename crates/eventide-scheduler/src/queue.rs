//! Trigger queue — a min-heap of pending triggers keyed by time.
//!
//! Ties on `time` are broken by insertion order so drains are reproducible.
//! No dedup: callers remove an event's triggers before pushing its new set.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use chrono::{DateTime, Utc};
use eventide_core::EventId;

use crate::trigger::Trigger;

#[derive(Debug, Clone)]
struct Entry {
    seq: u64,
    trigger: Trigger,
}

impl Entry {
    fn key(&self) -> (DateTime<Utc>, u64) {
        (self.trigger.time, self.seq)
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    // Reversed: BinaryHeap is a max-heap, the head must be the earliest trigger.
    fn cmp(&self, other: &Self) -> Ordering {
        other.key().cmp(&self.key())
    }
}

/// Pending triggers, earliest first.
#[derive(Debug, Default)]
pub struct TriggerQueue {
    heap: BinaryHeap<Entry>,
    next_seq: u64,
}

impl TriggerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert one trigger. O(log n).
    pub fn push(&mut self, trigger: Trigger) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Entry { seq, trigger });
    }

    /// Remove and return the earliest trigger if `time <= now`.
    pub fn pop_due(&mut self, now: DateTime<Utc>) -> Option<Trigger> {
        if self.heap.peek()?.trigger.time <= now {
            self.heap.pop().map(|e| e.trigger)
        } else {
            None
        }
    }

    /// Remove and return every trigger with `time <= now`, earliest first.
    pub fn pop_ready(&mut self, now: DateTime<Utc>) -> Vec<Trigger> {
        std::iter::from_fn(|| self.pop_due(now)).collect()
    }

    /// Remove every trigger for `event_id`, returning how many were dropped. O(n).
    pub fn remove_for_entity(&mut self, event_id: &EventId) -> usize {
        let before = self.heap.len();
        self.heap.retain(|e| &e.trigger.event_id != event_id);
        before - self.heap.len()
    }

    /// Time of the earliest pending trigger.
    pub fn peek_next(&self) -> Option<DateTime<Utc>> {
        self.heap.peek().map(|e| e.trigger.time)
    }

    /// The earliest pending trigger.
    pub fn peek(&self) -> Option<&Trigger> {
        self.heap.peek().map(|e| &e.trigger)
    }

    /// All pending triggers in firing order, without draining.
    pub fn snapshot(&self) -> Vec<Trigger> {
        let mut entries: Vec<&Entry> = self.heap.iter().collect();
        entries.sort_by_key(|e| e.key());
        entries.into_iter().map(|e| e.trigger.clone()).collect()
    }

    /// Whether any trigger is pending for `event_id`.
    pub fn contains_entity(&self, event_id: &EventId) -> bool {
        self.heap.iter().any(|e| &e.trigger.event_id == event_id)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use eventide_core::TriggerKind;

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap()
    }

    fn trig(id: u64, event: &str, offset_secs: i64, kind: TriggerKind) -> Trigger {
        Trigger {
            trigger_id: id,
            time: base() + Duration::seconds(offset_secs),
            event_id: EventId::new(event),
            kind,
        }
    }

    #[test]
    fn test_empty_queue() {
        let mut q = TriggerQueue::new();
        assert!(q.pop_ready(base()).is_empty());
        assert!(q.peek_next().is_none());
        assert!(q.peek().is_none());
        assert!(q.is_empty());
    }

    #[test]
    fn test_pop_ready_drains_all_due_in_order() {
        let mut q = TriggerQueue::new();
        q.push(trig(1, "a", 30, TriggerKind::OccurrenceEnd));
        q.push(trig(2, "b", 10, TriggerKind::OccurrenceStart));
        q.push(trig(3, "c", 20, TriggerKind::RegistrationClose));
        q.push(trig(4, "d", 100, TriggerKind::CertificateEnd));

        let ready = q.pop_ready(base() + Duration::seconds(30));
        let ids: Vec<_> = ready.iter().map(|t| t.trigger_id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
        assert_eq!(q.len(), 1);
        assert_eq!(q.peek_next(), Some(base() + Duration::seconds(100)));
    }

    #[test]
    fn test_pop_due_takes_one_at_a_time() {
        let mut q = TriggerQueue::new();
        q.push(trig(1, "a", 5, TriggerKind::OccurrenceStart));
        q.push(trig(2, "b", 5, TriggerKind::OccurrenceStart));
        q.push(trig(3, "c", 50, TriggerKind::OccurrenceEnd));
        let now = base() + Duration::seconds(10);

        assert_eq!(q.pop_due(now).map(|t| t.trigger_id), Some(1));
        q.remove_for_entity(&EventId::new("b"));
        assert!(q.pop_due(now).is_none());
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn test_pop_ready_never_returns_future() {
        let mut q = TriggerQueue::new();
        q.push(trig(1, "a", 1, TriggerKind::OccurrenceStart));
        assert!(q.pop_ready(base()).is_empty());
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn test_equal_times_pop_in_insertion_order() {
        let mut q = TriggerQueue::new();
        for id in [7, 3, 9, 1] {
            q.push(trig(id, "x", 5, TriggerKind::OccurrenceStart));
        }
        let ids: Vec<_> = q.pop_ready(base() + Duration::seconds(5)).iter().map(|t| t.trigger_id).collect();
        assert_eq!(ids, vec![7, 3, 9, 1]);
    }

    #[test]
    fn test_interleaved_pushes_and_pops_stay_ordered() {
        let mut q = TriggerQueue::new();
        let offsets = [50, 5, 42, 17, 99, 3, 64, 28, 71, 12, 88, 35];
        let mut now = base();
        for (i, off) in offsets.iter().enumerate() {
            q.push(trig(i as u64, "e", *off, TriggerKind::OccurrenceStart));
            if i % 3 == 2 {
                now += Duration::seconds(20);
                let batch = q.pop_ready(now);
                assert!(batch.iter().all(|t| t.time <= now));
                assert!(batch.windows(2).all(|w| w[0].time <= w[1].time));
                assert!(q.peek_next().is_none_or(|next| next > now));
            }
        }
        let rest = q.pop_ready(base() + Duration::days(1));
        assert!(rest.windows(2).all(|w| w[0].time <= w[1].time));
        assert!(q.is_empty());
    }

    #[test]
    fn test_remove_for_entity() {
        let mut q = TriggerQueue::new();
        q.push(trig(1, "keep", 10, TriggerKind::OccurrenceStart));
        q.push(trig(2, "drop", 5, TriggerKind::OccurrenceStart));
        q.push(trig(3, "drop", 15, TriggerKind::OccurrenceEnd));

        assert_eq!(q.remove_for_entity(&EventId::new("drop")), 2);
        assert!(!q.contains_entity(&EventId::new("drop")));
        assert_eq!(q.peek().map(|t| t.trigger_id), Some(1));
        assert_eq!(q.remove_for_entity(&EventId::new("missing")), 0);
    }

    #[test]
    fn test_snapshot_does_not_drain() {
        let mut q = TriggerQueue::new();
        q.push(trig(1, "a", 20, TriggerKind::OccurrenceEnd));
        q.push(trig(2, "a", 10, TriggerKind::OccurrenceStart));
        let snap = q.snapshot();
        assert_eq!(snap.iter().map(|t| t.trigger_id).collect::<Vec<_>>(), vec![2, 1]);
        assert_eq!(q.len(), 2);
    }
}
