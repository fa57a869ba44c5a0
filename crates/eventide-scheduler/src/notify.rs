//! Change notification — audit sinks called after each status transition.
//! Fire-and-forget: a failing sink never undoes the status write.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use eventide_core::{EventId, EventideError, Lifecycle, Result, TriggerKind};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

/// Max entries kept by [`ChangeHistory`].
pub const HISTORY_CAPACITY: usize = 100;

/// Why a status was rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeCause {
    /// A queued trigger fired.
    Trigger(TriggerKind),
    /// The cold-start load found a stale status.
    Reconcile,
}

impl fmt::Display for ChangeCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeCause::Trigger(kind) => write!(f, "trigger:{kind}"),
            ChangeCause::Reconcile => f.write_str("reconcile"),
        }
    }
}

impl FromStr for ChangeCause {
    type Err = EventideError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.split_once(':') {
            Some(("trigger", kind)) => Ok(ChangeCause::Trigger(kind.parse()?)),
            None if s == "reconcile" => Ok(ChangeCause::Reconcile),
            _ => Err(EventideError::Parse(format!("unknown change cause '{s}'"))),
        }
    }
}

/// One committed status transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub event_id: EventId,
    pub old: Lifecycle,
    pub new: Lifecycle,
    pub cause: ChangeCause,
    pub at: DateTime<Utc>,
}

/// Audit sink for status transitions.
#[async_trait]
pub trait ChangeNotifier: Send + Sync {
    async fn record(&self, change: &StatusChange) -> Result<()>;
}

/// Logs every change through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

#[async_trait]
impl ChangeNotifier for TracingNotifier {
    async fn record(&self, change: &StatusChange) -> Result<()> {
        tracing::info!(
            event_id = %change.event_id,
            cause = %change.cause,
            "🔁 {} → {}",
            change.old,
            change.new
        );
        Ok(())
    }
}

/// In-memory ring buffer of recent changes (newest [`HISTORY_CAPACITY`] kept).
#[derive(Debug, Default)]
pub struct ChangeHistory {
    entries: Mutex<VecDeque<StatusChange>>,
}

impl ChangeHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded changes, oldest first.
    pub async fn entries(&self) -> Vec<StatusChange> {
        self.entries.lock().await.iter().cloned().collect()
    }

    /// Recorded changes for one event, oldest first.
    pub async fn for_event(&self, id: &EventId) -> Vec<StatusChange> {
        self.entries
            .lock()
            .await
            .iter()
            .filter(|c| &c.event_id == id)
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

#[async_trait]
impl ChangeNotifier for ChangeHistory {
    async fn record(&self, change: &StatusChange) -> Result<()> {
        let mut entries = self.entries.lock().await;
        entries.push_back(change.clone());
        while entries.len() > HISTORY_CAPACITY {
            entries.pop_front();
        }
        Ok(())
    }
}

/// Forwards each change to several sinks. Every sink is called even if an
/// earlier one fails; the first error is returned.
#[derive(Default)]
pub struct FanoutNotifier {
    sinks: Vec<Arc<dyn ChangeNotifier>>,
}

impl FanoutNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn ChangeNotifier>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }
}

#[async_trait]
impl ChangeNotifier for FanoutNotifier {
    async fn record(&self, change: &StatusChange) -> Result<()> {
        let mut first_err = None;
        for sink in &self.sinks {
            if let Err(e) = sink.record(change).await {
                tracing::warn!(event_id = %change.event_id, "⚠️ Change sink failed: {e}");
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eventide_core::{EventStatus, SubStatus};

    fn change(id: &str, n: i64) -> StatusChange {
        StatusChange {
            event_id: EventId::new(id),
            old: Lifecycle::DRAFT,
            new: Lifecycle::new(EventStatus::Upcoming, SubStatus::RegistrationOpen),
            cause: ChangeCause::Trigger(TriggerKind::RegistrationOpen),
            at: DateTime::<Utc>::UNIX_EPOCH + chrono::Duration::seconds(n),
        }
    }

    struct FailingSink;

    #[async_trait]
    impl ChangeNotifier for FailingSink {
        async fn record(&self, _change: &StatusChange) -> Result<()> {
            Err(EventideError::Notifier("sink offline".into()))
        }
    }

    #[tokio::test]
    async fn test_history_ring_buffer() {
        let history = ChangeHistory::new();
        for i in 0..(HISTORY_CAPACITY as i64 + 5) {
            history.record(&change("evt", i)).await.unwrap();
        }
        let entries = history.entries().await;
        assert_eq!(entries.len(), HISTORY_CAPACITY);
        assert_eq!(entries[0].at, change("evt", 5).at);
    }

    #[tokio::test]
    async fn test_fanout_continues_past_failure() {
        let history = Arc::new(ChangeHistory::new());
        let fanout = FanoutNotifier::new()
            .with(Arc::new(FailingSink))
            .with(history.clone());

        let result = fanout.record(&change("evt", 1)).await;
        assert!(matches!(result, Err(EventideError::Notifier(_))));
        assert_eq!(history.len().await, 1);
        assert_eq!(fanout.sink_count(), 2);
    }

    #[test]
    fn test_cause_strings() {
        let cause = ChangeCause::Trigger(TriggerKind::CertificateEnd);
        assert_eq!(cause.to_string(), "trigger:certificate_end");
        assert_eq!("trigger:certificate_end".parse::<ChangeCause>().unwrap(), cause);
        assert_eq!("reconcile".parse::<ChangeCause>().unwrap(), ChangeCause::Reconcile);
        assert!("trigger:bogus".parse::<ChangeCause>().is_err());
    }
}
