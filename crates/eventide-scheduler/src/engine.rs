//! Scheduler engine: owns the trigger queue and the loop that fires it.
//!
//! The loop drains every ready trigger, then sleeps until the earlier of the
//! next trigger, the wait cap, a queue-change signal or cancellation. The
//! queue mutex is never held across a sleep or a trigger execution. A
//! (re)load holds it across the directory read and the rebuild, so every
//! mutation lands strictly before or after a load.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use eventide_core::{EventId, EventSnapshot, EventideError, Result, SchedulerConfig, TriggerKind};
use serde::Serialize;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::clock::{Clock, SystemClock};
use crate::directory::EventDirectory;
use crate::notify::{ChangeCause, ChangeNotifier, StatusChange, TracingNotifier};
use crate::queue::TriggerQueue;
use crate::status;
use crate::trigger::{Trigger, TriggerIds, derive_triggers};

/// Loop lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Stopped,
    Running,
    Stopping,
}

/// Introspection for dashboards.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub state: SchedulerState,
    pub pending_trigger_count: usize,
    pub next_trigger: Option<Trigger>,
}

/// One queued trigger, as shown by [`SchedulerEngine::list_pending`].
#[derive(Debug, Clone, Serialize)]
pub struct PendingTrigger {
    pub trigger_id: u64,
    pub event_id: EventId,
    pub kind: TriggerKind,
    pub time: DateTime<Utc>,
    /// Zero once the trigger is overdue.
    pub time_until: Duration,
}

/// Counters over the engine's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionStats {
    pub executed: u64,
    pub transitions: u64,
    pub discarded: u64,
    pub failed: u64,
}

/// What executing one trigger did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Transitioned(StatusChange),
    Unchanged,
    /// The event no longer exists in the directory.
    Missing,
}

#[derive(Debug, PartialEq, Eq)]
enum Wake {
    Elapsed,
    Changed,
    Cancelled,
}

#[derive(Default)]
struct Counters {
    executed: AtomicU64,
    transitions: AtomicU64,
    discarded: AtomicU64,
    failed: AtomicU64,
}

struct Control {
    state: SchedulerState,
    cancel: Option<CancellationToken>,
    handle: Option<JoinHandle<()>>,
}

/// The event lifecycle scheduler.
///
/// Build one per process and share it as `Arc<SchedulerEngine>`; CRUD
/// handlers call [`add_entity`](Self::add_entity),
/// [`update_entity`](Self::update_entity) and
/// [`remove_entity`](Self::remove_entity) after persisting a change.
pub struct SchedulerEngine {
    directory: Arc<dyn EventDirectory>,
    notifier: Arc<dyn ChangeNotifier>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
    queue: Mutex<TriggerQueue>,
    trigger_ids: TriggerIds,
    initialized: AtomicBool,
    changed: Notify,
    counters: Counters,
    control: Mutex<Control>,
}

impl SchedulerEngine {
    /// Create an engine over `directory`, logging transitions via `tracing`.
    pub fn new(directory: Arc<dyn EventDirectory>, config: SchedulerConfig) -> Self {
        Self::with_parts(
            directory,
            Arc::new(TracingNotifier),
            Arc::new(SystemClock),
            config,
        )
    }

    /// Create an engine with an explicit notifier and clock.
    pub fn with_parts(
        directory: Arc<dyn EventDirectory>,
        notifier: Arc<dyn ChangeNotifier>,
        clock: Arc<dyn Clock>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            directory,
            notifier,
            clock,
            config,
            queue: Mutex::new(TriggerQueue::new()),
            trigger_ids: TriggerIds::new(),
            initialized: AtomicBool::new(false),
            changed: Notify::new(),
            counters: Counters::default(),
            control: Mutex::new(Control {
                state: SchedulerState::Stopped,
                cancel: None,
                handle: None,
            }),
        }
    }

    // ─── Cold start ───────────────────────────────────────────

    /// Load every event from the directory and rebuild the queue from scratch.
    /// Calling it again yields the same queue for the same directory contents.
    pub async fn initialize(&self) -> Result<()> {
        let armed = self.load_all(true).await?;
        self.initialized.store(true, Ordering::SeqCst);
        tracing::info!("⏰ Scheduler initialized: {} trigger(s) pending", armed);
        self.signal_change();
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Read all events, reconcile stale statuses, and arm their triggers.
    /// With `replace` the queue is rebuilt; otherwise only events with no
    /// pending triggers are armed, so concurrent mutations are kept.
    async fn load_all(&self, replace: bool) -> Result<usize> {
        let mut queue = self.queue.lock().await;
        let events = self.directory.list_all().await?;
        let now = self.clock.now();

        if replace {
            queue.clear();
        }
        let mut armed = 0;
        for snapshot in &events {
            if !replace && queue.contains_entity(&snapshot.id) {
                continue;
            }
            for trigger in derive_triggers(snapshot, now, &self.trigger_ids) {
                queue.push(trigger);
                armed += 1;
            }
        }
        drop(queue);

        if self.config.reconcile_on_initialize {
            for snapshot in &events {
                if let Err(e) = self.apply(snapshot, now, ChangeCause::Reconcile).await {
                    tracing::warn!(event_id = %snapshot.id, "⚠️ Reconcile failed: {e}");
                }
            }
        }
        tracing::debug!(events = events.len(), armed, "📥 Loaded events from directory");
        Ok(armed)
    }

    // ─── Lifecycle ────────────────────────────────────────────

    /// Spawn the scheduler loop. No-op if already running; fails while a
    /// `stop()` is still in progress.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        let mut control = self.control.lock().await;
        match control.state {
            SchedulerState::Running => {
                tracing::debug!("Scheduler already running, start ignored");
                return Ok(());
            }
            SchedulerState::Stopping => return Err(EventideError::Stopping),
            SchedulerState::Stopped => {}
        }
        if !self.is_initialized() {
            self.initialize().await?;
        }

        let cancel = CancellationToken::new();
        let engine = Arc::clone(self);
        let token = cancel.clone();
        control.handle = Some(tokio::spawn(async move { engine.run_loop(token).await }));
        control.cancel = Some(cancel);
        control.state = SchedulerState::Running;
        tracing::info!(
            "⏰ Scheduler started (wait cap {}s)",
            self.config.wait_cap_secs
        );
        Ok(())
    }

    /// Cancel the loop and wait for it to exit, aborting it after the grace
    /// period. An in-flight trigger execution is allowed to finish. The queue
    /// is dropped; the next `start()` reloads from the directory.
    pub async fn stop(&self) {
        let (cancel, handle) = {
            let mut control = self.control.lock().await;
            if control.state != SchedulerState::Running {
                return;
            }
            control.state = SchedulerState::Stopping;
            (control.cancel.take(), control.handle.take())
        };

        if let Some(cancel) = cancel {
            cancel.cancel();
        }
        if let Some(mut handle) = handle {
            match tokio::time::timeout(self.config.stop_grace(), &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!("⚠️ Scheduler loop ended abnormally: {e}"),
                Err(_) => {
                    tracing::warn!(
                        "⚠️ Scheduler loop did not stop within {}s, aborting",
                        self.config.stop_grace_secs
                    );
                    handle.abort();
                }
            }
        }

        self.queue.lock().await.clear();
        self.initialized.store(false, Ordering::SeqCst);
        self.control.lock().await.state = SchedulerState::Stopped;
        tracing::info!("⏹️ Scheduler stopped");
    }

    pub async fn state(&self) -> SchedulerState {
        self.control.lock().await.state
    }

    // ─── Loop ─────────────────────────────────────────────────

    async fn run_loop(self: Arc<Self>, cancel: CancellationToken) {
        loop {
            if cancel.is_cancelled() {
                break;
            }

            // One at a time, so a removal during an execution drops the
            // event's other due triggers too.
            let now = self.clock.now();
            loop {
                let Some(trigger) = self.queue.lock().await.pop_due(now) else {
                    break;
                };
                self.execute(&trigger).await;
            }

            let next = self.queue.lock().await.peek_next();
            let wake = match next {
                None => self.wait(self.config.idle_wait(), &cancel).await,
                Some(at) => {
                    let until = (at - self.clock.now()).to_std().unwrap_or(Duration::ZERO);
                    self.wait(until.min(self.config.wait_cap()), &cancel).await
                }
            };

            match wake {
                Wake::Cancelled => break,
                Wake::Elapsed if next.is_none() && self.config.reload_when_idle => {
                    if let Err(e) = self.load_all(false).await {
                        tracing::warn!("⚠️ Idle reload failed: {e}");
                    }
                }
                Wake::Elapsed | Wake::Changed => {}
            }
        }
        tracing::debug!("Scheduler loop exited");
    }

    async fn wait(&self, duration: Duration, cancel: &CancellationToken) -> Wake {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Wake::Cancelled,
            _ = self.changed.notified() => Wake::Changed,
            _ = tokio::time::sleep(duration) => Wake::Elapsed,
        }
    }

    fn signal_change(&self) {
        if self.config.wake_on_change {
            self.changed.notify_one();
        }
    }

    /// Re-evaluate the trigger's event and write back a changed status.
    /// Failures are logged and counted, never propagated.
    async fn execute(&self, trigger: &Trigger) -> Option<ExecutionOutcome> {
        self.counters.executed.fetch_add(1, Ordering::Relaxed);
        let result = match self.directory.get(&trigger.event_id).await {
            Ok(Some(snapshot)) => {
                self.apply(&snapshot, self.clock.now(), ChangeCause::Trigger(trigger.kind))
                    .await
            }
            Ok(None) => Ok(ExecutionOutcome::Missing),
            Err(e) => Err(e),
        };

        match result {
            Ok(ExecutionOutcome::Missing) => {
                self.counters.discarded.fetch_add(1, Ordering::Relaxed);
                tracing::info!(
                    event_id = %trigger.event_id,
                    trigger_id = trigger.trigger_id,
                    kind = %trigger.kind,
                    "Event gone, trigger discarded"
                );
                Some(ExecutionOutcome::Missing)
            }
            Ok(outcome) => {
                tracing::debug!(
                    event_id = %trigger.event_id,
                    trigger_id = trigger.trigger_id,
                    kind = %trigger.kind,
                    at = %trigger.time,
                    "🔔 Trigger fired"
                );
                Some(outcome)
            }
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                tracing::error!(
                    event_id = %trigger.event_id,
                    trigger_id = trigger.trigger_id,
                    kind = %trigger.kind,
                    "❌ Trigger execution failed: {e}"
                );
                None
            }
        }
    }

    /// Compute the lifecycle at `now`; if it differs from the stored one,
    /// write it and record the change.
    async fn apply(
        &self,
        snapshot: &EventSnapshot,
        now: DateTime<Utc>,
        cause: ChangeCause,
    ) -> Result<ExecutionOutcome> {
        let computed = status::calculate(&snapshot.schedule, now);
        if computed == snapshot.lifecycle {
            return Ok(ExecutionOutcome::Unchanged);
        }

        self.directory.set_status(&snapshot.id, computed, now).await?;
        self.counters.transitions.fetch_add(1, Ordering::Relaxed);

        let change = StatusChange {
            event_id: snapshot.id.clone(),
            old: snapshot.lifecycle,
            new: computed,
            cause,
            at: now,
        };
        if let Err(e) = self.notifier.record(&change).await {
            tracing::warn!(event_id = %change.event_id, "⚠️ Change notifier failed: {e}");
        }
        Ok(ExecutionOutcome::Transitioned(change))
    }

    // ─── Mutation API ─────────────────────────────────────────

    /// Arm triggers for a newly created event. Returns how many were queued.
    pub async fn add_entity(&self, snapshot: &EventSnapshot) -> Result<usize> {
        self.ensure_initialized()?;
        let triggers = derive_triggers(snapshot, self.clock.now(), &self.trigger_ids);
        let armed = triggers.len();
        {
            let mut queue = self.queue.lock().await;
            for trigger in triggers {
                queue.push(trigger);
            }
        }
        tracing::info!(event_id = %snapshot.id, armed, "📅 Event added");
        self.signal_change();
        Ok(armed)
    }

    /// Replace an event's triggers with those derived from `snapshot`.
    pub async fn update_entity(&self, id: &EventId, snapshot: &EventSnapshot) -> Result<usize> {
        self.ensure_initialized()?;
        if &snapshot.id != id {
            return Err(EventideError::IdMismatch {
                expected: id.to_string(),
                actual: snapshot.id.to_string(),
            });
        }
        let triggers = derive_triggers(snapshot, self.clock.now(), &self.trigger_ids);
        let armed = triggers.len();
        let removed = {
            let mut queue = self.queue.lock().await;
            let removed = queue.remove_for_entity(id);
            for trigger in triggers {
                queue.push(trigger);
            }
            removed
        };
        tracing::info!(event_id = %id, removed, armed, "✏️ Event updated");
        self.signal_change();
        Ok(armed)
    }

    /// Drop every pending trigger for an event. Returns how many were removed.
    pub async fn remove_entity(&self, id: &EventId) -> Result<usize> {
        self.ensure_initialized()?;
        let removed = self.queue.lock().await.remove_for_entity(id);
        tracing::info!(event_id = %id, removed, "🗑️ Event removed");
        self.signal_change();
        Ok(removed)
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(EventideError::NotInitialized)
        }
    }

    // ─── Diagnostics ──────────────────────────────────────────

    pub async fn status(&self) -> SchedulerStatus {
        let state = self.state().await;
        let queue = self.queue.lock().await;
        SchedulerStatus {
            running: state == SchedulerState::Running,
            state,
            pending_trigger_count: queue.len(),
            next_trigger: queue.peek().cloned(),
        }
    }

    /// Every queued trigger in firing order.
    pub async fn list_pending(&self) -> Vec<PendingTrigger> {
        let triggers = self.queue.lock().await.snapshot();
        let now = self.clock.now();
        triggers
            .into_iter()
            .map(|t| PendingTrigger {
                time_until: (t.time - now).to_std().unwrap_or(Duration::ZERO),
                trigger_id: t.trigger_id,
                event_id: t.event_id,
                kind: t.kind,
                time: t.time,
            })
            .collect()
    }

    pub fn stats(&self) -> ExecutionStats {
        ExecutionStats {
            executed: self.counters.executed.load(Ordering::Relaxed),
            transitions: self.counters.transitions.load(Ordering::Relaxed),
            discarded: self.counters.discarded.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }
}
