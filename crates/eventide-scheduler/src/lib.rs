//! # Eventide Scheduler
//!
//! Time-triggered lifecycle scheduler for events.
//!
//! Each event carries up to six timestamps. The scheduler keeps one trigger
//! per still-future timestamp in a min-heap and runs a single loop that fires
//! triggers as they come due, recomputes the event's `(status, sub_status)`
//! and writes back any change.
//!
//! ## Architecture
//! ```text
//! SchedulerEngine (one tokio task)
//!   ├── TriggerQueue: min-heap of (time, event, kind)
//!   ├── loop: pop ready → execute → sleep min(next - now, wait cap)
//!   │           ↑ woken early by add/update/remove_entity
//!   ├── execute: EventDirectory::get → status::calculate → set_status
//!   └── on change → ChangeNotifier
//!                    ├── TracingNotifier
//!                    ├── ChangeHistory (ring buffer)
//!                    └── SqliteDirectory (status_changes table)
//! ```

pub mod clock;
pub mod directory;
pub mod engine;
pub mod notify;
pub mod persistence;
pub mod queue;
pub mod status;
pub mod trigger;

pub use clock::{Clock, SystemClock, TokioClock};
pub use directory::{EventDirectory, MemoryDirectory};
pub use engine::{
    ExecutionOutcome, ExecutionStats, PendingTrigger, SchedulerEngine, SchedulerState,
    SchedulerStatus,
};
pub use notify::{
    ChangeCause, ChangeHistory, ChangeNotifier, FanoutNotifier, StatusChange, TracingNotifier,
};
pub use persistence::SqliteDirectory;
pub use queue::TriggerQueue;
pub use trigger::{Trigger, TriggerIds, derive_triggers};
