//! # Eventide Core
//!
//! Shared vocabulary for the Eventide scheduler: event lifecycle types,
//! configuration and the crate-wide error type.

pub mod config;
pub mod error;
pub mod types;

pub use config::{DatabaseConfig, EventideConfig, LoggingConfig, SchedulerConfig};
pub use error::{EventideError, Result};
pub use types::{
    EventId, EventSchedule, EventSnapshot, EventStatus, Lifecycle, RawEvent, SubStatus,
    TriggerKind,
};
