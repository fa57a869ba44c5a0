//! Event lifecycle data model.
//!
//! An event carries up to six timestamps (registration, occurrence and
//! certificate windows) plus the last-written `(status, sub_status)` pair.
//! [`RawEvent`] is the untyped storage form; [`EventSnapshot`] is what the
//! scheduler works with.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EventideError;

/// Opaque event identifier, stable for the lifetime of the event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EventId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for EventId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// The timestamp boundary a trigger fires on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    RegistrationOpen,
    RegistrationClose,
    OccurrenceStart,
    OccurrenceEnd,
    CertificateStart,
    CertificateEnd,
}

impl TriggerKind {
    pub const ALL: [TriggerKind; 6] = [
        TriggerKind::RegistrationOpen,
        TriggerKind::RegistrationClose,
        TriggerKind::OccurrenceStart,
        TriggerKind::OccurrenceEnd,
        TriggerKind::CertificateStart,
        TriggerKind::CertificateEnd,
    ];

    /// Name of the event timestamp field this kind is derived from.
    pub fn field_name(&self) -> &'static str {
        match self {
            TriggerKind::RegistrationOpen => "registration_start",
            TriggerKind::RegistrationClose => "registration_end",
            TriggerKind::OccurrenceStart => "occurrence_start",
            TriggerKind::OccurrenceEnd => "occurrence_end",
            TriggerKind::CertificateStart => "certificate_start",
            TriggerKind::CertificateEnd => "certificate_end",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::RegistrationOpen => "registration_open",
            TriggerKind::RegistrationClose => "registration_close",
            TriggerKind::OccurrenceStart => "occurrence_start",
            TriggerKind::OccurrenceEnd => "occurrence_end",
            TriggerKind::CertificateStart => "certificate_start",
            TriggerKind::CertificateEnd => "certificate_end",
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerKind {
    type Err = EventideError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TriggerKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| EventideError::Parse(format!("unknown trigger kind '{s}'")))
    }
}

/// Top-level lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Draft,
    Upcoming,
    Ongoing,
    Completed,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Draft => "draft",
            EventStatus::Upcoming => "upcoming",
            EventStatus::Ongoing => "ongoing",
            EventStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventStatus {
    type Err = EventideError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(EventStatus::Draft),
            "upcoming" => Ok(EventStatus::Upcoming),
            "ongoing" => Ok(EventStatus::Ongoing),
            "completed" => Ok(EventStatus::Completed),
            other => Err(EventideError::Parse(format!("unknown status '{other}'"))),
        }
    }
}

/// Finer-grained reason within a [`EventStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubStatus {
    Draft,
    RegistrationNotStarted,
    RegistrationOpen,
    RegistrationClosed,
    EventStarted,
    CertificateAvailable,
    EventEnded,
}

impl SubStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubStatus::Draft => "draft",
            SubStatus::RegistrationNotStarted => "registration_not_started",
            SubStatus::RegistrationOpen => "registration_open",
            SubStatus::RegistrationClosed => "registration_closed",
            SubStatus::EventStarted => "event_started",
            SubStatus::CertificateAvailable => "certificate_available",
            SubStatus::EventEnded => "event_ended",
        }
    }
}

impl fmt::Display for SubStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubStatus {
    type Err = EventideError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(SubStatus::Draft),
            "registration_not_started" => Ok(SubStatus::RegistrationNotStarted),
            "registration_open" => Ok(SubStatus::RegistrationOpen),
            "registration_closed" => Ok(SubStatus::RegistrationClosed),
            "event_started" => Ok(SubStatus::EventStarted),
            "certificate_available" => Ok(SubStatus::CertificateAvailable),
            "event_ended" => Ok(SubStatus::EventEnded),
            other => Err(EventideError::Parse(format!("unknown sub-status '{other}'"))),
        }
    }
}

/// The two-level `(status, sub_status)` label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Lifecycle {
    pub status: EventStatus,
    pub sub_status: SubStatus,
}

impl Lifecycle {
    pub const DRAFT: Lifecycle = Lifecycle::new(EventStatus::Draft, SubStatus::Draft);

    pub const fn new(status: EventStatus, sub_status: SubStatus) -> Self {
        Self { status, sub_status }
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::DRAFT
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.status, self.sub_status)
    }
}

/// The timestamps an event may carry. Any field may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSchedule {
    #[serde(default)]
    pub registration_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub registration_end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub occurrence_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub occurrence_end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub certificate_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub certificate_end: Option<DateTime<Utc>>,
}

impl EventSchedule {
    /// The timestamp a trigger of `kind` is derived from.
    pub fn get(&self, kind: TriggerKind) -> Option<DateTime<Utc>> {
        match kind {
            TriggerKind::RegistrationOpen => self.registration_start,
            TriggerKind::RegistrationClose => self.registration_end,
            TriggerKind::OccurrenceStart => self.occurrence_start,
            TriggerKind::OccurrenceEnd => self.occurrence_end,
            TriggerKind::CertificateStart => self.certificate_start,
            TriggerKind::CertificateEnd => self.certificate_end,
        }
    }

    fn set(&mut self, kind: TriggerKind, value: Option<DateTime<Utc>>) {
        let slot = match kind {
            TriggerKind::RegistrationOpen => &mut self.registration_start,
            TriggerKind::RegistrationClose => &mut self.registration_end,
            TriggerKind::OccurrenceStart => &mut self.occurrence_start,
            TriggerKind::OccurrenceEnd => &mut self.occurrence_end,
            TriggerKind::CertificateStart => &mut self.certificate_start,
            TriggerKind::CertificateEnd => &mut self.certificate_end,
        };
        *slot = value;
    }
}

/// An event as read from the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSnapshot {
    pub id: EventId,
    #[serde(default)]
    pub schedule: EventSchedule,
    #[serde(default)]
    pub lifecycle: Lifecycle,
}

impl EventSnapshot {
    /// A new event in the default draft state.
    pub fn new(id: impl Into<EventId>, schedule: EventSchedule) -> Self {
        Self {
            id: id.into(),
            schedule,
            lifecycle: Lifecycle::DRAFT,
        }
    }

    pub fn with_lifecycle(mut self, lifecycle: Lifecycle) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    /// Build a typed snapshot from its storage form.
    ///
    /// Each timestamp is parsed on its own: an unparseable value is logged and
    /// treated as absent, the remaining fields are kept. Unknown status strings
    /// fall back to draft.
    pub fn from_raw(raw: RawEvent) -> Self {
        let id = EventId::new(raw.id.clone());
        let mut schedule = EventSchedule::default();
        for kind in TriggerKind::ALL {
            let Some(value) = raw.timestamp(kind) else {
                continue;
            };
            match parse_timestamp(value) {
                Some(at) => schedule.set(kind, Some(at)),
                None => tracing::warn!(
                    event_id = %id,
                    field = kind.field_name(),
                    value,
                    "⚠️ Skipping malformed timestamp"
                ),
            }
        }

        let lifecycle = match (raw.status.parse(), raw.sub_status.parse()) {
            (Ok(status), Ok(sub_status)) => Lifecycle::new(status, sub_status),
            _ => {
                tracing::warn!(
                    event_id = %id,
                    status = %raw.status,
                    sub_status = %raw.sub_status,
                    "⚠️ Unknown stored status, treating as draft"
                );
                Lifecycle::DRAFT
            }
        };

        Self {
            id,
            schedule,
            lifecycle,
        }
    }
}

/// Untyped storage form of an event: every timestamp as text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    pub id: String,
    #[serde(default)]
    pub registration_start: Option<String>,
    #[serde(default)]
    pub registration_end: Option<String>,
    #[serde(default)]
    pub occurrence_start: Option<String>,
    #[serde(default)]
    pub occurrence_end: Option<String>,
    #[serde(default)]
    pub certificate_start: Option<String>,
    #[serde(default)]
    pub certificate_end: Option<String>,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default = "default_status")]
    pub sub_status: String,
}

fn default_status() -> String {
    "draft".into()
}

impl RawEvent {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            status: default_status(),
            sub_status: default_status(),
            ..Default::default()
        }
    }

    /// The stored text for the field a trigger of `kind` is derived from.
    pub fn timestamp(&self, kind: TriggerKind) -> Option<&str> {
        let value = match kind {
            TriggerKind::RegistrationOpen => &self.registration_start,
            TriggerKind::RegistrationClose => &self.registration_end,
            TriggerKind::OccurrenceStart => &self.occurrence_start,
            TriggerKind::OccurrenceEnd => &self.occurrence_end,
            TriggerKind::CertificateStart => &self.certificate_start,
            TriggerKind::CertificateEnd => &self.certificate_end,
        };
        value.as_deref().filter(|v| !v.trim().is_empty())
    }

    /// The storage form of a typed snapshot (RFC 3339 timestamps).
    pub fn from_snapshot(snapshot: &EventSnapshot) -> Self {
        let text = |kind| snapshot.schedule.get(kind).map(|t: DateTime<Utc>| t.to_rfc3339());
        Self {
            id: snapshot.id.to_string(),
            registration_start: text(TriggerKind::RegistrationOpen),
            registration_end: text(TriggerKind::RegistrationClose),
            occurrence_start: text(TriggerKind::OccurrenceStart),
            occurrence_end: text(TriggerKind::OccurrenceEnd),
            certificate_start: text(TriggerKind::CertificateStart),
            certificate_end: text(TriggerKind::CertificateEnd),
            status: snapshot.lifecycle.status.as_str().to_string(),
            sub_status: snapshot.lifecycle.sub_status.as_str().to_string(),
        }
    }
}

/// Parse a stored timestamp: RFC 3339, or a naive date-time taken as UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc())
}
