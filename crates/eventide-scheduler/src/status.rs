//! Event lifecycle state machine.
//!
//! Pure and deterministic: the same `(schedule, now)` always yields the same
//! [`Lifecycle`]. Rules are evaluated in order, first match wins:
//!
//! ```text
//! occurrence_start/end missing          → draft/draft
//! now < registration_start              → upcoming/registration_not_started
//! now < registration_end                → upcoming/registration_open
//! registration_start only, now < start  → upcoming/registration_open
//! now < occurrence_start                → upcoming/registration_closed
//! now < occurrence_end                  → ongoing/event_started
//! no certificate_end or now < it        → ongoing/certificate_available
//! otherwise                             → completed/event_ended
//! ```

use chrono::{DateTime, Utc};
use eventide_core::{EventSchedule, EventStatus, Lifecycle, SubStatus};

/// Compute the canonical lifecycle of an event at `now`.
pub fn calculate(schedule: &EventSchedule, now: DateTime<Utc>) -> Lifecycle {
    use EventStatus::*;

    let (Some(start), Some(end)) = (schedule.occurrence_start, schedule.occurrence_end) else {
        return Lifecycle::DRAFT;
    };

    if schedule.registration_start.is_some_and(|rs| now < rs) {
        return Lifecycle::new(Upcoming, SubStatus::RegistrationNotStarted);
    }
    match schedule.registration_end {
        Some(re) if now < re => return Lifecycle::new(Upcoming, SubStatus::RegistrationOpen),
        // Open-ended registration runs until the event starts.
        None if schedule.registration_start.is_some() && now < start => {
            return Lifecycle::new(Upcoming, SubStatus::RegistrationOpen);
        }
        _ => {}
    }
    if now < start {
        return Lifecycle::new(Upcoming, SubStatus::RegistrationClosed);
    }
    if now < end {
        return Lifecycle::new(Ongoing, SubStatus::EventStarted);
    }
    if schedule.certificate_end.is_none_or(|ce| now < ce) {
        return Lifecycle::new(Ongoing, SubStatus::CertificateAvailable);
    }
    Lifecycle::new(Completed, SubStatus::EventEnded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 9, 1, 8, 0, 0).unwrap()
    }

    fn h(hours: i64) -> DateTime<Utc> {
        t0() + Duration::hours(hours)
    }

    fn l(status: EventStatus, sub: SubStatus) -> Lifecycle {
        Lifecycle::new(status, sub)
    }

    fn full_schedule() -> EventSchedule {
        EventSchedule {
            registration_start: Some(h(1)),
            registration_end: Some(h(2)),
            occurrence_start: Some(h(3)),
            occurrence_end: Some(h(4)),
            certificate_start: Some(h(4)),
            certificate_end: Some(h(6)),
        }
    }

    #[test]
    fn test_registration_to_ongoing_walkthrough() {
        let schedule = EventSchedule {
            certificate_start: None,
            certificate_end: None,
            ..full_schedule()
        };
        let half = Duration::minutes(30);

        assert_eq!(
            calculate(&schedule, t0()),
            l(EventStatus::Upcoming, SubStatus::RegistrationNotStarted)
        );
        assert_eq!(
            calculate(&schedule, h(1) + half),
            l(EventStatus::Upcoming, SubStatus::RegistrationOpen)
        );
        assert_eq!(
            calculate(&schedule, h(3) + half),
            l(EventStatus::Ongoing, SubStatus::EventStarted)
        );
        assert_eq!(
            calculate(&schedule, h(4) + half),
            l(EventStatus::Ongoing, SubStatus::CertificateAvailable)
        );
        // No certificate_end: stays available indefinitely.
        assert_eq!(
            calculate(&schedule, h(24 * 365)),
            l(EventStatus::Ongoing, SubStatus::CertificateAvailable)
        );
    }

    #[test]
    fn test_certificate_window_closes() {
        let schedule = EventSchedule {
            occurrence_start: Some(t0()),
            occurrence_end: Some(h(1)),
            certificate_end: Some(h(2)),
            ..Default::default()
        };
        assert_eq!(
            calculate(&schedule, h(1) + Duration::minutes(30)),
            l(EventStatus::Ongoing, SubStatus::CertificateAvailable)
        );
        assert_eq!(
            calculate(&schedule, h(2) + Duration::minutes(5)),
            l(EventStatus::Completed, SubStatus::EventEnded)
        );
    }

    #[test]
    fn test_missing_occurrence_is_draft() {
        let schedule = EventSchedule {
            occurrence_start: None,
            ..full_schedule()
        };
        for now in [t0() - Duration::days(30), t0(), h(5), h(24 * 400)] {
            assert_eq!(calculate(&schedule, now), Lifecycle::DRAFT);
        }
        let schedule = EventSchedule {
            occurrence_end: None,
            ..full_schedule()
        };
        assert_eq!(calculate(&schedule, h(3)), Lifecycle::DRAFT);
    }

    #[test]
    fn test_missing_registration_start_counts_as_open() {
        let schedule = EventSchedule {
            registration_start: None,
            ..full_schedule()
        };
        assert_eq!(
            calculate(&schedule, t0() - Duration::days(10)),
            l(EventStatus::Upcoming, SubStatus::RegistrationOpen)
        );
        assert_eq!(
            calculate(&schedule, h(2)),
            l(EventStatus::Upcoming, SubStatus::RegistrationClosed)
        );
    }

    #[test]
    fn test_missing_registration_end_open_until_start() {
        let schedule = EventSchedule {
            registration_end: None,
            ..full_schedule()
        };
        assert_eq!(
            calculate(&schedule, h(2)),
            l(EventStatus::Upcoming, SubStatus::RegistrationOpen)
        );
        assert_eq!(
            calculate(&schedule, h(3)),
            l(EventStatus::Ongoing, SubStatus::EventStarted)
        );
    }

    #[test]
    fn test_no_registration_window_is_closed_before_start() {
        let schedule = EventSchedule {
            occurrence_start: Some(h(3)),
            occurrence_end: Some(h(4)),
            ..Default::default()
        };
        assert_eq!(
            calculate(&schedule, t0()),
            l(EventStatus::Upcoming, SubStatus::RegistrationClosed)
        );
    }

    #[test]
    fn test_boundaries_flip_to_adjacent_state() {
        let schedule = full_schedule();
        let eps = Duration::microseconds(1);
        let boundaries = [
            (h(1), SubStatus::RegistrationNotStarted, SubStatus::RegistrationOpen),
            (h(2), SubStatus::RegistrationOpen, SubStatus::RegistrationClosed),
            (h(3), SubStatus::RegistrationClosed, SubStatus::EventStarted),
            (h(4), SubStatus::EventStarted, SubStatus::CertificateAvailable),
            (h(6), SubStatus::CertificateAvailable, SubStatus::EventEnded),
        ];
        for (at, before, after) in boundaries {
            assert_eq!(calculate(&schedule, at - eps).sub_status, before, "before {at}");
            assert_eq!(calculate(&schedule, at).sub_status, after, "at {at}");
            assert_eq!(calculate(&schedule, at + eps).sub_status, after, "after {at}");
        }
    }

    #[test]
    fn test_idempotent() {
        let schedule = full_schedule();
        for offset in 0..8 {
            let now = h(offset) + Duration::minutes(17);
            assert_eq!(calculate(&schedule, now), calculate(&schedule, now));
        }
    }
}
