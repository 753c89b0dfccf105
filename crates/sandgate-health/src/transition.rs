//! Lifecycle transition rules.
//!
//! Pure function from (current status, probe verdict, clock) to the next
//! status. The poller persists the result only when it differs from the
//! current status, so repeated identical verdicts cause no writes.

use std::time::Duration;

use sandgate_state::{Session, SessionStatus};

/// Compute the next status for a session given one probe verdict.
///
/// Rules:
/// - A healthy probe makes a `starting` or `active` session `active`.
/// - An unhealthy probe demotes `active` to `starting`.
/// - An unhealthy probe on a `starting` session past the startup
///   deadline (measured from `created_at`) makes it `failed`.
/// - `terminating`, `deleted`, and `failed` are never changed here; only
///   `starting` sessions can become `failed`.
pub fn next_status(
    session: &Session,
    healthy: bool,
    now: u64,
    startup_deadline: Duration,
) -> SessionStatus {
    match (session.status, healthy) {
        (SessionStatus::Starting | SessionStatus::Active, true) => SessionStatus::Active,
        (SessionStatus::Starting, false)
            if now >= session.created_at.saturating_add(startup_deadline.as_secs()) =>
        {
            SessionStatus::Failed
        }
        (SessionStatus::Starting | SessionStatus::Active, false) => SessionStatus::Starting,
        (other, _) => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEADLINE: Duration = Duration::from_secs(90);

    fn session(status: SessionStatus, created_at: u64) -> Session {
        Session {
            id: "s1".to_string(),
            name: "sandbox-a".to_string(),
            status,
            resource_id: "res-1".to_string(),
            created_at,
            updated_at: created_at,
        }
    }

    #[test]
    fn starting_becomes_active_on_healthy_probe() {
        let s = session(SessionStatus::Starting, 1000);
        assert_eq!(next_status(&s, true, 1005, DEADLINE), SessionStatus::Active);
    }

    #[test]
    fn starting_stays_starting_within_budget() {
        let s = session(SessionStatus::Starting, 1000);
        assert_eq!(next_status(&s, false, 1005, DEADLINE), SessionStatus::Starting);
    }

    #[test]
    fn starting_fails_exactly_at_deadline_not_before() {
        let s = session(SessionStatus::Starting, 1000);
        // One second short of the deadline: still starting.
        assert_eq!(next_status(&s, false, 1089, DEADLINE), SessionStatus::Starting);
        // Exactly at the deadline: failed.
        assert_eq!(next_status(&s, false, 1090, DEADLINE), SessionStatus::Failed);
        // And any time after.
        assert_eq!(next_status(&s, false, 1091, DEADLINE), SessionStatus::Failed);
    }

    #[test]
    fn active_demotes_to_starting_on_unhealthy_probe() {
        let s = session(SessionStatus::Active, 1000);
        assert_eq!(next_status(&s, false, 1050, DEADLINE), SessionStatus::Starting);
    }

    #[test]
    fn active_never_fails_directly() {
        // Only starting sessions may transition to failed, even long
        // past the startup deadline.
        let s = session(SessionStatus::Active, 1000);
        assert_eq!(next_status(&s, false, 2000, DEADLINE), SessionStatus::Starting);
    }

    #[test]
    fn active_stays_active_on_healthy_probe() {
        let s = session(SessionStatus::Active, 1000);
        assert_eq!(next_status(&s, true, 2000, DEADLINE), SessionStatus::Active);
    }

    #[test]
    fn alternating_probes_toggle_between_starting_and_active() {
        let mut s = session(SessionStatus::Starting, 1000);
        for (tick, healthy) in [(1010, true), (1020, false), (1030, true), (1040, false)] {
            s.status = next_status(&s, healthy, tick, DEADLINE);
            let expected = if healthy {
                SessionStatus::Active
            } else {
                SessionStatus::Starting
            };
            assert_eq!(s.status, expected);
        }
    }

    #[test]
    fn terminal_statuses_are_absorbing() {
        for status in [SessionStatus::Deleted, SessionStatus::Failed] {
            let s = session(status, 1000);
            assert_eq!(next_status(&s, true, 2000, DEADLINE), status);
            assert_eq!(next_status(&s, false, 2000, DEADLINE), status);
        }
    }

    #[test]
    fn terminating_is_untouched_by_probes() {
        let s = session(SessionStatus::Terminating, 1000);
        assert_eq!(next_status(&s, true, 2000, DEADLINE), SessionStatus::Terminating);
        assert_eq!(next_status(&s, false, 2000, DEADLINE), SessionStatus::Terminating);
    }

    #[test]
    fn mixed_cohort_in_one_cycle() {
        let now = 10_000;

        // Created 91s ago, failing probe: past the 90s budget.
        let s1 = session(SessionStatus::Starting, now - 91);
        assert_eq!(next_status(&s1, false, now, DEADLINE), SessionStatus::Failed);

        // Created 5s ago, failing probe: still within budget.
        let s2 = session(SessionStatus::Starting, now - 5);
        assert_eq!(next_status(&s2, false, now, DEADLINE), SessionStatus::Starting);

        // Succeeding probe.
        let s3 = session(SessionStatus::Starting, now - 5);
        assert_eq!(next_status(&s3, true, now, DEADLINE), SessionStatus::Active);
    }
}
