//! Deadline scheduling for the timed-release flow.
//!
//! The portal opens a given date for booking exactly `window_days` before
//! it, at midnight. A run logs in slightly ahead of that instant
//! (`login_lead`), submits its search, then sleeps until the release
//! instant before refreshing the result list.

use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use tracing::{debug, info};

/// Slept once after waking at the search checkpoint, before the refresh.
/// Absorbs clock skew between this machine and the portal.
pub const SAFETY_MARGIN: Duration = Duration::from_millis(500);

/// How far ahead of the release instant to perform login and search setup.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct BookingWindowPolicy {
    /// Days before the target date at which the portal opens bookings.
    #[serde(default = "default_window_days")]
    pub window_days: i64,

    /// Minutes before the release instant to log in and stage the search.
    #[serde(default = "default_login_lead_minutes")]
    pub login_lead_minutes: i64,
}

fn default_window_days() -> i64 {
    7
}

fn default_login_lead_minutes() -> i64 {
    2
}

impl Default for BookingWindowPolicy {
    fn default() -> Self {
        Self {
            window_days: default_window_days(),
            login_lead_minutes: default_login_lead_minutes(),
        }
    }
}

impl BookingWindowPolicy {
    pub fn login_lead(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.login_lead_minutes)
    }
}

/// The two instants a timed run wakes at. Computed once per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoints {
    pub login_at: NaiveDateTime,
    pub search_at: NaiveDateTime,
    /// False when the booking window was already open at computation time
    /// and both checkpoints collapsed to "now".
    pub deferred: bool,
}

/// Compute login and search checkpoints for `target` (midnight of the
/// reservation date). `now` is passed in rather than read here so the
/// arithmetic is deterministic under test; callers pass
/// `Local::now().naive_local()`.
///
/// Holds `login_at <= search_at <= target` in both branches.
pub fn compute_checkpoints(
    target: NaiveDateTime,
    policy: &BookingWindowPolicy,
    now: NaiveDateTime,
) -> Checkpoints {
    let window = chrono::Duration::days(policy.window_days);

    if target - now >= window {
        let search_at = target - window;
        Checkpoints {
            login_at: search_at - policy.login_lead(),
            search_at,
            deferred: true,
        }
    } else {
        // Window already open; no waiting.
        Checkpoints {
            login_at: now,
            search_at: now,
            deferred: false,
        }
    }
}

/// Block until wall-clock time reaches `deadline`. Returns immediately for
/// past deadlines.
///
/// Re-reads the clock every iteration instead of trusting one long sleep;
/// the wait can span days and the process may be suspended in between.
pub async fn wait_until(deadline: NaiveDateTime) {
    loop {
        let now = Local::now().naive_local();
        if now >= deadline {
            debug!(%deadline, "deadline reached");
            return;
        }
        let remaining = (deadline - now)
            .to_std()
            .unwrap_or(Duration::from_millis(1));
        info!(%deadline, remaining_secs = remaining.as_secs(), "sleeping until deadline");
        tokio::time::sleep(remaining).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn far_target_defers_both_checkpoints() {
        let policy = BookingWindowPolicy::default();
        let now = at(2026, 4, 1, 9);
        let target = at(2026, 4, 19, 0);

        let cps = compute_checkpoints(target, &policy, now);

        assert!(cps.deferred);
        assert_eq!(cps.search_at, at(2026, 4, 12, 0));
        assert_eq!(cps.search_at - cps.login_at, policy.login_lead());
        assert!(cps.login_at < cps.search_at);
        assert!(cps.search_at <= target);
    }

    #[test]
    fn near_target_collapses_to_now() {
        let policy = BookingWindowPolicy::default();
        let now = at(2026, 4, 15, 9);
        let target = at(2026, 4, 19, 0);

        let cps = compute_checkpoints(target, &policy, now);

        assert!(!cps.deferred);
        assert_eq!(cps.login_at, now);
        assert_eq!(cps.search_at, now);
    }

    #[test]
    fn exactly_at_window_boundary_still_defers() {
        let policy = BookingWindowPolicy::default();
        let now = at(2026, 4, 12, 0);
        let target = at(2026, 4, 19, 0);

        let cps = compute_checkpoints(target, &policy, now);

        assert!(cps.deferred);
        assert_eq!(cps.search_at, now);
    }

    #[tokio::test]
    async fn wait_until_past_deadline_returns_immediately() {
        let deadline = Local::now().naive_local() - chrono::Duration::hours(1);
        let start = std::time::Instant::now();
        wait_until(deadline).await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }
}
