//! Retry backoff policy.
//!
//! A fixed ascending ladder of delays, clamped at the top step. The ladder
//! is deliberately simple: the queue is low-volume and the far more
//! important property is that delays are monotone and bounded, so a stuck
//! bridge cannot push retries arbitrarily far apart.

use chrono::{DateTime, Duration, Utc};

/// Default retry budget when no override is configured.
pub const DEFAULT_MAX_RETRIES: i32 = 5;

/// Fixed reschedule delay for circuit-open outcomes, in seconds.
///
/// Circuit-open retries never consume budget, so this delay is separate
/// from the ladder and intentionally short: the circuit usually closes
/// within a minute.
pub const CIRCUIT_OPEN_DELAY_SECS: i64 = 65;

/// Delay ladder in seconds, indexed by attempt number (1-based).
const SCHEDULE_SECS: [i64; 5] = [5, 30, 120, 600, 3600];

/// Maps attempt counts to retry delays.
#[derive(Debug, Clone)]
pub struct RetrySchedule {
    steps: Vec<i64>,
}

impl RetrySchedule {
    /// Creates the standard ladder: 5s, 30s, 2m, 10m, 1h.
    pub fn new() -> Self {
        Self {
            steps: SCHEDULE_SECS.to_vec(),
        }
    }

    /// Creates a ladder from explicit steps, mainly for tests.
    ///
    /// Empty input falls back to the standard ladder.
    pub fn from_steps(steps: Vec<i64>) -> Self {
        if steps.is_empty() {
            return Self::new();
        }
        Self { steps }
    }

    /// Delay before the given attempt, 1-based.
    ///
    /// Attempts beyond the ladder clamp to the last step; attempts below 1
    /// clamp to the first.
    pub fn delay(&self, attempt: i32) -> Duration {
        let index = usize::try_from(attempt.max(1) - 1)
            .unwrap_or(0)
            .min(self.steps.len() - 1);
        Duration::seconds(self.steps[index])
    }

    /// Instant the given attempt becomes due.
    pub fn next_attempt_at(&self, attempt: i32, now: DateTime<Utc>) -> DateTime<Utc> {
        now + self.delay(attempt)
    }

    /// Number of steps in the ladder.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Always false; the ladder is never empty.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl Default for RetrySchedule {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves the retry budget, falling back to the default for absent or
/// non-positive overrides.
pub fn effective_max_retries(configured: Option<i32>) -> i32 {
    match configured {
        Some(max) if max >= 1 => max,
        _ => DEFAULT_MAX_RETRIES,
    }
}

/// Returns true when the retry counter has consumed the budget.
pub fn is_exhausted(retries: i32, max_retries: i32) -> bool {
    retries >= effective_max_retries(Some(max_retries))
}

/// Reschedule instant for a circuit-open outcome.
pub fn circuit_open_retry_at(now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::seconds(CIRCUIT_OPEN_DELAY_SECS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ladder_matches_the_documented_steps() {
        let schedule = RetrySchedule::new();
        assert_eq!(schedule.delay(1), Duration::seconds(5));
        assert_eq!(schedule.delay(2), Duration::seconds(30));
        assert_eq!(schedule.delay(3), Duration::seconds(120));
        assert_eq!(schedule.delay(4), Duration::seconds(600));
        assert_eq!(schedule.delay(5), Duration::seconds(3600));
    }

    #[test]
    fn delays_clamp_to_the_last_step() {
        let schedule = RetrySchedule::new();
        for attempt in [6, 7, 50, i32::MAX] {
            assert_eq!(schedule.delay(attempt), Duration::seconds(3600));
        }
    }

    #[test]
    fn delays_are_monotone_within_the_ladder() {
        let schedule = RetrySchedule::new();
        for attempt in 1..=i32::try_from(schedule.len()).unwrap() {
            assert!(schedule.delay(attempt) <= schedule.delay(attempt + 1));
        }
    }

    #[test]
    fn attempts_below_one_clamp_to_the_first_step() {
        let schedule = RetrySchedule::new();
        assert_eq!(schedule.delay(0), Duration::seconds(5));
        assert_eq!(schedule.delay(-3), Duration::seconds(5));
    }

    #[test]
    fn next_attempt_at_offsets_from_now() {
        let schedule = RetrySchedule::new();
        let now = Utc::now();
        assert_eq!(schedule.next_attempt_at(2, now), now + Duration::seconds(30));
    }

    #[test]
    fn invalid_budget_overrides_fall_back_to_default() {
        assert_eq!(effective_max_retries(None), DEFAULT_MAX_RETRIES);
        assert_eq!(effective_max_retries(Some(0)), DEFAULT_MAX_RETRIES);
        assert_eq!(effective_max_retries(Some(-7)), DEFAULT_MAX_RETRIES);
        assert_eq!(effective_max_retries(Some(3)), 3);
    }

    #[test]
    fn exhaustion_compares_against_the_budget() {
        assert!(!is_exhausted(4, 5));
        assert!(is_exhausted(5, 5));
        assert!(is_exhausted(6, 5));
        // Invalid budget behaves like the default of 5.
        assert!(!is_exhausted(4, 0));
        assert!(is_exhausted(5, 0));
    }

    #[test]
    fn circuit_open_delay_is_fixed() {
        let now = Utc::now();
        assert_eq!(circuit_open_retry_at(now) - now, Duration::seconds(65));
    }

    #[test]
    fn custom_steps_are_respected_and_empty_falls_back() {
        let schedule = RetrySchedule::from_steps(vec![1, 2]);
        assert_eq!(schedule.delay(1), Duration::seconds(1));
        assert_eq!(schedule.delay(9), Duration::seconds(2));
        assert_eq!(RetrySchedule::from_steps(Vec::new()).len(), 5);
    }
}
