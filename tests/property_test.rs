//! Property-based tests for the pure pieces of the outbox.
//!
//! Uses randomly generated inputs to verify invariants that must hold for
//! any input: backoff delays stay monotone and bounded, phone normalization
//! is idempotent, derived keys never collide, and template rendering never
//! drops resolved placeholders.

use std::collections::HashMap;

use chrono::{Duration, TimeZone, Utc};
use proptest::{prelude::*, test_runner::Config as ProptestConfig};
use zelo_core::{models::format_brl_cents, payload::MessageIntent};
use zelo_outbox::{
    backoff::{circuit_open_retry_at, effective_max_retries, is_exhausted},
    derive_idempotency_key, render_template, BrazilPhoneNormalizer, OutboxError, PhoneNormalizer,
    RetrySchedule, CIRCUIT_OPEN_DELAY_SECS, DEFAULT_MAX_RETRIES,
};

/// Creates property test configuration based on environment.
///
/// Uses environment variables:
/// - `PROPTEST_CASES`: Number of test cases (default: 64)
fn proptest_config() -> ProptestConfig {
    let cases = std::env::var("PROPTEST_CASES").ok().and_then(|s| s.parse().ok()).unwrap_or(64);
    ProptestConfig::with_cases(cases)
}

proptest! {
    #![proptest_config(proptest_config())]

    /// Delays never decrease with the attempt number and never leave the
    /// [5s, 1h] band, no matter how wild the attempt counter gets.
    #[test]
    fn backoff_is_monotone_and_bounded(a in i32::MIN..i32::MAX, b in i32::MIN..i32::MAX) {
        let schedule = RetrySchedule::new();
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(schedule.delay(lo) <= schedule.delay(hi));
        prop_assert!(schedule.delay(hi) >= Duration::seconds(5));
        prop_assert!(schedule.delay(hi) <= Duration::seconds(3600));
    }

    /// The next attempt is always strictly in the future.
    #[test]
    fn backoff_never_schedules_in_the_past(attempt in i32::MIN..i32::MAX) {
        let schedule = RetrySchedule::new();
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        prop_assert!(schedule.next_attempt_at(attempt, now) > now);
    }

    /// A custom ladder indexes 1-based and clamps at both ends.
    #[test]
    fn custom_ladders_clamp_at_both_ends(
        steps in prop::collection::vec(1i64..10_000, 1..8),
        attempt in -10i32..100,
    ) {
        let expected_index = usize::try_from(attempt.max(1) - 1)
            .unwrap()
            .min(steps.len() - 1);
        let expected = Duration::seconds(steps[expected_index]);
        let schedule = RetrySchedule::from_steps(steps);
        prop_assert_eq!(schedule.delay(attempt), expected);
    }

    /// Non-positive budget overrides always fall back to the default, and
    /// exhaustion is consistent with whatever budget comes out.
    #[test]
    fn budget_resolution_is_total(configured in proptest::option::of(i32::MIN..i32::MAX), retries in 0i32..1000) {
        let budget = effective_max_retries(configured);
        prop_assert!(budget >= 1);
        if let Some(max) = configured {
            if max >= 1 {
                prop_assert_eq!(budget, max);
            } else {
                prop_assert_eq!(budget, DEFAULT_MAX_RETRIES);
            }
        }
        prop_assert_eq!(is_exhausted(retries, budget), retries >= budget);
    }

    /// Circuit-open rescheduling is a fixed offset, independent of attempt
    /// history.
    #[test]
    fn circuit_open_delay_is_constant(seconds in 0i64..4_000_000_000) {
        let now = Utc.timestamp_opt(seconds, 0).unwrap();
        prop_assert_eq!(
            circuit_open_retry_at(now) - now,
            Duration::seconds(CIRCUIT_OPEN_DELAY_SECS)
        );
    }

    /// Any accepted Brazilian mobile normalizes to a 14-character E.164
    /// string, and normalizing the output again is a no-op.
    #[test]
    fn phone_normalization_is_idempotent(
        area in 11u64..100,
        subscriber_tail in 0u64..100_000_000,
    ) {
        // Mobile subscribers have nine digits and lead with 9.
        let raw = format!("{area}9{subscriber_tail:08}");
        let phone = BrazilPhoneNormalizer.normalize(&raw).unwrap();
        prop_assert!(phone.as_str().starts_with("+55"));
        prop_assert_eq!(phone.as_str().len(), 14);

        let again = BrazilPhoneNormalizer.normalize(phone.as_str()).unwrap();
        prop_assert_eq!(again, phone);
    }

    /// Eight-digit subscribers are landlines and never pass the gate.
    #[test]
    fn landlines_never_pass(
        area in 11u64..100,
        first in 2u64..9,
        subscriber_tail in 0u64..10_000_000,
    ) {
        let raw = format!("{area}{first}{subscriber_tail:07}");
        prop_assert!(BrazilPhoneNormalizer.normalize(&raw).is_err());
    }

    /// Derived keys are namespaced by intent and never repeat.
    #[test]
    fn derived_keys_are_unique_and_namespaced(text in ".{0,40}") {
        let intent = MessageIntent::SendText { text };
        let first = derive_idempotency_key(&intent);
        let second = derive_idempotency_key(&intent);
        prop_assert!(first.starts_with("zelo:SEND_TEXT:"));
        prop_assert!(second.starts_with("zelo:SEND_TEXT:"));
        prop_assert_ne!(first, second);
    }

    /// Text without placeholders renders to itself.
    #[test]
    fn rendering_without_placeholders_is_identity(text in "[^{}]{0,60}") {
        prop_assert_eq!(render_template(&text, &HashMap::new()).unwrap(), text);
    }

    /// Every occurrence of a resolved placeholder is substituted; none
    /// survive in the output.
    #[test]
    fn resolved_placeholders_never_survive(value in "[^{}]{1,20}") {
        let vars = HashMap::from([("nome".to_string(), value.clone())]);
        let rendered = render_template("Olá {{nome}}, tudo bem, {{nome}}?", &vars).unwrap();
        prop_assert!(!rendered.contains("{{"));
        prop_assert!(rendered.matches(value.as_str()).count() >= 2);
    }

    /// An unresolved placeholder always fails with a terminal error naming
    /// the variable, regardless of what else the template contains.
    #[test]
    fn unresolved_placeholders_are_terminal(prefix in "[^{}]{0,30}") {
        let template = format!("{prefix}{{{{faltando}}}}");
        match render_template(&template, &HashMap::new()) {
            Err(OutboxError::UnresolvedVariable { name }) => prop_assert_eq!(name, "faltando"),
            other => prop_assert!(false, "unexpected result: {other:?}"),
        }
    }

    /// BRL formatting keeps sign, prefix and two decimal places for any
    /// amount a quote could hold.
    #[test]
    fn brl_formatting_is_well_formed(cents in -10_000_000_000i64..10_000_000_000) {
        let formatted = format_brl_cents(cents);
        if cents < 0 {
            prop_assert!(formatted.starts_with("-R$ "));
        } else {
            prop_assert!(formatted.starts_with("R$ "));
        }
        let (_, decimals) = formatted.rsplit_once(',').unwrap();
        prop_assert_eq!(decimals.len(), 2);
        prop_assert_eq!(decimals, format!("{:02}", cents.abs() % 100));
    }
}
