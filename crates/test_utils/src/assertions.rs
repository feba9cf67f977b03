//! Custom Test Assertions
//!
//! Assertion helpers for calculation outcomes that report the whole
//! outcome on failure instead of a bare `false`.

use domain_bonus::{CalculationHistoryRecord, CalculationOutcome, SkipReason};

/// Asserts that `code` was accepted with exactly `points`
pub fn assert_accepted(outcome: &CalculationOutcome, code: &str, points: i32) {
    match outcome.result_for(code) {
        Some(result) => assert_eq!(
            result.points, points,
            "'{}' accepted with {} points, expected {}",
            code, result.points, points
        ),
        None => panic!(
            "Expected '{}' to be accepted; results={:?}, skipped={:?}",
            code,
            outcome.results.iter().map(|r| &r.code).collect::<Vec<_>>(),
            outcome.skipped
        ),
    }
}

/// Asserts that `code` was not accepted
pub fn assert_not_accepted(outcome: &CalculationOutcome, code: &str) {
    assert!(
        outcome.result_for(code).is_none(),
        "Expected '{}' not to be accepted, results={:?}",
        code,
        outcome.results.iter().map(|r| (&r.code, r.points)).collect::<Vec<_>>()
    );
}

/// Asserts that `code` was skipped for a reason matching the predicate
pub fn assert_skipped<F>(outcome: &CalculationOutcome, code: &str, predicate: F)
where
    F: Fn(&SkipReason) -> bool,
{
    match outcome.skip_for(code) {
        Some(skip) => assert!(
            predicate(&skip.reason),
            "'{}' skipped for an unexpected reason: {:?}",
            code,
            skip.reason
        ),
        None => panic!(
            "Expected '{}' to be skipped; skipped={:?}",
            code,
            outcome.skipped.iter().map(|s| &s.code).collect::<Vec<_>>()
        ),
    }
}

/// Asserts that the history rows mirror the outcome's results, in order
pub fn assert_history_matches(outcome: &CalculationOutcome, rows: &[CalculationHistoryRecord]) {
    let expected: Vec<_> = outcome
        .results
        .iter()
        .map(|r| (r.definition_id, r.code.as_str(), r.points))
        .collect();
    let actual: Vec<_> = rows
        .iter()
        .map(|r| (r.definition_id, r.code.as_str(), r.points))
        .collect();
    assert_eq!(actual, expected, "History rows do not match calculation results");
}
