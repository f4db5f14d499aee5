//! Generation attempts and validation results.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One bounded attempt to produce a candidate test file for a module.
///
/// # Invariants
///
/// Attempt numbers are 1-based, strictly increasing per module within a run,
/// and never reused. A module has at most one pending attempt at a time —
/// the orchestrator's per-module loop enforces this structurally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationAttempt {
    pub module: PathBuf,
    pub number: u32,
    /// Candidate test source. Held in memory / scratch space only until a
    /// validation result accepts it.
    pub candidate: String,
    pub requested_at: DateTime<Utc>,
}

/// Why a candidate was rejected by the validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Gate 1: the candidate does not parse as plausible test code.
    Malformed,
    /// Gate 2: the candidate failed under the test execution harness.
    ExecutionFailed,
    /// Gate 3: merging the candidate lowered coverage versus the baseline.
    CoverageRegressed,
    /// Gate 4: the candidate drops pre-existing passing tests.
    DestructiveEdit,
    /// The harness backend is absent; validation cannot run at all.
    HarnessUnavailable,
}

impl RejectReason {
    /// Whether another generation attempt could plausibly fix this.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, RejectReason::HarnessUnavailable)
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RejectReason::Malformed => "candidate is not well-formed test code",
            RejectReason::ExecutionFailed => "candidate failed under the test harness",
            RejectReason::CoverageRegressed => "candidate regressed coverage",
            RejectReason::DestructiveEdit => "candidate removes pre-existing tests",
            RejectReason::HarnessUnavailable => "harness unavailable",
        };
        f.write_str(s)
    }
}

/// Outcome of validating one [`GenerationAttempt`]. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub attempt: u32,
    pub passed: bool,
    /// Captured harness / gate output, fed back into the next attempt.
    pub output: String,
    /// Percentage-point delta versus the pre-generation report.
    pub coverage_delta: f64,
    pub reject_reason: Option<RejectReason>,
}

impl ValidationResult {
    pub fn accepted(attempt: u32, output: String, coverage_delta: f64) -> Self {
        Self {
            attempt,
            passed: true,
            output,
            coverage_delta,
            reject_reason: None,
        }
    }

    pub fn rejected(
        attempt: u32,
        reason: RejectReason,
        output: String,
        coverage_delta: f64,
    ) -> Self {
        Self {
            attempt,
            passed: false,
            output,
            coverage_delta,
            reject_reason: Some(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepted_result_has_no_reject_reason() {
        let result = ValidationResult::accepted(1, "2 passed".to_string(), 12.5);
        assert!(result.passed);
        assert!(result.reject_reason.is_none());
        assert_eq!(result.attempt, 1);
    }

    #[test]
    fn test_rejected_result_carries_reason() {
        let result = ValidationResult::rejected(
            2,
            RejectReason::ExecutionFailed,
            "assertion failed".to_string(),
            0.0,
        );
        assert!(!result.passed);
        assert_eq!(result.reject_reason, Some(RejectReason::ExecutionFailed));
    }

    #[test]
    fn test_harness_unavailable_is_not_retryable() {
        assert!(!RejectReason::HarnessUnavailable.is_retryable());
        assert!(RejectReason::Malformed.is_retryable());
        assert!(RejectReason::ExecutionFailed.is_retryable());
        assert!(RejectReason::CoverageRegressed.is_retryable());
        assert!(RejectReason::DestructiveEdit.is_retryable());
    }

    #[test]
    fn test_reject_reason_serde_snake_case() {
        let json = serde_json::to_string(&RejectReason::CoverageRegressed).unwrap();
        assert_eq!(json, r#""coverage_regressed""#);
    }
}
