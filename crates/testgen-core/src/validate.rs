//! Candidate validation.
//!
//! Four gates, each mandatory, evaluated in order:
//! 1. static well-formedness of the candidate source
//! 2. execution under the test harness in an isolated working copy
//! 3. coverage delta versus the pre-generation baseline (must not regress)
//! 4. additive-only with respect to pre-existing test functions
//!
//! The validator never touches the permanent test file; only the
//! orchestrator writes, and only after acceptance.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use regex::Regex;
use tracing::{debug, warn};

use crate::backend::{CoverageBackend, TestHarness};
use crate::discover::TestFile;
use crate::domain::attempt::{RejectReason, ValidationResult};
use crate::domain::coverage::CoverageReport;
use crate::domain::error::{Result, TestgenError};

/// Everything validation needs about the module under test.
pub struct ValidationContext<'a> {
    /// Live tree root. Read-only for the validator.
    pub root: &'a Path,
    /// Module path relative to the root.
    pub module: &'a Path,
    /// Conventional test path relative to the root.
    pub test_path: &'a Path,
    /// Pre-existing test file, when discovery found one.
    pub existing: Option<&'a TestFile>,
    /// Pre-generation coverage snapshot.
    pub baseline: &'a CoverageReport,
    pub attempt: u32,
}

/// Runs candidates through the acceptance gates.
pub struct Validator {
    harness: Arc<dyn TestHarness>,
    coverage: Arc<dyn CoverageBackend>,
    pattern: Regex,
}

impl Validator {
    pub fn new(
        harness: Arc<dyn TestHarness>,
        coverage: Arc<dyn CoverageBackend>,
        pattern: Regex,
    ) -> Self {
        Self {
            harness,
            coverage,
            pattern,
        }
    }

    /// Validate one candidate. Rejections come back as a failing
    /// [`ValidationResult`]; only infrastructure failures (scratch staging
    /// I/O) are errors.
    pub async fn validate(
        &self,
        ctx: &ValidationContext<'_>,
        candidate: &str,
    ) -> Result<ValidationResult> {
        // Gate 1: well-formedness. No execution for garbage.
        if let Some(problem) = self.well_formedness_problem(candidate) {
            debug!(module = %ctx.module.display(), attempt = ctx.attempt, problem = %problem, "candidate rejected before execution");
            return Ok(ValidationResult::rejected(
                ctx.attempt,
                RejectReason::Malformed,
                problem,
                0.0,
            ));
        }

        // Gate 2: execute in an isolated working copy, never the live tree.
        let scratch = tempfile::tempdir()?;
        stage_working_copy(ctx.root, scratch.path())?;
        let staged_test = scratch.path().join(ctx.test_path);
        if let Some(parent) = staged_test.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&staged_test, candidate)?;

        let run = match self.harness.execute(scratch.path()).await {
            Ok(run) => run,
            Err(TestgenError::BackendUnavailable { reason, .. }) => {
                warn!(module = %ctx.module.display(), %reason, "harness unavailable; candidate cannot be validated");
                return Ok(ValidationResult::rejected(
                    ctx.attempt,
                    RejectReason::HarnessUnavailable,
                    format!("harness unavailable: {reason}"),
                    0.0,
                ));
            }
            Err(e) => return Err(e),
        };

        if !run.passed {
            return Ok(ValidationResult::rejected(
                ctx.attempt,
                RejectReason::ExecutionFailed,
                run.output,
                0.0,
            ));
        }

        // Gate 3: re-measure with the candidate merged in; coverage must
        // not regress versus the baseline.
        let mut output = run.output;
        let delta = match self
            .coverage
            .measure(scratch.path(), ctx.module, Some(ctx.test_path))
            .await
        {
            Ok(report) => report.delta_from(ctx.baseline),
            Err(e) => {
                warn!(module = %ctx.module.display(), error = %e, "coverage re-measure unavailable; delta unverified");
                output.push_str(&format!("\ncoverage re-measure unavailable: {e}"));
                0.0
            }
        };
        if delta < 0.0 {
            return Ok(ValidationResult::rejected(
                ctx.attempt,
                RejectReason::CoverageRegressed,
                format!("coverage delta {delta:+.2} points versus baseline"),
                delta,
            ));
        }

        // Gate 4: the candidate must keep every pre-existing test function.
        if let Some(existing) = ctx.existing {
            let kept: Vec<String> = extract_names(&self.pattern, candidate);
            let dropped: Vec<String> = extract_names(&self.pattern, &existing.content)
                .into_iter()
                .filter(|name| !kept.contains(name))
                .collect();
            if !dropped.is_empty() {
                return Ok(ValidationResult::rejected(
                    ctx.attempt,
                    RejectReason::DestructiveEdit,
                    format!("candidate drops existing tests: [{}]", dropped.join(", ")),
                    delta,
                ));
            }
        }

        Ok(ValidationResult::accepted(ctx.attempt, output, delta))
    }

    /// Gate-1 check. Returns a description of the first problem found.
    fn well_formedness_problem(&self, candidate: &str) -> Option<String> {
        if candidate.trim().is_empty() {
            return Some("candidate is empty".to_string());
        }
        if !self.pattern.is_match(candidate) {
            return Some("candidate defines no test functions".to_string());
        }
        if let Some(problem) = unbalanced_delimiters(candidate) {
            return Some(problem);
        }
        None
    }
}

fn extract_names(pattern: &Regex, content: &str) -> Vec<String> {
    pattern
        .captures_iter(content)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

/// Cheap structural check: parens, brackets and braces must balance
/// (string/comment contents are not interpreted; generation output that
/// trips this is mangled enough to reject without execution).
fn unbalanced_delimiters(source: &str) -> Option<String> {
    let mut stack = Vec::new();
    for c in source.chars() {
        match c {
            '(' | '[' | '{' => stack.push(c),
            ')' => {
                if stack.pop() != Some('(') {
                    return Some("unbalanced ')'".to_string());
                }
            }
            ']' => {
                if stack.pop() != Some('[') {
                    return Some("unbalanced ']'".to_string());
                }
            }
            '}' => {
                if stack.pop() != Some('{') {
                    return Some("unbalanced '}'".to_string());
                }
            }
            _ => {}
        }
    }
    if let Some(open) = stack.pop() {
        return Some(format!("unclosed '{open}'"));
    }
    None
}

/// Mirror the live tree into `scratch`, skipping dot-entries (VCS metadata,
/// the state directory) so candidate execution cannot leak back.
fn stage_working_copy(root: &Path, scratch: &Path) -> Result<()> {
    copy_dir(root, scratch)
}

fn copy_dir(from: &Path, to: &Path) -> Result<()> {
    std::fs::create_dir_all(to)?;
    for entry in std::fs::read_dir(from)? {
        let entry = entry?;
        let name = entry.file_name();
        if name.to_string_lossy().starts_with('.') {
            continue;
        }
        let src = entry.path();
        let dst: PathBuf = to.join(&name);
        if src.is_dir() {
            copy_dir(&src, &dst)?;
        } else {
            std::fs::copy(&src, &dst)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::BTreeSet;
    use std::sync::Mutex;

    use crate::backend::HarnessRun;
    use crate::config::RunnerConfig;
    use crate::domain::coverage::Region;

    struct StubHarness {
        outcome: Mutex<Option<Result<HarnessRun>>>,
        seen_candidate: Mutex<Option<String>>,
        test_rel: PathBuf,
    }

    impl StubHarness {
        fn passing() -> Self {
            Self::with(Ok(HarnessRun {
                passed: true,
                output: "2 passed".to_string(),
                duration_ms: 10,
            }))
        }

        fn failing(output: &str) -> Self {
            Self::with(Ok(HarnessRun {
                passed: false,
                output: output.to_string(),
                duration_ms: 10,
            }))
        }

        fn unavailable() -> Self {
            Self::with(Err(TestgenError::BackendUnavailable {
                backend: "harness",
                reason: "pytest not installed".to_string(),
            }))
        }

        fn with(outcome: Result<HarnessRun>) -> Self {
            Self {
                outcome: Mutex::new(Some(outcome)),
                seen_candidate: Mutex::new(None),
                test_rel: PathBuf::from("tests/test_m.py"),
            }
        }
    }

    #[async_trait]
    impl TestHarness for StubHarness {
        async fn execute(&self, work_dir: &Path) -> Result<HarnessRun> {
            // Record what the scratch copy held, to assert isolation.
            let staged = work_dir.join(&self.test_rel);
            if staged.exists() {
                *self.seen_candidate.lock().unwrap() =
                    Some(std::fs::read_to_string(staged).unwrap());
            }
            self.outcome.lock().unwrap().take().expect("single call")
        }
    }

    struct StubCoverage {
        report: Option<CoverageReport>,
    }

    #[async_trait]
    impl CoverageBackend for StubCoverage {
        async fn measure(
            &self,
            _work_dir: &Path,
            module: &Path,
            _test_file: Option<&Path>,
        ) -> Result<CoverageReport> {
            match &self.report {
                Some(r) => Ok(r.clone()),
                None => Err(TestgenError::BackendUnavailable {
                    backend: "coverage",
                    reason: format!("no data for {}", module.display()),
                }),
            }
        }
    }

    fn report(covered: &[u32], uncovered: &[u32]) -> CoverageReport {
        CoverageReport::new(
            "src/m.py",
            covered.iter().map(|l| Region::line(*l)).collect::<BTreeSet<_>>(),
            uncovered.iter().map(|l| Region::line(*l)).collect::<BTreeSet<_>>(),
        )
    }

    fn validator(harness: StubHarness, coverage: StubCoverage) -> Validator {
        Validator::new(
            Arc::new(harness),
            Arc::new(coverage),
            RunnerConfig::default().test_pattern().unwrap(),
        )
    }

    fn live_tree() -> tempfile::TempDir {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("src")).unwrap();
        std::fs::create_dir_all(root.path().join("tests")).unwrap();
        std::fs::write(root.path().join("src/m.py"), "def f():\n    return 1\n").unwrap();
        root
    }

    const GOOD_CANDIDATE: &str = "def test_f():\n    assert f() == 1\n";

    #[tokio::test]
    async fn accepts_passing_non_regressing_candidate() {
        let root = live_tree();
        let baseline = report(&[1], &[2]);
        let v = validator(
            StubHarness::passing(),
            StubCoverage {
                report: Some(report(&[1, 2], &[])),
            },
        );

        let result = v
            .validate(
                &ValidationContext {
                    root: root.path(),
                    module: Path::new("src/m.py"),
                    test_path: Path::new("tests/test_m.py"),
                    existing: None,
                    baseline: &baseline,
                    attempt: 1,
                },
                GOOD_CANDIDATE,
            )
            .await
            .unwrap();

        assert!(result.passed);
        assert!(result.coverage_delta > 0.0);
    }

    #[tokio::test]
    async fn malformed_candidate_rejected_without_execution() {
        let root = live_tree();
        let baseline = report(&[], &[1]);
        // Harness would panic if called twice; a Malformed rejection must
        // not consume it at all.
        let harness = StubHarness::passing();
        let v = validator(harness, StubCoverage { report: None });

        let result = v
            .validate(
                &ValidationContext {
                    root: root.path(),
                    module: Path::new("src/m.py"),
                    test_path: Path::new("tests/test_m.py"),
                    existing: None,
                    baseline: &baseline,
                    attempt: 1,
                },
                "def test_broken(:\n    assert (1\n",
            )
            .await
            .unwrap();

        assert!(!result.passed);
        assert_eq!(result.reject_reason, Some(RejectReason::Malformed));
    }

    #[tokio::test]
    async fn candidate_without_tests_is_malformed() {
        let root = live_tree();
        let baseline = report(&[], &[1]);
        let v = validator(StubHarness::passing(), StubCoverage { report: None });

        let result = v
            .validate(
                &ValidationContext {
                    root: root.path(),
                    module: Path::new("src/m.py"),
                    test_path: Path::new("tests/test_m.py"),
                    existing: None,
                    baseline: &baseline,
                    attempt: 1,
                },
                "x = 1\n",
            )
            .await
            .unwrap();
        assert_eq!(result.reject_reason, Some(RejectReason::Malformed));
    }

    #[tokio::test]
    async fn failing_execution_rejected_with_output() {
        let root = live_tree();
        let baseline = report(&[], &[1]);
        let v = validator(
            StubHarness::failing("AssertionError: expected 2"),
            StubCoverage { report: None },
        );

        let result = v
            .validate(
                &ValidationContext {
                    root: root.path(),
                    module: Path::new("src/m.py"),
                    test_path: Path::new("tests/test_m.py"),
                    existing: None,
                    baseline: &baseline,
                    attempt: 2,
                },
                GOOD_CANDIDATE,
            )
            .await
            .unwrap();

        assert!(!result.passed);
        assert_eq!(result.reject_reason, Some(RejectReason::ExecutionFailed));
        assert!(result.output.contains("AssertionError"));
    }

    #[tokio::test]
    async fn coverage_regression_rejected() {
        let root = live_tree();
        let baseline = report(&[1, 2, 3], &[4]);
        let v = validator(
            StubHarness::passing(),
            StubCoverage {
                report: Some(report(&[1], &[2, 3, 4])),
            },
        );

        let result = v
            .validate(
                &ValidationContext {
                    root: root.path(),
                    module: Path::new("src/m.py"),
                    test_path: Path::new("tests/test_m.py"),
                    existing: None,
                    baseline: &baseline,
                    attempt: 1,
                },
                GOOD_CANDIDATE,
            )
            .await
            .unwrap();

        assert_eq!(result.reject_reason, Some(RejectReason::CoverageRegressed));
        assert!(result.coverage_delta < 0.0);
    }

    #[tokio::test]
    async fn destructive_candidate_rejected() {
        let root = live_tree();
        let baseline = report(&[], &[1]);
        let existing = TestFile {
            path: PathBuf::from("tests/test_m.py"),
            content: "def test_keep_me():\n    pass\n".to_string(),
        };
        let v = validator(
            StubHarness::passing(),
            StubCoverage {
                report: Some(report(&[1], &[])),
            },
        );

        let result = v
            .validate(
                &ValidationContext {
                    root: root.path(),
                    module: Path::new("src/m.py"),
                    test_path: Path::new("tests/test_m.py"),
                    existing: Some(&existing),
                    baseline: &baseline,
                    attempt: 1,
                },
                GOOD_CANDIDATE,
            )
            .await
            .unwrap();

        assert_eq!(result.reject_reason, Some(RejectReason::DestructiveEdit));
        assert!(result.output.contains("test_keep_me"));
    }

    #[tokio::test]
    async fn superset_candidate_passes_additive_gate() {
        let root = live_tree();
        let baseline = report(&[], &[1]);
        let existing = TestFile {
            path: PathBuf::from("tests/test_m.py"),
            content: "def test_keep_me():\n    pass\n".to_string(),
        };
        let v = validator(
            StubHarness::passing(),
            StubCoverage {
                report: Some(report(&[1], &[])),
            },
        );

        let candidate = "def test_keep_me():\n    pass\n\ndef test_f():\n    assert f() == 1\n";
        let result = v
            .validate(
                &ValidationContext {
                    root: root.path(),
                    module: Path::new("src/m.py"),
                    test_path: Path::new("tests/test_m.py"),
                    existing: Some(&existing),
                    baseline: &baseline,
                    attempt: 1,
                },
                candidate,
            )
            .await
            .unwrap();
        assert!(result.passed);
    }

    #[tokio::test]
    async fn harness_absence_is_flagged_not_accepted() {
        let root = live_tree();
        let baseline = report(&[], &[1]);
        let v = validator(StubHarness::unavailable(), StubCoverage { report: None });

        let result = v
            .validate(
                &ValidationContext {
                    root: root.path(),
                    module: Path::new("src/m.py"),
                    test_path: Path::new("tests/test_m.py"),
                    existing: None,
                    baseline: &baseline,
                    attempt: 1,
                },
                GOOD_CANDIDATE,
            )
            .await
            .unwrap();

        assert!(!result.passed);
        assert_eq!(
            result.reject_reason,
            Some(RejectReason::HarnessUnavailable)
        );
    }

    #[tokio::test]
    async fn candidate_executes_in_scratch_never_live_tree() {
        let root = live_tree();
        std::fs::write(root.path().join("tests/test_m.py"), "def test_old(): pass\n").unwrap();
        let baseline = report(&[], &[1]);
        let harness = Arc::new(StubHarness::failing("boom"));
        let v = Validator::new(
            harness.clone(),
            Arc::new(StubCoverage { report: None }),
            RunnerConfig::default().test_pattern().unwrap(),
        );

        let candidate = "def test_old(): pass\n\ndef test_new():\n    assert True\n";
        let _ = v
            .validate(
                &ValidationContext {
                    root: root.path(),
                    module: Path::new("src/m.py"),
                    test_path: Path::new("tests/test_m.py"),
                    existing: None,
                    baseline: &baseline,
                    attempt: 1,
                },
                candidate,
            )
            .await
            .unwrap();

        // The harness saw the candidate in its scratch copy...
        let seen = harness.seen_candidate.lock().unwrap();
        assert_eq!(seen.as_deref(), Some(candidate));
        // ...but the live file is untouched.
        let live = std::fs::read_to_string(root.path().join("tests/test_m.py")).unwrap();
        assert_eq!(live, "def test_old(): pass\n");
    }

    #[test]
    fn delimiter_balance_check() {
        assert!(unbalanced_delimiters("assert f(1) == [2]").is_none());
        assert!(unbalanced_delimiters("assert f(1").is_some());
        assert!(unbalanced_delimiters("assert f 1)").is_some());
        assert!(unbalanced_delimiters("{[()]}").is_none());
        assert!(unbalanced_delimiters("{[}]").is_some());
    }
}
