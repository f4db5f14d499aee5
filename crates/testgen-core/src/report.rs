//! Run reporting: per-module outcomes, summary rendering, exit codes, and
//! the persisted run artifact.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::error::Result;

/// Terminal resolution of one module within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ModuleOutcome {
    /// Candidate accepted and written; stored hash advanced.
    Accepted { attempts: u32 },
    /// All attempts exhausted or validation cannot run; tree untouched.
    Failed { attempts: u32, reason: String },
    /// Nothing to do (no gaps, dry run); counts as success.
    Skipped { reason: String },
    /// Test file was edited outside the pipeline; flagged, never overwritten.
    ManualReview { reason: String },
}

impl ModuleOutcome {
    /// Whether the outcome counts toward a clean exit.
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            ModuleOutcome::Accepted { .. } | ModuleOutcome::Skipped { .. }
        )
    }
}

/// One module's row in the run report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleReport {
    pub module: PathBuf,
    #[serde(flatten)]
    pub outcome: ModuleOutcome,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Full report for one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub schema_version: String,
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Marker committed at the end of the run, when one was available.
    pub marker: Option<String>,
    pub modules: Vec<ModuleReport>,
    /// Run-level warnings (degraded backends, state recovery).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl RunReport {
    pub fn accepted_count(&self) -> usize {
        self.modules
            .iter()
            .filter(|m| matches!(m.outcome, ModuleOutcome::Accepted { .. }))
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.modules
            .iter()
            .filter(|m| matches!(m.outcome, ModuleOutcome::Failed { .. }))
            .count()
    }

    pub fn skipped_count(&self) -> usize {
        self.modules
            .iter()
            .filter(|m| matches!(m.outcome, ModuleOutcome::Skipped { .. }))
            .count()
    }

    pub fn manual_review_count(&self) -> usize {
        self.modules
            .iter()
            .filter(|m| matches!(m.outcome, ModuleOutcome::ManualReview { .. }))
            .count()
    }

    /// True when every module resolved successfully.
    pub fn success(&self) -> bool {
        self.modules.iter().all(|m| m.outcome.is_success())
    }

    /// Exit code for the CLI: 0 all accepted/skipped, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.success() {
            0
        } else {
            1
        }
    }

    /// Human summary, one line per module plus totals.
    pub fn render_summary(&self) -> String {
        let mut out = String::new();
        for module in &self.modules {
            let line = match &module.outcome {
                ModuleOutcome::Accepted { attempts } => {
                    format!(
                        "ACCEPTED  {} (attempt {attempts})",
                        module.module.display()
                    )
                }
                ModuleOutcome::Failed { attempts, reason } => {
                    format!(
                        "FAILED    {} after {attempts} attempt(s): {reason}",
                        module.module.display()
                    )
                }
                ModuleOutcome::Skipped { reason } => {
                    format!("SKIPPED   {} ({reason})", module.module.display())
                }
                ModuleOutcome::ManualReview { reason } => {
                    format!("REVIEW    {} ({reason})", module.module.display())
                }
            };
            out.push_str(&line);
            out.push('\n');
        }
        for warning in &self.warnings {
            out.push_str(&format!("warning: {warning}\n"));
        }
        out.push_str(&format!(
            "{} accepted, {} failed, {} skipped, {} for review\n",
            self.accepted_count(),
            self.failed_count(),
            self.skipped_count(),
            self.manual_review_count(),
        ));
        out
    }

    /// Write the report as a pretty-JSON artifact under `runs_dir`.
    pub fn write_artifact(&self, runs_dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(runs_dir)?;
        let path = runs_dir.join(format!("run-{}.json", self.run_id));
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, content)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(outcomes: Vec<(&str, ModuleOutcome)>) -> RunReport {
        RunReport {
            schema_version: "1".to_string(),
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            marker: Some("abc".to_string()),
            modules: outcomes
                .into_iter()
                .map(|(path, outcome)| ModuleReport {
                    module: PathBuf::from(path),
                    outcome,
                    warnings: Vec::new(),
                })
                .collect(),
            warnings: Vec::new(),
        }
    }

    #[test]
    fn test_counts_and_exit_code() {
        let r = report(vec![
            ("src/a.py", ModuleOutcome::Accepted { attempts: 1 }),
            (
                "src/b.py",
                ModuleOutcome::Failed {
                    attempts: 3,
                    reason: "retries exhausted".to_string(),
                },
            ),
            (
                "src/c.py",
                ModuleOutcome::Skipped {
                    reason: "fully covered".to_string(),
                },
            ),
        ]);

        assert_eq!(r.accepted_count(), 1);
        assert_eq!(r.failed_count(), 1);
        assert_eq!(r.skipped_count(), 1);
        assert!(!r.success());
        assert_eq!(r.exit_code(), 1);
    }

    #[test]
    fn test_all_successful_exits_zero() {
        let r = report(vec![
            ("src/a.py", ModuleOutcome::Accepted { attempts: 2 }),
            (
                "src/b.py",
                ModuleOutcome::Skipped {
                    reason: "no changes".to_string(),
                },
            ),
        ]);
        assert!(r.success());
        assert_eq!(r.exit_code(), 0);
    }

    #[test]
    fn test_empty_run_is_success() {
        let r = report(vec![]);
        assert!(r.success());
        assert_eq!(r.exit_code(), 0);
    }

    #[test]
    fn test_manual_review_is_not_success() {
        let r = report(vec![(
            "src/a.py",
            ModuleOutcome::ManualReview {
                reason: "test file edited outside the pipeline".to_string(),
            },
        )]);
        assert!(!r.success());
    }

    #[test]
    fn test_summary_lists_every_module() {
        let r = report(vec![
            ("src/a.py", ModuleOutcome::Accepted { attempts: 3 }),
            (
                "src/b.py",
                ModuleOutcome::Failed {
                    attempts: 2,
                    reason: "assertion failed".to_string(),
                },
            ),
        ]);
        let summary = r.render_summary();
        assert!(summary.contains("ACCEPTED  src/a.py (attempt 3)"));
        assert!(summary.contains("FAILED    src/b.py after 2 attempt(s)"));
        assert!(summary.contains("1 accepted, 1 failed, 0 skipped, 0 for review"));
    }

    #[test]
    fn test_artifact_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let r = report(vec![("src/a.py", ModuleOutcome::Accepted { attempts: 1 })]);
        let path = r.write_artifact(dir.path()).unwrap();

        let raw = std::fs::read_to_string(path).unwrap();
        let loaded: RunReport = serde_json::from_str(&raw).unwrap();
        assert_eq!(loaded, r);
    }
}
