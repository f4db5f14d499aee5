//! Process-backed test execution harness.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::debug;

use super::{HarnessRun, TestHarness};
use crate::domain::error::{Result, TestgenError};

/// Configuration for [`ProcessHarness`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Command to execute (first element is the executable).
    pub command: Vec<String>,
    /// Timeout in seconds (0 = no timeout).
    pub timeout_secs: u64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            command: vec!["pytest".to_string()],
            timeout_secs: 120,
        }
    }
}

/// Harness that spawns the configured test command inside a working copy.
///
/// A missing binary is [`TestgenError::BackendUnavailable`] — the caller
/// must surface it, never treat it as a pass. A timeout is an execution
/// failure of the candidate (it may spin forever) and comes back as a
/// failing [`HarnessRun`], eligible for retry like any other failure.
pub struct ProcessHarness {
    config: HarnessConfig,
}

impl ProcessHarness {
    pub fn new(config: HarnessConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl TestHarness for ProcessHarness {
    async fn execute(&self, work_dir: &Path) -> Result<HarnessRun> {
        if self.config.command.is_empty() {
            return Err(TestgenError::InvalidConfig(
                "harness command is empty".to_string(),
            ));
        }

        let start = Instant::now();
        let exe = &self.config.command[0];
        let args = &self.config.command[1..];

        let child = Command::new(exe)
            .args(args)
            .current_dir(work_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| TestgenError::BackendUnavailable {
                backend: "harness",
                reason: format!("failed to spawn {exe}: {e}"),
            })?;

        let output = if self.config.timeout_secs > 0 {
            match tokio::time::timeout(
                Duration::from_secs(self.config.timeout_secs),
                child.wait_with_output(),
            )
            .await
            {
                Ok(result) => result?,
                Err(_) => {
                    return Ok(HarnessRun {
                        passed: false,
                        output: format!(
                            "harness timed out after {} seconds",
                            self.config.timeout_secs
                        ),
                        duration_ms: start.elapsed().as_millis() as u64,
                    });
                }
            }
        } else {
            child.wait_with_output().await?
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let combined = format!("{stdout}{stderr}");

        debug!(
            exit = ?output.status.code(),
            duration_ms,
            "harness run finished"
        );

        Ok(HarnessRun {
            passed: output.status.success(),
            output: combined,
            duration_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn harness(command: Vec<&str>, timeout_secs: u64) -> ProcessHarness {
        ProcessHarness::new(HarnessConfig {
            command: command.into_iter().map(String::from).collect(),
            timeout_secs,
        })
    }

    #[tokio::test]
    async fn passing_command_reports_pass() {
        let dir = tempfile::tempdir().unwrap();
        let run = harness(vec!["echo", "1 passed"], 30)
            .execute(dir.path())
            .await
            .unwrap();
        assert!(run.passed);
        assert!(run.output.contains("1 passed"));
    }

    #[tokio::test]
    async fn failing_command_reports_fail() {
        let dir = tempfile::tempdir().unwrap();
        let run = harness(vec!["false"], 30).execute(dir.path()).await.unwrap();
        assert!(!run.passed);
    }

    #[tokio::test]
    async fn missing_binary_is_backend_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let err = harness(vec!["no-such-test-harness"], 30)
            .execute(dir.path())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TestgenError::BackendUnavailable {
                backend: "harness",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn timeout_is_a_failing_run_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let run = harness(vec!["sleep", "5"], 1)
            .execute(dir.path())
            .await
            .unwrap();
        assert!(!run.passed);
        assert!(run.output.contains("timed out"));
    }

    #[tokio::test]
    async fn runs_in_the_given_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("present.txt"), "x").unwrap();
        let run = harness(vec!["ls"], 30).execute(dir.path()).await.unwrap();
        assert!(run.passed);
        assert!(run.output.contains("present.txt"));
    }
}
