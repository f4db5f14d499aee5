//! Command-backed coverage measurement.
//!
//! Runs a configured coverage tool (e.g. `pytest --cov --cov-report=json`)
//! with a timeout, then parses the JSON report it leaves behind. The JSON
//! schema matches the coverage-JSON convention: a `files` map keyed by
//! relative path, each entry listing executed/missing lines and branches.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::debug;

use super::CoverageBackend;
use crate::domain::coverage::{CoverageReport, Region};
use crate::domain::error::{Result, TestgenError};

/// Configuration for [`CommandCoverageBackend`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoverageCommandConfig {
    /// Command to execute (first element is the executable).
    pub command: Vec<String>,
    /// Report file the command writes, relative to the working directory.
    pub report_path: PathBuf,
    /// Timeout in seconds (0 = no timeout).
    pub timeout_secs: u64,
}

impl Default for CoverageCommandConfig {
    fn default() -> Self {
        Self {
            command: vec![
                "pytest".to_string(),
                "--cov=src".to_string(),
                "--cov-report=json".to_string(),
            ],
            report_path: PathBuf::from("coverage.json"),
            timeout_secs: 300,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CoverageJson {
    #[serde(default)]
    files: BTreeMap<String, FileCoverage>,
}

#[derive(Debug, Default, Deserialize)]
struct FileCoverage {
    #[serde(default)]
    executed_lines: Vec<u32>,
    #[serde(default)]
    missing_lines: Vec<u32>,
    #[serde(default)]
    executed_branches: Vec<[i64; 2]>,
    #[serde(default)]
    missing_branches: Vec<[i64; 2]>,
}

/// Coverage backend that shells out to an external measurement tool.
pub struct CommandCoverageBackend {
    config: CoverageCommandConfig,
}

impl CommandCoverageBackend {
    pub fn new(config: CoverageCommandConfig) -> Self {
        Self { config }
    }

    fn report_for(module: &Path, file: &FileCoverage) -> CoverageReport {
        let covered = file
            .executed_lines
            .iter()
            .map(|l| Region::line(*l))
            .chain(
                file.executed_branches
                    .iter()
                    .map(|[l, a]| Region::branch(*l as u32, *a as i32)),
            )
            .collect();
        let uncovered = file
            .missing_lines
            .iter()
            .map(|l| Region::line(*l))
            .chain(
                file.missing_branches
                    .iter()
                    .map(|[l, a]| Region::branch(*l as u32, *a as i32)),
            )
            .collect();
        CoverageReport::new(module, covered, uncovered)
    }
}

#[async_trait]
impl CoverageBackend for CommandCoverageBackend {
    async fn measure(
        &self,
        work_dir: &Path,
        module: &Path,
        test_file: Option<&Path>,
    ) -> Result<CoverageReport> {
        if self.config.command.is_empty() {
            return Err(TestgenError::InvalidConfig(
                "coverage command is empty".to_string(),
            ));
        }

        let report_file = work_dir.join(&self.config.report_path);
        // Drop any report from a previous invocation so a failed run cannot
        // be mistaken for a fresh measurement.
        if report_file.exists() {
            std::fs::remove_file(&report_file)?;
        }

        let exe = &self.config.command[0];
        let mut args: Vec<String> = self.config.command[1..].to_vec();
        // Scope the run to the module's test file when one exists.
        if let Some(test_file) = test_file {
            args.push(test_file.display().to_string());
        }

        let child = Command::new(exe)
            .args(&args)
            .current_dir(work_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| TestgenError::BackendUnavailable {
                backend: "coverage",
                reason: format!("failed to spawn {exe}: {e}"),
            })?;

        let output = if self.config.timeout_secs > 0 {
            tokio::time::timeout(
                Duration::from_secs(self.config.timeout_secs),
                child.wait_with_output(),
            )
            .await
            .map_err(|_| TestgenError::BackendUnavailable {
                backend: "coverage",
                reason: format!("timed out after {} seconds", self.config.timeout_secs),
            })??
        } else {
            child.wait_with_output().await?
        };

        // Coverage tools exit non-zero when the suite itself fails; the
        // report is still valid measurement data. Only a missing report
        // counts as measurement failure.
        if !report_file.exists() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TestgenError::BackendUnavailable {
                backend: "coverage",
                reason: format!(
                    "no report at {} (exit {:?}): {}",
                    report_file.display(),
                    output.status.code(),
                    stderr.trim()
                ),
            });
        }

        let raw = std::fs::read_to_string(&report_file)?;
        let parsed: CoverageJson =
            serde_json::from_str(&raw).map_err(|e| TestgenError::BackendUnavailable {
                backend: "coverage",
                reason: format!("unreadable report: {e}"),
            })?;

        let key = module.display().to_string();
        let Some(file) = parsed.files.get(&key) else {
            return Err(TestgenError::BackendUnavailable {
                backend: "coverage",
                reason: format!("no coverage data for {key}"),
            });
        };

        debug!(module = %key, executed = file.executed_lines.len(), missing = file.missing_lines.len(), "parsed coverage report");
        Ok(Self::report_for(module, file))
    }
}
