//! Pluggable backend contracts.
//!
//! Each external collaborator is a capability trait with one method and one
//! failure mode, so the pipeline depends only on the interface and tests can
//! substitute deterministic stubs:
//! - [`DiffSource`] — version-control diff + marker capture
//! - [`CoverageBackend`] — per-module coverage measurement
//! - [`GenerationService`] — opaque candidate-test synthesis
//! - [`TestHarness`] — test execution in a working copy

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::coverage::CoverageReport;
use crate::domain::error::Result;

pub mod coverage_cmd;
pub mod git;
pub mod harness;
pub mod http_gen;

pub use coverage_cmd::{CommandCoverageBackend, CoverageCommandConfig};
pub use git::{is_git_repo, DiffMode, GitDiffSource};
pub use harness::{HarnessConfig, ProcessHarness};
pub use http_gen::{HttpGenerationConfig, HttpGenerationService};

/// Version-control collaborator: changed paths since a marker, plus the
/// current marker for commit at the end of a run.
#[async_trait]
pub trait DiffSource: Send + Sync {
    /// Paths changed since `since` (an opaque marker such as a commit SHA).
    /// With no marker the source may return an empty set; the detector then
    /// falls back to a full tree scan.
    async fn changed_paths(&self, since: Option<&str>) -> Result<Vec<PathBuf>>;

    /// The marker identifying the current state of the tree.
    async fn current_marker(&self) -> Result<String>;
}

/// Coverage measurement collaborator.
#[async_trait]
pub trait CoverageBackend: Send + Sync {
    /// Measure coverage of `module` within the tree rooted at `work_dir`,
    /// exercising `test_file` when present. Must be deterministic for fixed
    /// module and test content.
    async fn measure(
        &self,
        work_dir: &Path,
        module: &Path,
        test_file: Option<&Path>,
    ) -> Result<CoverageReport>;
}

/// Context handed to the generation service for one attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub module: PathBuf,
    pub module_source: String,
    /// Rendered uncovered regions, e.g. `["line 12", "branch 14->0"]`.
    /// Empty when measurement was degraded (all-uncovered assumption).
    pub coverage_gaps: Vec<String>,
    /// Existing test file content, when discovery found one.
    pub existing_tests: Option<String>,
    pub attempt: u32,
    /// Accumulated failure output from prior rejected attempts.
    pub feedback: Vec<String>,
}

/// Opaque candidate-test synthesis collaborator. Must respect the
/// caller-supplied timeout carried in its configuration.
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Produce candidate test source for the request, or fail with a
    /// generation error (timeout, malformed or empty output).
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;
}

/// Result of one harness execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarnessRun {
    pub passed: bool,
    /// Combined captured stdout/stderr.
    pub output: String,
    pub duration_ms: u64,
}

/// Test execution collaborator, always pointed at an isolated working copy.
#[async_trait]
pub trait TestHarness: Send + Sync {
    /// Run the test suite inside `work_dir` and report pass/fail plus
    /// captured output. Absence of the harness binary is
    /// `TestgenError::BackendUnavailable`, never a silent pass.
    async fn execute(&self, work_dir: &Path) -> Result<HarnessRun>;
}
