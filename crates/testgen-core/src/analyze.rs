//! Coverage analysis stage.
//!
//! Thin wrapper over the coverage backend that turns measurement failure
//! into the all-uncovered degraded report instead of failing the module:
//! a module we cannot measure gets maximum generation effort, and the
//! orchestrator surfaces the warning.

use std::path::Path;
use std::sync::Arc;

use tracing::warn;

use crate::backend::CoverageBackend;
use crate::domain::coverage::CoverageReport;

/// Result of the ANALYZING stage. Never an error.
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub report: CoverageReport,
    /// Present when measurement degraded to the all-uncovered assumption.
    pub warning: Option<String>,
}

/// Measures module coverage, degrading gracefully when the backend cannot run.
pub struct CoverageAnalyzer {
    backend: Arc<dyn CoverageBackend>,
}

impl CoverageAnalyzer {
    pub fn new(backend: Arc<dyn CoverageBackend>) -> Self {
        Self { backend }
    }

    /// Analyze `module` within `work_dir`, exercising `test_file` if present.
    pub async fn analyze(
        &self,
        work_dir: &Path,
        module: &Path,
        test_file: Option<&Path>,
    ) -> AnalysisOutcome {
        match self.backend.measure(work_dir, module, test_file).await {
            Ok(report) => AnalysisOutcome {
                report,
                warning: None,
            },
            Err(e) => {
                warn!(module = %module.display(), error = %e, "coverage unavailable, assuming fully uncovered");
                AnalysisOutcome {
                    report: CoverageReport::degraded(module),
                    warning: Some(format!("coverage unavailable for {}: {e}", module.display())),
                }
            }
        }
    }
}
