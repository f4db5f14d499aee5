//! Test generation stage.
//!
//! Glue between the pipeline and the opaque generation service: assembles
//! the request context (coverage gaps, existing test skeleton, prior failure
//! feedback), stamps the attempt number, and enforces the non-empty
//! candidate contract. Side-effect-free on the permanent tree — candidates
//! live in memory until validation accepts them.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use crate::backend::{GenerationRequest, GenerationService};
use crate::discover::Discovery;
use crate::domain::attempt::GenerationAttempt;
use crate::domain::coverage::CoverageReport;
use crate::domain::error::{Result, TestgenError};

/// Produces candidate test source for a module's coverage gaps.
pub struct TestGenerator {
    service: Arc<dyn GenerationService>,
}

impl TestGenerator {
    pub fn new(service: Arc<dyn GenerationService>) -> Self {
        Self { service }
    }

    /// Run one generation attempt.
    ///
    /// `feedback` carries the captured output of earlier rejected attempts;
    /// the closed loop is bounded by the orchestrator's attempt cap, never
    /// by this call.
    pub async fn generate(
        &self,
        module: &Path,
        module_source: &str,
        report: &CoverageReport,
        discovery: &Discovery,
        attempt: u32,
        feedback: &[String],
    ) -> Result<GenerationAttempt> {
        let request = GenerationRequest {
            module: module.to_path_buf(),
            module_source: module_source.to_string(),
            coverage_gaps: report.gap_descriptions(),
            existing_tests: discovery.test_file().map(|f| f.content.clone()),
            attempt,
            feedback: feedback.to_vec(),
        };

        debug!(
            module = %module.display(),
            attempt,
            gaps = request.coverage_gaps.len(),
            feedback = feedback.len(),
            "requesting candidate"
        );

        let candidate = self.service.generate(&request).await?;
        if candidate.trim().is_empty() {
            return Err(TestgenError::Generation {
                attempt,
                reason: "empty candidate".to_string(),
            });
        }

        Ok(GenerationAttempt {
            module: module.to_path_buf(),
            number: attempt,
            candidate,
            requested_at: Utc::now(),
        })
    }
}
