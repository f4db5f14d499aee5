//! Domain-level error taxonomy for testgen.

use std::path::PathBuf;

/// Testgen domain errors.
///
/// Per-module errors (`Generation`, `RetriesExhausted`) are resolved to a
/// terminal module outcome by the orchestrator and never abort a run.
/// `BackendUnavailable` degrades the affected stage. Only infrastructure
/// errors (`Io` on the tree itself, `StateCorruption` that cannot be
/// recovered) surface to the caller.
#[derive(Debug, thiserror::Error)]
pub enum TestgenError {
    #[error("backend unavailable: {backend}: {reason}")]
    BackendUnavailable {
        backend: &'static str,
        reason: String,
    },

    #[error("generation failed on attempt {attempt}: {reason}")]
    Generation { attempt: u32, reason: String },

    #[error("retries exhausted for {module} after {attempts} attempt(s): {last_failure}")]
    RetriesExhausted {
        module: PathBuf,
        attempts: u32,
        last_failure: String,
    },

    #[error("version control error: {0}")]
    Vcs(String),

    #[error("state corruption: {0}")]
    StateCorruption(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl TestgenError {
    /// Whether this error degrades a stage rather than failing the module.
    pub fn is_degradation(&self) -> bool {
        matches!(self, TestgenError::BackendUnavailable { .. })
    }
}

/// Result type for testgen domain operations.
pub type Result<T> = std::result::Result<T, TestgenError>;
