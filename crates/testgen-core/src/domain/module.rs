//! Module lifecycle state machine and change records.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Pipeline states a module moves through within a single run.
///
/// `Accepted` and `Failed` are terminal for the run. A `Failed` module keeps
/// its prior stored hash, so the next run re-detects it as changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleState {
    Detected,
    Analyzing,
    Discovering,
    Generating,
    Validating,
    Accepted,
    Failed,
}

impl ModuleState {
    /// Whether the state is terminal for this run.
    pub fn is_terminal(self) -> bool {
        matches!(self, ModuleState::Accepted | ModuleState::Failed)
    }

    /// Whether a transition from `self` to `next` is legal.
    ///
    /// ANALYZING and DISCOVERING overlap in time but join before
    /// GENERATING, so both orderings between them are allowed.
    pub fn can_transition_to(self, next: ModuleState) -> bool {
        use ModuleState::*;
        matches!(
            (self, next),
            (Detected, Analyzing)
                | (Analyzing, Discovering)
                | (Discovering, Analyzing)
                | (Analyzing, Generating)
                | (Discovering, Generating)
                | (Generating, Validating)
                | (Validating, Generating)
                | (Validating, Accepted)
                | (Validating, Failed)
                | (Generating, Failed)
        )
    }
}

impl std::fmt::Display for ModuleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ModuleState::Detected => "detected",
            ModuleState::Analyzing => "analyzing",
            ModuleState::Discovering => "discovering",
            ModuleState::Generating => "generating",
            ModuleState::Validating => "validating",
            ModuleState::Accepted => "accepted",
            ModuleState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One detected change for a module. Immutable once created; consumed by the
/// orchestrator and discarded when the run completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Source path relative to the repository root.
    pub module: PathBuf,
    /// Stored hash from the previous successful processing, if any.
    pub previous_hash: Option<String>,
    /// Current content hash.
    pub new_hash: String,
    pub detected_at: DateTime<Utc>,
}

impl ChangeRecord {
    /// Whether this is the first time the module has been seen.
    pub fn is_new(&self) -> bool {
        self.previous_hash.is_none()
    }
}

/// Persisted per-module row in the hash store.
///
/// Rows are never deleted; a module whose source file disappears is marked
/// inactive and skipped by detection until the file returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleEntry {
    /// Content hash recorded at the last ACCEPTED (or skip-as-current) resolution.
    pub last_processed_hash: Option<String>,
    /// Digest of the accepted test file content. A mismatch against the file
    /// on disk means it was edited outside the pipeline.
    pub test_digest: Option<String>,
    pub active: bool,
}

impl ModuleEntry {
    pub fn new() -> Self {
        Self {
            last_processed_hash: None,
            test_digest: None,
            active: true,
        }
    }
}

impl Default for ModuleEntry {
    fn default() -> Self {
        Self::new()
    }
}
