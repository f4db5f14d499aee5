//! Persisted pipeline state: module hashes and the last processed marker.
//!
//! The store is an explicit key-value structure handed to the orchestrator
//! at run start and written back transactionally per module, so a crash
//! mid-run leaves unresolved modules looking unprocessed for the next run.
//! A corrupted or missing file degrades to "process everything".

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::warn;

use crate::domain::error::Result;
use crate::domain::module::ModuleEntry;

const SCHEMA_VERSION: u32 = 1;

/// Module path → hash rows, plus the last successfully processed marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashStore {
    pub schema_version: u32,
    /// Last version-control marker a run committed.
    pub marker: Option<String>,
    pub modules: BTreeMap<PathBuf, ModuleEntry>,
}

impl Default for HashStore {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            marker: None,
            modules: BTreeMap::new(),
        }
    }
}

impl HashStore {
    /// Load the store from `path`. Missing, unreadable, or corrupt files all
    /// degrade to an empty store with a warning — never an error, per the
    /// state-corruption recovery policy.
    pub fn load_or_default(path: &Path) -> Self {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "state store unreadable; falling back to full re-scan");
                return Self::default();
            }
        };

        match serde_json::from_str::<HashStore>(&raw) {
            Ok(store) if store.schema_version == SCHEMA_VERSION => store,
            Ok(store) => {
                warn!(
                    found = store.schema_version,
                    expected = SCHEMA_VERSION,
                    "state store schema mismatch; falling back to full re-scan"
                );
                Self::default()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "state store corrupt; falling back to full re-scan");
                Self::default()
            }
        }
    }

    /// Write the store to `path` atomically (temp file + rename).
    pub fn save(&self, path: &Path) -> Result<()> {
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent)?;

        let mut tmp = NamedTempFile::new_in(&parent)?;
        let content = serde_json::to_string_pretty(self)?;
        tmp.write_all(content.as_bytes())?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    /// Stored hash for a module, if it is tracked and active.
    pub fn stored_hash(&self, module: &Path) -> Option<&str> {
        self.modules
            .get(module)
            .filter(|e| e.active)
            .and_then(|e| e.last_processed_hash.as_deref())
    }

    /// Record a module as processed at `hash`, with the digest of its
    /// accepted test file when one was written.
    pub fn record_processed(&mut self, module: &Path, hash: &str, test_digest: Option<String>) {
        let entry = self.modules.entry(module.to_path_buf()).or_default();
        entry.last_processed_hash = Some(hash.to_string());
        if test_digest.is_some() {
            entry.test_digest = test_digest;
        }
        entry.active = true;
    }

    /// Ensure a module has an active row without touching its hash. Failed
    /// modules are tracked this way so they stay on the re-detection
    /// backlog even after the marker advances past their change.
    pub fn track(&mut self, module: &Path) {
        let entry = self.modules.entry(module.to_path_buf()).or_default();
        entry.active = true;
    }

    /// Mark a module inactive (source file removed). The row is kept.
    pub fn mark_inactive(&mut self, module: &Path) {
        if let Some(entry) = self.modules.get_mut(module) {
            entry.active = false;
        }
    }

    /// Active tracked module paths — the backlog the detector always
    /// considers in addition to the diff.
    pub fn active_modules(&self) -> Vec<PathBuf> {
        self.modules
            .iter()
            .filter(|(_, e)| e.active)
            .map(|(p, _)| p.clone())
            .collect()
    }
}
