//! Change detection.
//!
//! Produces one [`ChangeRecord`] per module whose content hash differs from
//! the persisted store, drawing candidates from the version-control diff
//! plus the tracked backlog. Detection is read-only and idempotent: nothing
//! is committed until the orchestrator resolves each module.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::backend::DiffSource;
use crate::config::RunnerConfig;
use crate::domain::digest::file_digest;
use crate::domain::error::Result;
use crate::domain::module::ChangeRecord;
use crate::state::HashStore;

/// What one detection pass found.
#[derive(Debug, Default)]
pub struct DetectionOutcome {
    /// Ordered (by path) records for modules that changed or are new.
    pub records: Vec<ChangeRecord>,
    /// Tracked modules whose source file no longer exists; the orchestrator
    /// marks these inactive.
    pub missing: Vec<PathBuf>,
    pub warnings: Vec<String>,
}

/// Lists modules added or modified since the previous successful run.
pub struct ChangeDetector {
    diff: Arc<dyn DiffSource>,
    config: RunnerConfig,
}

impl ChangeDetector {
    pub fn new(diff: Arc<dyn DiffSource>, config: RunnerConfig) -> Self {
        Self { diff, config }
    }

    /// Detect changes in the tree rooted at `root`, relative to `since`.
    ///
    /// With no marker every tracked module is treated as a candidate (full
    /// scan). A failing diff source degrades to the same full scan with a
    /// warning rather than aborting.
    pub async fn detect(
        &self,
        root: &Path,
        store: &HashStore,
        since: Option<&str>,
    ) -> Result<DetectionOutcome> {
        let mut outcome = DetectionOutcome::default();
        let mut candidates: BTreeSet<PathBuf> = BTreeSet::new();
        let mut full_scan = since.is_none();

        if !full_scan {
            match self.diff.changed_paths(since).await {
                Ok(paths) => {
                    candidates.extend(
                        paths
                            .into_iter()
                            .filter(|p| self.config.is_tracked_source(p)),
                    );
                }
                Err(e) => {
                    outcome
                        .warnings
                        .push(format!("diff source unavailable, re-scanning tree: {e}"));
                    full_scan = true;
                }
            }
        }

        if full_scan {
            let source_root = root.join(&self.config.source_root);
            for path in walk_files(&source_root)? {
                let rel = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
                if self.config.is_tracked_source(&rel) {
                    candidates.insert(rel);
                }
            }
        }

        // Failed or crashed modules keep a stale stored hash; folding the
        // tracked backlog in re-detects them even when the diff moved past
        // their last change.
        candidates.extend(store.active_modules());

        let detected_at = Utc::now();
        for module in candidates {
            let absolute = root.join(&module);
            if !absolute.exists() {
                if store.modules.contains_key(&module) {
                    outcome.missing.push(module);
                }
                continue;
            }

            let new_hash = match file_digest(&absolute) {
                Ok(hash) => hash,
                Err(e) => {
                    warn!(module = %module.display(), error = %e, "module unreadable, skipping");
                    outcome
                        .warnings
                        .push(format!("{} unreadable: {e}", module.display()));
                    continue;
                }
            };

            let previous_hash = store.stored_hash(&module).map(String::from);
            if previous_hash.as_deref() == Some(new_hash.as_str()) {
                continue;
            }

            debug!(module = %module.display(), "detected change");
            outcome.records.push(ChangeRecord {
                module,
                previous_hash,
                new_hash,
                detected_at,
            });
        }

        Ok(outcome)
    }
}

/// Simple recursive directory walker (no external dependency).
fn walk_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    if dir.is_dir() {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                files.extend(walk_files(&path)?);
            } else {
                files.push(path);
            }
        }
    }

    Ok(files)
}
