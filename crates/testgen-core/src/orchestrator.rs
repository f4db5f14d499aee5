//! Orchestrator: composes detection, analysis, discovery, generation and
//! validation into the per-module state machine, schedules modules across a
//! bounded worker pool, and commits accepted candidates to the tree.
//!
//! Per-module atomicity: each module resolves independently, the hash store
//! is written back after every resolution, and test files are written via
//! temp-file + rename. A crash mid-run leaves unresolved modules looking
//! unprocessed for the next run.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tempfile::NamedTempFile;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::analyze::CoverageAnalyzer;
use crate::backend::{CoverageBackend, DiffSource, GenerationService, TestHarness};
use crate::config::RunnerConfig;
use crate::detect::ChangeDetector;
use crate::discover::TestDiscovery;
use crate::domain::attempt::RejectReason;
use crate::domain::digest::content_digest;
use crate::domain::error::{Result, TestgenError};
use crate::domain::module::{ChangeRecord, ModuleState};
use crate::generate::TestGenerator;
use crate::report::{ModuleOutcome, ModuleReport, RunReport};
use crate::state::HashStore;
use crate::validate::{ValidationContext, Validator};

const REPORT_SCHEMA_VERSION: &str = "1";

/// Drives the whole pipeline for one run.
pub struct Orchestrator {
    root: PathBuf,
    config: RunnerConfig,
    diff: Arc<dyn DiffSource>,
    coverage: Arc<dyn CoverageBackend>,
    generation: Arc<dyn GenerationService>,
    harness: Arc<dyn TestHarness>,
}

impl Orchestrator {
    pub fn new(
        root: impl Into<PathBuf>,
        config: RunnerConfig,
        diff: Arc<dyn DiffSource>,
        coverage: Arc<dyn CoverageBackend>,
        generation: Arc<dyn GenerationService>,
        harness: Arc<dyn TestHarness>,
    ) -> Self {
        Self {
            root: root.into(),
            config,
            diff,
            coverage,
            generation,
            harness,
        }
    }

    /// Execute one run: detect, process every changed module on the worker
    /// pool, commit the marker, and report.
    ///
    /// Per-module errors never surface here; only infrastructure failures
    /// (unreadable tree, unwritable state) abort the run.
    pub async fn run(&self) -> Result<RunReport> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();
        self.config.validate()?;

        let state_path = self.root.join(&self.config.state_path);
        let store = HashStore::load_or_default(&state_path);
        let since = store.marker.clone();

        let detector = ChangeDetector::new(Arc::clone(&self.diff), self.config.clone());
        let detection = detector
            .detect(&self.root, &store, since.as_deref())
            .await?;
        let mut warnings = detection.warnings;

        info!(
            run_id = %run_id,
            changed = detection.records.len(),
            missing = detection.missing.len(),
            "detection complete"
        );

        let store = Arc::new(Mutex::new(store));

        if !detection.missing.is_empty() && !self.config.dry_run {
            let mut guard = store.lock().await;
            for module in &detection.missing {
                info!(module = %module.display(), "source removed; marking inactive");
                guard.mark_inactive(module);
            }
            guard.save(&state_path)?;
        }

        let worker = Arc::new(ModuleWorker {
            root: self.root.clone(),
            state_path: state_path.clone(),
            config: self.config.clone(),
            analyzer: CoverageAnalyzer::new(Arc::clone(&self.coverage)),
            discovery: TestDiscovery::new(
                self.config.tests_root.clone(),
                self.config.test_pattern()?,
            ),
            generator: TestGenerator::new(Arc::clone(&self.generation)),
            validator: Validator::new(
                Arc::clone(&self.harness),
                Arc::clone(&self.coverage),
                self.config.test_pattern()?,
            ),
            store: Arc::clone(&store),
        });

        let semaphore = Arc::new(Semaphore::new(self.config.workers));
        let mut tasks = Vec::new();
        for record in detection.records {
            let worker = Arc::clone(&worker);
            let semaphore = Arc::clone(&semaphore);
            tasks.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                worker.process(record).await
            }));
        }

        let mut modules = Vec::new();
        for task in tasks {
            match task.await {
                Ok(report) => modules.push(report),
                Err(e) => warnings.push(format!("module task aborted: {e}")),
            }
        }
        modules.sort_by(|a, b| a.module.cmp(&b.module));

        // Commit the marker only after every module resolved; a failed
        // module keeps its stale stored hash and is re-detected next run
        // through the tracked backlog.
        let marker = if self.config.dry_run {
            since
        } else {
            match self.diff.current_marker().await {
                Ok(marker) => {
                    let mut guard = store.lock().await;
                    guard.marker = Some(marker.clone());
                    guard.save(&state_path)?;
                    Some(marker)
                }
                Err(e) => {
                    warnings.push(format!("marker unavailable, not committed: {e}"));
                    since
                }
            }
        };

        let report = RunReport {
            schema_version: REPORT_SCHEMA_VERSION.to_string(),
            run_id,
            started_at,
            finished_at: Utc::now(),
            marker,
            modules,
            warnings,
        };

        info!(
            run_id = %run_id,
            accepted = report.accepted_count(),
            failed = report.failed_count(),
            skipped = report.skipped_count(),
            "run finished"
        );
        Ok(report)
    }
}

/// Per-module pipeline shared across the worker pool.
struct ModuleWorker {
    root: PathBuf,
    state_path: PathBuf,
    config: RunnerConfig,
    analyzer: CoverageAnalyzer,
    discovery: TestDiscovery,
    generator: TestGenerator,
    validator: Validator,
    store: Arc<Mutex<HashStore>>,
}

impl ModuleWorker {
    /// Run one module to a terminal outcome and keep it on the backlog if
    /// it did not resolve cleanly.
    async fn process(&self, record: ChangeRecord) -> ModuleReport {
        let mut report = self.process_inner(record).await;
        if !self.config.dry_run
            && matches!(
                report.outcome,
                ModuleOutcome::Failed { .. } | ModuleOutcome::ManualReview { .. }
            )
        {
            let mut guard = self.store.lock().await;
            guard.track(&report.module);
            if let Err(e) = guard.save(&self.state_path) {
                report.warnings.push(format!("state write failed: {e}"));
            }
        }
        report
    }

    /// Run one module through the state machine to a terminal outcome.
    async fn process_inner(&self, record: ChangeRecord) -> ModuleReport {
        let module = record.module.clone();
        let mut warnings = Vec::new();
        let mut state = ModuleState::Detected;

        let module_source = match std::fs::read_to_string(self.root.join(&module)) {
            Ok(source) => source,
            Err(e) => {
                return ModuleReport {
                    module,
                    outcome: ModuleOutcome::Failed {
                        attempts: 0,
                        reason: format!("module unreadable: {e}"),
                    },
                    warnings,
                };
            }
        };

        let (association, accepted_test_digest) = {
            let guard = self.store.lock().await;
            let entry = guard.modules.get(&module);
            (
                entry.and_then(|e| e.last_processed_hash.clone()),
                entry.and_then(|e| e.test_digest.clone()),
            )
        };

        advance(&module, &mut state, ModuleState::Analyzing);
        let test_path = self.discovery.test_path_for(&module);
        let existing_test_path = self
            .root
            .join(&test_path)
            .exists()
            .then(|| test_path.clone());

        // ANALYZING and DISCOVERING are independent; join before GENERATING.
        let analyze_fut = self
            .analyzer
            .analyze(&self.root, &module, existing_test_path.as_deref());
        let lookup_fut = async { self.discovery.lookup(&self.root, &module) };
        let (analysis, lookup) = tokio::join!(analyze_fut, lookup_fut);

        if let Some(warning) = analysis.warning.clone() {
            warnings.push(warning);
        }
        let lookup = match lookup {
            Ok(found) => found,
            Err(e) => {
                return ModuleReport {
                    module,
                    outcome: ModuleOutcome::Failed {
                        attempts: 0,
                        reason: format!("test file unreadable: {e}"),
                    },
                    warnings,
                };
            }
        };

        advance(&module, &mut state, ModuleState::Discovering);
        let discovery = self.discovery.classify(
            lookup,
            &record.new_hash,
            association.as_deref(),
            &analysis.report,
        );

        // A test file we once accepted that no longer matches its recorded
        // digest was edited by hand; flag it instead of overwriting.
        if let (Some(file), Some(digest)) = (discovery.test_file(), &accepted_test_digest) {
            if content_digest(file.content.as_bytes()) != *digest {
                warn!(module = %module.display(), "test file edited outside the pipeline");
                return ModuleReport {
                    module,
                    outcome: ModuleOutcome::ManualReview {
                        reason: format!(
                            "{} edited outside the pipeline; review and re-baseline",
                            file.path.display()
                        ),
                    },
                    warnings,
                };
            }
        }

        if !analysis.report.has_gaps() {
            debug!(module = %module.display(), "fully covered; nothing to generate");
            if !self.config.dry_run {
                if let Err(e) = self.mark_processed(&module, &record.new_hash, None).await {
                    return ModuleReport {
                        module,
                        outcome: ModuleOutcome::Failed {
                            attempts: 0,
                            reason: format!("state write failed: {e}"),
                        },
                        warnings,
                    };
                }
            }
            return ModuleReport {
                module,
                outcome: ModuleOutcome::Skipped {
                    reason: "fully covered".to_string(),
                },
                warnings,
            };
        }

        if self.config.dry_run {
            return ModuleReport {
                module,
                outcome: ModuleOutcome::Skipped {
                    reason: format!(
                        "dry run: {} coverage gap(s) open",
                        analysis.report.uncovered.len()
                    ),
                },
                warnings,
            };
        }

        // Bounded generate → validate loop with a feedback accumulator.
        // Termination is guaranteed by the attempt cap; attempt numbers are
        // strictly increasing and never reused.
        advance(&module, &mut state, ModuleState::Generating);
        let max_attempts = self.config.max_attempts;
        let mut feedback: Vec<String> = Vec::new();
        let mut attempt_no = 0u32;

        let outcome = loop {
            attempt_no += 1;
            let attempt = match self
                .generator
                .generate(
                    &module,
                    &module_source,
                    &analysis.report,
                    &discovery,
                    attempt_no,
                    &feedback,
                )
                .await
            {
                Ok(attempt) => attempt,
                Err(e @ TestgenError::Generation { .. }) => {
                    warn!(module = %module.display(), attempt = attempt_no, error = %e, "generation attempt failed");
                    if attempt_no < max_attempts {
                        feedback.push(e.to_string());
                        continue;
                    }
                    break ModuleOutcome::Failed {
                        attempts: attempt_no,
                        reason: TestgenError::RetriesExhausted {
                            module: module.clone(),
                            attempts: attempt_no,
                            last_failure: e.to_string(),
                        }
                        .to_string(),
                    };
                }
                Err(e) => {
                    break ModuleOutcome::Failed {
                        attempts: attempt_no,
                        reason: e.to_string(),
                    };
                }
            };

            advance(&module, &mut state, ModuleState::Validating);
            let ctx = ValidationContext {
                root: &self.root,
                module: &module,
                test_path: &test_path,
                existing: discovery.test_file(),
                baseline: &analysis.report,
                attempt: attempt_no,
            };
            let result = match self.validator.validate(&ctx, &attempt.candidate).await {
                Ok(result) => result,
                Err(e) => {
                    break ModuleOutcome::Failed {
                        attempts: attempt_no,
                        reason: format!("validation infrastructure failed: {e}"),
                    };
                }
            };

            if result.passed {
                match self
                    .accept(&module, &test_path, &attempt.candidate, &record.new_hash)
                    .await
                {
                    Ok(()) => {
                        advance(&module, &mut state, ModuleState::Accepted);
                        break ModuleOutcome::Accepted {
                            attempts: attempt_no,
                        }
                    }
                    Err(e) => {
                        break ModuleOutcome::Failed {
                            attempts: attempt_no,
                            reason: format!("acceptance write failed: {e}"),
                        }
                    }
                }
            }

            let reason = result
                .reject_reason
                .clone()
                .unwrap_or(RejectReason::ExecutionFailed);

            if !reason.is_retryable() {
                advance(&module, &mut state, ModuleState::Failed);
                warnings.push("test harness unavailable; validation cannot run".to_string());
                break ModuleOutcome::Failed {
                    attempts: attempt_no,
                    reason: reason.to_string(),
                };
            }

            if attempt_no >= max_attempts {
                advance(&module, &mut state, ModuleState::Failed);
                break ModuleOutcome::Failed {
                    attempts: attempt_no,
                    reason: TestgenError::RetriesExhausted {
                        module: module.clone(),
                        attempts: attempt_no,
                        last_failure: reason.to_string(),
                    }
                    .to_string(),
                };
            }

            debug!(module = %module.display(), attempt = attempt_no, reason = %reason, "retrying with feedback");
            feedback.push(result.output);
            advance(&module, &mut state, ModuleState::Generating);
        };

        ModuleReport {
            module,
            outcome,
            warnings,
        }
    }

    /// Commit an accepted candidate: atomic write to the permanent test
    /// file, then the module's row in the hash store.
    async fn accept(
        &self,
        module: &Path,
        test_path: &Path,
        candidate: &str,
        new_hash: &str,
    ) -> Result<()> {
        let dest = self.root.join(test_path);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let parent = dest.parent().expect("test path always has a parent");

        // Atomic write: temp file in the same directory, then rename. A
        // crash between the two leaves the old content fully intact.
        let mut tmp = NamedTempFile::new_in(parent)?;
        tmp.write_all(candidate.as_bytes())?;
        tmp.persist(&dest).map_err(|e| e.error)?;

        self.mark_processed(module, new_hash, Some(content_digest(candidate.as_bytes())))
            .await?;

        info!(module = %module.display(), test = %dest.display(), "candidate accepted");
        Ok(())
    }

    async fn mark_processed(
        &self,
        module: &Path,
        new_hash: &str,
        test_digest: Option<String>,
    ) -> Result<()> {
        let mut guard = self.store.lock().await;
        guard.record_processed(module, new_hash, test_digest);
        guard.save(&self.state_path)
    }
}

/// Log and apply a state transition, asserting it is legal.
fn advance(module: &Path, state: &mut ModuleState, next: ModuleState) {
    debug_assert!(
        state.can_transition_to(next),
        "illegal transition {state} -> {next}"
    );
    debug!(module = %module.display(), from = %state, to = %next, "state transition");
    *state = next;
}
