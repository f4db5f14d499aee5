//! Testgen Core Library
//!
//! Automated unit-test generation pipeline: detects changed modules,
//! measures their coverage, locates the associated test file, asks an
//! opaque generation service for candidate tests, and validates candidates
//! in isolation before they are accepted into the tree.

pub mod analyze;
pub mod backend;
pub mod config;
pub mod detect;
pub mod discover;
pub mod domain;
pub mod generate;
pub mod orchestrator;
pub mod report;
pub mod state;
pub mod telemetry;
pub mod validate;

pub use analyze::{AnalysisOutcome, CoverageAnalyzer};
pub use backend::{
    is_git_repo, CommandCoverageBackend, CoverageBackend, CoverageCommandConfig, DiffMode,
    DiffSource, GenerationRequest, GenerationService, GitDiffSource, HarnessConfig, HarnessRun,
    HttpGenerationConfig, HttpGenerationService, ProcessHarness, TestHarness,
};
pub use config::{GenerationSection, RunnerConfig, CONFIG_FILE};
pub use detect::{ChangeDetector, DetectionOutcome};
pub use discover::{Discovery, TestDiscovery, TestFile};
pub use domain::{
    content_digest, file_digest, ChangeRecord, CoverageReport, GenerationAttempt, ModuleEntry,
    ModuleState, Region, RegionKind, RejectReason, Result, TestgenError, ValidationResult,
};
pub use generate::TestGenerator;
pub use orchestrator::Orchestrator;
pub use report::{ModuleOutcome, ModuleReport, RunReport};
pub use state::HashStore;
pub use telemetry::init_tracing;
pub use validate::{ValidationContext, Validator};

/// Testgen version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
