//! Runner configuration.
//!
//! Loaded from `testgen.toml` at the repository root when present, with
//! defaults matching a pytest-style Python tree. CLI flags override via the
//! builder methods.

use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::backend::{CoverageCommandConfig, HarnessConfig};
use crate::domain::error::{Result, TestgenError};

/// Configuration file name looked up at the repository root.
pub const CONFIG_FILE: &str = "testgen.toml";

fn default_source_root() -> PathBuf {
    PathBuf::from("src")
}

fn default_tests_root() -> PathBuf {
    PathBuf::from("tests")
}

fn default_state_path() -> PathBuf {
    PathBuf::from(".testgen/state.json")
}

fn default_runs_dir() -> Option<PathBuf> {
    Some(PathBuf::from(".testgen/runs"))
}

fn default_extensions() -> Vec<String> {
    vec!["py".to_string()]
}

fn default_workers() -> usize {
    4
}

fn default_max_attempts() -> u32 {
    3
}

fn default_test_pattern() -> String {
    // Matches `def test_*` (Python) and `fn test_*` (Rust) definitions.
    r"(?m)^\s*(?:def|fn)\s+(test_[A-Za-z0-9_]+)".to_string()
}

/// Generation service settings. The endpoint is optional in configuration;
/// `run` refuses to start generation without one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSection {
    pub endpoint: Option<String>,
    pub model: Option<String>,
    pub timeout_secs: Option<u64>,
}

/// Top-level runner configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Root of the tracked source tree, relative to the repository root.
    pub source_root: PathBuf,
    /// Root of the test tree holding one test file per module.
    pub tests_root: PathBuf,
    /// Persisted hash-store location.
    pub state_path: PathBuf,
    /// Where run report artifacts are written (None disables them).
    pub runs_dir: Option<PathBuf>,
    /// File extensions counted as modules.
    pub source_extensions: Vec<String>,
    /// Folders under the source root to ignore.
    pub excluded_folders: Vec<PathBuf>,
    /// Worker limit for concurrent module pipelines.
    pub workers: usize,
    /// Maximum generation attempts per module per run.
    pub max_attempts: u32,
    /// Regex extracting test function names; capture group 1 is the name.
    pub test_function_pattern: String,
    /// Whether a pre-commit hook failure should block the commit.
    pub block_commit_on_failure: bool,
    /// Detect and report only; no generation, no writes.
    pub dry_run: bool,
    pub coverage: CoverageCommandConfig,
    pub harness: HarnessConfig,
    pub generation: GenerationSection,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            source_root: default_source_root(),
            tests_root: default_tests_root(),
            state_path: default_state_path(),
            runs_dir: default_runs_dir(),
            source_extensions: default_extensions(),
            excluded_folders: Vec::new(),
            workers: default_workers(),
            max_attempts: default_max_attempts(),
            test_function_pattern: default_test_pattern(),
            block_commit_on_failure: false,
            dry_run: false,
            coverage: CoverageCommandConfig::default(),
            harness: HarnessConfig::default(),
            generation: GenerationSection::default(),
        }
    }
}

impl RunnerConfig {
    /// Load configuration from `<root>/testgen.toml`, falling back to
    /// defaults when the file does not exist.
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(CONFIG_FILE);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };

        let config: RunnerConfig = toml::from_str(&raw)
            .map_err(|e| TestgenError::InvalidConfig(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the pipeline cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(TestgenError::InvalidConfig(
                "workers must be at least 1".to_string(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(TestgenError::InvalidConfig(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.source_extensions.is_empty() {
            return Err(TestgenError::InvalidConfig(
                "source_extensions must not be empty".to_string(),
            ));
        }
        self.test_pattern()?;
        Ok(())
    }

    /// Compile the test-function extraction pattern.
    pub fn test_pattern(&self) -> Result<Regex> {
        Regex::new(&self.test_function_pattern)
            .map_err(|e| TestgenError::InvalidConfig(format!("test_function_pattern: {e}")))
    }

    /// Whether `path` counts as a tracked module.
    pub fn is_tracked_source(&self, path: &Path) -> bool {
        if !path.starts_with(&self.source_root) {
            return false;
        }
        if self
            .excluded_folders
            .iter()
            .any(|dir| path.starts_with(self.source_root.join(dir)))
        {
            return false;
        }
        path.extension()
            .and_then(|e| e.to_str())
            .map(|ext| self.source_extensions.iter().any(|s| s == ext))
            .unwrap_or(false)
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}
