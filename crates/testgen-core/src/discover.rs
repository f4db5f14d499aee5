//! Test discovery.
//!
//! Maps a module to its zero-or-one associated test file by a deterministic
//! naming convention (`<tests_root>/test_<stem>.<ext>`) and classifies the
//! association as missing, stale, or current. No side effects.

use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::coverage::CoverageReport;
use crate::domain::error::Result;

/// An existing test file associated with a module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestFile {
    /// Path relative to the repository root.
    pub path: PathBuf,
    pub content: String,
}

/// Classification of a module's test association.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discovery {
    /// No test file exists at the conventional path.
    Missing,
    /// A test file exists but its association is outdated relative to the
    /// module's current content, or gaps remain in what it claims to cover.
    Stale(TestFile),
    /// The test file matches the module's current hash with no open gaps.
    Current(TestFile),
}

impl Discovery {
    pub fn test_file(&self) -> Option<&TestFile> {
        match self {
            Discovery::Missing => None,
            Discovery::Stale(f) | Discovery::Current(f) => Some(f),
        }
    }

    pub fn is_current(&self) -> bool {
        matches!(self, Discovery::Current(_))
    }
}

/// Locates and classifies test files for modules.
pub struct TestDiscovery {
    tests_root: PathBuf,
    pattern: Regex,
}

impl TestDiscovery {
    pub fn new(tests_root: impl Into<PathBuf>, pattern: Regex) -> Self {
        Self {
            tests_root: tests_root.into(),
            pattern,
        }
    }

    /// The conventional test path for a module: one test file per module,
    /// named after its stem, keeping the module's extension.
    pub fn test_path_for(&self, module: &Path) -> PathBuf {
        let stem = module
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("module");
        let ext = module.extension().and_then(|e| e.to_str()).unwrap_or("py");
        self.tests_root.join(format!("test_{stem}.{ext}"))
    }

    /// Read the associated test file, if one exists. Runs concurrently with
    /// coverage analysis; classification happens at the join.
    pub fn lookup(&self, root: &Path, module: &Path) -> Result<Option<TestFile>> {
        let rel = self.test_path_for(module);
        let absolute = root.join(&rel);
        if !absolute.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&absolute)?;
        Ok(Some(TestFile { path: rel, content }))
    }

    /// Classify a looked-up test file against the module's current hash,
    /// its stored association, and the fresh coverage report.
    pub fn classify(
        &self,
        found: Option<TestFile>,
        module_hash: &str,
        association: Option<&str>,
        report: &CoverageReport,
    ) -> Discovery {
        let Some(file) = found else {
            return Discovery::Missing;
        };

        if association != Some(module_hash) || report.has_gaps() {
            Discovery::Stale(file)
        } else {
            Discovery::Current(file)
        }
    }

    /// Lookup + classify in one step.
    pub fn discover(
        &self,
        root: &Path,
        module: &Path,
        module_hash: &str,
        association: Option<&str>,
        report: &CoverageReport,
    ) -> Result<Discovery> {
        let found = self.lookup(root, module)?;
        Ok(self.classify(found, module_hash, association, report))
    }

    /// Extract test function names from test source.
    pub fn test_names(&self, content: &str) -> Vec<String> {
        self.pattern
            .captures_iter(content)
            .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
            .collect()
    }
}
