//! Git-backed diff source.

use std::path::{Path, PathBuf};
use std::process::Command;

use async_trait::async_trait;

use super::DiffSource;
use crate::domain::error::{Result, TestgenError};

/// Which diff the source reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffMode {
    /// Staged changes only (`git diff --cached`). Used by the pre-commit
    /// trigger, which must stay fast and scoped to the pending commit.
    Staged,
    /// Changes between the stored marker and HEAD. Used by post-commit and
    /// manual triggers.
    SinceMarker,
}

/// Diff source that shells out to git.
pub struct GitDiffSource {
    repo_root: PathBuf,
    mode: DiffMode,
}

impl GitDiffSource {
    pub fn new(repo_root: impl Into<PathBuf>, mode: DiffMode) -> Self {
        Self {
            repo_root: repo_root.into(),
            mode,
        }
    }

    fn run_git(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.repo_root)
            .output()
            .map_err(|e| TestgenError::Vcs(format!("failed to run git: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TestgenError::Vcs(format!(
                "git {} failed: {}",
                args.join(" "),
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn parse_paths(output: &str) -> Vec<PathBuf> {
        output
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(PathBuf::from)
            .collect()
    }
}

/// Check whether a directory is inside a git work tree.
pub fn is_git_repo(dir: &Path) -> bool {
    Command::new("git")
        .args(["rev-parse", "--is-inside-work-tree"])
        .current_dir(dir)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

#[async_trait]
impl DiffSource for GitDiffSource {
    async fn changed_paths(&self, since: Option<&str>) -> Result<Vec<PathBuf>> {
        let output = match (self.mode, since) {
            (DiffMode::Staged, _) => self.run_git(&["diff", "--cached", "--name-only"])?,
            (DiffMode::SinceMarker, Some(marker)) => {
                self.run_git(&["diff", "--name-only", marker, "HEAD"])?
            }
            // No marker to diff against; the detector falls back to a
            // full tree scan.
            (DiffMode::SinceMarker, None) => return Ok(Vec::new()),
        };
        Ok(Self::parse_paths(&output))
    }

    async fn current_marker(&self) -> Result<String> {
        let sha = self.run_git(&["rev-parse", "HEAD"])?.trim().to_string();
        if sha.is_empty() {
            return Err(TestgenError::Vcs(
                "git rev-parse HEAD returned empty output".to_string(),
            ));
        }
        Ok(sha)
    }
}
