//! Git hook installation.
//!
//! Writes `pre-commit` and `post-commit` trigger scripts into `.git/hooks`.
//! The pre-commit hook is non-blocking unless explicitly configured to
//! block, so the committer is never surprised by default.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

/// Install the two hook scripts. Returns the paths written.
pub fn install_git_hooks(root: &Path, block_on_failure: bool) -> Result<Vec<PathBuf>> {
    let git_dir = root.join(".git");
    if !git_dir.is_dir() {
        bail!("{} is not a git repository", root.display());
    }
    let hooks_dir = git_dir.join("hooks");
    std::fs::create_dir_all(&hooks_dir)
        .with_context(|| format!("create {}", hooks_dir.display()))?;

    let mut written = Vec::new();
    for (name, script) in [
        ("pre-commit", pre_commit_script(block_on_failure)),
        ("post-commit", post_commit_script()),
    ] {
        let path = hooks_dir.join(name);
        std::fs::write(&path, script).with_context(|| format!("write {}", path.display()))?;
        make_executable(&path)?;
        written.push(path);
    }
    Ok(written)
}

fn pre_commit_script(block_on_failure: bool) -> String {
    // Pre-commit runs only the staged subset and must stay fast.
    let invoke = "testgen run --trigger pre-commit";
    if block_on_failure {
        format!("#!/bin/sh\n# Installed by testgen\nexec {invoke}\n")
    } else {
        format!("#!/bin/sh\n# Installed by testgen\n{invoke} || true\n")
    }
}

fn post_commit_script() -> String {
    // Post-commit works through the full backlog and never blocks.
    "#!/bin/sh\n# Installed by testgen\ntestgen run --trigger post-commit || true\n".to_string()
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = std::fs::metadata(path)?.permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        dir
    }

    #[test]
    fn installs_both_hooks() {
        let repo = fake_repo();
        let written = install_git_hooks(repo.path(), false).unwrap();
        assert_eq!(written.len(), 2);
        assert!(repo.path().join(".git/hooks/pre-commit").exists());
        assert!(repo.path().join(".git/hooks/post-commit").exists());
    }

    #[test]
    fn non_blocking_by_default() {
        let repo = fake_repo();
        install_git_hooks(repo.path(), false).unwrap();
        let script =
            std::fs::read_to_string(repo.path().join(".git/hooks/pre-commit")).unwrap();
        assert!(script.contains("|| true"));
    }

    #[test]
    fn blocking_when_configured() {
        let repo = fake_repo();
        install_git_hooks(repo.path(), true).unwrap();
        let script =
            std::fs::read_to_string(repo.path().join(".git/hooks/pre-commit")).unwrap();
        assert!(script.contains("exec testgen run"));
        assert!(!script.contains("|| true"));
    }

    #[test]
    fn post_commit_never_blocks() {
        let repo = fake_repo();
        install_git_hooks(repo.path(), true).unwrap();
        let script =
            std::fs::read_to_string(repo.path().join(".git/hooks/post-commit")).unwrap();
        assert!(script.contains("|| true"));
    }

    #[test]
    fn refuses_outside_a_repository() {
        let dir = tempfile::tempdir().unwrap();
        assert!(install_git_hooks(dir.path(), false).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn hooks_are_executable() {
        use std::os::unix::fs::PermissionsExt;
        let repo = fake_repo();
        install_git_hooks(repo.path(), false).unwrap();
        let mode = std::fs::metadata(repo.path().join(".git/hooks/pre-commit"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o111, 0o111);
    }
}
