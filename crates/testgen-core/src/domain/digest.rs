//! Content digest computation for modules and test files.
//!
//! A module's identity across runs is its path; its *version* is the SHA256
//! hex digest of its bytes. The persisted hash store compares these digests
//! to decide what changed.

use std::path::Path;

use sha2::{Digest, Sha256};

use crate::domain::error::Result;

/// Compute the SHA256 hex digest of a byte slice.
pub fn content_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Compute the SHA256 hex digest of a file's contents.
pub fn file_digest(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(content_digest(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_content_digest_is_64_hex_chars() {
        let digest = content_digest(b"def add(a, b):\n    return a + b\n");
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_content_digest_deterministic() {
        assert_eq!(content_digest(b"same input"), content_digest(b"same input"));
        assert_ne!(content_digest(b"one"), content_digest(b"two"));
    }

    #[test]
    fn test_file_digest_matches_content_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.py");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(b"x = 1\n").unwrap();

        assert_eq!(file_digest(&path).unwrap(), content_digest(b"x = 1\n"));
    }

    #[test]
    fn test_file_digest_missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(file_digest(&dir.path().join("absent.py")).is_err());
    }
}
