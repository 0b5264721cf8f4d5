//! Content hashes used as change triggers.

use crate::error::{CoreError, Result};
use sha2::{Digest, Sha256};
use std::path::Path;

/// SHA-256 of `bytes` as lowercase hex.
pub fn hash_bytes(bytes: impl AsRef<[u8]>) -> String {
    hex::encode(Sha256::digest(bytes.as_ref()))
}

pub fn hash_file(path: &Path) -> Result<String> {
    let content = std::fs::read(path).map_err(|e| CoreError::IoError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    Ok(hash_bytes(content))
}

/// Combined hash of an ordered trigger list.
///
/// Each item is length-prefixed so `["ab", "c"]` and `["a", "bc"]` differ.
pub fn hash_triggers(triggers: &[String]) -> String {
    let mut hasher = Sha256::new();
    for trigger in triggers {
        hasher.update((trigger.len() as u64).to_be_bytes());
        hasher.update(trigger.as_bytes());
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_stable() {
        let content = "services:\n  app:\n    image: simplelogin/app:4.6.5\n";
        assert_eq!(hash_bytes(content), hash_bytes(content));
        assert_eq!(hash_bytes(content).len(), 64);
    }

    #[test]
    fn test_hash_known_value() {
        assert_eq!(
            hash_bytes(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_hash_file_matches_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ntfy.service");
        std::fs::write(&path, "[Unit]\nDescription=ntfy\n").unwrap();

        assert_eq!(
            hash_file(&path).unwrap(),
            hash_bytes("[Unit]\nDescription=ntfy\n")
        );
    }

    #[test]
    fn test_hash_file_missing() {
        let err = hash_file(Path::new("/nonexistent/file")).unwrap_err();
        assert!(matches!(err, CoreError::IoError { .. }));
    }

    #[test]
    fn test_trigger_boundaries_matter() {
        let a = hash_triggers(&["ab".to_string(), "c".to_string()]);
        let b = hash_triggers(&["a".to_string(), "bc".to_string()]);
        assert_ne!(a, b);
        assert_eq!(a, hash_triggers(&["ab".to_string(), "c".to_string()]));
    }
}
