//! Per-user static key files that bypass the registry.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{KeysError, Result};

/// Default directory holding override files, one per username.
pub const DEFAULT_AUTHORIZED_KEYS_DIR: &str = "/etc/ssh/authorized_keys.d";

/// Path of the override file for `username`.
pub fn override_path(dir: &Path, username: &str) -> PathBuf {
    dir.join(username)
}

/// Read the override file for `username`, if there is one.
///
/// A missing file means "ask the registry". Every other I/O failure is an
/// error so that a broken override never falls through to federation.
pub fn check_local_override(dir: &Path, username: &str) -> Result<Option<Vec<u8>>> {
    let path = override_path(dir, username);
    match std::fs::read(&path) {
        Ok(content) => {
            debug!(path = %path.display(), bytes = content.len(), "Using local override");
            Ok(Some(content))
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "No local override");
            Ok(None)
        }
        Err(source) => Err(KeysError::OverrideUnreadable { path, source }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_override_is_none() {
        let temp = TempDir::new().unwrap();
        assert!(check_local_override(temp.path(), "alice").unwrap().is_none());
    }

    #[test]
    fn test_override_content_is_verbatim() {
        let temp = TempDir::new().unwrap();
        let content = b"ssh-ed25519 AAAAC3Nza local\n\n# trailing comment without newline";
        std::fs::write(temp.path().join("alice"), content).unwrap();

        let found = check_local_override(temp.path(), "alice").unwrap();
        assert_eq!(found.as_deref(), Some(&content[..]));
    }

    #[test]
    fn test_missing_directory_is_none() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("does-not-exist");
        assert!(check_local_override(&dir, "alice").unwrap().is_none());
    }

    #[test]
    fn test_unreadable_override_is_surfaced() {
        let temp = TempDir::new().unwrap();
        // A directory in place of the file fails with something other than NotFound.
        std::fs::create_dir(temp.path().join("alice")).unwrap();

        let err = check_local_override(temp.path(), "alice").unwrap_err();
        assert!(matches!(err, KeysError::OverrideUnreadable { .. }));
    }
}
