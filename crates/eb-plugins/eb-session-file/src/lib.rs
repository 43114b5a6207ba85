//! # eb-session-file
//!
//! Filesystem implementation of `SessionStore`: one `<key>.json` file per key
//! inside a session directory.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use eb_core::{AppError, Result, SessionStore};
use tracing::debug;

pub struct FileSessionStore {
    /// Directory holding the session files (e.g. "~/.config/echo-board")
    root: PathBuf,
}

impl FileSessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || key.contains(['/', '\\']) || key.starts_with('.') {
            return Err(AppError::Storage(format!("invalid session key '{key}'")));
        }
        Ok(self.root.join(format!("{key}.json")))
    }
}

fn storage_error(path: &Path, err: std::io::Error) -> AppError {
    AppError::Storage(format!("{}: {err}", path.display()))
}

impl SessionStore for FileSessionStore {
    fn load(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(raw) => Ok(Some(raw)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(storage_error(&path, err)),
        }
    }

    /// Writes a sibling temp file, then renames it over the target.
    fn save(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.root).map_err(|err| storage_error(&self.root, err))?;
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, value).map_err(|err| storage_error(&staging, err))?;
        fs::rename(&staging, &path).map_err(|err| storage_error(&path, err))?;
        debug!(path = %path.display(), "session saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());
        assert_eq!(store.load("echosky.session.v1").unwrap(), None);
    }

    #[test]
    fn save_creates_directory_and_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path().join("nested").join("sessions"));

        store.save("echosky.session.v1", r#"{"did":"a"}"#).unwrap();
        store.save("echosky.session.v1", r#"{"did":"b"}"#).unwrap();

        assert_eq!(
            store.load("echosky.session.v1").unwrap().as_deref(),
            Some(r#"{"did":"b"}"#)
        );
        assert!(store.root().join("echosky.session.v1.json").exists());
        assert!(!store.root().join("echosky.session.v1.json.tmp").exists());
    }

    #[test]
    fn keys_cannot_escape_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path());
        assert!(matches!(store.save("../evil", "x"), Err(AppError::Storage(_))));
        assert!(matches!(store.load(""), Err(AppError::Storage(_))));
    }
}
