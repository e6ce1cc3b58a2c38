// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    /// Artifact names must be bare filenames.  Path separators and `..`
    /// would let one session read or clobber another.
    #[error("invalid artifact name: {0:?}")]
    InvalidName(String),

    #[error("artifact not found: {session}/{name}")]
    NotFound { session: String, name: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result of a successful `put`.
#[derive(Debug, Clone, Serialize)]
pub struct StoredFile {
    pub session_id: String,
    pub name: String,
    pub size: u64,
}

/// One artifact in a listing.
#[derive(Debug, Clone, Serialize)]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
}

/// Listing of a session's artifacts, newest first.
#[derive(Debug, Clone, Serialize)]
pub struct SessionListing {
    pub session_id: String,
    pub exists: bool,
    pub files: Vec<FileInfo>,
}

/// Handle on the shared `sessions/` tree.  Cheap to clone; every gateway
/// holds one in its service state.
///
/// The tree is shared-mutable across processes with no locking: a write to
/// an existing name overwrites (last writer wins) and readers tolerate
/// absence.  Clients serialize their own dependencies by awaiting each
/// gateway's response before issuing the next request.
#[derive(Debug, Clone)]
pub struct SessionStore {
    root: PathBuf,
}

impl SessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root of the `sessions/` tree (for the sweeper).
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory for one session.  Does not create it.
    pub fn session_dir(&self, session_id: &str) -> Result<PathBuf, SessionError> {
        validate_component(session_id)?;
        Ok(self.root.join(session_id))
    }

    /// Write an artifact, creating the session directory on demand.
    /// Overwrites silently when the name already exists.
    pub fn put(
        &self,
        session_id: &str,
        name: &str,
        bytes: &[u8],
    ) -> Result<StoredFile, SessionError> {
        validate_component(name)?;
        let dir = self.session_dir(session_id)?;
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(name);
        std::fs::write(&path, bytes)?;
        Ok(StoredFile {
            session_id: session_id.to_string(),
            name: name.to_string(),
            size: bytes.len() as u64,
        })
    }

    /// Read an artifact.  Unknown session or name is `NotFound`, not an
    /// I/O error — absence is an expected state in this protocol.
    pub fn get(&self, session_id: &str, name: &str) -> Result<Vec<u8>, SessionError> {
        validate_component(name)?;
        let path = self.session_dir(session_id)?.join(name);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(SessionError::NotFound {
                session: session_id.to_string(),
                name: name.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Absolute path of an artifact, verified to exist.  Gateways hand
    /// these paths to the encoder and the node-graph uploader.
    pub fn artifact_path(&self, session_id: &str, name: &str) -> Result<PathBuf, SessionError> {
        validate_component(name)?;
        let path = self.session_dir(session_id)?.join(name);
        if !path.is_file() {
            return Err(SessionError::NotFound {
                session: session_id.to_string(),
                name: name.to_string(),
            });
        }
        Ok(path)
    }

    /// List a session's artifacts in descending `created_at` order.
    /// An unknown session yields `exists: false` and an empty list.
    pub fn list(&self, session_id: &str) -> Result<SessionListing, SessionError> {
        let dir = self.session_dir(session_id)?;
        if !dir.is_dir() {
            return Ok(SessionListing {
                session_id: session_id.to_string(),
                exists: false,
                files: Vec::new(),
            });
        }

        let mut files = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let meta = entry.metadata()?;
            if !meta.is_file() {
                continue;
            }
            let created = meta
                .created()
                .or_else(|_| meta.modified())
                .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
            files.push(FileInfo {
                name: entry.file_name().to_string_lossy().into_owned(),
                size: meta.len(),
                created_at: DateTime::<Utc>::from(created),
            });
        }
        files.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(SessionListing {
            session_id: session_id.to_string(),
            exists: true,
            files,
        })
    }

    /// Recursively remove a session.  Returns the number of files removed;
    /// an unknown session removes nothing and is not an error.
    pub fn delete(&self, session_id: &str) -> Result<usize, SessionError> {
        let dir = self.session_dir(session_id)?;
        if !dir.is_dir() {
            return Ok(0);
        }
        let count = count_files(&dir)?;
        std::fs::remove_dir_all(&dir)?;
        Ok(count)
    }
}

fn count_files(dir: &Path) -> std::io::Result<usize> {
    let mut count = 0;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.metadata()?.is_dir() {
            count += count_files(&entry.path())?;
        } else {
            count += 1;
        }
    }
    Ok(count)
}

/// Reject anything that is not a single, normal path component.
fn validate_component(name: &str) -> Result<(), SessionError> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0')
    {
        return Err(SessionError::InvalidName(name.to_string()));
    }
    Ok(())
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, SessionStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("sessions"));
        (dir, store)
    }

    #[test]
    fn put_then_get_round_trips() {
        let (_dir, store) = store();
        store.put("s1", "scene_001.mp4", b"video bytes").unwrap();
        let bytes = store.get("s1", "scene_001.mp4").unwrap();
        assert_eq!(bytes, b"video bytes");
    }

    #[test]
    fn put_creates_session_directory_lazily() {
        let (_dir, store) = store();
        assert!(!store.session_dir("fresh").unwrap().exists());
        store.put("fresh", "a.txt", b"x").unwrap();
        assert!(store.session_dir("fresh").unwrap().is_dir());
    }

    #[test]
    fn second_put_overwrites_last_writer_wins() {
        let (_dir, store) = store();
        store.put("s1", "final.mp4", b"first").unwrap();
        store.put("s1", "final.mp4", b"second").unwrap();
        assert_eq!(store.get("s1", "final.mp4").unwrap(), b"second");
    }

    #[test]
    fn get_unknown_artifact_is_not_found() {
        let (_dir, store) = store();
        store.put("s1", "a.txt", b"x").unwrap();
        let err = store.get("s1", "missing.mp4").unwrap_err();
        assert!(matches!(err, SessionError::NotFound { .. }));
    }

    #[test]
    fn get_unknown_session_is_not_found() {
        let (_dir, store) = store();
        let err = store.get("nope", "a.txt").unwrap_err();
        assert!(matches!(err, SessionError::NotFound { .. }));
    }

    #[test]
    fn list_unknown_session_reports_exists_false() {
        let (_dir, store) = store();
        let listing = store.list("ghost").unwrap();
        assert!(!listing.exists);
        assert!(listing.files.is_empty());
    }

    #[test]
    fn list_sorted_newest_first() {
        let (_dir, store) = store();
        store.put("s1", "older.mp3", b"a").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        store.put("s1", "newer.mp3", b"b").unwrap();

        let listing = store.list("s1").unwrap();
        assert!(listing.exists);
        assert_eq!(listing.files.len(), 2);
        assert_eq!(listing.files[0].name, "newer.mp3");
    }

    #[test]
    fn delete_returns_file_count_and_clears_listing() {
        let (_dir, store) = store();
        store.put("s1", "a.mp4", b"x").unwrap();
        store.put("s1", "b.mp4", b"y").unwrap();

        assert_eq!(store.delete("s1").unwrap(), 2);
        let listing = store.list("s1").unwrap();
        assert!(!listing.exists);
        assert!(listing.files.is_empty());
    }

    #[test]
    fn delete_unknown_session_removes_nothing() {
        let (_dir, store) = store();
        assert_eq!(store.delete("ghost").unwrap(), 0);
    }

    #[test]
    fn path_components_in_names_are_rejected() {
        let (_dir, store) = store();
        for bad in ["../escape", "a/b", "a\\b", "..", ""] {
            let err = store.put("s1", bad, b"x").unwrap_err();
            assert!(matches!(err, SessionError::InvalidName(_)), "name {bad:?}");
        }
        // Session ids get the same treatment.
        let err = store.put("../other", "a.txt", b"x").unwrap_err();
        assert!(matches!(err, SessionError::InvalidName(_)));
    }
}
