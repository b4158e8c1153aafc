//! Per-session block counters.
//!
//! Only the decision aggregator reads or writes these. A counter starts
//! at zero, grows by one per block and is never reset for a session.

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from a session store.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session store I/O failed at {path}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Corrupt session counter at {path}: '{value}'")]
    Corrupt { path: PathBuf, value: String },
}

/// Persistent state of one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub session_id: String,
    pub block_count: u32,
}

impl SessionState {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            block_count: 0,
        }
    }
}

/// Storage for session counters, keyed by session id.
pub trait SessionStore: Send + Sync {
    /// Current state; an unknown session has a count of zero.
    fn load(&self, session_id: &str) -> Result<SessionState, SessionError>;

    /// Durably record the state before returning.
    fn save(&self, state: &SessionState) -> Result<(), SessionError>;
}

/// Filesystem key for a session id: the first 16 hex chars of its SHA-256.
///
/// Hashing keeps crafted ids such as `../../etc` out of the path.
pub fn session_key(session_id: &str) -> String {
    let digest = Sha256::digest(session_id.as_bytes());
    let mut key = hex::encode(digest);
    key.truncate(16);
    key
}

/// One `<key>.count` file per session inside a directory.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{}.count", session_key(session_id)))
    }
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> SessionError + '_ {
    move |source| SessionError::IoError {
        path: path.to_path_buf(),
        source,
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self, session_id: &str) -> Result<SessionState, SessionError> {
        let path = self.path_for(session_id);

        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(SessionState::new(session_id));
            }
            Err(e) => return Err(io_error(&path)(e)),
        };

        let block_count = raw.trim().parse().map_err(|_| SessionError::Corrupt {
            path: path.clone(),
            value: raw.trim().to_string(),
        })?;

        Ok(SessionState {
            session_id: session_id.to_string(),
            block_count,
        })
    }

    fn save(&self, state: &SessionState) -> Result<(), SessionError> {
        fs::create_dir_all(&self.dir).map_err(io_error(&self.dir))?;

        let path = self.path_for(&state.session_id);
        let temp_path = path.with_extension("count.tmp");
        fs::write(&temp_path, state.block_count.to_string()).map_err(io_error(&temp_path))?;

        if let Err(e) = fs::rename(&temp_path, &path) {
            let _ = fs::remove_file(&temp_path);
            return Err(io_error(&path)(e));
        }

        tracing::debug!(
            session = %session_key(&state.session_id),
            block_count = state.block_count,
            "Persisted session counter"
        );
        Ok(())
    }
}

/// In-memory store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    counts: Mutex<HashMap<String, u32>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a session with an existing count.
    pub fn with_count(self, session_id: impl Into<String>, block_count: u32) -> Self {
        self.counts.lock().insert(session_id.into(), block_count);
        self
    }

    pub fn count(&self, session_id: &str) -> u32 {
        self.counts.lock().get(session_id).copied().unwrap_or(0)
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self, session_id: &str) -> Result<SessionState, SessionError> {
        Ok(SessionState {
            session_id: session_id.to_string(),
            block_count: self.count(session_id),
        })
    }

    fn save(&self, state: &SessionState) -> Result<(), SessionError> {
        self.counts
            .lock()
            .insert(state.session_id.clone(), state.block_count);
        Ok(())
    }
}
