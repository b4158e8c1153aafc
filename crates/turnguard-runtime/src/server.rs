//! Shared OpenCode server lifecycle.
//!
//! Sessions share one `opencode serve` process through a reference count
//! kept in `server.refs` in the state directory. Every read-modify-write of
//! the refs file happens under an exclusive `flock` on `server.lock`, so
//! concurrent session start/end hooks serialize.
//!
//! A server that was already listening when we first looked is recorded as
//! external and is never killed.

use backon::{ConstantBuilder, Retryable};
use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::process::Command;

use crate::config::EngineConfig;
use crate::judge::locate_binary;

const LOCK_FILE: &str = "server.lock";
const REFS_FILE: &str = "server.refs";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const READY_ATTEMPTS: usize = 30;
const READY_INTERVAL: Duration = Duration::from_millis(500);
const STOP_POLLS: usize = 10;
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("opencode binary not found; is it installed and on PATH?")]
    BinaryNotFound,

    #[error("Failed to access {path}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to lock {path}: {source}")]
    LockError {
        path: PathBuf,
        #[source]
        source: Errno,
    },

    #[error("Failed to start opencode server: {0}")]
    SpawnError(#[source] std::io::Error),

    #[error("opencode server on port {port} did not respond")]
    NotReady { port: u16 },

    #[error("Lock task failed: {0}")]
    TaskError(String),
}

/// Contents of the refs file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerRefs {
    pub count: u32,
    pub pid: Option<u32>,
    /// The server was running before any session acquired it
    #[serde(default)]
    pub external: bool,
}

/// Reference-counted start and stop of the judge server.
#[derive(Debug, Clone)]
pub struct ServerLifecycle {
    state_dir: PathBuf,
    binary: Option<PathBuf>,
    port: u16,
    ready_attempts: usize,
    ready_interval: Duration,
}

impl ServerLifecycle {
    pub fn new(state_dir: impl Into<PathBuf>, binary: Option<PathBuf>, port: u16) -> Self {
        Self {
            state_dir: state_dir.into(),
            binary,
            port,
            ready_attempts: READY_ATTEMPTS,
            ready_interval: READY_INTERVAL,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            config.state_dir.clone(),
            locate_binary(config.opencode.binary.as_deref()),
            config.opencode.server_port,
        )
    }

    /// Override the readiness polling schedule.
    pub fn with_readiness(mut self, attempts: usize, interval: Duration) -> Self {
        self.ready_attempts = attempts;
        self.ready_interval = interval;
        self
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    fn lock_path(&self) -> PathBuf {
        self.state_dir.join(LOCK_FILE)
    }

    fn refs_path(&self) -> PathBuf {
        self.state_dir.join(REFS_FILE)
    }

    /// Current refs, or the empty state when missing or unreadable.
    pub fn refs(&self) -> ServerRefs {
        load_refs(&self.refs_path())
    }

    /// Take a reference, starting the server if nobody holds one.
    pub async fn acquire(&self) -> Result<ServerRefs, ServerError> {
        let binary = self.binary.clone().ok_or(ServerError::BinaryNotFound)?;

        fs::create_dir_all(&self.state_dir).map_err(|source| ServerError::IoError {
            path: self.state_dir.clone(),
            source,
        })?;
        let _lock = self.lock().await?;

        let mut refs = self.refs();
        if (refs.pid.is_some() || refs.external) && !self.is_running(&refs).await {
            tracing::info!(pid = ?refs.pid, "Recorded server is gone, resetting refs");
            refs = ServerRefs::default();
        }

        if refs.count == 0 {
            if is_listening(self.port).await {
                tracing::info!(port = self.port, "Using already running opencode server");
                refs.pid = None;
                refs.external = true;
            } else {
                refs.pid = Some(self.start(&binary).await?);
                refs.external = false;
            }
        }

        refs.count += 1;
        self.save(&refs)?;

        tracing::info!(count = refs.count, pid = ?refs.pid, "Server reference acquired");
        Ok(refs)
    }

    /// Drop a reference, stopping an owned server when the count reaches zero.
    pub async fn release(&self) -> Result<ServerRefs, ServerError> {
        if !self.lock_path().exists() {
            return Ok(ServerRefs::default());
        }
        let _lock = self.lock().await?;

        let mut refs = self.refs();
        refs.count = refs.count.saturating_sub(1);

        if refs.count == 0 {
            if let Some(pid) = refs.pid.filter(|_| !refs.external) {
                stop(pid).await;
            }
            refs.pid = None;
            refs.external = false;
        }

        self.save(&refs)?;

        tracing::info!(count = refs.count, "Server reference released");
        Ok(refs)
    }

    async fn lock(&self) -> Result<Flock<File>, ServerError> {
        let path = self.lock_path();
        tokio::task::spawn_blocking(move || lock_exclusive(&path))
            .await
            .map_err(|e| ServerError::TaskError(e.to_string()))?
    }

    async fn is_running(&self, refs: &ServerRefs) -> bool {
        if refs.external {
            return is_listening(self.port).await;
        }
        refs.pid.is_some_and(is_process_running)
    }

    async fn start(&self, binary: &Path) -> Result<u32, ServerError> {
        let mut child = Command::new(binary)
            .args(["serve", "--port", &self.port.to_string()])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .process_group(0)
            .spawn()
            .map_err(ServerError::SpawnError)?;

        let pid = child
            .id()
            .ok_or_else(|| ServerError::SpawnError(std::io::Error::other("server exited at once")))?;

        let port = self.port;
        let ready = (move || async move {
            if is_listening(port).await {
                Ok(())
            } else {
                Err(ServerError::NotReady { port })
            }
        })
        .retry(
            ConstantBuilder::default()
                .with_delay(self.ready_interval)
                .with_max_times(self.ready_attempts),
        )
        .await;

        if let Err(e) = ready {
            tracing::warn!(pid, port, "Server never responded, killing it");
            let _ = child.start_kill();
            let _ = tokio::time::timeout(Duration::from_secs(5), child.wait()).await;
            return Err(e);
        }

        tracing::info!(pid, port, "Started opencode server");
        Ok(pid)
    }

    fn save(&self, refs: &ServerRefs) -> Result<(), ServerError> {
        let path = self.refs_path();
        let tmp = path.with_extension("refs.tmp");
        let io_err = |source| ServerError::IoError {
            path: path.clone(),
            source,
        };

        let json = serde_json::to_string(refs).map_err(|e| io_err(e.into()))?;
        if let Err(e) = fs::write(&tmp, json) {
            let _ = fs::remove_file(&tmp);
            return Err(io_err(e));
        }
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(io_err(e));
        }
        Ok(())
    }
}

fn lock_exclusive(path: &Path) -> Result<Flock<File>, ServerError> {
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)
        .map_err(|source| ServerError::IoError {
            path: path.to_path_buf(),
            source,
        })?;

    Flock::lock(file, FlockArg::LockExclusive).map_err(|(_, source)| ServerError::LockError {
        path: path.to_path_buf(),
        source,
    })
}

fn load_refs(path: &Path) -> ServerRefs {
    match fs::read_to_string(path) {
        Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), error = %e, "Corrupt refs file, starting over");
            ServerRefs::default()
        }),
        Err(_) => ServerRefs::default(),
    }
}

async fn is_listening(port: u16) -> bool {
    matches!(
        tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(("127.0.0.1", port))).await,
        Ok(Ok(_))
    )
}

fn is_process_running(pid: u32) -> bool {
    match kill(Pid::from_raw(pid as i32), None) {
        Ok(_) => true,
        Err(Errno::ESRCH) => false,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

/// SIGTERM, wait, then SIGKILL.
async fn stop(pid: u32) {
    let target = Pid::from_raw(pid as i32);
    if kill(target, Signal::SIGTERM).is_err() {
        return;
    }

    for _ in 0..STOP_POLLS {
        if !is_process_running(pid) {
            tracing::info!(pid, "Stopped opencode server");
            return;
        }
        tokio::time::sleep(STOP_POLL_INTERVAL).await;
    }

    tracing::warn!(pid, "Server ignored SIGTERM, killing");
    let _ = kill(target, Signal::SIGKILL);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use tempfile::TempDir;

    fn fake_binary(dir: &TempDir) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.path().join("opencode");
        fs::write(&path, "#!/bin/sh\nexit 0\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn free_port() -> u16 {
        TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    #[tokio::test]
    async fn test_acquire_without_binary() {
        let dir = TempDir::new().unwrap();
        let lifecycle = ServerLifecycle::new(dir.path(), None, free_port());

        assert!(matches!(
            lifecycle.acquire().await,
            Err(ServerError::BinaryNotFound)
        ));
    }

    #[tokio::test]
    async fn test_external_server_is_shared_and_kept() {
        let dir = TempDir::new().unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let lifecycle = ServerLifecycle::new(dir.path(), Some(fake_binary(&dir)), port);

        let first = lifecycle.acquire().await.unwrap();
        assert!(first.external);
        assert_eq!(first.count, 1);
        assert_eq!(lifecycle.acquire().await.unwrap().count, 2);

        assert_eq!(lifecycle.release().await.unwrap().count, 1);
        let last = lifecycle.release().await.unwrap();
        assert_eq!(last, ServerRefs::default());

        // still accepting connections
        assert!(is_listening(port).await);
    }

    #[tokio::test]
    async fn test_server_that_never_listens() {
        let dir = TempDir::new().unwrap();
        let lifecycle = ServerLifecycle::new(dir.path(), Some(fake_binary(&dir)), free_port())
            .with_readiness(2, Duration::from_millis(10));

        let result = lifecycle.acquire().await;
        assert!(matches!(result, Err(ServerError::NotReady { .. })));
        assert_eq!(lifecycle.refs().count, 0);
    }

    #[tokio::test]
    async fn test_stale_refs_are_reset() {
        let dir = TempDir::new().unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let lifecycle = ServerLifecycle::new(dir.path(), Some(fake_binary(&dir)), port);

        lifecycle
            .save(&ServerRefs {
                count: 5,
                pid: Some(i32::MAX as u32),
                external: false,
            })
            .unwrap();

        let refs = lifecycle.acquire().await.unwrap();
        assert_eq!(refs.count, 1);
        assert!(refs.external);
    }

    #[tokio::test]
    async fn test_release_without_lock_file() {
        let dir = TempDir::new().unwrap();
        let lifecycle = ServerLifecycle::new(dir.path(), None, free_port());
        assert_eq!(lifecycle.release().await.unwrap(), ServerRefs::default());
    }

    #[test]
    fn test_corrupt_refs_read_as_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(REFS_FILE);
        fs::write(&path, "not json").unwrap();
        assert_eq!(load_refs(&path), ServerRefs::default());
    }

    #[test]
    fn test_current_process_is_running() {
        assert!(is_process_running(std::process::id()));
    }
}
