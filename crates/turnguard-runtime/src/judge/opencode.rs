//! OpenCode judge backend.
//!
//! Asks through a running `opencode serve` instance when one is configured
//! (`opencode run --attach <url> <prompt>`), falling back to a one-shot
//! `opencode run <prompt>`. Both attempts share the caller's time budget.

use async_trait::async_trait;
use directories::BaseDirs;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::Instant;

use turnguard_core::JudgeError;

use super::JudgeBackend;
use crate::evaluator::deadline_after;

const BINARY_NAME: &str = "opencode";

/// Find the `opencode` binary.
///
/// Order: the explicit path, `PATH`, `~/.opencode/bin`, `~/.local/bin`.
pub fn locate_binary(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        if path.is_file() {
            return Some(path.to_path_buf());
        }
        tracing::warn!(path = %path.display(), "Configured opencode binary does not exist, searching");
    }

    let on_path = std::env::var_os("PATH").and_then(|paths| {
        std::env::split_paths(&paths)
            .map(|dir| dir.join(BINARY_NAME))
            .find(|candidate| candidate.is_file())
    });
    if on_path.is_some() {
        return on_path;
    }

    let home = BaseDirs::new()?.home_dir().to_path_buf();
    [
        home.join(".opencode").join("bin").join(BINARY_NAME),
        home.join(".local").join("bin").join(BINARY_NAME),
    ]
    .into_iter()
    .find(|candidate| candidate.is_file())
}

/// Judge backend driving the `opencode` CLI.
#[derive(Debug, Clone)]
pub struct OpenCodeBackend {
    binary: Option<PathBuf>,
    server_url: Option<String>,
}

impl OpenCodeBackend {
    pub fn new(binary: Option<PathBuf>, server_url: Option<String>) -> Self {
        Self { binary, server_url }
    }

    /// Locate the binary and build the backend.
    pub fn discover(explicit: Option<PathBuf>, server_url: Option<String>) -> Self {
        Self::new(locate_binary(explicit.as_deref()), server_url)
    }

    pub fn binary(&self) -> Option<&Path> {
        self.binary.as_deref()
    }

    pub fn server_url(&self) -> Option<&str> {
        self.server_url.as_deref()
    }

    async fn run(binary: &Path, args: &[&str]) -> Result<String, JudgeError> {
        let output = Command::new(binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    JudgeError::Unavailable(format!("{}: {e}", binary.display()))
                } else {
                    JudgeError::Backend(format!("failed to run opencode: {e}"))
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = stderr.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
            return Err(JudgeError::Backend(format!(
                "opencode exited with {}: {}",
                output.status,
                detail.trim()
            )));
        }

        let answer = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if answer.is_empty() {
            return Err(JudgeError::Backend("opencode returned no output".to_string()));
        }
        Ok(answer)
    }
}

#[async_trait]
impl JudgeBackend for OpenCodeBackend {
    async fn ask(&self, prompt: &str, timeout: Duration) -> Result<String, JudgeError> {
        let binary = self
            .binary
            .as_deref()
            .ok_or_else(|| JudgeError::Unavailable("opencode binary not found".to_string()))?;

        let deadline = deadline_after(Instant::now(), timeout);

        if let Some(url) = self.server_url.as_deref() {
            let attached =
                tokio::time::timeout_at(deadline, Self::run(binary, &["run", "--attach", url, prompt]))
                    .await
                    .map_err(|_| JudgeError::Timeout(timeout))?;

            match attached {
                Ok(answer) => return Ok(answer),
                Err(e) => {
                    tracing::debug!(server = url, error = %e, "Attached run failed, running opencode directly");
                }
            }
        }

        tokio::time::timeout_at(deadline, Self::run(binary, &["run", prompt]))
            .await
            .map_err(|_| JudgeError::Timeout(timeout))?
    }

    async fn health_check(&self) -> bool {
        self.binary.as_deref().is_some_and(Path::is_file)
    }

    fn name(&self) -> &str {
        "opencode"
    }
}
