//! Judge backends: the external oracles that answer rule questions.
//!
//! A backend takes a fully rendered prompt and returns the raw answer text.
//! Parsing the answer and failing open are the [`JudgeClient`]'s job, so a
//! backend only has to report honestly when it cannot answer.
//!
//! [`JudgeClient`]: crate::client::JudgeClient
//!
//! ## Security
//!
//! Backends that need an API key hold it as an [`ApiCredential`].

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use turnguard_core::JudgeError;

use crate::config::{BackendKind, EngineConfig};

mod opencode;
mod scripted;
pub mod secrets;

#[cfg(feature = "anthropic")]
mod anthropic;

pub use opencode::{locate_binary, OpenCodeBackend};
pub use scripted::{Reply, ScriptedBackend};
pub use secrets::{ApiCredential, CredentialSource};

#[cfg(feature = "anthropic")]
pub use anthropic::AnthropicBackend;

/// An oracle that answers one judge prompt.
#[async_trait]
pub trait JudgeBackend: Send + Sync {
    /// Send `prompt` and return the raw answer.
    ///
    /// `timeout` is the budget for this call; callers enforce it as well.
    async fn ask(&self, prompt: &str, timeout: Duration) -> Result<String, JudgeError>;

    /// Whether the backend looks usable, without sending a prompt.
    async fn health_check(&self) -> bool;

    /// Backend name for logs.
    fn name(&self) -> &str;
}

/// Build the backend selected in the configuration.
pub fn build_backend(config: &EngineConfig) -> Result<Arc<dyn JudgeBackend>, JudgeError> {
    match config.backend {
        BackendKind::OpenCode => {
            let backend = OpenCodeBackend::discover(
                config.opencode.binary.clone(),
                Some(config.opencode.server_url.clone()),
            );
            if backend.binary().is_none() {
                tracing::warn!("opencode binary not found, rules will not be evaluated");
            }
            Ok(Arc::new(backend))
        }
        BackendKind::Anthropic => build_anthropic(config),
        BackendKind::Scripted => Ok(Arc::new(ScriptedBackend::always(Reply::no(
            "Scripted backend: no evaluation performed.",
        )))),
    }
}

#[cfg(feature = "anthropic")]
fn build_anthropic(config: &EngineConfig) -> Result<Arc<dyn JudgeBackend>, JudgeError> {
    let credential = config.anthropic.api_key.clone().ok_or_else(|| {
        JudgeError::Unavailable(
            "Anthropic API key required: set anthropic.api_key or ANTHROPIC_API_KEY".to_string(),
        )
    })?;
    Ok(Arc::new(AnthropicBackend::new(credential, &config.anthropic)?))
}

#[cfg(not(feature = "anthropic"))]
fn build_anthropic(_config: &EngineConfig) -> Result<Arc<dyn JudgeBackend>, JudgeError> {
    Err(JudgeError::Unavailable(
        "Anthropic backend requires the 'anthropic' feature".to_string(),
    ))
}
