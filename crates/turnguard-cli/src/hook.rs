//! Stop-hook entry point.
//!
//! Reads the hook JSON, evaluates the transcript and returns the payload to
//! print. Every failure on this path is logged and becomes "no output"; the
//! host never sees an error from the hook.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use turnguard_core::{HookResponse, Mode, Transcript};
use turnguard_runtime::{build_backend, EngineBuilder, EngineConfig, Invocation, JudgeBackend};

use crate::policy::find_policy;

/// What the host writes to the hook's stdin.
#[derive(Debug, Default, Deserialize)]
pub struct HookInput {
    #[serde(default)]
    pub session_id: String,

    #[serde(default)]
    pub transcript_path: Option<PathBuf>,

    #[serde(default)]
    pub hook_event_name: String,

    #[serde(default)]
    pub cwd: Option<PathBuf>,
}

pub struct HookRunner {
    config: EngineConfig,
    rules_override: Option<PathBuf>,
    project_dir: Option<PathBuf>,
    process_dir: Option<PathBuf>,
}

impl HookRunner {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            rules_override: None,
            project_dir: None,
            process_dir: None,
        }
    }

    pub fn with_rules(mut self, path: Option<PathBuf>) -> Self {
        self.rules_override = path;
        self
    }

    /// `$CLAUDE_PROJECT_DIR`, searched first for the policy.
    pub fn with_project_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.project_dir = dir;
        self
    }

    /// The process working directory, searched last for the policy.
    pub fn with_process_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.process_dir = dir;
        self
    }

    /// Evaluate with the configured backend.
    pub async fn run(&self, raw_input: &str) -> Option<HookResponse> {
        match build_backend(&self.config) {
            Ok(backend) => self.run_with(raw_input, backend).await,
            Err(e) => {
                tracing::warn!(backend = %self.config.backend, error = %e, "Judge backend unavailable");
                None
            }
        }
    }

    pub async fn run_with(
        &self,
        raw_input: &str,
        backend: Arc<dyn JudgeBackend>,
    ) -> Option<HookResponse> {
        let input: HookInput = match serde_json::from_str(raw_input) {
            Ok(input) => input,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to parse hook input");
                return None;
            }
        };

        tracing::info!(
            event = %input.hook_event_name,
            session = %input.session_id,
            "Hook triggered"
        );

        let Some(path) = input.transcript_path.as_deref().filter(|p| p.is_file()) else {
            tracing::info!(path = ?input.transcript_path, "No transcript to evaluate");
            return None;
        };

        let transcript = match Transcript::from_file(path) {
            Ok(transcript) => transcript,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read transcript");
                return None;
            }
        };
        if !transcript.has_assistant_message() {
            tracing::info!("No assistant message found");
            return None;
        }

        let source = self.config.rule_source(self.rules_override.as_deref());
        let rules = source.load_or_empty();
        if rules.is_empty() {
            return None;
        }
        tracing::info!(rules = rules.len(), source = %source, "Loaded rules");

        let policy = if rules.uses_mode(Mode::ClaudeMd) {
            let policy = find_policy(self.policy_dirs(input.cwd.as_deref()));
            if policy.is_none() {
                tracing::info!("No CLAUDE.md found, skipping claudemd rules");
            }
            policy
        } else {
            None
        };

        let engine = match EngineBuilder::from_config(&self.config)
            .rules(rules)
            .backend(backend)
            .build()
        {
            Ok(engine) => engine,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to build engine");
                return None;
            }
        };

        let invocation = Invocation {
            session_id: input.session_id,
            messages: transcript.messages().to_vec(),
            policy,
        };
        let decision = engine.run(invocation).await;

        let response = HookResponse::from(&decision);
        (!response.is_empty()).then_some(response)
    }

    fn policy_dirs<'a>(&'a self, hook_cwd: Option<&'a Path>) -> Vec<&'a Path> {
        [
            self.project_dir.as_deref(),
            hook_cwd,
            self.process_dir.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}
