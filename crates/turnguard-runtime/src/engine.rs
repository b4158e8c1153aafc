//! End-to-end evaluation of one hook invocation.
//!
//! Extract contexts → filter applicable rules → judge concurrently →
//! aggregate under the safety valve. Nothing here returns an error once the
//! engine is built; every failure degrades to fewer verdicts or a no-op.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use turnguard_core::{
    ContextExtractor, Decision, DecisionAggregator, FileSessionStore, Message, RuleId, RuleSet,
    SessionStore, DEFAULT_MAX_BLOCKS, DEFAULT_MIN_LAST_LENGTH,
};

use crate::client::JudgeClient;
use crate::config::{EngineConfig, DEFAULT_JUDGE_TIMEOUT};
use crate::evaluator::{ConcurrentEvaluator, EvaluationTask};
use crate::judge::JudgeBackend;

/// Engine construction errors.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Judge backend not configured: {0}")]
    BackendNotConfigured(String),

    #[error("Session store not configured: {0}")]
    SessionStoreNotConfigured(String),
}

/// Everything the engine needs from one lifecycle event.
#[derive(Debug, Clone, Default)]
pub struct Invocation {
    pub session_id: String,
    pub messages: Vec<Message>,
    /// Project policy document for `claudemd` rules
    pub policy: Option<String>,
}

impl Invocation {
    pub fn new(session_id: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            session_id: session_id.into(),
            messages,
            policy: None,
        }
    }

    pub fn with_policy(mut self, policy: impl Into<String>) -> Self {
        self.policy = Some(policy.into());
        self
    }
}

/// The behavior-rule engine.
pub struct Engine {
    rules: RuleSet,
    extractor: ContextExtractor,
    evaluator: ConcurrentEvaluator,
    aggregator: DecisionAggregator,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Decide the action for one invocation.
    pub async fn run(&self, invocation: Invocation) -> Decision {
        if self.rules.is_empty() {
            tracing::debug!("No rules loaded, nothing to evaluate");
            return Decision::no_op();
        }

        let contexts = self
            .extractor
            .extract_all(&invocation.messages, invocation.policy.as_deref());
        if contexts.is_empty() {
            tracing::debug!(
                messages = invocation.messages.len(),
                "No assistant context, skipping evaluation"
            );
            return Decision::no_op();
        }

        let applicable = self.rules.applicable(&contexts);
        if applicable.is_empty() {
            tracing::debug!("No rule applies to this turn");
            return Decision::no_op();
        }

        let client = self.evaluator.client();
        let ids: Vec<RuleId> = applicable.iter().map(|a| a.id).collect();
        let tasks = applicable
            .iter()
            .map(|a| EvaluationTask {
                id: a.id,
                rule: a.rule.clone(),
                context: Arc::new(a.context.clone()),
                timeout: client.timeout_for(a.rule),
            })
            .collect();

        let outcome = self.evaluator.evaluate(tasks).await;

        let decision =
            self.aggregator
                .decide(&invocation.session_id, &self.rules, &ids, &outcome.verdicts);

        tracing::info!(
            session = %invocation.session_id,
            applicable = ids.len(),
            judge_failures = decision.judge_failures,
            block = decision.is_block(),
            suggestions = decision.suggestions.len(),
            "Decision"
        );

        decision
    }
}

/// Builder for [`Engine`].
pub struct EngineBuilder {
    rules: RuleSet,
    backend: Option<Arc<dyn JudgeBackend>>,
    store: Option<Arc<dyn SessionStore>>,
    min_last_length: usize,
    max_blocks: u32,
    judge_timeout: Duration,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            rules: RuleSet::empty(),
            backend: None,
            store: None,
            min_last_length: DEFAULT_MIN_LAST_LENGTH,
            max_blocks: DEFAULT_MAX_BLOCKS,
            judge_timeout: DEFAULT_JUDGE_TIMEOUT,
        }
    }

    /// Take thresholds, timeout and the session directory from `config`.
    ///
    /// The backend is still set separately.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new()
            .min_last_length(config.min_last_length)
            .max_blocks(config.max_blocks)
            .judge_timeout(config.judge_timeout)
            .session_store(Arc::new(FileSessionStore::new(config.sessions_dir())))
    }

    pub fn rules(mut self, rules: RuleSet) -> Self {
        self.rules = rules;
        self
    }

    pub fn backend(mut self, backend: Arc<dyn JudgeBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn min_last_length(mut self, min_last_length: usize) -> Self {
        self.min_last_length = min_last_length;
        self
    }

    pub fn max_blocks(mut self, max_blocks: u32) -> Self {
        self.max_blocks = max_blocks;
        self
    }

    pub fn judge_timeout(mut self, timeout: Duration) -> Self {
        self.judge_timeout = timeout;
        self
    }

    pub fn build(self) -> Result<Engine, EngineError> {
        let backend = self
            .backend
            .ok_or_else(|| EngineError::BackendNotConfigured("No backend set".to_string()))?;
        let store = self.store.ok_or_else(|| {
            EngineError::SessionStoreNotConfigured("No session store set".to_string())
        })?;

        let client = Arc::new(JudgeClient::new(backend, self.judge_timeout));

        Ok(Engine {
            rules: self.rules,
            extractor: ContextExtractor::new(self.min_last_length),
            evaluator: ConcurrentEvaluator::new(client),
            aggregator: DecisionAggregator::new(store).with_max_blocks(self.max_blocks),
        })
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::judge::{Reply, ScriptedBackend};
    use turnguard_core::{Gate, MemorySessionStore};

    const RULES: &str = "\
Did the agent skip tests?,turn,block,Explain
Is the final answer evasive?,last,notify,Explain
";

    #[test]
    fn test_build_without_backend() {
        let result = Engine::builder()
            .session_store(Arc::new(MemorySessionStore::new()))
            .build();
        assert!(matches!(result, Err(EngineError::BackendNotConfigured(_))));
    }

    #[test]
    fn test_build_without_store() {
        let result = Engine::builder()
            .backend(Arc::new(ScriptedBackend::default()))
            .build();
        assert!(matches!(result, Err(EngineError::SessionStoreNotConfigured(_))));
    }

    #[test]
    fn test_from_config_uses_thresholds() {
        let config = EngineConfig {
            min_last_length: 7,
            max_blocks: 3,
            ..EngineConfig::default()
        };
        let engine = EngineBuilder::from_config(&config)
            .backend(Arc::new(ScriptedBackend::default()))
            .build()
            .unwrap();

        assert_eq!(engine.extractor.min_last_length(), 7);
        assert_eq!(engine.aggregator.max_blocks(), 3);
    }

    #[tokio::test]
    async fn test_empty_rules_skip_judge() {
        let backend = Arc::new(ScriptedBackend::always(Reply::yes("x")));
        let engine = Engine::builder()
            .backend(backend.clone())
            .session_store(Arc::new(MemorySessionStore::new()))
            .build()
            .unwrap();

        let decision = engine
            .run(Invocation::new("s", vec![Message::assistant("done", 0)]))
            .await;
        assert!(decision.is_no_op());
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_only_applicable_rules_are_judged() {
        let backend = Arc::new(ScriptedBackend::always(Reply::yes("Tests were skipped.")));
        let engine = Engine::builder()
            .rules(RuleSet::from_csv(RULES).unwrap())
            .backend(backend.clone())
            .session_store(Arc::new(MemorySessionStore::new()))
            .build()
            .unwrap();

        let messages = vec![Message::user("fix it", 0), Message::assistant("Done.", 1)];
        let decision = engine.run(Invocation::new("s", messages)).await;

        // short final message: only the turn rule is judged
        assert_eq!(backend.call_count(), 1);
        assert!(matches!(decision.gate, Gate::Block { block_count: 1, .. }));
    }
}
