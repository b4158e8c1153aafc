//! Judge client: one rule, one context, one verdict.
//!
//! The client never fails. Timeouts, backend errors and unparseable answers
//! all become a non-triggering [`Verdict`] that carries the error.

use std::sync::Arc;
use std::time::Duration;

use turnguard_core::{parse_judgment, EvaluationContext, JudgeError, Rule, RuleId, Verdict};

use crate::judge::JudgeBackend;
use crate::prompts::build_judge_prompt;

/// Fail-open wrapper around a [`JudgeBackend`].
#[derive(Clone)]
pub struct JudgeClient {
    backend: Arc<dyn JudgeBackend>,
    default_timeout: Duration,
}

impl JudgeClient {
    pub fn new(backend: Arc<dyn JudgeBackend>, default_timeout: Duration) -> Self {
        Self {
            backend,
            default_timeout,
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// The rule's own timeout, or the default.
    pub fn timeout_for(&self, rule: &Rule) -> Duration {
        rule.timeout.unwrap_or(self.default_timeout)
    }

    /// Judge `rule` against `context` within `timeout`.
    pub async fn evaluate(
        &self,
        id: RuleId,
        rule: &Rule,
        context: &EvaluationContext,
        timeout: Duration,
    ) -> Verdict {
        let prompt = build_judge_prompt(rule, context);

        let answer = match tokio::time::timeout(timeout, self.backend.ask(&prompt, timeout)).await {
            Ok(result) => result,
            Err(_) => Err(JudgeError::Timeout(timeout)),
        };

        let verdict = match answer.and_then(|raw| parse_judgment(&raw)) {
            Ok(judgment) => Verdict::answered(id, judgment),
            Err(e) => {
                tracing::warn!(
                    rule = %id,
                    backend = self.backend.name(),
                    kind = e.kind(),
                    error = %e,
                    "Judge call failed, treating rule as not triggered"
                );
                return Verdict::failed(id, e);
            }
        };

        tracing::info!(
            rule = %id,
            criteria = %rule.label(),
            triggered = verdict.triggered,
            "Verdict"
        );
        verdict
    }
}
