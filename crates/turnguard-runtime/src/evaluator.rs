//! Concurrent evaluation of applicable rules.
//!
//! # Architecture
//! - Fan-out: one tokio task per rule, all dispatched at once
//! - Bulkhead: a failing, slow or panicking judge only loses its own verdict
//! - Deadline: the slowest per-rule timeout plus [`DEADLINE_GRACE`]; tasks
//!   still running then are aborted and their results never merged
//! - Fan-in: verdicts sorted by rule id for deterministic reduction

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;

use turnguard_core::{EvaluationContext, Rule, RuleId, Verdict};

use crate::client::JudgeClient;

/// Scheduling slack added to the slowest per-rule timeout.
pub const DEADLINE_GRACE: Duration = Duration::from_millis(500);

const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// `start + wait`, clamped to a far-future instant instead of overflowing.
pub(crate) fn deadline_after(start: Instant, wait: Duration) -> Instant {
    start
        .checked_add(wait)
        .unwrap_or_else(|| start + FAR_FUTURE)
}

/// One rule to judge, with everything the task needs to own.
#[derive(Debug, Clone)]
pub struct EvaluationTask {
    pub id: RuleId,
    pub rule: Rule,
    pub context: Arc<EvaluationContext>,
    pub timeout: Duration,
}

/// Verdicts collected before the deadline.
#[derive(Debug, Clone)]
pub struct EvaluationOutcome {
    /// Sorted by rule id
    pub verdicts: Vec<Verdict>,

    pub dispatched: usize,

    /// Tasks aborted at the deadline or lost to a panic
    pub lost: usize,

    pub elapsed: Duration,
}

/// Fans rules out to a [`JudgeClient`].
pub struct ConcurrentEvaluator {
    client: Arc<JudgeClient>,
}

impl ConcurrentEvaluator {
    pub fn new(client: Arc<JudgeClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &JudgeClient {
        &self.client
    }

    /// Judge every task concurrently and wait for the slowest.
    pub async fn evaluate(&self, tasks: Vec<EvaluationTask>) -> EvaluationOutcome {
        let started = Instant::now();
        let dispatched = tasks.len();

        let slowest = tasks.iter().map(|t| t.timeout).max().unwrap_or_default();
        let wait = slowest.saturating_add(DEADLINE_GRACE);
        let deadline = deadline_after(started, wait);

        tracing::info!(
            rules = dispatched,
            backend = self.client.backend_name(),
            deadline = %humantime::format_duration(wait),
            "Dispatching judge calls"
        );

        let mut set = JoinSet::new();
        for task in tasks {
            let client = Arc::clone(&self.client);
            set.spawn(async move {
                client
                    .evaluate(task.id, &task.rule, &task.context, task.timeout)
                    .await
            });
        }

        let mut verdicts = Vec::with_capacity(dispatched);
        loop {
            match tokio::time::timeout_at(deadline, set.join_next()).await {
                Ok(Some(Ok(verdict))) => verdicts.push(verdict),
                Ok(Some(Err(e))) => {
                    tracing::error!(error = %e, "Judge task failed");
                }
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!(
                        pending = set.len(),
                        "Evaluation deadline passed, discarding late verdicts"
                    );
                    set.abort_all();
                    break;
                }
            }
        }

        verdicts.sort_by_key(|v| v.rule);
        let elapsed = started.elapsed();

        tracing::info!(
            completed = verdicts.len(),
            dispatched,
            elapsed_ms = elapsed.as_millis() as u64,
            "Judge calls finished"
        );

        EvaluationOutcome {
            lost: dispatched - verdicts.len(),
            verdicts,
            dispatched,
            elapsed,
        }
    }
}
