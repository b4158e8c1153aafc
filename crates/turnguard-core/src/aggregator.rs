//! Decision aggregation: reduces verdicts to one action under the safety valve.
//!
//! Policy, in order:
//! 1. Every applicable suggest rule contributes a suggestion, whatever its verdict
//! 2. Any triggered block rule → BLOCK, unless the session already hit `max_blocks`
//! 3. Else any triggered notify rule → NOTIFY
//! 4. Else no gating action
//!
//! When several rules of one tier fire, their explanations are concatenated in
//! rule-file order. This is the only place that mutates a session's block count.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::rules::RuleSet;
use crate::session::{session_key, SessionState, SessionStore};
use crate::types::{Action, Rule, RuleId};
use crate::verdict::Verdict;

/// Default cap on blocks per session.
pub const DEFAULT_MAX_BLOCKS: u32 = 10;

/// Separator between the entries of several contributing rules.
pub const ENTRY_SEPARATOR: &str = "\n\n";

/// The gating part of a decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Gate {
    /// Stop the turn; the agent must address `reason`
    Block { reason: String, block_count: u32 },

    /// Let the turn end but warn the user
    Notify { warning: String },

    Pass,
}

/// The single action decided for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub gate: Gate,

    /// Advisory texts, attached regardless of the gate
    pub suggestions: Vec<String>,

    /// Set when a block was demoted because the session hit the cap
    pub valve_exhausted: Option<u32>,

    /// Applicable rules that produced no usable verdict
    pub judge_failures: usize,
}

impl Decision {
    pub fn no_op() -> Self {
        Self {
            gate: Gate::Pass,
            suggestions: Vec::new(),
            valve_exhausted: None,
            judge_failures: 0,
        }
    }

    pub fn is_block(&self) -> bool {
        matches!(self.gate, Gate::Block { .. })
    }

    pub fn is_no_op(&self) -> bool {
        self.gate == Gate::Pass && self.suggestions.is_empty() && self.valve_exhausted.is_none()
    }
}

impl Default for Decision {
    fn default() -> Self {
        Self::no_op()
    }
}

/// Reduces verdicts and session state into a [`Decision`].
pub struct DecisionAggregator {
    store: Arc<dyn SessionStore>,
    max_blocks: u32,
}

impl DecisionAggregator {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            store,
            max_blocks: DEFAULT_MAX_BLOCKS,
        }
    }

    pub fn with_max_blocks(mut self, max_blocks: u32) -> Self {
        self.max_blocks = max_blocks;
        self
    }

    pub fn max_blocks(&self) -> u32 {
        self.max_blocks
    }

    /// Decide the action for one invocation.
    ///
    /// `applicable` lists the rules that were dispatched; `verdicts` holds
    /// whatever came back before the deadline, in any order.
    pub fn decide(
        &self,
        session_id: &str,
        rules: &RuleSet,
        applicable: &[RuleId],
        verdicts: &[Verdict],
    ) -> Decision {
        let by_rule: BTreeMap<RuleId, &Verdict> = verdicts.iter().map(|v| (v.rule, v)).collect();

        let judge_failures = applicable
            .iter()
            .filter(|id| by_rule.get(*id).map_or(true, |v| !v.is_answered()))
            .count();

        let mut applicable: Vec<RuleId> = applicable.to_vec();
        applicable.sort();
        applicable.dedup();

        let suggestions = applicable
            .iter()
            .filter_map(|id| rules.get(*id).map(|rule| (*id, rule)))
            .filter(|(_, rule)| rule.action == Action::Suggest)
            .map(|(id, rule)| compose_entry(rule, by_rule.get(&id).copied()))
            .collect();

        let mut decision = Decision {
            gate: Gate::Pass,
            suggestions,
            valve_exhausted: None,
            judge_failures,
        };

        let blocking = triggered_entries(rules, &by_rule, Action::Block);
        if !blocking.is_empty() {
            match self.try_block(session_id) {
                BlockAttempt::Granted(block_count) => {
                    tracing::info!(
                        rules = blocking.len(),
                        block_count,
                        max_blocks = self.max_blocks,
                        "Blocking turn"
                    );
                    decision.gate = Gate::Block {
                        reason: blocking.join(ENTRY_SEPARATOR),
                        block_count,
                    };
                    return decision;
                }
                BlockAttempt::Exhausted(block_count) => {
                    tracing::warn!(
                        block_count,
                        max_blocks = self.max_blocks,
                        "Safety valve exhausted, not blocking"
                    );
                    decision.valve_exhausted = Some(block_count);
                }
                BlockAttempt::Unrecorded => {}
            }
        }

        let notifying = triggered_entries(rules, &by_rule, Action::Notify);
        if !notifying.is_empty() {
            tracing::info!(rules = notifying.len(), "Notifying user");
            decision.gate = Gate::Notify {
                warning: notifying.join(ENTRY_SEPARATOR),
            };
        }

        decision
    }

    /// Read-check-increment of the session counter.
    fn try_block(&self, session_id: &str) -> BlockAttempt {
        let session = session_key(session_id);

        let current = match self.store.load(session_id) {
            Ok(state) => state.block_count,
            Err(e) => {
                tracing::warn!(session = %session, error = %e, "Could not read block count, assuming 0");
                0
            }
        };

        if current >= self.max_blocks {
            return BlockAttempt::Exhausted(current);
        }

        let next = SessionState {
            session_id: session_id.to_string(),
            block_count: current + 1,
        };

        match self.store.save(&next) {
            Ok(()) => BlockAttempt::Granted(next.block_count),
            Err(e) => {
                tracing::error!(session = %session, error = %e, "Could not persist block count, not blocking");
                BlockAttempt::Unrecorded
            }
        }
    }
}

enum BlockAttempt {
    Granted(u32),
    Exhausted(u32),
    Unrecorded,
}

/// Entries of every triggered rule with `action`, in rule-file order.
fn triggered_entries(
    rules: &RuleSet,
    by_rule: &BTreeMap<RuleId, &Verdict>,
    action: Action,
) -> Vec<String> {
    by_rule
        .iter()
        .filter(|(_, verdict)| verdict.triggered)
        .filter_map(|(id, verdict)| rules.get(*id).map(|rule| (rule, *verdict)))
        .filter(|(rule, _)| rule.action == action)
        .map(|(rule, verdict)| compose_entry(rule, Some(verdict)))
        .collect()
}

/// `criteria` followed by the judge's rationale, or the rule's own
/// response prompt when the judge gave none.
fn compose_entry(rule: &Rule, verdict: Option<&Verdict>) -> String {
    let explanation = verdict
        .map(|v| v.rationale.trim())
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| rule.response_prompt.trim());

    format!("{}\n{}", rule.criteria, explanation)
}
