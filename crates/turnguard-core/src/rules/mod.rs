//! Rule sets: loading, validation and applicability.
//!
//! A rule set is loaded once per invocation and is immutable afterwards.
//! Rules are independent of each other; their file order only matters
//! when several of them contribute text to the same message.

mod parser;

pub use parser::RuleSetError;

use std::path::Path;

use crate::context::ModeContexts;
use crate::types::{Action, EvaluationContext, Mode, Rule, RuleId};

/// The validated rules for one invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

/// A rule paired with the context it will be judged against.
#[derive(Debug, Clone, Copy)]
pub struct ApplicableRule<'a> {
    pub id: RuleId,
    pub rule: &'a Rule,
    pub context: &'a EvaluationContext,
}

impl RuleSet {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse CSV rule content. Any invalid row rejects the whole set.
    pub fn from_csv(content: &str) -> Result<Self, RuleSetError> {
        parser::parse_rules(content).map(Self::new)
    }

    pub fn from_csv_file(path: impl AsRef<Path>) -> Result<Self, RuleSetError> {
        parser::parse_rules_file(path.as_ref()).map(Self::new)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn get(&self, id: RuleId) -> Option<&Rule> {
        self.rules.get(id.0)
    }

    /// Rules with their ids, in file order.
    pub fn iter(&self) -> impl Iterator<Item = (RuleId, &Rule)> {
        self.rules.iter().enumerate().map(|(i, rule)| (RuleId(i), rule))
    }

    pub fn uses_mode(&self, mode: Mode) -> bool {
        self.rules.iter().any(|rule| rule.mode == mode)
    }

    pub fn count_by_action(&self, action: Action) -> usize {
        self.rules.iter().filter(|rule| rule.action == action).count()
    }

    /// Rules whose mode produced a context this invocation.
    pub fn applicable<'a>(&'a self, contexts: &'a ModeContexts) -> Vec<ApplicableRule<'a>> {
        self.iter()
            .filter_map(|(id, rule)| {
                contexts
                    .get(rule.mode)
                    .map(|context| ApplicableRule { id, rule, context })
            })
            .collect()
    }
}
