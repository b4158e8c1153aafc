//! Core data model: messages, rules and evaluation contexts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// A value in a rule row that is not one of the recognized variants.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unrecognized {kind} '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Who authored a transcript message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One text-bearing message from the transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,

    /// Text blocks of the entry joined with blank lines
    pub text: String,

    /// Line index of the entry in the transcript
    pub position: usize,

    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Message {
    pub fn new(role: Role, text: impl Into<String>, position: usize) -> Self {
        Self {
            role,
            text: text.into(),
            position,
            timestamp: None,
        }
    }

    pub fn user(text: impl Into<String>, position: usize) -> Self {
        Self::new(Role::User, text, position)
    }

    pub fn assistant(text: impl Into<String>, position: usize) -> Self {
        Self::new(Role::Assistant, text, position)
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }

    /// Length in characters, the unit used by the brief-response bypass.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Which slice of the transcript a rule is judged against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Every assistant message since the most recent user message
    Turn,
    /// Only the final assistant message
    Last,
    /// The turn, judged against the project policy document
    #[serde(rename = "claudemd")]
    ClaudeMd,
}

impl Mode {
    pub const ALL: [Mode; 3] = [Mode::Turn, Mode::Last, Mode::ClaudeMd];

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Turn => "turn",
            Mode::Last => "last",
            Mode::ClaudeMd => "claudemd",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            // "all" is the legacy spelling of "turn"
            "turn" | "all" => Ok(Mode::Turn),
            "last" => Ok(Mode::Last),
            "claudemd" => Ok(Mode::ClaudeMd),
            _ => Err(UnknownVariant {
                kind: "mode",
                value: s.to_string(),
            }),
        }
    }
}

/// What a rule does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Stop the turn and make the agent retry
    Block,
    /// Warn the user without stopping the turn
    Notify,
    /// Attach an advisory tip
    Suggest,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Block => "block",
            Action::Notify => "notify",
            Action::Suggest => "suggest",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "block" => Ok(Action::Block),
            "notify" => Ok(Action::Notify),
            "suggest" => Ok(Action::Suggest),
            _ => Err(UnknownVariant {
                kind: "action",
                value: s.to_string(),
            }),
        }
    }
}

/// Stable position of a rule inside its rule set.
///
/// Ordering by `RuleId` is rule-file order, which is the order used when
/// several rules of the same tier contribute to one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RuleId(pub usize);

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0 + 1)
    }
}

/// Longest judge timeout accepted from a rule file or configuration.
pub const MAX_JUDGE_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// A behavior rule loaded from the rule file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    /// Yes/no question posed to the judge
    pub criteria: String,

    pub mode: Mode,

    pub action: Action,

    /// What the judge should write after its verdict line
    pub response_prompt: String,

    /// Per-rule judge timeout; the configured default applies when absent
    pub timeout: Option<Duration>,
}

impl Rule {
    pub fn new(
        criteria: impl Into<String>,
        mode: Mode,
        action: Action,
        response_prompt: impl Into<String>,
    ) -> Self {
        Self {
            criteria: criteria.into(),
            mode,
            action,
            response_prompt: response_prompt.into(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Shortened criteria for log lines.
    pub fn label(&self) -> String {
        const MAX: usize = 40;
        if self.criteria.chars().count() <= MAX {
            self.criteria.clone()
        } else {
            let head: String = self.criteria.chars().take(MAX).collect();
            format!("{head}...")
        }
    }
}

/// The text a rule is judged against, built fresh for each invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationContext {
    pub mode: Mode,

    /// The selected messages, in transcript order
    pub messages: Vec<Message>,

    /// Selected message texts joined for the judge
    pub content: String,

    /// Project policy document, present only for `claudemd`
    pub policy: Option<String>,
}

impl EvaluationContext {
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parsing() {
        assert_eq!("turn".parse::<Mode>().unwrap(), Mode::Turn);
        assert_eq!(" LAST ".parse::<Mode>().unwrap(), Mode::Last);
        assert_eq!("claudemd".parse::<Mode>().unwrap(), Mode::ClaudeMd);
        assert_eq!("all".parse::<Mode>().unwrap(), Mode::Turn);

        let err = "everything".parse::<Mode>().unwrap_err();
        assert_eq!(err.kind, "mode");
        assert_eq!(err.value, "everything");
    }

    #[test]
    fn test_action_parsing() {
        assert_eq!("Block".parse::<Action>().unwrap(), Action::Block);
        assert_eq!("notify".parse::<Action>().unwrap(), Action::Notify);
        assert_eq!("suggest".parse::<Action>().unwrap(), Action::Suggest);
        assert!("warn".parse::<Action>().is_err());
    }

    #[test]
    fn test_rule_id_display_is_one_based() {
        assert_eq!(RuleId(0).to_string(), "#1");
        assert_eq!(RuleId(6).to_string(), "#7");
    }

    #[test]
    fn test_rule_label_truncates() {
        let rule = Rule::new(
            "Is the agent claiming work is complete while tests still fail?",
            Mode::Turn,
            Action::Block,
            "Explain",
        );
        let label = rule.label();
        assert!(label.ends_with("..."));
        assert_eq!(label.chars().count(), 43);

        let short = Rule::new("Short?", Mode::Last, Action::Notify, "Explain");
        assert_eq!(short.label(), "Short?");
    }

    #[test]
    fn test_char_len_counts_characters() {
        let msg = Message::assistant("Fertig ✅", 0);
        assert_eq!(msg.char_len(), 8);
    }
}
