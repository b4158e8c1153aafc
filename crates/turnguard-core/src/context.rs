//! Context extraction: which messages each mode judges.

use crate::types::{EvaluationContext, Message, Mode, Role};

/// Default minimum length (characters) of the final message for `last` rules.
pub const DEFAULT_MIN_LAST_LENGTH: usize = 50;

/// Separator placed between assistant messages of one turn.
pub const TURN_SEPARATOR: &str = "\n---\n";

/// Builds an [`EvaluationContext`] per mode from the transcript messages.
#[derive(Debug, Clone)]
pub struct ContextExtractor {
    min_last_length: usize,
}

impl ContextExtractor {
    pub fn new(min_last_length: usize) -> Self {
        Self { min_last_length }
    }

    pub fn min_last_length(&self) -> usize {
        self.min_last_length
    }

    /// Context for one mode, or `None` when the mode has nothing to judge.
    pub fn extract(
        &self,
        messages: &[Message],
        mode: Mode,
        policy: Option<&str>,
    ) -> Option<EvaluationContext> {
        let last = messages.iter().rev().find(|m| m.is_assistant())?;

        match mode {
            Mode::Turn => {
                let turn = turn_messages(messages);
                if turn.is_empty() {
                    return None;
                }
                Some(build_context(Mode::Turn, turn, None))
            }
            Mode::Last => {
                if last.char_len() < self.min_last_length {
                    tracing::debug!(
                        length = last.char_len(),
                        min = self.min_last_length,
                        "Final message below minimum length, skipping last-mode rules"
                    );
                    return None;
                }
                Some(build_context(Mode::Last, vec![last.clone()], None))
            }
            Mode::ClaudeMd => {
                let policy = policy.filter(|p| !p.trim().is_empty())?;
                let mut turn = turn_messages(messages);
                if turn.is_empty() {
                    turn.push(last.clone());
                }
                Some(build_context(Mode::ClaudeMd, turn, Some(policy.to_string())))
            }
        }
    }

    /// Contexts for every mode.
    pub fn extract_all(&self, messages: &[Message], policy: Option<&str>) -> ModeContexts {
        ModeContexts {
            turn: self.extract(messages, Mode::Turn, policy),
            last: self.extract(messages, Mode::Last, policy),
            claudemd: self.extract(messages, Mode::ClaudeMd, policy),
        }
    }
}

impl Default for ContextExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_LAST_LENGTH)
    }
}

/// The per-mode contexts of one invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModeContexts {
    pub turn: Option<EvaluationContext>,
    pub last: Option<EvaluationContext>,
    pub claudemd: Option<EvaluationContext>,
}

impl ModeContexts {
    pub fn get(&self, mode: Mode) -> Option<&EvaluationContext> {
        match mode {
            Mode::Turn => self.turn.as_ref(),
            Mode::Last => self.last.as_ref(),
            Mode::ClaudeMd => self.claudemd.as_ref(),
        }
    }

    pub fn is_empty(&self) -> bool {
        Mode::ALL.iter().all(|mode| self.get(*mode).is_none())
    }
}

/// Assistant messages after the most recent user message.
fn turn_messages(messages: &[Message]) -> Vec<Message> {
    let start = messages
        .iter()
        .rposition(|m| m.role == Role::User)
        .map(|i| i + 1)
        .unwrap_or(0);

    messages[start..]
        .iter()
        .filter(|m| m.is_assistant())
        .cloned()
        .collect()
}

fn build_context(mode: Mode, messages: Vec<Message>, policy: Option<String>) -> EvaluationContext {
    let content = messages
        .iter()
        .map(|m| m.text.as_str())
        .collect::<Vec<_>>()
        .join(TURN_SEPARATOR);

    EvaluationContext {
        mode,
        messages,
        content,
        policy,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LONG: &str = "I refactored the parser, updated all call sites and the tests now pass.";

    fn conversation() -> Vec<Message> {
        vec![
            Message::user("First request", 0),
            Message::assistant("Old answer", 1),
            Message::user("Second request", 2),
            Message::assistant("Working on it.", 3),
            Message::assistant(LONG, 4),
        ]
    }

    #[test]
    fn test_turn_covers_messages_after_last_user() {
        let ctx = ContextExtractor::default()
            .extract(&conversation(), Mode::Turn, None)
            .unwrap();

        assert_eq!(ctx.message_count(), 2);
        assert_eq!(ctx.content, format!("Working on it.{TURN_SEPARATOR}{LONG}"));
        assert!(ctx.policy.is_none());
    }

    #[test]
    fn test_last_is_final_assistant_message() {
        let ctx = ContextExtractor::default()
            .extract(&conversation(), Mode::Last, None)
            .unwrap();

        assert_eq!(ctx.content, LONG);
        assert_eq!(ctx.messages[0].position, 4);
    }

    #[test]
    fn test_short_last_message_is_bypassed_but_turn_is_not() {
        let messages = vec![Message::user("go", 0), Message::assistant("Done.", 1)];
        let contexts = ContextExtractor::default().extract_all(&messages, Some("Always test"));

        assert!(contexts.last.is_none());
        assert!(contexts.turn.is_some());
        assert!(contexts.claudemd.is_some());
    }

    #[test]
    fn test_min_length_is_measured_in_characters() {
        // 5 characters, 15 bytes
        let messages = vec![Message::assistant("ééééé", 0)];
        let extractor = ContextExtractor::new(5);
        assert!(extractor.extract(&messages, Mode::Last, None).is_some());

        let extractor = ContextExtractor::new(6);
        assert!(extractor.extract(&messages, Mode::Last, None).is_none());
    }

    #[test]
    fn test_claudemd_requires_policy() {
        let extractor = ContextExtractor::default();
        assert!(extractor
            .extract(&conversation(), Mode::ClaudeMd, None)
            .is_none());
        assert!(extractor
            .extract(&conversation(), Mode::ClaudeMd, Some("  \n"))
            .is_none());

        let ctx = extractor
            .extract(&conversation(), Mode::ClaudeMd, Some("Never skip tests."))
            .unwrap();
        assert_eq!(ctx.policy.as_deref(), Some("Never skip tests."));
        assert_eq!(ctx.message_count(), 2);
    }

    #[test]
    fn test_claudemd_falls_back_to_last_message_when_turn_is_empty() {
        let messages = vec![
            Message::assistant(LONG, 0),
            Message::user("thanks", 1),
        ];
        let extractor = ContextExtractor::default();

        assert!(extractor.extract(&messages, Mode::Turn, None).is_none());
        let ctx = extractor
            .extract(&messages, Mode::ClaudeMd, Some("policy"))
            .unwrap();
        assert_eq!(ctx.content, LONG);
    }

    #[test]
    fn test_no_assistant_message_yields_nothing() {
        let messages = vec![Message::user("hello", 0)];
        let contexts = ContextExtractor::default().extract_all(&messages, Some("policy"));
        assert!(contexts.is_empty());

        assert!(ContextExtractor::default().extract_all(&[], None).is_empty());
    }
}
