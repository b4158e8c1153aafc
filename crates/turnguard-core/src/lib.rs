//! # turnguard-core
//!
//! Deterministic half of the turnguard behavior-rule engine.
//!
//! Everything here is synchronous and free of judge calls:
//! - parse a transcript and pick the context each rule mode judges
//! - load and validate the rule set
//! - parse judge answers into verdicts
//! - reduce verdicts into one decision under a per-session block cap
//! - render the decision as the hook's stdout payload
//!
//! ## Example
//!
//! ```rust,ignore
//! use turnguard_core::{ContextExtractor, RuleSet, Transcript};
//!
//! let transcript = Transcript::from_file("session.jsonl")?;
//! let rules = RuleSet::from_csv_file("rules.csv")?;
//! let contexts = ContextExtractor::default().extract_all(transcript.messages(), None);
//!
//! for applicable in rules.applicable(&contexts) {
//!     println!("{} judges {} message(s)", applicable.id, applicable.context.message_count());
//! }
//! ```

pub mod aggregator;
pub mod context;
pub mod output;
pub mod rules;
pub mod session;
pub mod transcript;
pub mod types;
pub mod verdict;

// Re-export main types at crate root
pub use aggregator::{Decision, DecisionAggregator, Gate, DEFAULT_MAX_BLOCKS};
pub use context::{ContextExtractor, ModeContexts, DEFAULT_MIN_LAST_LENGTH, TURN_SEPARATOR};
pub use output::{HookDecision, HookResponse};
pub use rules::{ApplicableRule, RuleSet, RuleSetError};
pub use session::{
    session_key, FileSessionStore, MemorySessionStore, SessionError, SessionState, SessionStore,
};
pub use transcript::{Transcript, TranscriptError};
pub use types::{
    Action, EvaluationContext, Message, Mode, Role, Rule, RuleId, UnknownVariant, MAX_JUDGE_TIMEOUT,
};
pub use verdict::{parse_judgment, JudgeError, Judgment, Verdict};
