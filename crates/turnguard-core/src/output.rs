//! Hook response payloads.
//!
//! A decision becomes at most one JSON line on stdout:
//! - block: `{"decision":"block","reason":...}`
//! - notify / suggestions / valve notice: `{"systemMessage":...}`
//! - nothing to say: no output at all

use serde::{Deserialize, Serialize};

use crate::aggregator::{Decision, Gate, ENTRY_SEPARATOR};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HookDecision {
    Block,
}

/// The JSON object a Stop hook writes to stdout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<HookDecision>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(
        rename = "systemMessage",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub system_message: Option<String>,
}

impl HookResponse {
    pub fn from_decision(decision: &Decision) -> Self {
        let mut response = Self::default();
        let mut notes = Vec::new();

        match &decision.gate {
            Gate::Block { reason, .. } => {
                response.decision = Some(HookDecision::Block);
                response.reason = Some(reason.clone());
            }
            Gate::Notify { warning } => {
                notes.push(format!("⚠️ Monitor Alert:\n{warning}"));
            }
            Gate::Pass => {}
        }

        if let Some(block_count) = decision.valve_exhausted {
            notes.push(format!(
                "⚠️ Monitor safety valve: Stopped blocking after {block_count} attempts. Review session manually."
            ));
        }

        notes.extend(decision.suggestions.iter().map(|s| format!("💡 {s}")));

        if !notes.is_empty() {
            response.system_message = Some(notes.join(ENTRY_SEPARATOR));
        }

        response
    }

    /// A plain advisory message, used outside rule evaluation.
    pub fn advisory(message: impl Into<String>) -> Self {
        Self {
            system_message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.decision.is_none() && self.reason.is_none() && self.system_message.is_none()
    }

    /// The single stdout line, or `None` when nothing should be printed.
    pub fn to_json_line(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }
        serde_json::to_string(self).ok()
    }
}

impl From<&Decision> for HookResponse {
    fn from(decision: &Decision) -> Self {
        Self::from_decision(decision)
    }
}
