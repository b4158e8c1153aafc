//! Judge answers and the per-rule verdicts built from them.

use lazy_static::lazy_static;
use regex::Regex;
use std::time::Duration;
use thiserror::Error;

use crate::types::RuleId;

lazy_static! {
    static ref VERDICT_TOKEN: Regex = Regex::new(r"(?i)\b(yes|no)\b").unwrap();
}

/// Why a judge call produced no usable answer.
///
/// Every variant is fail-open: the rule is treated as not triggered.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JudgeError {
    #[error("judge timed out after {}", humantime::format_duration(*.0))]
    Timeout(Duration),

    #[error("judge backend unavailable: {0}")]
    Unavailable(String),

    #[error("judge backend failed: {0}")]
    Backend(String),

    #[error("judge API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("malformed judge answer: {0}")]
    Malformed(String),
}

impl JudgeError {
    /// Short machine-friendly kind for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            JudgeError::Timeout(_) => "timeout",
            JudgeError::Unavailable(_) => "unavailable",
            JudgeError::Backend(_) => "backend",
            JudgeError::Api { .. } => "api",
            JudgeError::Malformed(_) => "malformed",
        }
    }
}

/// A parsed judge answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Judgment {
    pub triggered: bool,
    pub explanation: String,
}

/// Parse a raw judge answer.
///
/// The first non-empty line carries the verdict as a standalone `YES` or
/// `NO` token (case-insensitive, markdown emphasis tolerated). The earliest
/// token on the line wins. Everything after that line is the explanation.
pub fn parse_judgment(answer: &str) -> Result<Judgment, JudgeError> {
    let mut lines = answer.lines().skip_while(|line| line.trim().is_empty());

    let first = lines
        .next()
        .ok_or_else(|| JudgeError::Malformed("empty answer".to_string()))?;

    let token = VERDICT_TOKEN.find(first).ok_or_else(|| {
        JudgeError::Malformed(format!("no YES/NO on first line: {}", first.trim()))
    })?;
    let triggered = token.as_str().eq_ignore_ascii_case("yes");

    let explanation = lines.collect::<Vec<_>>().join("\n").trim().to_string();

    Ok(Judgment {
        triggered,
        explanation,
    })
}

/// Outcome of judging one rule in one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub rule: RuleId,
    pub triggered: bool,
    pub rationale: String,
    pub judge_error: Option<JudgeError>,
}

impl Verdict {
    pub fn answered(rule: RuleId, judgment: Judgment) -> Self {
        Self {
            rule,
            triggered: judgment.triggered,
            rationale: judgment.explanation,
            judge_error: None,
        }
    }

    /// Non-triggering verdict for a call that failed.
    pub fn failed(rule: RuleId, error: JudgeError) -> Self {
        Self {
            rule,
            triggered: false,
            rationale: String::new(),
            judge_error: Some(error),
        }
    }

    pub fn is_answered(&self) -> bool {
        self.judge_error.is_none()
    }
}
