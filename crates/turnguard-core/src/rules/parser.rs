//! Rule file parsing from CSV.
//!
//! Row layout: `criteria,mode,action,response_prompt[,timeout]`.

use csv::{ReaderBuilder, StringRecord, Trim};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::types::{Action, Mode, Rule, MAX_JUDGE_TIMEOUT};

/// Errors that can occur when loading a rule file.
#[derive(Error, Debug)]
pub enum RuleSetError {
    #[error("Failed to read rule file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Line {line}: failed to parse CSV: {source}")]
    CsvError {
        line: usize,
        #[source]
        source: csv::Error,
    },

    #[error("Line {line}: missing field '{field}'")]
    MissingField { line: usize, field: &'static str },

    #[error("Line {line}: unknown mode '{value}' (expected turn, last or claudemd)")]
    UnknownMode { line: usize, value: String },

    #[error("Line {line}: unknown action '{value}' (expected block, notify or suggest)")]
    UnknownAction { line: usize, value: String },

    #[error("Line {line}: invalid timeout '{value}': {reason}")]
    InvalidTimeout {
        line: usize,
        value: String,
        reason: String,
    },
}

const FIELDS: [&str; 4] = ["criteria", "mode", "action", "response_prompt"];

/// Parse rule file content into rules, in file order.
pub(crate) fn parse_rules(content: &str) -> Result<Vec<Rule>, RuleSetError> {
    let mut rules = Vec::new();

    for (index, raw) in content.lines().enumerate() {
        let line = index + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let record = read_record(trimmed, line)?;
        rules.push(parse_record(&record, line)?);
    }

    Ok(rules)
}

pub(crate) fn parse_rules_file(path: &Path) -> Result<Vec<Rule>, RuleSetError> {
    let content = fs::read_to_string(path)?;
    parse_rules(&content)
}

fn read_record(line_text: &str, line: usize) -> Result<StringRecord, RuleSetError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(line_text.as_bytes());

    let mut record = StringRecord::new();
    reader
        .read_record(&mut record)
        .map_err(|source| RuleSetError::CsvError { line, source })?;
    Ok(record)
}

fn parse_record(record: &StringRecord, line: usize) -> Result<Rule, RuleSetError> {
    for (i, field) in FIELDS.iter().enumerate() {
        if record.get(i).map_or(true, str::is_empty) {
            return Err(RuleSetError::MissingField { line, field });
        }
    }

    let field = |i: usize| record.get(i).unwrap_or_default();

    let mode: Mode = field(1).parse().map_err(|_| RuleSetError::UnknownMode {
        line,
        value: field(1).to_string(),
    })?;

    let action: Action = field(2).parse().map_err(|_| RuleSetError::UnknownAction {
        line,
        value: field(2).to_string(),
    })?;

    let mut rule = Rule::new(field(0), mode, action, field(3));

    if let Some(timeout) = record.get(4).filter(|t| !t.is_empty()) {
        rule = rule.with_timeout(parse_timeout(timeout, line)?);
    }

    Ok(rule)
}

fn parse_timeout(value: &str, line: usize) -> Result<Duration, RuleSetError> {
    let invalid = |reason: String| RuleSetError::InvalidTimeout {
        line,
        value: value.to_string(),
        reason,
    };

    let timeout = humantime::parse_duration(value).map_err(|e| invalid(e.to_string()))?;
    if timeout.is_zero() {
        return Err(invalid("must be greater than zero".to_string()));
    }
    if timeout > MAX_JUDGE_TIMEOUT {
        return Err(invalid(format!(
            "must be at most {}",
            humantime::format_duration(MAX_JUDGE_TIMEOUT)
        )));
    }
    Ok(timeout)
}
