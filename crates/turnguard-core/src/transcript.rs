//! Transcript parsing from newline-delimited JSON.
//!
//! Each line is one entry. Only entries whose message has a `user` or
//! `assistant` role and at least one text block become [`Message`]s;
//! tool calls, tool results and malformed lines are skipped.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::types::{Message, Role};

/// Errors that can occur when reading a transcript.
#[derive(Error, Debug)]
pub enum TranscriptError {
    #[error("Failed to read transcript file: {0}")]
    IoError(#[from] std::io::Error),
}

#[derive(Debug, Deserialize)]
struct Entry {
    #[serde(default)]
    message: Option<EntryMessage>,

    #[serde(default)]
    timestamp: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EntryMessage {
    #[serde(default)]
    role: Option<String>,

    #[serde(default)]
    content: Value,
}

/// The text-bearing messages of one transcript, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, TranscriptError> {
        let content = fs::read_to_string(path)?;
        Ok(Self::parse(&content))
    }

    /// Parse JSONL content. Never fails; unusable lines are dropped.
    pub fn parse(content: &str) -> Self {
        let messages = content
            .lines()
            .enumerate()
            .filter_map(|(position, line)| parse_line(position, line))
            .collect();

        Self { messages }
    }

    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn has_assistant_message(&self) -> bool {
        self.messages.iter().any(Message::is_assistant)
    }

    pub fn last_assistant(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.is_assistant())
    }
}

fn parse_line(position: usize, line: &str) -> Option<Message> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let entry: Entry = serde_json::from_str(line).ok()?;
    let message = entry.message?;

    let role = match message.role.as_deref() {
        Some("user") => Role::User,
        Some("assistant") => Role::Assistant,
        _ => return None,
    };

    let text = extract_text(&message.content)?;

    let timestamp = entry
        .timestamp
        .as_deref()
        .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
        .map(|ts| ts.with_timezone(&Utc));

    Some(Message {
        role,
        text,
        position,
        timestamp,
    })
}

/// Join the text blocks of a message; `None` if it has none.
fn extract_text(content: &Value) -> Option<String> {
    match content {
        Value::String(text) if !text.trim().is_empty() => Some(text.clone()),
        Value::Array(blocks) => {
            let texts: Vec<&str> = blocks
                .iter()
                .filter(|block| block.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|block| block.get("text").and_then(Value::as_str))
                .collect();

            let joined = texts.join("\n\n");
            if joined.trim().is_empty() {
                None
            } else {
                Some(joined)
            }
        }
        _ => None,
    }
}
