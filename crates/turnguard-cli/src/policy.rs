//! Project policy document lookup for `claudemd` rules.

use std::fs;
use std::path::{Path, PathBuf};

pub const POLICY_FILE: &str = "CLAUDE.md";

/// Longest policy passed to the judge, in characters.
pub const MAX_POLICY_CHARS: usize = 10 * 1024;

pub const TRUNCATION_MARKER: &str = "\n[... truncated ...]";

/// Read the first readable `CLAUDE.md` among `dirs`, in order.
pub fn find_policy<'a>(dirs: impl IntoIterator<Item = &'a Path>) -> Option<String> {
    for dir in dirs {
        let candidate: PathBuf = dir.join(POLICY_FILE);
        if !candidate.is_file() {
            continue;
        }
        match fs::read_to_string(&candidate) {
            Ok(content) => {
                tracing::debug!(path = %candidate.display(), chars = content.chars().count(), "Loaded policy");
                return Some(truncate(content));
            }
            Err(e) => {
                tracing::warn!(path = %candidate.display(), error = %e, "Failed to read policy");
            }
        }
    }
    None
}

fn truncate(content: String) -> String {
    match content.char_indices().nth(MAX_POLICY_CHARS) {
        Some((cut, _)) => {
            tracing::info!(
                chars = content.chars().count(),
                max = MAX_POLICY_CHARS,
                "Policy truncated"
            );
            format!("{}{TRUNCATION_MARKER}", &content[..cut])
        }
        None => content,
    }
}
