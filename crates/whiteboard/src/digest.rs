//! Rendering whiteboard entries into prompt context.

use std::cmp::Reverse;

use stride_common::{EntryType, WhiteboardEntry};

const ENTRY_CHAR_LIMIT: usize = 400;

/// Render entries as a markdown section, highest priority first and newest
/// first within a priority, stopping before `max_tokens` would be exceeded.
/// Returns an empty string when there is nothing to show.
pub fn render_digest(entries: &[WhiteboardEntry], max_tokens: usize) -> String {
    let mut ordered: Vec<&WhiteboardEntry> = entries.iter().collect();
    ordered.sort_by_key(|e| (Reverse(e.priority), Reverse(e.created_at)));

    let mut parts = Vec::new();
    let mut token_count = 0;
    for entry in ordered {
        let part = format_entry(entry);
        let tokens = estimate_tokens(&part);
        if token_count + tokens > max_tokens {
            break;
        }
        token_count += tokens;
        parts.push(part);
    }

    if parts.is_empty() {
        return String::new();
    }
    format!("## Whiteboard\n\n{}", parts.join("\n"))
}

fn label(entry_type: EntryType) -> &'static str {
    match entry_type {
        EntryType::Observation => "Observation",
        EntryType::Suggestion => "Suggestion",
        EntryType::Alert => "ALERT",
        EntryType::Insight => "Insight",
        EntryType::Plan => "Plan",
        EntryType::Reflection => "Reflection",
        EntryType::Summary => "Summary",
        EntryType::Question => "Question",
    }
}

fn format_entry(entry: &WhiteboardEntry) -> String {
    let mut line = format!(
        "- **[{}]** ({}, p{}) {}",
        label(entry.entry_type),
        entry.author,
        entry.priority,
        truncate(&entry.content, ENTRY_CHAR_LIMIT)
    );
    if entry.requires_response {
        line.push_str(" _(awaiting response)_");
    }
    line
}

/// Rough estimate: ~4 chars per token.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
