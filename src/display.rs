//! Colored CLI display of tailed status events.

use std::io::{self, Write};

use owo_colors::OwoColorize;

use crate::watcher::{ErrorEvent, StatusEvent};

/// Maximum length for truncated display strings.
const DEFAULT_MAX_LEN: usize = 80;

/// Maximum length of a single field value in a summary.
const FIELD_MAX_LEN: usize = 40;

/// Truncate a string to a maximum number of characters, adding ellipsis if truncated.
#[must_use]
pub fn truncate(s: &str, max_len: usize, raw_mode: bool) -> String {
    if raw_mode || s.chars().count() <= max_len {
        return s.to_string();
    }
    if max_len <= 3 {
        return "...".to_string();
    }
    let kept: String = s.chars().take(max_len - 3).collect();
    format!("{kept}...")
}

/// Summarize a status payload as `key=value` pairs.
///
/// Nested objects are flattened one level deep (`model.display_name=...`).
#[must_use]
pub fn format_payload(data: &serde_json::Value, raw_mode: bool) -> String {
    match data {
        serde_json::Value::Object(map) => {
            let mut pairs = Vec::new();
            for (key, value) in map {
                match value {
                    serde_json::Value::Object(inner) => {
                        for (inner_key, inner_value) in inner {
                            pairs.push(format!(
                                "{key}.{inner_key}={}",
                                format_scalar(inner_value, raw_mode)
                            ));
                        }
                    }
                    other => pairs.push(format!("{key}={}", format_scalar(other, raw_mode))),
                }
            }
            pairs.join(", ")
        }
        other => truncate(&other.to_string(), DEFAULT_MAX_LEN, raw_mode),
    }
}

fn format_scalar(value: &serde_json::Value, raw_mode: bool) -> String {
    match value {
        serde_json::Value::String(s) => truncate(s, FIELD_MAX_LEN, raw_mode),
        other => truncate(&other.to_string(), FIELD_MAX_LEN, raw_mode),
    }
}

/// Print an update event.
pub fn print_update(event: &StatusEvent, raw_mode: bool) {
    println!(
        "{} {} {}",
        event.timestamp.to_rfc3339().dimmed(),
        format!("[{}]", event.source_name).cyan().bold(),
        format_payload(&event.data, raw_mode)
    );
    let _ = io::stdout().flush();
}

/// Print an error event.
pub fn print_error_event(event: &ErrorEvent) {
    println!(
        "{} {} {}{}",
        event.timestamp.to_rfc3339().dimmed(),
        "[ERROR]".red().bold(),
        event
            .source_name
            .as_deref()
            .map_or(String::new(), |name| format!("{name}: ")),
        event.message.red()
    );
    let _ = io::stdout().flush();
}

/// Print an event as a single JSON line.
pub fn print_json<T: serde::Serialize>(event: &T) {
    match serde_json::to_string(event) {
        Ok(line) => println!("{line}"),
        Err(e) => tracing::warn!(error = %e, "Failed to serialize event"),
    }
    let _ = io::stdout().flush();
}

/// Print a lagged-subscriber notice.
pub fn print_lagged(channel: &str, skipped: u64) {
    println!(
        "{} {} channel lagged, {} events skipped",
        "[WARN]".yellow().bold(),
        channel,
        skipped
    );
    let _ = io::stdout().flush();
}
