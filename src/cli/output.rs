//! CLI output: human tables by default, JSON with `--json`.

use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, Table};
use console::style;
use serde::Serialize;

/// Everything a command prints implements this: a serde shape for
/// `--json` and a human rendering.
pub trait CommandOutput: Serialize {
    fn to_human(&self) -> String;
}

/// Print a command result in the requested format.
pub fn print<T: CommandOutput>(value: &T, json: bool) {
    if json {
        match serde_json::to_string_pretty(value) {
            Ok(rendered) => println!("{rendered}"),
            Err(e) => eprintln!("{}: {e}", style("serialization error").red()),
        }
    } else {
        println!("{}", value.to_human());
    }
}

/// Build a condensed table with a styled header row.
pub fn table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(headers.iter().map(|h| Cell::new(style(h).bold().to_string())));
    table
}

/// Shorten a UUID-ish string for table display.
pub fn short_id(id: impl ToString) -> String {
    let id = id.to_string();
    id.chars().take(8).collect()
}

/// Truncate long free text for table cells.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max.saturating_sub(1)).collect();
        format!("{cut}…")
    }
}

/// A bare confirmation message.
#[derive(Serialize)]
pub struct Message {
    pub message: String,
}

impl Message {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

impl CommandOutput for Message {
    fn to_human(&self) -> String {
        self.message.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a longer sentence", 8), "a longe…");
    }

    #[test]
    fn test_short_id() {
        assert_eq!(short_id("123e4567-e89b-12d3-a456-426614174000"), "123e4567");
    }
}
