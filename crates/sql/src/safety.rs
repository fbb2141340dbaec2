//! Read-only Statement Gate
//!
//! A statement is accepted when, after dropping SQL comments and leading
//! whitespace, it starts with `select` or `with`. This is a prefix check, not a
//! parser: a `WITH` whose tail is a data-modifying statement, or a second
//! statement stacked after a `;`, is still accepted.

use std::sync::OnceLock;

use regex::Regex;

fn line_comment() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"--.*?(?:\n|$)").unwrap())
}

fn block_comment() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)/\*.*?\*/").unwrap())
}

/// Remove `--` line comments, then `/* */` block comments.
fn strip_comments(statement: &str) -> String {
    let without_lines = line_comment().replace_all(statement, " ");
    block_comment().replace_all(&without_lines, " ").into_owned()
}

/// Whether `statement` may be sent to the database.
pub fn is_safe(statement: &str) -> bool {
    let cleaned = strip_comments(statement);
    let head = cleaned.trim_start().to_lowercase();
    head.starts_with("select") || head.starts_with("with")
}
