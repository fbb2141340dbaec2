//! Decision Parsing
//!
//! Turns the model's reply to the decision prompt into a [`Decision`].
//!
//! The reply is supposed to be a JSON object, but in practice it arrives
//! wrapped in code fences, surrounded by prose, or written as a Python-style
//! literal. Parsing therefore goes through two stages:
//! - strict JSON over the outermost `{...}` span
//! - the permissive literal parser over the same span
//!
//! When neither yields an object, callers fall back to
//! [`extract_sql_fallback`], which pulls statements straight out of the text.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::literal::parse_literal;

/// The model's structured decision for one user turn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub needs_sql: bool,
    /// One statement per entry, each normalized to end in a single `;`.
    pub sql: Vec<String>,
    pub notes: String,
}

impl Decision {
    /// Decision used when the decision call itself failed.
    pub fn degraded(notes: impl Into<String>) -> Self {
        Self {
            needs_sql: false,
            sql: Vec::new(),
            notes: notes.into(),
        }
    }

    /// Whether any statement should run. `needs_sql` without statements
    /// counts as no SQL.
    pub fn wants_sql(&self) -> bool {
        self.needs_sql && !self.sql.is_empty()
    }
}

/// Which stage produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseStrategy {
    Json,
    Literal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDecision {
    pub decision: Decision,
    pub strategy: ParseStrategy,
}

fn fence_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"```(?:\w+)?").unwrap())
}

fn object_span() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\{.*\}").unwrap())
}

fn tagged_sql_block() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)```sql\s*((?:select|with)\b.*?)\s*```").unwrap())
}

fn inline_select() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)\bselect\b.*?;").unwrap())
}

fn select_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?im)^[ \t]*select\b.*$").unwrap())
}

/// Remove Markdown code-fence markers (with their optional language tag) and
/// trim the result.
pub fn strip_code_fences(text: &str) -> String {
    fence_marker().replace_all(text, "").trim().to_string()
}

/// Trim, drop every trailing `;` and whitespace, then append exactly one `;`.
///
/// Returns `None` when nothing but semicolons and whitespace remain.
pub fn normalize_statement(statement: &str) -> Option<String> {
    let body = statement
        .trim()
        .trim_end_matches(|c: char| c == ';' || c.is_whitespace());
    if body.is_empty() {
        None
    } else {
        Some(format!("{};", body))
    }
}

/// Parse a decision reply. `None` when the reply holds no parsable object.
pub fn parse_decision(raw: &str) -> Option<Decision> {
    parse_decision_detailed(raw).map(|p| p.decision)
}

/// Like [`parse_decision`], also reporting which stage succeeded.
pub fn parse_decision_detailed(raw: &str) -> Option<ParsedDecision> {
    let cleaned = strip_code_fences(raw);
    let candidate = object_span()
        .find(&cleaned)
        .map(|m| m.as_str())
        .unwrap_or(&cleaned);

    let (value, strategy) = match serde_json::from_str::<Value>(candidate) {
        Ok(v) => (v, ParseStrategy::Json),
        Err(json_err) => match parse_literal(candidate) {
            Ok(v) => (v, ParseStrategy::Literal),
            Err(literal_err) => {
                tracing::debug!(
                    json_error = %json_err,
                    literal_error = %literal_err,
                    "decision reply is not an object"
                );
                return None;
            }
        },
    };

    let Value::Object(fields) = value else {
        tracing::debug!(?strategy, "decision reply parsed to a non-object value");
        return None;
    };

    let decision = Decision {
        needs_sql: truthy(fields.get("needs_sql")),
        sql: coerce_statements(fields.get("sql")),
        notes: coerce_notes(fields.get("notes")),
    };
    tracing::debug!(
        ?strategy,
        needs_sql = decision.needs_sql,
        statements = decision.sql.len(),
        "parsed decision"
    );
    Some(ParsedDecision { decision, strategy })
}

fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => {
            let s = s.trim().to_lowercase();
            !matches!(s.as_str(), "" | "false" | "no" | "0")
        }
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(map)) => !map.is_empty(),
    }
}

fn coerce_statements(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => normalize_statement(s),
                other => {
                    tracing::debug!(item = %other, "skipping non-string sql entry");
                    None
                }
            })
            .collect(),
        Some(Value::String(s)) => extract_sql_fallback(s),
        _ => Vec::new(),
    }
}

fn coerce_notes(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Pull SQL statements out of free text.
///
/// Strategies, first one with a match wins:
/// 1. ```` ```sql ```` fenced blocks whose body starts with `select` or `with`
/// 2. inline `select ... ;` spans
/// 3. lines starting with `select`
pub fn extract_sql_fallback(raw: &str) -> Vec<String> {
    let fenced: Vec<String> = tagged_sql_block()
        .captures_iter(raw)
        .filter_map(|c| c.get(1))
        .filter_map(|m| normalize_statement(m.as_str()))
        .collect();
    if !fenced.is_empty() {
        return fenced;
    }

    let cleaned = strip_code_fences(raw);

    let inline: Vec<String> = inline_select()
        .find_iter(&cleaned)
        .filter_map(|m| normalize_statement(m.as_str()))
        .collect();
    if !inline.is_empty() {
        return inline;
    }

    select_line()
        .find_iter(&cleaned)
        .filter_map(|m| normalize_statement(m.as_str()))
        .collect()
}
