//! Prompt Templates
//!
//! Templates with named `{slot}` placeholders. The source is parsed once into
//! literal and slot segments, and rendering only ever looks at those segments,
//! so a slot value that happens to contain `{other_slot}` is emitted verbatim
//! instead of being substituted again.
//!
//! Literal braces are written `{{` and `}}`.

use std::collections::HashSet;

use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Slot(String),
}

/// A parsed prompt template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    segments: Vec<Segment>,
}

impl PromptTemplate {
    /// Parse a template source string.
    pub fn parse(source: &str) -> CoreResult<Self> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = source.char_indices().peekable();

        while let Some((pos, ch)) = chars.next() {
            match ch {
                '{' => {
                    if matches!(chars.peek(), Some((_, '{'))) {
                        chars.next();
                        literal.push('{');
                        continue;
                    }

                    let mut name = String::new();
                    let mut closed = false;
                    for (_, c) in chars.by_ref() {
                        if c == '}' {
                            closed = true;
                            break;
                        }
                        name.push(c);
                    }

                    if !closed {
                        return Err(CoreError::template(format!(
                            "unterminated slot starting at byte {}",
                            pos
                        )));
                    }
                    if !is_slot_name(&name) {
                        return Err(CoreError::template(format!(
                            "invalid slot name `{}` at byte {}",
                            name, pos
                        )));
                    }

                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Slot(name));
                }
                '}' => {
                    if matches!(chars.peek(), Some((_, '}'))) {
                        chars.next();
                        literal.push('}');
                    } else {
                        return Err(CoreError::template(format!(
                            "unmatched `}}` at byte {}",
                            pos
                        )));
                    }
                }
                other => literal.push(other),
            }
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self { segments })
    }

    /// Slot names in order of first appearance.
    pub fn slots(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Slot(name) if seen.insert(name.as_str()) => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Render the template.
    ///
    /// Every slot must have a value and every value must name a slot.
    pub fn render(&self, values: &[(&str, &str)]) -> CoreResult<String> {
        let slots = self.slots();
        for (name, _) in values {
            if !slots.contains(name) {
                return Err(CoreError::template(format!("unknown slot `{}`", name)));
            }
        }

        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Slot(name) => {
                    let value = values
                        .iter()
                        .find(|(n, _)| *n == name.as_str())
                        .map(|(_, v)| *v)
                        .ok_or_else(|| {
                            CoreError::template(format!("missing value for slot `{}`", name))
                        })?;
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }
}

fn is_slot_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_named_slots() {
        let tpl = PromptTemplate::parse("Schema:\n{db_schema}\nTable: {table_name}").unwrap();
        let out = tpl
            .render(&[("db_schema", "t(x numeric)"), ("table_name", "t")])
            .unwrap();
        assert_eq!(out, "Schema:\nt(x numeric)\nTable: t");
    }

    #[test]
    fn test_escaped_braces() {
        let tpl = PromptTemplate::parse("{{\"needs_sql\": true}} for {table_name}").unwrap();
        assert_eq!(tpl.slots(), vec!["table_name"]);
        let out = tpl.render(&[("table_name", "t")]).unwrap();
        assert_eq!(out, "{\"needs_sql\": true} for t");
    }

    #[test]
    fn test_values_are_not_rescanned() {
        let tpl = PromptTemplate::parse("{a} / {b}").unwrap();
        let out = tpl.render(&[("a", "{b}"), ("b", "x")]).unwrap();
        assert_eq!(out, "{b} / x");
    }

    #[test]
    fn test_repeated_slot() {
        let tpl = PromptTemplate::parse("{t} and {t}").unwrap();
        assert_eq!(tpl.slots(), vec!["t"]);
        assert_eq!(tpl.render(&[("t", "x")]).unwrap(), "x and x");
    }

    #[test]
    fn test_missing_value_is_error() {
        let tpl = PromptTemplate::parse("{a} {b}").unwrap();
        let err = tpl.render(&[("a", "1")]).unwrap_err();
        assert!(err.to_string().contains("missing value for slot `b`"));
    }

    #[test]
    fn test_unknown_value_is_error() {
        let tpl = PromptTemplate::parse("{a}").unwrap();
        let err = tpl.render(&[("a", "1"), ("zzz", "2")]).unwrap_err();
        assert!(err.to_string().contains("unknown slot `zzz`"));
    }

    #[test]
    fn test_malformed_sources() {
        assert!(PromptTemplate::parse("open {slot").is_err());
        assert!(PromptTemplate::parse("stray } brace").is_err());
        assert!(PromptTemplate::parse("{not a slot}").is_err());
        assert!(PromptTemplate::parse("{}").is_err());
    }
}
