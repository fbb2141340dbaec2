//! Permissive Literal Parser
//!
//! Models asked for JSON sometimes reply with Python-flavoured literals:
//! single-quoted strings, `True`/`False`/`None`, tuples, trailing commas.
//! This parser accepts that superset and produces a `serde_json::Value`.
//!
//! Non-string dictionary keys (numbers, booleans) are stringified.

use serde_json::{Map, Number, Value};
use thiserror::Error;

/// Deepest bracket nesting accepted, the same limit serde_json applies.
const MAX_DEPTH: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("literal parse error at byte {pos}: {message}")]
pub struct LiteralError {
    pub pos: usize,
    pub message: String,
}

/// Parse `input` as a single literal value. Surrounding whitespace is allowed;
/// anything else after the value is an error.
pub fn parse_literal(input: &str) -> Result<Value, LiteralError> {
    let mut parser = Parser {
        src: input,
        bytes: input.as_bytes(),
        pos: 0,
        depth: 0,
    };
    let value = parser.value()?;
    parser.skip_ws();
    if parser.pos != parser.bytes.len() {
        return Err(parser.error("trailing characters after value"));
    }
    Ok(value)
}

struct Parser<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn error(&self, message: impl Into<String>) -> LiteralError {
        LiteralError {
            pos: self.pos,
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while let Some(b) = self.peek() {
            if b.is_ascii_whitespace() {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    fn expect(&mut self, byte: u8) -> Result<(), LiteralError> {
        self.skip_ws();
        if self.peek() == Some(byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(format!("expected `{}`", byte as char)))
        }
    }

    fn value(&mut self) -> Result<Value, LiteralError> {
        self.skip_ws();
        match self.peek() {
            Some(b'{') => self.dict(),
            Some(b'[') => self.sequence(b'[', b']'),
            Some(b'(') => self.sequence(b'(', b')'),
            Some(b'\'') | Some(b'"') => self.string().map(Value::String),
            Some(b) if b == b'-' || b == b'+' || b == b'.' || b.is_ascii_digit() => self.number(),
            Some(b) if b.is_ascii_alphabetic() => self.keyword(),
            Some(_) => Err(self.error("unexpected character")),
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn descend(&mut self) -> Result<(), LiteralError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(self.error(format!("nesting deeper than {}", MAX_DEPTH)));
        }
        Ok(())
    }

    /// Parses a comma-separated list up to `close`, allowing a trailing comma.
    fn items<T>(
        &mut self,
        close: u8,
        mut item: impl FnMut(&mut Self) -> Result<T, LiteralError>,
    ) -> Result<Vec<T>, LiteralError> {
        let mut out = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() == Some(close) {
                self.pos += 1;
                return Ok(out);
            }
            out.push(item(self)?);
            self.skip_ws();
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b) if b == close => {
                    self.pos += 1;
                    return Ok(out);
                }
                _ => return Err(self.error(format!("expected `,` or `{}`", close as char))),
            }
        }
    }

    fn sequence(&mut self, open: u8, close: u8) -> Result<Value, LiteralError> {
        self.expect(open)?;
        self.descend()?;
        let items = self.items(close, |p| p.value())?;
        self.depth -= 1;
        Ok(Value::Array(items))
    }

    fn dict(&mut self) -> Result<Value, LiteralError> {
        self.expect(b'{')?;
        self.descend()?;
        let entries = self.items(b'}', |p| {
            let key = match p.value()? {
                Value::String(s) => s,
                Value::Null => "None".to_string(),
                Value::Array(_) | Value::Object(_) => {
                    return Err(p.error("dictionary keys must be scalars"))
                }
                other => other.to_string(),
            };
            p.expect(b':')?;
            let value = p.value()?;
            Ok((key, value))
        })?;
        self.depth -= 1;

        let mut map = Map::new();
        for (k, v) in entries {
            map.insert(k, v);
        }
        Ok(Value::Object(map))
    }

    fn string(&mut self) -> Result<String, LiteralError> {
        let quote = self.peek().ok_or_else(|| self.error("expected string"))?;
        self.pos += 1;
        let mut out = String::new();

        loop {
            let rest = &self.src[self.pos..];
            let mut chars = rest.chars();
            let c = chars
                .next()
                .ok_or_else(|| self.error("unterminated string"))?;
            self.pos += c.len_utf8();

            if c as u32 == quote as u32 {
                return Ok(out);
            }
            if c != '\\' {
                out.push(c);
                continue;
            }

            let escaped = self.src[self.pos..]
                .chars()
                .next()
                .ok_or_else(|| self.error("unterminated escape"))?;
            self.pos += escaped.len_utf8();
            match escaped {
                'n' => out.push('\n'),
                't' => out.push('\t'),
                'r' => out.push('\r'),
                '0' => out.push('\0'),
                '\\' => out.push('\\'),
                '\'' => out.push('\''),
                '"' => out.push('"'),
                '\n' => {}
                'u' => {
                    let hex = self
                        .src
                        .get(self.pos..self.pos + 4)
                        .ok_or_else(|| self.error("truncated \\u escape"))?;
                    let code = u32::from_str_radix(hex, 16)
                        .map_err(|_| self.error("invalid \\u escape"))?;
                    self.pos += 4;
                    out.push(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER));
                }
                other => {
                    // Unknown escapes are kept verbatim
                    out.push('\\');
                    out.push(other);
                }
            }
        }
    }

    fn number(&mut self) -> Result<Value, LiteralError> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b.is_ascii_digit() || matches!(b, b'-' | b'+' | b'.' | b'e' | b'E' | b'_') {
                self.pos += 1;
            } else {
                break;
            }
        }
        let text: String = self.src[start..self.pos]
            .chars()
            .filter(|c| *c != '_')
            .collect();

        if let Ok(i) = text.parse::<i64>() {
            return Ok(Value::Number(i.into()));
        }
        text.parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| LiteralError {
                pos: start,
                message: format!("invalid number `{}`", text),
            })
    }

    fn keyword(&mut self) -> Result<Value, LiteralError> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b.is_ascii_alphanumeric() || b == b'_' {
                self.pos += 1;
            } else {
                break;
            }
        }
        match &self.src[start..self.pos] {
            "True" | "true" => Ok(Value::Bool(true)),
            "False" | "false" => Ok(Value::Bool(false)),
            "None" | "null" => Ok(Value::Null),
            other => Err(LiteralError {
                pos: start,
                message: format!("unknown identifier `{}`", other),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_python_dict() {
        let value =
            parse_literal("{'needs_sql': True, 'sql': ['SELECT 1;',], 'notes': None}").unwrap();
        assert_eq!(
            value,
            json!({"needs_sql": true, "sql": ["SELECT 1;"], "notes": null})
        );
    }

    #[test]
    fn test_key_order_is_preserved() {
        let value = parse_literal("{'b': 1, 'a': 2}").unwrap();
        let keys: Vec<&String> = value.as_object().unwrap().keys().collect();
        assert_eq!(keys, ["b", "a"]);
    }

    #[test]
    fn test_escapes_and_mixed_quotes() {
        let value = parse_literal(r#"['it\'s', "say \"hi\"", 'a\nb', 'é']"#).unwrap();
        assert_eq!(value, json!(["it's", "say \"hi\"", "a\nb", "é"]));
    }

    #[test]
    fn test_tuples_and_numbers() {
        let value = parse_literal("(1, -2.5, 1_000, 3e2)").unwrap();
        assert_eq!(value, json!([1, -2.5, 1000, 300.0]));
    }

    #[test]
    fn test_non_string_keys() {
        let value = parse_literal("{1: 'a', True: 'b'}").unwrap();
        assert_eq!(value, json!({"1": "a", "true": "b"}));
    }

    #[test]
    fn test_errors() {
        assert!(parse_literal("").is_err());
        assert!(parse_literal("{'a': }").is_err());
        assert!(parse_literal("{'a': 1").is_err());
        assert!(parse_literal("'unterminated").is_err());
        assert!(parse_literal("[1, 2] extra").is_err());
        assert!(parse_literal("{'a': undefined}").is_err());
    }

    #[test]
    fn test_nesting_limit() {
        let nested = |d: usize| format!("{}{}", "[".repeat(d), "]".repeat(d));
        assert!(parse_literal(&nested(MAX_DEPTH)).is_ok());

        let err = parse_literal(&nested(MAX_DEPTH + 1)).unwrap_err();
        assert!(err.message.contains("nesting deeper than"));
        assert!(parse_literal(&nested(200_000)).is_err());

        let dicts = format!("{}1{}", "{'a': ".repeat(5000), "}".repeat(5000));
        assert!(parse_literal(&dicts).is_err());
    }

    #[test]
    fn test_sibling_containers_do_not_accumulate_depth() {
        let wide = format!("[{}]", vec!["[[1]]"; 500].join(", "));
        let value = parse_literal(&wide).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 500);
    }
}
