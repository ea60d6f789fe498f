//! Value normalization (C1): turns raw replication row values into the
//! canonical value tree the rest of the pipeline operates on.

use serde_json::{Map, Number, Value};

/// Columns whose content is always resolved to an object, even when the
/// source row held a scalar or an unparseable string.
const ALWAYS_OBJECT_COLUMNS: &[&str] = &["BussinessJson", "ExtraJson"];

/// Normalize a single raw column value coming off the replication stream
/// into the canonical `serde_json::Value` tree used by the rest of the
/// pipeline (null / bool / int / string / number / object / array).
pub fn normalize_value(column: &str, raw: &RawValue) -> Value {
    if ALWAYS_OBJECT_COLUMNS.contains(&column) {
        return normalize_json_column(raw);
    }
    if column.to_ascii_lowercase().ends_with("json") {
        if let Some(v) = try_parse_json_like(raw) {
            return v;
        }
    }
    normalize_scalar(raw)
}

/// The shape a replication row value can arrive in before normalization.
/// `mysql_async`/`mysql_common` binlog rows surface values along these
/// lines; this is the seam between that representation and our tree.
#[derive(Debug, Clone)]
pub enum RawValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Bytes(Vec<u8>),
    Str(String),
    DateTime(chrono::NaiveDateTime),
    Date(chrono::NaiveDate),
    Decimal(String),
}

fn normalize_scalar(raw: &RawValue) -> Value {
    match raw {
        RawValue::Null => Value::Null,
        RawValue::Bool(b) => Value::Bool(*b),
        RawValue::Int(i) => Value::Number((*i).into()),
        RawValue::UInt(u) => Number::from_f64(*u as f64)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        RawValue::Float(f) => Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
        RawValue::Decimal(s) => Value::String(s.clone()),
        RawValue::DateTime(dt) => Value::String(dt.format("%Y-%m-%d %H:%M:%S").to_string()),
        RawValue::Date(d) => Value::String(d.format("%Y-%m-%d").to_string()),
        RawValue::Bytes(bytes) => Value::String(bytes_to_string(bytes)),
        RawValue::Str(s) => normalize_string(s),
    }
}

fn bytes_to_string(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => hex::encode(bytes),
    }
}

/// Strings get a trailing pass: strip a single layer of enclosing quotes,
/// then if the result looks like a JSON object/array, repair single
/// quotes to double quotes and try to parse it. Anything that doesn't
/// parse falls back to the trimmed string itself.
fn normalize_string(s: &str) -> Value {
    let trimmed = s.trim_matches('\'');
    if looks_json_shaped(trimmed) {
        if let Some(v) = parse_repaired_json(trimmed) {
            return v;
        }
    }
    Value::String(trimmed.to_string())
}

fn looks_json_shaped(s: &str) -> bool {
    let s = s.trim();
    (s.starts_with('{') && s.ends_with('}')) || (s.starts_with('[') && s.ends_with(']'))
}

fn parse_repaired_json(s: &str) -> Option<Value> {
    let repaired = s.replace('\'', "\"");
    serde_json::from_str(&repaired).ok()
}

fn try_parse_json_like(raw: &RawValue) -> Option<Value> {
    match raw {
        RawValue::Str(s) => {
            let trimmed = s.trim_matches('\'');
            if looks_json_shaped(trimmed) {
                parse_repaired_json(trimmed)
            } else {
                None
            }
        }
        RawValue::Bytes(bytes) => {
            let s = bytes_to_string(bytes);
            let trimmed = s.trim_matches('\'');
            if looks_json_shaped(trimmed) {
                parse_repaired_json(trimmed)
            } else {
                None
            }
        }
        _ => None,
    }
}

/// `BussinessJson` / `ExtraJson`: these columns always resolve to a JSON
/// object, no matter what shape the source row actually held.
fn normalize_json_column(raw: &RawValue) -> Value {
    match raw {
        RawValue::Null => Value::Object(Map::new()),
        RawValue::Str(s) => resolve_json_object_string(s),
        RawValue::Bytes(bytes) => resolve_json_object_string(&bytes_to_string(bytes)),
        other => wrap_non_object(normalize_scalar(other)),
    }
}

fn resolve_json_object_string(s: &str) -> Value {
    let s = strip_byte_repr(s.trim());
    let repaired = strip_trailing_commas(&repair_json_text(s));
    match serde_json::from_str::<Value>(&repaired) {
        Ok(Value::Object(map)) => Value::Object(map),
        Ok(other) => wrap_non_object(other),
        Err(_) => {
            let mut obj = Map::new();
            obj.insert("raw_value".to_string(), Value::String(s.to_string()));
            Value::Object(obj)
        }
    }
}

/// Strips a Python `b'...'` byte-literal wrapper some upstream rows carry
/// verbatim when a column was decoded as bytes and then stringified.
fn strip_byte_repr(s: &str) -> &str {
    if let Some(inner) = s.strip_prefix("b'").and_then(|s| s.strip_suffix('\'')) {
        inner
    } else {
        s
    }
}

/// Repairs loose quoting in a value that's supposed to be a JSON object
/// or array: single quotes become double quotes, and a colon immediately
/// followed by a non-space character gets a space inserted, matching the
/// source system's looser repair pass for config-shaped strings.
fn repair_json_text(s: &str) -> String {
    let quoted = s.replace('\'', "\"");
    let mut out = String::with_capacity(quoted.len());
    let mut chars = quoted.chars().peekable();
    while let Some(c) = chars.next() {
        out.push(c);
        if c == ':' {
            if let Some(&next) = chars.peek() {
                if next != ' ' {
                    out.push(' ');
                }
            }
        }
    }
    out
}

/// Drops a trailing `,` that precedes a closing `}`/`]` (skipping
/// whitespace in between), a loose-JSON shape the single-quote rewrite
/// doesn't otherwise fix. Tracks string literals so commas inside quoted
/// values are left alone.
fn strip_trailing_commas(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    let mut in_string = false;
    let mut escaped = false;
    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        if c == '"' {
            in_string = true;
            out.push(c);
            continue;
        }
        if c == ',' {
            let mut lookahead = chars.clone();
            let mut closes = false;
            while let Some(&next) = lookahead.peek() {
                if next.is_whitespace() {
                    lookahead.next();
                    continue;
                }
                closes = next == '}' || next == ']';
                break;
            }
            if closes {
                continue;
            }
        }
        out.push(c);
    }
    out
}

fn wrap_non_object(v: Value) -> Value {
    let mut obj = Map::new();
    obj.insert("value".to_string(), v);
    Value::Object(obj)
}

mod hex {
    pub fn encode(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_passthrough() {
        assert_eq!(normalize_value("Remark", &RawValue::Str("hello".into())), Value::String("hello".into()));
    }

    #[test]
    fn datetime_formats_as_space_separated() {
        let dt = chrono::NaiveDateTime::parse_from_str("2024-01-02 03:04:05", "%Y-%m-%d %H:%M:%S").unwrap();
        assert_eq!(
            normalize_value("CreatedAt", &RawValue::DateTime(dt)),
            Value::String("2024-01-02 03:04:05".into())
        );
    }

    #[test]
    fn quoted_json_shaped_string_is_parsed() {
        let raw = RawValue::Str("'{\"a\": 1}'".into());
        assert_eq!(normalize_value("Payload", &raw), serde_json::json!({"a": 1}));
    }

    #[test]
    fn extra_json_always_resolves_to_object() {
        assert_eq!(normalize_value("ExtraJson", &RawValue::Null), serde_json::json!({}));
        assert_eq!(
            normalize_value("ExtraJson", &RawValue::Str("42".into())),
            serde_json::json!({"raw_value": "42"})
        );
        assert_eq!(
            normalize_value("ExtraJson", &RawValue::Str("'[1,2]'".into())),
            serde_json::json!({"value": [1, 2]})
        );
    }

    #[test]
    fn trailing_comma_before_closing_bracket_is_repaired() {
        assert_eq!(
            normalize_value("ExtraJson", &RawValue::Str("{'a':'1',}".into())),
            serde_json::json!({"a": "1"})
        );
        assert_eq!(
            normalize_value("ExtraJson", &RawValue::Str("{'a': [1, 2,],}".into())),
            serde_json::json!({"a": [1, 2]})
        );
    }

    #[test]
    fn bytes_decode_to_utf8_or_hex() {
        assert_eq!(normalize_value("Note", &RawValue::Bytes(vec![104, 105])), Value::String("hi".into()));
        assert_eq!(
            normalize_value("Note", &RawValue::Bytes(vec![0xff, 0xfe])),
            Value::String("fffe".into())
        );
    }
}
