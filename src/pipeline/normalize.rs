//! Response normalisation: recover a JSON payload from a model completion.
//!
//! ## Why is this necessary?
//!
//! Every stage prompt says "respond ONLY with valid JSON", and models still
//! reply with:
//!
//! - the object wrapped in ` ```json ... ``` ` fences
//! - a sentence of preamble ("Sure! Here is the JSON:") before the object
//! - a closing remark after it
//!
//! [`normalize`] is total: it never fails. A completion that contains nothing
//! usable yields [`Normalized::Empty`], which every stage treats as "this stage
//! produced nothing" rather than as an error.
//!
//! ## Recovery order
//!
//! 1. Trim, strip an opening ` ``` ` / ` ```json ` fence and a closing fence.
//! 2. Parse the remainder directly.
//! 3. Otherwise parse the widest `{ … }` span (first `{` to last `}`).
//! 4. Otherwise give up with `Empty`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Outcome of normalising a completion.
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    /// A structured value was recovered.
    Value(Value),
    /// Nothing parseable was found.
    Empty,
}

impl Normalized {
    pub fn is_empty(&self) -> bool {
        matches!(self, Normalized::Empty)
    }

    /// Look up a top-level field; `None` when empty or not an object.
    pub fn field(&self, key: &str) -> Option<&Value> {
        match self {
            Normalized::Value(Value::Object(map)) => map.get(key),
            _ => None,
        }
    }

    /// Top-level string field, or `""`.
    pub fn str_field(&self, key: &str) -> &str {
        self.field(key).and_then(Value::as_str).unwrap_or_default()
    }

    /// Top-level array field, or an empty slice.
    pub fn array_field(&self, key: &str) -> &[Value] {
        self.field(key)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Top-level array of strings; non-string entries are skipped.
    pub fn string_list(&self, key: &str) -> Vec<String> {
        self.array_field(key)
            .iter()
            .filter_map(Value::as_str)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    pub fn into_value(self) -> Option<Value> {
        match self {
            Normalized::Value(v) => Some(v),
            Normalized::Empty => None,
        }
    }
}

/// Recover a structured value from a raw completion. Never fails.
pub fn normalize(raw: &str) -> Normalized {
    let text = strip_fences(raw);

    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return Normalized::Value(value);
    }

    if let Some(span) = RE_OUTER_OBJECT.find(text) {
        if let Ok(value) = serde_json::from_str::<Value>(span.as_str()) {
            return Normalized::Value(value);
        }
    }

    Normalized::Empty
}

// Greedy: first `{` through last `}`.
static RE_OUTER_OBJECT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\{.*\}").unwrap());

fn strip_fences(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```json") {
        text = rest;
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest;
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }
    text.trim()
}
