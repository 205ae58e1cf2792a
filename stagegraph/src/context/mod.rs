//! Loosely-typed stage context.
//!
//! Stage context is whatever the pipeline author wrote plus whatever tasks
//! have added since, so it stays an ordered map of JSON values. Typed access
//! goes through the lookup helpers here or through `Stage::map_to`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::ops::{Deref, DerefMut};

/// Ordered map of context values for a single stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StageContext(Map<String, Value>);

impl StageContext {
    /// Creates a new empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context from an existing map.
    #[must_use]
    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Returns the underlying map.
    #[must_use]
    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }

    /// Sets a value, returning the previous one.
    pub fn set(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    /// Reads an integral value; non-numeric values read as absent.
    #[must_use]
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        match self.0.get(key)? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            _ => None,
        }
    }

    /// Reads a boolean, accepting `true`/`false` strings.
    #[must_use]
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.0.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Reads a string value.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Looks up a value by RFC 6901 JSON pointer. The empty pointer is not
    /// addressable here; use the map itself.
    #[must_use]
    pub fn pointer(&self, pointer: &str) -> Option<&Value> {
        let rest = pointer.strip_prefix('/')?;
        let (head, tail) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, ""),
        };
        let key = head.replace("~1", "/").replace("~0", "~");
        let value = self.0.get(&key)?;

        if tail.is_empty() {
            Some(value)
        } else {
            value.pointer(tail)
        }
    }

    /// Returns the context as a JSON object value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

impl Deref for StageContext {
    type Target = Map<String, Value>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for StageContext {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<Map<String, Value>> for StageContext {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, Value)> for StageContext {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context(value: Value) -> StageContext {
        match value {
            Value::Object(map) => StageContext::from_map(map),
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn test_preserves_insertion_order() {
        let mut ctx = StageContext::new();
        ctx.set("zeta", json!(1));
        ctx.set("alpha", json!(2));
        ctx.set("mid", json!(3));

        let keys: Vec<&String> = ctx.keys().collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_typed_lookups() {
        let ctx = context(json!({
            "stageTimeoutMs": 1500,
            "fraction": 2.9,
            "flag": "true",
            "name": "deploy",
            "text": "x"
        }));

        assert_eq!(ctx.get_i64("stageTimeoutMs"), Some(1500));
        assert_eq!(ctx.get_i64("fraction"), Some(2));
        assert_eq!(ctx.get_i64("text"), None);
        assert_eq!(ctx.get_bool("flag"), Some(true));
        assert_eq!(ctx.get_str("name"), Some("deploy"));
        assert_eq!(ctx.get_i64("missing"), None);
    }

    #[test]
    fn test_pointer_lookup() {
        let ctx = context(json!({
            "exception": { "details": { "errors": ["boom"] } },
            "a/b": 1
        }));

        assert_eq!(ctx.pointer("/exception/details/errors/0"), Some(&json!("boom")));
        assert_eq!(ctx.pointer("/a~1b"), Some(&json!(1)));
        assert_eq!(ctx.pointer("/exception/missing"), None);
        assert_eq!(ctx.pointer(""), None);
    }

    #[test]
    fn test_serializes_as_plain_object() {
        let ctx = context(json!({"b": 1, "a": 2}));
        assert_eq!(serde_json::to_string(&ctx).unwrap(), r#"{"b":1,"a":2}"#);
    }
}
