use parking_lot::RwLock;
use serde_json::{Map, Number, Value};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// Marker substituted for a node that is reached again on its own path.
pub const CIRCULAR_MARKER: &str = "[Circular Reference]";
/// Marker substituted once nesting exceeds [`MAX_DEPTH`].
pub const MAX_DEPTH_MARKER: &str = "[Max Depth Exceeded]";
/// Nesting limit applied during JSON conversion.
pub const MAX_DEPTH: usize = 16;

/// Shared, mutable node inside a context graph.
pub type SharedValue = Arc<RwLock<FieldValue>>;

/// Dynamically shaped context or argument value.
///
/// Owned variants form a tree. `Shared` lets callers build reference graphs,
/// including cycles, which is why conversion to JSON goes through
/// [`FieldValue::to_json`] instead of a derived `Serialize`.
#[derive(Debug, Clone, Default)]
pub enum FieldValue {
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<FieldValue>),
    Map(BTreeMap<String, FieldValue>),
    Shared(SharedValue),
}

impl FieldValue {
    /// Wraps a value in a shared node that other values can point back to.
    pub fn shared(value: FieldValue) -> SharedValue {
        Arc::new(RwLock::new(value))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Null => "null",
            FieldValue::Bool(_) => "boolean",
            FieldValue::Integer(_) | FieldValue::Float(_) => "number",
            FieldValue::String(_) => "string",
            FieldValue::List(_) => "array",
            FieldValue::Map(_) => "object",
            FieldValue::Shared(_) => "shared",
        }
    }

    /// Converts to JSON without ever recursing forever.
    pub fn to_json(&self) -> Value {
        let mut ancestors = HashSet::new();
        self.to_json_inner(&mut ancestors, 0)
    }

    fn to_json_inner(&self, ancestors: &mut HashSet<usize>, depth: usize) -> Value {
        if depth > MAX_DEPTH {
            return Value::String(MAX_DEPTH_MARKER.to_string());
        }

        match self {
            FieldValue::Null => Value::Null,
            FieldValue::Bool(b) => Value::Bool(*b),
            FieldValue::Integer(i) => Value::Number((*i).into()),
            // NaN and infinities have no JSON form
            FieldValue::Float(f) => Number::from_f64(*f).map_or(Value::Null, Value::Number),
            FieldValue::String(s) => Value::String(s.clone()),
            FieldValue::List(items) => Value::Array(
                items
                    .iter()
                    .map(|item| item.to_json_inner(ancestors, depth + 1))
                    .collect(),
            ),
            FieldValue::Map(entries) => {
                let mut map = Map::with_capacity(entries.len());
                for (key, value) in entries {
                    map.insert(key.clone(), value.to_json_inner(ancestors, depth + 1));
                }
                Value::Object(map)
            }
            FieldValue::Shared(node) => {
                let identity = Arc::as_ptr(node) as usize;
                if !ancestors.insert(identity) {
                    return Value::String(CIRCULAR_MARKER.to_string());
                }
                let converted = node.read().to_json_inner(ancestors, depth);
                ancestors.remove(&identity);
                converted
            }
        }
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => FieldValue::Integer(i),
                None => FieldValue::Float(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => FieldValue::String(s),
            Value::Array(items) => FieldValue::List(items.into_iter().map(Into::into).collect()),
            Value::Object(map) => {
                FieldValue::Map(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::String(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::String(s)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Integer(i)
    }
}

impl From<f64> for FieldValue {
    fn from(f: f64) -> Self {
        FieldValue::Float(f)
    }
}

impl From<SharedValue> for FieldValue {
    fn from(node: SharedValue) -> Self {
        FieldValue::Shared(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn converts_plain_tree() {
        let value: FieldValue = json!({"a": [1, 2.5, "x"], "b": null}).into();
        assert_eq!(value.to_json(), json!({"a": [1, 2.5, "x"], "b": null}));
    }

    #[test]
    fn self_reference_becomes_marker() {
        let node = FieldValue::shared(FieldValue::Map(BTreeMap::new()));
        if let FieldValue::Map(map) = &mut *node.write() {
            map.insert("name".to_string(), "root".into());
            map.insert("self".to_string(), FieldValue::Shared(node.clone()));
        }

        let json = FieldValue::Shared(node.clone()).to_json();
        assert_eq!(json["name"], "root");
        assert_eq!(json["self"], CIRCULAR_MARKER);

        // Break the cycle so the test does not leak.
        *node.write() = FieldValue::Null;
    }

    #[test]
    fn shared_sibling_is_not_circular() {
        let shared = FieldValue::shared("same".into());
        let value = FieldValue::List(vec![
            FieldValue::Shared(shared.clone()),
            FieldValue::Shared(shared),
        ]);
        assert_eq!(value.to_json(), json!(["same", "same"]));
    }

    #[test]
    fn deep_nesting_is_capped() {
        let mut value = FieldValue::String("leaf".into());
        for _ in 0..(MAX_DEPTH + 4) {
            value = FieldValue::List(vec![value]);
        }
        let rendered = value.to_json().to_string();
        assert!(rendered.contains(MAX_DEPTH_MARKER));
        assert!(!rendered.contains("leaf"));
    }

    #[test]
    fn non_finite_float_becomes_null() {
        assert_eq!(FieldValue::Float(f64::NAN).to_json(), Value::Null);
    }
}
