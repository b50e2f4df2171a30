//! Attribute merging
//!
//! Attributes are a JSON object. Merging is deep: objects merge key by
//! key, arrays are unioned keeping first-seen order, and anything else
//! is replaced by the incoming value.

use serde_json::{Map, Value};

/// Deep-merge `incoming` into `base`
pub fn deep_merge(base: &mut Map<String, Value>, incoming: Map<String, Value>) {
    for (key, value) in incoming {
        match base.get_mut(&key) {
            Some(existing) => merge_value(existing, value),
            None => {
                base.insert(key, value);
            }
        }
    }
}

fn merge_value(existing: &mut Value, incoming: Value) {
    match (existing, incoming) {
        (Value::Object(base), Value::Object(incoming)) => deep_merge(base, incoming),
        (Value::Array(base), Value::Array(incoming)) => {
            for item in incoming {
                if !base.contains(&item) {
                    base.push(item);
                }
            }
        }
        (existing, incoming) => *existing = incoming,
    }
}
