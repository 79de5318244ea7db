//! JSON merge patch (RFC 7386) helpers.

use serde_json::{Map, Value};

/// Builds the merge patch that turns `original` into `modified`.
///
/// Keys missing from `modified` become `null` (removal). Arrays and scalars
/// are replaced wholesale, as merge patch has no list semantics.
pub fn diff(original: &Value, modified: &Value) -> Value {
    match (original, modified) {
        (Value::Object(orig), Value::Object(modi)) => {
            let mut patch = Map::new();
            for (key, old) in orig {
                match modi.get(key) {
                    None => {
                        patch.insert(key.clone(), Value::Null);
                    }
                    Some(new) if new != old => {
                        patch.insert(key.clone(), diff(old, new));
                    }
                    Some(_) => {}
                }
            }
            for (key, new) in modi {
                if !orig.contains_key(key) {
                    patch.insert(key.clone(), new.clone());
                }
            }
            Value::Object(patch)
        }
        _ => modified.clone(),
    }
}

/// Applies `patch` to `target` in place.
pub fn apply(target: &mut Value, patch: &Value) {
    let Value::Object(entries) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(fields) = target {
        for (key, value) in entries {
            if value.is_null() {
                fields.remove(key);
            } else {
                apply(fields.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

/// True when the patch carries no change.
pub fn is_noop(patch: &Value) -> bool {
    matches!(patch, Value::Object(m) if m.is_empty())
}
