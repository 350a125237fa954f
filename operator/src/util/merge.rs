use serde_json::Value;

/// Deep-merges `override_` into `defaults` and returns the result.
///
/// Objects merge key-wise, arrays concatenate, anything else is overridden
/// by the right-hand side. Null on the right keeps the left-hand value.
pub fn mergeconcat(defaults: Value, override_: Value) -> Value {
    match (defaults, override_) {
        (Value::Object(defaults), Value::Object(overrides)) => {
            let mut merged = defaults;
            for (key, value) in overrides {
                let current = merged.remove(&key);
                let value = match current {
                    Some(current) => mergeconcat(current, value),
                    None => value,
                };
                merged.insert(key, value);
            }
            Value::Object(merged)
        }
        (Value::Array(mut defaults), Value::Array(overrides)) => {
            defaults.extend(overrides);
            Value::Array(defaults)
        }
        (defaults, Value::Null) => defaults,
        (_, override_) => override_,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalars_override() {
        assert_eq!(mergeconcat(json!(1), json!(2)), json!(2));
        assert_eq!(mergeconcat(json!("a"), json!("b")), json!("b"));
    }

    #[test]
    fn null_keeps_defaults() {
        assert_eq!(mergeconcat(json!({"a": 1}), json!(null)), json!({"a": 1}));
    }

    #[test]
    fn objects_merge_key_wise() {
        let merged = mergeconcat(
            json!({"a": 1, "b": {"c": 2, "d": 3}}),
            json!({"b": {"d": 4, "e": 5}, "f": 6}),
        );
        assert_eq!(merged, json!({"a": 1, "b": {"c": 2, "d": 4, "e": 5}, "f": 6}));
    }

    #[test]
    fn sequences_concatenate() {
        let merged = mergeconcat(json!({"a": [1, 2]}), json!({"a": [3]}));
        assert_eq!(merged, json!({"a": [1, 2, 3]}));
    }
}
