use serde_json::Value;

pub type Id = String;

/// Render a parameter value for display in a diff: objects and arrays become
/// their compact JSON text, scalars are kept as they are.
pub fn display_value(value: &Value) -> Value {
    match value {
        Value::Object(_) | Value::Array(_) => Value::String(value.to_string()),
        other => other.clone(),
    }
}

/// Collapse all whitespace out of a string. Used as the second-tier match for
/// template expressions whose spacing drifts between versions.
pub fn strip_whitespace(value: &str) -> String {
    value.chars().filter(|c| !c.is_whitespace()).collect()
}
