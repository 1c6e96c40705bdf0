//! Argument checks run before a capability is invoked.

use serde_json::Value;

/// Validate tool arguments against their JSON schema.
///
/// Every violation is reported, joined with `; `.
pub fn validate_arguments(args: &Value, schema: &Value) -> Result<(), String> {
    let validator =
        jsonschema::Validator::new(schema).map_err(|e| format!("invalid tool schema: {e}"))?;
    if validator.is_valid(args) {
        return Ok(());
    }
    let errors: Vec<String> = validator.iter_errors(args).map(|e| e.to_string()).collect();
    Err(errors.join("; "))
}

/// Turn the raw argument text of a tool call into a JSON value.
///
/// Empty text means no arguments. Text that is not a JSON object is accepted
/// only when the schema has exactly one required field, in which case it is
/// bound to that field.
pub fn parse_arguments(raw: &str, schema: &Value) -> Result<Value, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(Value::Object(Default::default()));
    }

    let parsed = serde_json::from_str::<Value>(raw);
    if let Ok(value @ Value::Object(_)) = &parsed {
        return Ok(value.clone());
    }

    let single = single_required_field(schema);
    match (single, parsed) {
        (Some(field), Ok(Value::String(s))) => Ok(serde_json::json!({ field: s })),
        (Some(field), Ok(Value::Number(n))) => Ok(serde_json::json!({ field: n.to_string() })),
        (Some(field), Err(_)) => Ok(serde_json::json!({ field: raw })),
        (_, Ok(other)) => Err(format!(
            "expected object arguments, got {}",
            json_type_name(&other)
        )),
        (None, Err(e)) => Err(format!("arguments are not valid JSON: {e}")),
    }
}

fn single_required_field(schema: &Value) -> Option<String> {
    let required = schema.get("required")?.as_array()?;
    match required.as_slice() {
        [only] => only.as_str().map(str::to_string),
        _ => None,
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
