//! Argument validation against the JSON schema subset tools declare:
//! object `properties` with `type`, `required`, `default`,
//! `minLength`/`maxLength` and `enum`.

use serde_json::{Map, Value};

/// Validate `args` against `schema`, filling in declared defaults.
pub fn validate_args(schema: &Value, args: &Value) -> Result<Value, String> {
    let mut object = match args {
        Value::Object(map) => map.clone(),
        Value::Null => Map::new(),
        other => return Err(format!("arguments must be an object, got {}", type_name(other))),
    };

    let properties = schema
        .get("properties")
        .and_then(|p| p.as_object())
        .cloned()
        .unwrap_or_default();

    if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
        for field in required.iter().filter_map(|f| f.as_str()) {
            if !object.contains_key(field) {
                return Err(format!("missing required field '{}'", field));
            }
        }
    }

    for (field, property) in &properties {
        match object.get(field) {
            Some(value) => check_property(field, property, value)?,
            None => {
                if let Some(default) = property.get("default") {
                    object.insert(field.clone(), default.clone());
                }
            }
        }
    }

    Ok(Value::Object(object))
}

fn check_property(field: &str, property: &Value, value: &Value) -> Result<(), String> {
    if let Some(expected) = property.get("type").and_then(|t| t.as_str()) {
        if !matches_type(expected, value) {
            return Err(format!(
                "field '{}' expected {}, got {}",
                field,
                expected,
                type_name(value)
            ));
        }
    }

    if let Some(s) = value.as_str() {
        let len = s.chars().count();
        if let Some(min) = property.get("minLength").and_then(|m| m.as_u64()) {
            if (len as u64) < min {
                return Err(format!("field '{}' must be at least {} characters", field, min));
            }
        }
        if let Some(max) = property.get("maxLength").and_then(|m| m.as_u64()) {
            if (len as u64) > max {
                return Err(format!("field '{}' must be at most {} characters", field, max));
            }
        }
    }

    if let Some(options) = property.get("enum").and_then(|e| e.as_array()) {
        if !options.contains(value) {
            return Err(format!("field '{}' must be one of {}", field, Value::Array(options.clone())));
        }
    }

    Ok(())
}

fn matches_type(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
