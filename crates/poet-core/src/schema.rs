//! Schema validation for values crossing a model boundary.
//!
//! Every flow input and every model response is described by a type
//! implementing [`Schema`]. Its JSON Schema is derived with `schemars` (field
//! doc comments become descriptions the model sees), and [`parse`] is the single
//! parse-or-fail entry point: the candidate value is checked structurally
//! against that schema, deserialized, and then run through the type's
//! refinements. All offending fields are reported together.

use std::fmt;

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Path used for violations that concern the whole value.
pub const ROOT: &str = "$";

/// A single field that failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct FieldViolation {
    /// Dotted path to the field, `$` for the root value.
    pub path: String,
    pub message: String,
}

impl FieldViolation {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "`{}` {}", self.path, self.message)
    }
}

/// A value did not conform to the shape named by `schema`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ValidationError {
    pub schema: String,
    pub violations: Vec<FieldViolation>,
}

impl ValidationError {
    pub fn new(schema: impl Into<String>, violations: Vec<FieldViolation>) -> Self {
        Self {
            schema: schema.into(),
            violations,
        }
    }

    /// Paths of every offending field, in the order they were found.
    pub fn paths(&self) -> Vec<&str> {
        self.violations.iter().map(|v| v.path.as_str()).collect()
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} does not match its schema: ", self.schema)?;
        for (i, violation) in self.violations.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", violation)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// A typed shape declaration.
pub trait Schema: Serialize + DeserializeOwned + JsonSchema {
    /// Name used in error messages and as the structured-output schema name.
    const NAME: &'static str;

    /// Checks the JSON Schema cannot express (non-empty strings and the like).
    fn refine(&self, _violations: &mut Vec<FieldViolation>) {}
}

/// JSON Schema for `T`, as sent to the model for structured output.
pub fn output_schema<T: Schema>() -> Value {
    let root = schemars::schema_for!(T);
    let mut schema = serde_json::to_value(&root).unwrap_or_default();
    if let Some(map) = schema.as_object_mut() {
        map.remove("$schema");
    }
    schema
}

/// Parse a candidate value into `T` or report every offending field.
pub fn parse<T: Schema>(value: Value) -> Result<T, ValidationError> {
    let schema = output_schema::<T>();
    let mut violations = Vec::new();
    check_against(&schema, &value, ROOT, &mut violations);
    if !violations.is_empty() {
        return Err(ValidationError::new(T::NAME, violations));
    }

    let parsed: T = serde_json::from_value(value).map_err(|e| {
        ValidationError::new(T::NAME, vec![FieldViolation::new(ROOT, e.to_string())])
    })?;
    validate(&parsed)?;
    Ok(parsed)
}

/// Parse model output text (optionally wrapped in a Markdown code fence).
pub fn parse_json_text<T: Schema>(text: &str) -> Result<T, ValidationError> {
    let body = strip_code_fence(text);
    let value: Value = serde_json::from_str(body).map_err(|e| {
        ValidationError::new(
            T::NAME,
            vec![FieldViolation::new(ROOT, format!("is not valid JSON: {}", e))],
        )
    })?;
    parse(value)
}

/// Run `T`'s refinements on an already-typed value.
pub fn validate<T: Schema>(value: &T) -> Result<(), ValidationError> {
    let mut violations = Vec::new();
    value.refine(&mut violations);
    if violations.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::new(T::NAME, violations))
    }
}

/// Refinement helper: record a violation if `value` is blank.
pub fn require_non_empty(path: &str, value: &str, violations: &mut Vec<FieldViolation>) {
    if value.trim().is_empty() {
        violations.push(FieldViolation::new(path, "must not be empty"));
    }
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    // Drop the info string ("json") after the opening fence.
    let body = match rest.split_once('\n') {
        Some((info, body)) if !info.trim_start().starts_with(['{', '[']) => body,
        Some(_) => rest,
        None => rest
            .trim_start()
            .trim_start_matches(|c: char| c.is_ascii_alphabetic()),
    };
    body.trim()
}

fn check_against(schema: &Value, value: &Value, path: &str, out: &mut Vec<FieldViolation>) {
    let allowed: Vec<&str> = match schema.get("type") {
        Some(Value::String(t)) => vec![t.as_str()],
        Some(Value::Array(types)) => types.iter().filter_map(Value::as_str).collect(),
        _ => return,
    };

    if !allowed.iter().any(|t| type_matches(t, value)) {
        if value.is_null() && path != ROOT {
            out.push(FieldViolation::new(path, "is required"));
        } else {
            out.push(FieldViolation::new(
                path,
                format!("expected {}, found {}", allowed.join(" or "), type_name(value)),
            ));
        }
        return;
    }

    match value {
        Value::Object(map) => {
            if let Some(required) = schema.get("required").and_then(Value::as_array) {
                for name in required.iter().filter_map(Value::as_str) {
                    if !map.contains_key(name) {
                        out.push(FieldViolation::new(child_path(path, name), "is required"));
                    }
                }
            }
            if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
                for (name, property) in properties {
                    if let Some(field) = map.get(name) {
                        check_against(property, field, &child_path(path, name), out);
                    }
                }
            }
        }
        Value::Array(items) => {
            if let Some(item_schema) = schema.get("items") {
                for (i, item) in items.iter().enumerate() {
                    check_against(item_schema, item, &format!("{}[{}]", path, i), out);
                }
            }
        }
        _ => {}
    }
}

fn child_path(parent: &str, name: &str) -> String {
    if parent == ROOT {
        name.to_string()
    } else {
        format!("{}.{}", parent, name)
    }
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
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
