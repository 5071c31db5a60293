//! Tool parameter schemas.
//!
//! Each handler derives [`JsonSchema`] on its input struct. [`input_schema`] renders
//! that struct as the JSON Schema advertised in the catalog, and [`validate`] checks
//! a raw argument bag against the same document before serde decodes it. Validation
//! collects every violation instead of stopping at the first one.

use std::fmt;

use schemars::generate::SchemaSettings;
use schemars::JsonSchema;
use serde::Serialize;
use serde_json::{Map, Value};

/// One failed constraint. `field` is a dotted path such as `tasks[0].text`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    pub field: String,
    pub constraint: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, constraint: impl Into<String>) -> Self {
        Self { field: field.into(), constraint: constraint.into() }
    }
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.constraint)
    }
}

/// Self-contained object schema for `T`, without `$schema`, `title` or `$defs`.
pub fn input_schema<T: JsonSchema>() -> Value {
    let generator = SchemaSettings::draft2020_12()
        .with(|settings| settings.inline_subschemas = true)
        .into_generator();
    let mut schema = generator.into_root_schema_for::<T>().to_value();
    if let Some(object) = schema.as_object_mut() {
        object.remove("$schema");
        object.remove("title");
        object.entry("type").or_insert_with(|| Value::from("object"));
        object.entry("properties").or_insert_with(|| Value::Object(Map::new()));
    }
    schema
}

/// Checks `args` against `schema` and returns them ready for serde.
///
/// `null` is treated as an empty argument object and `null` properties as absent.
/// Advertised defaults are filled in and whole floats such as `5.0` are normalised
/// for integer properties. Unknown fields pass through untouched.
pub fn validate(schema: &Value, args: &Value) -> Result<Map<String, Value>, Vec<FieldViolation>> {
    let mut params = match args {
        Value::Null => Map::new(),
        Value::Object(object) => object.clone(),
        _ => return Err(vec![FieldViolation::new("arguments", "must be an object")]),
    };

    let mut violations = Vec::new();
    check_object(schema, &mut params, "", &mut violations);
    if violations.is_empty() {
        Ok(params)
    } else {
        Err(violations)
    }
}

fn path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

fn is_required(schema: &Value, name: &str) -> bool {
    schema
        .get("required")
        .and_then(Value::as_array)
        .is_some_and(|required| required.iter().any(|entry| entry.as_str() == Some(name)))
}

fn check_object(schema: &Value, object: &mut Map<String, Value>, prefix: &str, violations: &mut Vec<FieldViolation>) {
    object.retain(|_, value| !value.is_null());
    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return;
    };

    for (name, property) in properties {
        let field = path(prefix, name);
        if let Some(value) = object.get_mut(name) {
            check_value(property, value, &field, violations);
        } else if let Some(default) = property.get("default").filter(|default| !default.is_null()) {
            object.insert(name.clone(), default.clone());
        } else if is_required(schema, name) {
            violations.push(FieldViolation::new(field, "is required"));
        }
    }
}

fn check_value(schema: &Value, value: &mut Value, field: &str, violations: &mut Vec<FieldViolation>) {
    let Some(keywords) = schema.as_object() else {
        if schema == &Value::Bool(false) {
            violations.push(FieldViolation::new(field, "is not allowed"));
        }
        return;
    };

    if let Some(branches) = keywords.get("anyOf").or_else(|| keywords.get("oneOf")).and_then(Value::as_array) {
        check_branches(branches, value, field, violations);
    }

    if let Some(options) = keywords.get("enum").and_then(Value::as_array) {
        if !options.contains(value) {
            violations.push(FieldViolation::new(field, format!("must be one of {}", list_options(options))));
            return;
        }
    }

    let types = types_of(keywords);
    if types.is_empty() {
        return;
    }
    let Some(kind) = types.iter().copied().find(|kind| accepts(kind, value)) else {
        violations.push(FieldViolation::new(field, type_constraint(&types)));
        return;
    };

    match kind {
        "integer" | "number" => check_number(keywords, value, field, violations),
        "string" => check_string(keywords, value, field, violations),
        "array" => check_array(keywords, value, field, violations),
        "object" => {
            if let Some(object) = value.as_object_mut() {
                check_object(schema, object, field, violations);
            }
        }
        _ => {}
    }
}

/// `anyOf`: the first branch that accepts the value wins, otherwise the first
/// non-null branch explains the failure.
fn check_branches(branches: &[Value], value: &mut Value, field: &str, violations: &mut Vec<FieldViolation>) {
    if value.is_null() && branches.iter().any(is_null_schema) {
        return;
    }
    let mut first_failure = None;
    for branch in branches.iter().filter(|branch| !is_null_schema(branch)) {
        let mut candidate = value.clone();
        let mut found = Vec::new();
        check_value(branch, &mut candidate, field, &mut found);
        if found.is_empty() {
            *value = candidate;
            return;
        }
        first_failure.get_or_insert(found);
    }
    violations.extend(first_failure.unwrap_or_default());
}

fn is_null_schema(schema: &Value) -> bool {
    schema.get("type").and_then(Value::as_str) == Some("null")
}

fn types_of(keywords: &Map<String, Value>) -> Vec<&str> {
    let kinds: Vec<&str> = match keywords.get("type") {
        Some(Value::String(kind)) => vec![kind.as_str()],
        Some(Value::Array(kinds)) => kinds.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    };
    kinds.into_iter().filter(|kind| *kind != "null").collect()
}

/// Whether `value` has JSON type `kind`. Whole floats are rewritten as integers.
fn accepts(kind: &str, value: &mut Value) -> bool {
    match kind {
        "integer" => {
            if value.is_i64() || value.is_u64() {
                return true;
            }
            match value.as_f64().filter(|n| n.fract() == 0.0 && n.abs() < 9.0e15) {
                Some(whole) => {
                    *value = Value::from(whole as i64);
                    true
                }
                None => false,
            }
        }
        "number" => value.is_number(),
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        _ => false,
    }
}

fn type_constraint(types: &[&str]) -> String {
    let names: Vec<&str> = types
        .iter()
        .map(|kind| match *kind {
            "integer" => "an integer",
            "number" => "a number",
            "string" => "a string",
            "boolean" => "a boolean",
            "array" => "an array",
            "object" => "an object",
            other => other,
        })
        .collect();
    format!("must be {}", names.join(" or "))
}

fn list_options(options: &[Value]) -> String {
    options
        .iter()
        .filter(|option| !option.is_null())
        .map(|option| match option {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn show(bound: f64) -> String {
    if bound.fract() == 0.0 && bound.abs() < 9.0e15 {
        (bound as i64).to_string()
    } else {
        bound.to_string()
    }
}

fn check_number(keywords: &Map<String, Value>, value: &Value, field: &str, violations: &mut Vec<FieldViolation>) {
    let Some(number) = value.as_f64() else {
        return;
    };
    let bound = |key: &str| keywords.get(key).and_then(Value::as_f64);
    if let Some(min) = bound("minimum").filter(|min| number < *min) {
        violations.push(FieldViolation::new(field, format!("must be >= {}", show(min))));
    }
    if let Some(max) = bound("maximum").filter(|max| number > *max) {
        violations.push(FieldViolation::new(field, format!("must be <= {}", show(max))));
    }
    if let Some(min) = bound("exclusiveMinimum").filter(|min| number <= *min) {
        violations.push(FieldViolation::new(field, format!("must be > {}", show(min))));
    }
    if let Some(max) = bound("exclusiveMaximum").filter(|max| number >= *max) {
        violations.push(FieldViolation::new(field, format!("must be < {}", show(max))));
    }
}

fn check_string(keywords: &Map<String, Value>, value: &Value, field: &str, violations: &mut Vec<FieldViolation>) {
    let Some(text) = value.as_str() else {
        return;
    };
    let length = text.chars().count() as u64;
    if let Some(min) = keywords.get("minLength").and_then(Value::as_u64).filter(|min| length < *min) {
        violations.push(FieldViolation::new(field, format!("must be at least {min} characters")));
    }
    if let Some(max) = keywords.get("maxLength").and_then(Value::as_u64).filter(|max| length > *max) {
        violations.push(FieldViolation::new(field, format!("must be at most {max} characters")));
    }
}

fn check_array(keywords: &Map<String, Value>, value: &mut Value, field: &str, violations: &mut Vec<FieldViolation>) {
    let Some(items) = value.as_array_mut() else {
        return;
    };
    let count = items.len() as u64;
    if let Some(min) = keywords.get("minItems").and_then(Value::as_u64).filter(|min| count < *min) {
        violations.push(FieldViolation::new(field, format!("must have at least {min} items")));
    }
    if let Some(max) = keywords.get("maxItems").and_then(Value::as_u64).filter(|max| count > *max) {
        violations.push(FieldViolation::new(field, format!("must have at most {max} items")));
    }
    if let Some(item_schema) = keywords.get("items") {
        for (index, element) in items.iter_mut().enumerate() {
            check_value(item_schema, element, &format!("{field}[{index}]"), violations);
        }
    }
}
