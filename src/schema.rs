//! Schema registry: closed JSON Schemas for every flow record and the validation step that
//! turns a raw JSON value into a typed record.

use schemars::{generate::SchemaGenerator, JsonSchema};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};

use crate::{
    error::{Boundary, FlowError, Result},
    flows::{Chat, Diagnose, Flow, GenerateConditions},
};

/// Keywords the Gemini response-schema subset rejects.
const UNSUPPORTED_KEYWORDS: &[&str] = &[
    "$schema",
    "$id",
    "$comment",
    "title",
    "default",
    "examples",
    "readOnly",
    "writeOnly",
    "additionalProperties",
];

const MAX_REF_DEPTH: usize = 32;

/// A record type with a generated, closed JSON Schema.
///
/// Blanket-implemented for every `JsonSchema + Serialize + DeserializeOwned` type.
pub trait FlowSchema: JsonSchema + Serialize + DeserializeOwned {
    /// Full JSON Schema (draft 2020-12) used for local validation.
    fn flow_schema() -> Value {
        let mut schema: Value = SchemaGenerator::default()
            .into_root_schema_for::<Self>()
            .into();
        close_objects(&mut schema);
        schema
    }

    /// Schema reduced to what the Gemini `response_schema` field accepts.
    fn gemini_schema() -> Value {
        let mut schema = Self::flow_schema();
        clean_schema_for_gemini(&mut schema);
        schema
    }
}

impl<T> FlowSchema for T where T: JsonSchema + Serialize + DeserializeOwned {}

/// One field of a record, as declared by its schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    pub kind: String,
    pub required: bool,
    pub description: Option<String>,
}

/// Input and output schema of one flow.
#[derive(Debug, Clone)]
pub struct FlowDescriptor {
    pub name: &'static str,
    pub input_schema: Value,
    pub output_schema: Value,
}

impl FlowDescriptor {
    pub fn of<F: Flow>() -> Self {
        Self {
            name: F::NAME,
            input_schema: F::Input::flow_schema(),
            output_schema: F::Output::flow_schema(),
        }
    }
}

/// Every flow known to the crate, in a stable order.
pub fn registry() -> Vec<FlowDescriptor> {
    vec![
        FlowDescriptor::of::<Diagnose>(),
        FlowDescriptor::of::<GenerateConditions>(),
        FlowDescriptor::of::<Chat>(),
    ]
}

/// List the top-level fields of `T` with their type, requiredness and description.
pub fn fields<T: FlowSchema>() -> Vec<FieldSpec> {
    let schema = T::flow_schema();
    let required: Vec<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return Vec::new();
    };

    properties
        .iter()
        .map(|(name, prop)| FieldSpec {
            name: name.clone(),
            kind: describe_kind(prop),
            required: required.contains(&name.as_str()),
            description: prop
                .get("description")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
        .collect()
}

fn describe_kind(prop: &Value) -> String {
    if let Some(reference) = prop.get("$ref").and_then(Value::as_str) {
        return reference.rsplit('/').next().unwrap_or(reference).to_string();
    }
    match prop.get("type") {
        Some(Value::String(kind)) if kind == "array" => {
            let item = prop.get("items").map(describe_kind).unwrap_or_default();
            format!("array<{item}>")
        }
        Some(Value::String(kind)) => kind.clone(),
        Some(Value::Array(kinds)) => kinds
            .iter()
            .filter_map(Value::as_str)
            .filter(|k| *k != "null")
            .collect::<Vec<_>>()
            .join("|"),
        _ => prop
            .get("anyOf")
            .or_else(|| prop.get("oneOf"))
            .and_then(Value::as_array)
            .and_then(|variants| {
                variants
                    .iter()
                    .find(|v| v.get("type").and_then(Value::as_str) != Some("null"))
            })
            .map(describe_kind)
            .unwrap_or_else(|| "any".to_string()),
    }
}

/// Compile the JSON Schema of `T` for validation.
pub fn compile_validator<T: FlowSchema>() -> Result<jsonschema::Validator> {
    let schema = T::flow_schema();
    jsonschema::validator_for(&schema).map_err(|e| {
        FlowError::Config(format!(
            "schema for {} does not compile: {e}",
            std::any::type_name::<T>()
        ))
    })
}

/// Validate `value` against the schema of `T`, then deserialize it.
///
/// Every violation is reported, each as `"<instance path>: <message>"`. Nothing is coerced:
/// a string where a boolean is declared is an error. `raw_text` is the text the value came
/// from and is only used for error reporting on the output boundary.
pub fn validate_value<T: FlowSchema>(
    boundary: Boundary,
    value: &Value,
    raw_text: &str,
) -> Result<T> {
    let validator = compile_validator::<T>()?;
    let issues: Vec<String> = validator
        .iter_errors(value)
        .map(|err| format!("{}: {}", err.instance_path(), err))
        .collect();

    if !issues.is_empty() {
        let issues = issues.join("; ");
        return Err(match boundary {
            Boundary::Input => FlowError::invalid_input(issues),
            Boundary::Output => FlowError::schema_violation(issues, raw_text),
        });
    }

    serde_json::from_value::<T>(value.clone()).map_err(|e| match boundary {
        Boundary::Input => FlowError::invalid_input(e.to_string()),
        Boundary::Output => FlowError::parse_error(e, raw_text),
    })
}

/// Serialize a request record and check it against its own schema.
///
/// Returns the JSON form, which is what templates render against.
pub fn validate_input<T: FlowSchema>(input: &T) -> Result<Value> {
    let value = serde_json::to_value(input)?;
    let validator = compile_validator::<T>()?;
    let issues: Vec<String> = validator
        .iter_errors(&value)
        .map(|err| format!("{}: {}", err.instance_path(), err))
        .collect();
    if issues.is_empty() {
        Ok(value)
    } else {
        Err(FlowError::invalid_input(issues.join("; ")))
    }
}

/// Mark every object schema that declares properties as closed.
pub fn close_objects(schema: &mut Value) {
    match schema {
        Value::Object(map) => {
            if map.contains_key("properties") && !map.contains_key("additionalProperties") {
                map.insert("additionalProperties".to_string(), Value::Bool(false));
            }
            for child in map.values_mut() {
                close_objects(child);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(close_objects),
        _ => {}
    }
}

/// Reduce a generated schema to the subset accepted by Gemini.
///
/// Local `$ref`s are inlined, `[T, "null"]` type unions become `nullable`, and keywords the
/// API rejects are dropped.
pub fn clean_schema_for_gemini(schema: &mut Value) {
    let defs = match schema.as_object_mut() {
        Some(root) => {
            let mut defs = Map::new();
            for key in ["$defs", "definitions"] {
                if let Some(Value::Object(found)) = root.remove(key) {
                    defs.extend(found);
                }
            }
            defs
        }
        None => Map::new(),
    };
    inline_refs(schema, &defs, 0);
    clean_node(schema);
}

fn inline_refs(node: &mut Value, defs: &Map<String, Value>, depth: usize) {
    if depth > MAX_REF_DEPTH {
        return;
    }
    match node {
        Value::Object(map) => {
            let target = map
                .get("$ref")
                .and_then(Value::as_str)
                .and_then(|r| r.rsplit('/').next())
                .and_then(|name| defs.get(name))
                .cloned();
            if let Some(mut resolved) = target {
                map.remove("$ref");
                inline_refs(&mut resolved, defs, depth + 1);
                if let Value::Object(resolved) = resolved {
                    for (key, value) in resolved {
                        // Keep the referencing site's own description.
                        map.entry(key).or_insert(value);
                    }
                }
            }
            for child in map.values_mut() {
                inline_refs(child, defs, depth);
            }
        }
        Value::Array(items) => {
            for item in items {
                inline_refs(item, defs, depth);
            }
        }
        _ => {}
    }
}

fn clean_node(node: &mut Value) {
    match node {
        Value::Object(map) => {
            // Unions first: collapsing a nullable record merges in keys that still need stripping.
            collapse_nullable_type(map);
            collapse_nullable_any_of(map);

            map.retain(|key, _| {
                !UNSUPPORTED_KEYWORDS.contains(&key.as_str()) && !key.starts_with("x-")
            });

            let keep_format = map.get("type").and_then(Value::as_str) == Some("string")
                && matches!(
                    map.get("format").and_then(Value::as_str),
                    Some("date-time" | "enum")
                );
            if !keep_format {
                map.remove("format");
            }

            for (key, child) in map.iter_mut() {
                match (key.as_str(), child) {
                    // Keys of `properties` are field names, not keywords.
                    ("properties", Value::Object(fields)) => {
                        fields.values_mut().for_each(clean_node)
                    }
                    (_, child) => clean_node(child),
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(clean_node),
        _ => {}
    }
}

/// `"type": ["object", "null"]` becomes `"type": "object", "nullable": true`.
fn collapse_nullable_type(map: &mut Map<String, Value>) {
    let Some(Value::Array(kinds)) = map.get("type") else {
        return;
    };
    let non_null: Vec<Value> = kinds
        .iter()
        .filter(|k| k.as_str() != Some("null"))
        .cloned()
        .collect();
    if non_null.len() < kinds.len() {
        map.insert("nullable".to_string(), Value::Bool(true));
    }
    if let [single] = non_null.as_slice() {
        map.insert("type".to_string(), single.clone());
    }
}

/// `anyOf: [X, {"type": "null"}]` becomes X with `nullable: true`.
fn collapse_nullable_any_of(map: &mut Map<String, Value>) {
    let Some(Value::Array(variants)) = map.get("anyOf") else {
        return;
    };
    let mut non_null: Vec<Value> = variants
        .iter()
        .filter(|v| v.get("type").and_then(Value::as_str) != Some("null"))
        .cloned()
        .collect();
    if non_null.len() == variants.len() {
        return;
    }
    map.insert("nullable".to_string(), Value::Bool(true));
    match non_null.as_mut_slice() {
        [Value::Object(single)] => {
            map.remove("anyOf");
            for (key, value) in std::mem::take(single) {
                map.entry(key).or_insert(value);
            }
        }
        _ => {
            map.insert("anyOf".to_string(), Value::Array(non_null));
        }
    }
}
