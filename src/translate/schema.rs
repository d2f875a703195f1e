use crate::config::MAX_SCHEMA_DEPTH;
use serde_json::{Map, Value};

/// Schema keywords the Gemini backend accepts. Everything else
/// (`additionalProperties`, `$schema`, `exclusiveMinimum`, `propertyNames`,
/// ...) is rejected upstream and must be filtered out.
const ALLOWED_KEYS: &[&str] = &[
    "type",
    "description",
    "properties",
    "required",
    "items",
    "enum",
    "format",
    "nullable",
    "minimum",
    "maximum",
    "minItems",
    "maxItems",
    "minLength",
    "maxLength",
    "pattern",
    "default",
    "example",
    "title",
    "anyOf",
    "oneOf",
];

/// Recursively reduce a JSON Schema to the keyword whitelist.
///
/// Keys directly inside a `properties` map are user-defined field names and
/// are never filtered. The operation is idempotent.
pub fn clean_schema(schema: &Value) -> Value {
    clean_at_depth(schema, 0)
}

fn clean_at_depth(schema: &Value, depth: usize) -> Value {
    let Value::Object(obj) = schema else {
        return schema.clone();
    };

    if depth >= MAX_SCHEMA_DEPTH {
        return Value::Object(Map::new());
    }

    let mut cleaned = Map::new();
    for (key, value) in obj {
        if !ALLOWED_KEYS.contains(&key.as_str()) {
            continue;
        }

        let value = match key.as_str() {
            "properties" => clean_properties(value, depth),
            "items" => clean_at_depth(value, depth + 1),
            "anyOf" | "oneOf" => clean_schema_list(value, depth),
            _ => value.clone(),
        };
        cleaned.insert(key.clone(), value);
    }

    Value::Object(cleaned)
}

fn clean_properties(properties: &Value, depth: usize) -> Value {
    let Value::Object(props) = properties else {
        return properties.clone();
    };

    let cleaned = props
        .iter()
        .map(|(name, sub)| (name.clone(), clean_at_depth(sub, depth + 1)))
        .collect::<Map<_, _>>();
    Value::Object(cleaned)
}

fn clean_schema_list(list: &Value, depth: usize) -> Value {
    let Value::Array(items) = list else {
        return list.clone();
    };

    Value::Array(
        items
            .iter()
            .map(|item| clean_at_depth(item, depth + 1))
            .collect(),
    )
}
