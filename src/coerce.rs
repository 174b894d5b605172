//! Schema-guided coercion of string-typed request values.
//!
//! Path params and query pairs are always strings on the wire. Before they are
//! merged with the JSON body they are converted to the JSON type the target
//! schema declares, so `?page=2` deserializes into a `u32` field.

use std::collections::BTreeMap;

use serde_json::{Map, Number, Value};

/// Scalar JSON type a string value can be coerced into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scalar {
    Integer,
    Number,
    Boolean,
    Text,
}

/// Declared shape of one property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Scalar(Scalar),
    List(Scalar),
}

/// Per-property coercion table derived from an object schema.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Coercions {
    fields: BTreeMap<String, FieldKind>,
}

impl Coercions {
    /// Read the property kinds of an object schema (as serialized OpenAPI JSON).
    ///
    /// Properties that are references or compositions are treated as text.
    pub fn from_schema(schema: &Value) -> Self {
        let fields = schema
            .get("properties")
            .and_then(Value::as_object)
            .map(|properties| {
                properties
                    .iter()
                    .map(|(name, property)| (name.clone(), field_kind(property)))
                    .collect()
            })
            .unwrap_or_default();

        Self { fields }
    }

    /// Add entries from `other`; existing entries win.
    pub fn merge(&mut self, other: Coercions) {
        for (name, kind) in other.fields {
            self.fields.entry(name).or_insert(kind);
        }
    }

    pub fn kind(&self, name: &str) -> Option<FieldKind> {
        self.fields.get(name).copied()
    }

    /// Convert the raw values collected for `name` into a JSON value.
    ///
    /// Several values always produce an array. A single value produces an
    /// array only when the property is declared as a list.
    pub fn apply(&self, name: &str, raw: Vec<String>) -> Value {
        match self.kind(name) {
            Some(FieldKind::List(scalar)) => {
                Value::Array(raw.into_iter().map(|v| coerce(scalar, v)).collect())
            }
            kind => {
                let scalar = match kind {
                    Some(FieldKind::Scalar(scalar)) => scalar,
                    _ => Scalar::Text,
                };
                if raw.len() == 1 {
                    raw.into_iter()
                        .next()
                        .map(|v| coerce(scalar, v))
                        .unwrap_or(Value::Null)
                } else {
                    Value::Array(raw.into_iter().map(|v| coerce(scalar, v)).collect())
                }
            }
        }
    }

    /// Group `pairs` by key (keeping first-seen order) and coerce each group.
    pub fn apply_pairs(&self, pairs: Vec<(String, String)>) -> Map<String, Value> {
        let mut grouped: Vec<(String, Vec<String>)> = Vec::new();
        for (key, value) in pairs {
            match grouped.iter_mut().find(|(k, _)| *k == key) {
                Some((_, values)) => values.push(value),
                None => grouped.push((key, vec![value])),
            }
        }

        grouped
            .into_iter()
            .map(|(key, values)| {
                let value = self.apply(&key, values);
                (key, value)
            })
            .collect()
    }
}

fn field_kind(property: &Value) -> FieldKind {
    match primary_type(property) {
        Some("array") => {
            let items = property.get("items").map(scalar_of).unwrap_or(Scalar::Text);
            FieldKind::List(items)
        }
        _ => FieldKind::Scalar(scalar_of(property)),
    }
}

fn scalar_of(schema: &Value) -> Scalar {
    match primary_type(schema) {
        Some("integer") => Scalar::Integer,
        Some("number") => Scalar::Number,
        Some("boolean") => Scalar::Boolean,
        _ => Scalar::Text,
    }
}

/// First non-null `type`, looking through `oneOf`/`anyOf` used for nullable refs.
fn primary_type(schema: &Value) -> Option<&str> {
    match schema.get("type") {
        Some(Value::String(t)) => return Some(t.as_str()),
        Some(Value::Array(types)) => {
            return types
                .iter()
                .filter_map(Value::as_str)
                .find(|t| *t != "null");
        }
        _ => {}
    }

    ["oneOf", "anyOf", "allOf"]
        .iter()
        .filter_map(|key| schema.get(*key).and_then(Value::as_array))
        .flatten()
        .find_map(|member| primary_type(member).filter(|t| *t != "null"))
}

fn coerce(scalar: Scalar, raw: String) -> Value {
    match scalar {
        Scalar::Integer => {
            if let Ok(n) = raw.parse::<i64>() {
                Value::Number(n.into())
            } else if let Ok(n) = raw.parse::<u64>() {
                Value::Number(n.into())
            } else {
                Value::String(raw)
            }
        }
        Scalar::Number => raw
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::String(raw)),
        Scalar::Boolean => match raw.as_str() {
            "true" | "1" => Value::Bool(true),
            "false" | "0" => Value::Bool(false),
            _ => Value::String(raw),
        },
        Scalar::Text => Value::String(raw),
    }
}
