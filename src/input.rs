//! Request input: merging the request sources into one validated value.
//!
//! A route declares its input either as one schema type (the merged object is
//! deserialized into it) or as [`Parts`] with separate path, query and body
//! schemas (each is read from the same merged object). In both cases the
//! handler only runs once deserialization and `validator` rules have passed.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use utoipa::ToSchema;
use utoipa::openapi::{RefOr, Schema};
use validator::Validate;

use crate::coerce::Coercions;
use crate::docs::{RequestShape, SchemaRegistry, schema_json};
use crate::route::Method;
use crate::validation::ValidationReport;

/// Placeholder for "no schema": a route without input, or an empty slot of [`Parts`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoSchema;

/// Split request input: path params, query params and JSON body.
///
/// Unused slots are [`NoSchema`]:
///
/// ```ignore
/// app.put("/users/:id", "Replace a user", |ctx, input: Parts<UserId, NoSchema, UserBody>| async move {
///     update(input.params.id, input.body).await
/// })
/// ```
#[derive(Debug, Clone)]
pub struct Parts<P = NoSchema, Q = NoSchema, B = NoSchema> {
    pub params: P,
    pub query: Q,
    pub body: B,
}

/// One slot of [`Parts`].
pub trait SchemaPart: Sized + Send + 'static {
    /// Serialized schema, `None` for [`NoSchema`].
    fn schema_value() -> Option<Value>;

    fn extract(merged: &Map<String, Value>) -> Result<Self, ValidationReport>;

    /// Register the schema and return how a body of this type is referenced.
    fn register(registry: &mut SchemaRegistry) -> Option<RefOr<Schema>>;

    /// Register only the schemas this one refers to; used for parameter slots.
    fn register_nested(registry: &mut SchemaRegistry);
}

impl<T> SchemaPart for T
where
    T: DeserializeOwned + Validate + ToSchema + Send + 'static,
{
    fn schema_value() -> Option<Value> {
        Some(schema_json::<T>())
    }

    fn extract(merged: &Map<String, Value>) -> Result<Self, ValidationReport> {
        deserialize_validated(merged.clone())
    }

    fn register(registry: &mut SchemaRegistry) -> Option<RefOr<Schema>> {
        Some(registry.register::<T>())
    }

    fn register_nested(registry: &mut SchemaRegistry) {
        registry.register_nested::<T>();
    }
}

impl SchemaPart for NoSchema {
    fn schema_value() -> Option<Value> {
        None
    }

    fn extract(_merged: &Map<String, Value>) -> Result<Self, ValidationReport> {
        Ok(NoSchema)
    }

    fn register(_registry: &mut SchemaRegistry) -> Option<RefOr<Schema>> {
        None
    }

    fn register_nested(_registry: &mut SchemaRegistry) {}
}

/// The complete input of a route.
pub trait RequestSchema: Sized + Send + 'static {
    /// How string path/query values are typed before merging.
    fn coercions() -> Coercions;

    fn from_merged(merged: Map<String, Value>) -> Result<Self, ValidationReport>;

    /// Describe parameters and body for the OpenAPI operation.
    fn request_shape(method: Method, path_params: &[String], registry: &mut SchemaRegistry)
    -> RequestShape;
}

impl<T> RequestSchema for T
where
    T: DeserializeOwned + Validate + ToSchema + Send + 'static,
{
    fn coercions() -> Coercions {
        Coercions::from_schema(&schema_json::<T>())
    }

    fn from_merged(merged: Map<String, Value>) -> Result<Self, ValidationReport> {
        deserialize_validated(merged)
    }

    fn request_shape(
        method: Method,
        path_params: &[String],
        registry: &mut SchemaRegistry,
    ) -> RequestShape {
        let schema = schema_json::<T>();
        registry.register_nested::<T>();

        let (path, rest) = split_properties(&schema, path_params);

        if !method.has_body() {
            return RequestShape {
                path,
                query: rest,
                body: None,
            };
        }

        let body = match (&path, rest) {
            // nothing taken by the path, so the body is the named schema itself
            (None, Some(_)) => Some(registry.register::<T>()),
            (Some(_), Some(rest)) => serde_json::from_value(rest).ok(),
            (_, None) => None,
        };

        RequestShape {
            path,
            query: None,
            body,
        }
    }
}

impl RequestSchema for NoSchema {
    fn coercions() -> Coercions {
        Coercions::default()
    }

    fn from_merged(_merged: Map<String, Value>) -> Result<Self, ValidationReport> {
        Ok(NoSchema)
    }

    fn request_shape(
        _method: Method,
        _path_params: &[String],
        _registry: &mut SchemaRegistry,
    ) -> RequestShape {
        RequestShape::default()
    }
}

impl<P, Q, B> RequestSchema for Parts<P, Q, B>
where
    P: SchemaPart,
    Q: SchemaPart,
    B: SchemaPart,
{
    fn coercions() -> Coercions {
        let mut coercions = Coercions::default();
        for schema in [P::schema_value(), Q::schema_value(), B::schema_value()].into_iter().flatten() {
            coercions.merge(Coercions::from_schema(&schema));
        }
        coercions
    }

    fn from_merged(merged: Map<String, Value>) -> Result<Self, ValidationReport> {
        let params = P::extract(&merged);
        let query = Q::extract(&merged);
        let body = B::extract(&merged);

        match (params, query, body) {
            (Ok(params), Ok(query), Ok(body)) => Ok(Parts {
                params,
                query,
                body,
            }),
            (params, query, body) => {
                let mut report = ValidationReport::new();
                for failed in [params.err(), query.err(), body.err()].into_iter().flatten() {
                    report.extend(failed);
                }
                Err(report)
            }
        }
    }

    fn request_shape(
        _method: Method,
        _path_params: &[String],
        registry: &mut SchemaRegistry,
    ) -> RequestShape {
        P::register_nested(registry);
        Q::register_nested(registry);
        RequestShape {
            path: P::schema_value(),
            query: Q::schema_value(),
            body: B::register(registry),
        }
    }
}

/// Combine body, query and path into one object.
///
/// Later sources overwrite earlier keys: body, then query, then path params.
pub fn merge(
    path: Vec<(String, String)>,
    query: Vec<(String, String)>,
    body: &[u8],
    coercions: &Coercions,
) -> Result<Map<String, Value>, ValidationReport> {
    let mut merged = parse_body(body)?;
    merged.extend(coercions.apply_pairs(query));
    merged.extend(coercions.apply_pairs(path));
    Ok(merged)
}

fn parse_body(body: &[u8]) -> Result<Map<String, Value>, ValidationReport> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }

    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(Value::Null) => Ok(Map::new()),
        Ok(_) => Err(ValidationReport::single("body", "must be a JSON object")),
        Err(err) => Err(ValidationReport::single(
            "body",
            format!("invalid JSON: {err}"),
        )),
    }
}

fn deserialize_validated<T>(merged: Map<String, Value>) -> Result<T, ValidationReport>
where
    T: DeserializeOwned + Validate,
{
    let value: T = serde_path_to_error::deserialize(Value::Object(merged))
        .map_err(ValidationReport::from_deserialize)?;
    value.validate().map_err(ValidationReport::from)?;
    Ok(value)
}

/// Split an object schema into the path-param subset and the remainder.
///
/// Either side is `None` when it would have no properties.
fn split_properties(schema: &Value, path_params: &[String]) -> (Option<Value>, Option<Value>) {
    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return (None, None);
    };
    let required: Vec<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|r| r.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let (path, rest): (Map<String, Value>, Map<String, Value>) = properties
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .partition(|(name, _)| path_params.contains(name));

    let object = |props: Map<String, Value>| -> Option<Value> {
        if props.is_empty() {
            return None;
        }
        let required: Vec<Value> = required
            .iter()
            .filter(|name| props.contains_key(**name))
            .map(|name| Value::String(name.to_string()))
            .collect();

        let mut object = Map::new();
        object.insert("type".into(), Value::String("object".into()));
        object.insert("properties".into(), Value::Object(props));
        if !required.is_empty() {
            object.insert("required".into(), Value::Array(required));
        }
        Some(Value::Object(object))
    };

    (object(path), object(rest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, Validate, ToSchema)]
    struct UserId {
        id: u64,
    }

    #[derive(Debug, Deserialize, Validate, ToSchema)]
    struct Paging {
        #[validate(range(min = 1, max = 100))]
        limit: Option<u32>,
    }

    #[derive(Debug, Deserialize, Validate, ToSchema)]
    struct Rename {
        #[validate(length(min = 1))]
        name: String,
    }

    #[derive(Debug, Deserialize, Validate, ToSchema)]
    struct RenameUser {
        id: u64,
        #[validate(length(min = 1))]
        name: String,
    }

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_merge_precedence_path_wins() {
        let merged = merge(
            pairs(&[("id", "7")]),
            pairs(&[("id", "8"), ("limit", "5")]),
            br#"{"id": 9, "name": "x"}"#,
            &RenameUser::coercions(),
        )
        .unwrap();
        assert_eq!(merged["id"], json!(7));
        assert_eq!(merged["name"], json!("x"));
        assert_eq!(merged["limit"], json!("5"));
    }

    #[test]
    fn test_merge_rejects_non_object_body() {
        let report = merge(vec![], vec![], b"[1,2]", &Coercions::default()).unwrap_err();
        assert_eq!(report.errors()[0].field, "body");
        assert_eq!(report.errors()[0].message, "must be a JSON object");

        let report = merge(vec![], vec![], b"{oops", &Coercions::default()).unwrap_err();
        assert!(report.errors()[0].message.starts_with("invalid JSON"));
    }

    #[test]
    fn test_merge_empty_body_is_empty_object() {
        assert!(merge(vec![], vec![], b"  ", &Coercions::default()).unwrap().is_empty());
        assert!(merge(vec![], vec![], b"null", &Coercions::default()).unwrap().is_empty());
    }

    #[test]
    fn test_single_schema_from_merged() {
        let merged = merge(
            pairs(&[("id", "3")]),
            vec![],
            br#"{"name":"ann"}"#,
            &RenameUser::coercions(),
        )
        .unwrap();
        let input = RenameUser::from_merged(merged).unwrap();
        assert_eq!(input.id, 3);
        assert_eq!(input.name, "ann");
    }

    #[test]
    fn test_parts_collect_errors_from_every_slot() {
        type Input = Parts<UserId, Paging, Rename>;
        let merged = merge(
            vec![],
            pairs(&[("limit", "500")]),
            br#"{"name": ""}"#,
            &Input::coercions(),
        )
        .unwrap();

        let report = Input::from_merged(merged).unwrap_err();
        let fields: Vec<&str> = report.errors().iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["id", "limit", "name"]);
    }

    #[test]
    fn test_parts_success() {
        type Input = Parts<UserId, NoSchema, Rename>;
        let merged = merge(
            pairs(&[("id", "12")]),
            vec![],
            br#"{"name": "bea"}"#,
            &Input::coercions(),
        )
        .unwrap();

        let input = Input::from_merged(merged).unwrap();
        assert_eq!(input.params.id, 12);
        assert_eq!(input.query, NoSchema);
        assert_eq!(input.body.name, "bea");
    }

    #[test]
    fn test_split_properties() {
        let schema = json!({
            "type": "object",
            "properties": {"id": {"type": "integer"}, "name": {"type": "string"}},
            "required": ["id", "name"]
        });
        let (path, rest) = split_properties(&schema, &["id".to_string()]);
        assert_eq!(path.unwrap()["required"], json!(["id"]));
        let rest = rest.unwrap();
        assert!(rest["properties"].get("id").is_none());
        assert_eq!(rest["required"], json!(["name"]));
    }
}
