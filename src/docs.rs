//! OpenAPI document assembly.
//!
//! Operations are derived from each route's input and response schemas;
//! named object schemas land in `components.schemas` and are referenced.

use std::collections::BTreeMap;

use axum::http::StatusCode;
use serde_json::Value;
use tracing::warn;
use utoipa::openapi::path::{Operation, OperationBuilder, Parameter, ParameterBuilder, ParameterIn, PathItem};
use utoipa::openapi::request_body::RequestBodyBuilder;
use utoipa::openapi::tag::TagBuilder;
use utoipa::openapi::{
    Components, ContentBuilder, Deprecated, Info, InfoBuilder, OpenApi, OpenApiBuilder, Paths, Ref, RefOr,
    Required, ResponseBuilder, Schema, Tag,
};
use utoipa::{PartialSchema, ToSchema};

use crate::error::{AppError, ErrorResponse};
use crate::route::{Method, RouteSpec};

const JSON: &str = "application/json";

/// Serialized form of a type's schema, used for introspection.
pub fn schema_json<T: PartialSchema>() -> Value {
    serde_json::to_value(<T as PartialSchema>::schema()).unwrap_or(Value::Null)
}

/// Parameters and body of one operation, as described by its input schema.
///
/// `path` and `query` are object schemas whose properties become parameters.
#[derive(Default, Clone)]
pub struct RequestShape {
    pub path: Option<Value>,
    pub query: Option<Value>,
    pub body: Option<RefOr<Schema>>,
}

/// Collects component schemas, detecting same-name/different-shape conflicts.
#[derive(Default)]
pub struct SchemaRegistry {
    schemas: BTreeMap<String, RefOr<Schema>>,
    conflicts: Vec<String>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` and everything it refers to.
    ///
    /// Named objects are stored as components and returned as a `$ref`;
    /// anything else (arrays, primitives, enums) is returned inline.
    pub fn register<T: ToSchema>(&mut self) -> RefOr<Schema> {
        self.register_nested::<T>();

        let schema = <T as PartialSchema>::schema();
        if is_named_object(&schema_json::<T>()) {
            let name = T::name().into_owned();
            self.insert(name.clone(), schema);
            RefOr::Ref(Ref::from_schema_name(name))
        } else {
            schema
        }
    }

    /// Register only the schemas `T` refers to.
    pub fn register_nested<T: ToSchema>(&mut self) {
        let mut nested = Vec::new();
        T::schemas(&mut nested);
        for (name, schema) in nested {
            self.insert(name, schema);
        }
    }

    /// Identical re-registrations are no-ops; differing ones are recorded as conflicts.
    pub fn insert(&mut self, name: String, schema: RefOr<Schema>) {
        match self.schemas.get(&name) {
            Some(existing) => {
                if !same_schema(existing, &schema) && !self.conflicts.contains(&name) {
                    warn!("schema '{}' registered twice with different definitions", name);
                    self.conflicts.push(name);
                }
            }
            None => {
                self.schemas.insert(name, schema);
            }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.schemas.contains_key(name)
    }

    pub fn conflicts(&self) -> &[String] {
        &self.conflicts
    }
}

fn same_schema(a: &RefOr<Schema>, b: &RefOr<Schema>) -> bool {
    serde_json::to_value(a).ok() == serde_json::to_value(b).ok()
}

fn is_named_object(schema: &Value) -> bool {
    schema.get("type").and_then(Value::as_str) == Some("object")
        && schema
            .get("properties")
            .and_then(Value::as_object)
            .is_some_and(|p| !p.is_empty())
}

/// Inputs for building one operation.
pub(crate) struct OperationDoc<'a> {
    pub method: Method,
    pub path: &'a str,
    pub path_params: &'a [String],
    pub spec: &'a RouteSpec,
    pub shape: RequestShape,
    pub response: Option<RefOr<Schema>>,
    pub status: StatusCode,
}

/// Build the operation object for one route.
pub(crate) fn operation(doc: OperationDoc<'_>, registry: &mut SchemaRegistry) -> Operation {
    let OperationDoc {
        method,
        path,
        path_params,
        spec,
        shape,
        response,
        status,
    } = doc;

    let mut parameters = Vec::new();
    let documented: Vec<String> = shape
        .path
        .as_ref()
        .map(|schema| property_names(schema))
        .unwrap_or_default();

    if let Some(schema) = &shape.path {
        parameters.extend(
            parameters_from(schema, ParameterIn::Path)
                .into_iter()
                .filter(|(name, _)| path_params.contains(name))
                .map(|(_, p)| p),
        );
    }
    // placeholders the path schema does not describe are plain strings
    for name in path_params.iter().filter(|n| !documented.contains(n)) {
        parameters.push(
            ParameterBuilder::new()
                .name(name)
                .parameter_in(ParameterIn::Path)
                .required(Required::True)
                .schema(Some(String::schema()))
                .build(),
        );
    }
    if let Some(schema) = &shape.query {
        parameters.extend(parameters_from(schema, ParameterIn::Query).into_iter().map(|(_, p)| p));
    }

    let operation_id = spec
        .operation_id
        .clone()
        .unwrap_or_else(|| crate::path::operation_id(method.as_str(), path));

    let success = match response {
        Some(schema) => ResponseBuilder::new()
            .description(status.canonical_reason().unwrap_or("Success"))
            .content(JSON, ContentBuilder::new().schema(Some(schema)).build())
            .build(),
        None => ResponseBuilder::new()
            .description(status.canonical_reason().unwrap_or("Success"))
            .build(),
    };

    let error_schema = registry.register::<ErrorResponse>();
    let error_response = |description: &str| {
        ResponseBuilder::new()
            .description(description)
            .content(JSON, ContentBuilder::new().schema(Some(error_schema.clone())).build())
            .build()
    };

    let mut builder = OperationBuilder::new()
        .summary(Some(spec.summary_text()))
        .description(Some(spec.description.clone()))
        .operation_id(Some(operation_id))
        .response(status.as_str(), success)
        .response("400", error_response("Request validation failed"))
        .response("500", error_response("Internal server error"));

    if !spec.tags.is_empty() {
        builder = builder.tags(Some(spec.tags.clone()));
    }
    if !parameters.is_empty() {
        builder = builder.parameters(Some(parameters));
    }
    if let Some(body) = shape.body {
        builder = builder.request_body(Some(
            RequestBodyBuilder::new()
                .content(JSON, ContentBuilder::new().schema(Some(body)).build())
                .required(Some(Required::True))
                .build(),
        ));
    }
    if spec.deprecated {
        builder = builder.deprecated(Some(Deprecated::True));
    }

    builder.build()
}

fn property_names(schema: &Value) -> Vec<String> {
    schema
        .get("properties")
        .and_then(Value::as_object)
        .map(|p| p.keys().cloned().collect())
        .unwrap_or_default()
}

/// One parameter per property of an object schema.
fn parameters_from(schema: &Value, location: ParameterIn) -> Vec<(String, Parameter)> {
    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return Vec::new();
    };
    let required: Vec<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|r| r.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    let is_path = matches!(location, ParameterIn::Path);

    properties
        .iter()
        .map(|(name, property)| {
            let description = property
                .get("description")
                .and_then(Value::as_str)
                .map(str::to_string);
            let schema: Option<RefOr<Schema>> = serde_json::from_value(property.clone()).ok();
            let required = if is_path || required.contains(&name.as_str()) {
                Required::True
            } else {
                Required::False
            };

            let parameter = ParameterBuilder::new()
                .name(name)
                .parameter_in(location.clone())
                .required(required)
                .description(description)
                .schema(schema)
                .build();
            (name.clone(), parameter)
        })
        .collect()
}

/// Accumulates operations into one OpenAPI document.
pub(crate) struct DocBuilder {
    pub(crate) info: Info,
    pub(crate) tags: Vec<Tag>,
    pub(crate) paths: Paths,
    pub(crate) registry: SchemaRegistry,
}

impl Default for DocBuilder {
    fn default() -> Self {
        Self {
            info: InfoBuilder::new().title("API").version("0.1.0").build(),
            tags: Vec::new(),
            paths: Paths::new(),
            registry: SchemaRegistry::new(),
        }
    }
}

impl DocBuilder {
    pub(crate) fn add_tag(&mut self, name: &str, description: Option<String>) {
        match self.tags.iter_mut().find(|t| t.name == name) {
            Some(tag) => {
                if description.is_some() {
                    tag.description = description;
                }
            }
            None => self
                .tags
                .push(TagBuilder::new().name(name).description(description).build()),
        }
    }

    /// Add an operation; several methods on one path share a path item.
    ///
    /// Duplicate method/path pairs are rejected by `SchemaApp::route` first.
    pub(crate) fn add_operation(&mut self, method: Method, path: &str, operation: Operation) {
        match self.paths.paths.get_mut(path) {
            Some(item) => {
                let slot = match method {
                    Method::Get => &mut item.get,
                    Method::Put => &mut item.put,
                    Method::Post => &mut item.post,
                    Method::Delete => &mut item.delete,
                    Method::Patch => &mut item.patch,
                };
                debug_assert!(slot.is_none(), "{method} {path} documented twice");
                *slot = Some(operation);
            }
            None => {
                self.paths
                    .paths
                    .insert(path.to_string(), PathItem::new(method.http_method(), operation));
            }
        }
    }

    pub(crate) fn build(&self) -> crate::Result<OpenApi> {
        if let Some(name) = self.registry.conflicts().first() {
            return Err(AppError::Route(format!(
                "schema conflict for '{name}': defined differently by multiple routes"
            )));
        }

        let mut components = Components::new();
        for (name, schema) in &self.registry.schemas {
            components.schemas.insert(name.clone(), schema.clone());
        }

        let mut builder = OpenApiBuilder::new()
            .info(self.info.clone())
            .paths(self.paths.clone())
            .components(Some(components));
        if !self.tags.is_empty() {
            builder = builder.tags(Some(self.tags.clone()));
        }

        Ok(builder.build())
    }
}
