//! Route declarations and request dispatch.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::PathRejection;
use axum::extract::{FromRequest, FromRequestParts, Path, Query, Request, State};
use anyhow::anyhow;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{MethodFilter, MethodRouter};
use serde::Serialize;
use utoipa::ToSchema;
use utoipa::openapi::path::HttpMethod;
use utoipa::openapi::{RefOr, Schema};

use crate::coerce::Coercions;
use crate::docs::SchemaRegistry;
use crate::error::AppError;
use crate::input::{self, RequestSchema};
use crate::middleware::RequestContext;

const JSON: &str = "application/json";

/// HTTP verbs a route can be registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Method {
    Get,
    Put,
    Post,
    Delete,
    Patch,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Put => "PUT",
            Self::Post => "POST",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
        }
    }

    /// Whether non-path input is documented as a JSON body rather than query params.
    pub fn has_body(&self) -> bool {
        matches!(self, Self::Put | Self::Post | Self::Patch)
    }

    pub(crate) fn filter(&self) -> MethodFilter {
        match self {
            Self::Get => MethodFilter::GET,
            Self::Put => MethodFilter::PUT,
            Self::Post => MethodFilter::POST,
            Self::Delete => MethodFilter::DELETE,
            Self::Patch => MethodFilter::PATCH,
        }
    }

    pub(crate) fn http_method(&self) -> HttpMethod {
        match self {
            Self::Get => HttpMethod::Get,
            Self::Put => HttpMethod::Put,
            Self::Post => HttpMethod::Post,
            Self::Delete => HttpMethod::Delete,
            Self::Patch => HttpMethod::Patch,
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static, human facing configuration of a route.
///
/// A plain string converts into a `RouteSpec` carrying only the description:
///
/// ```ignore
/// app.get("/users/:id", "Fetch a single user", get_user)
/// ```
#[derive(Debug, Clone)]
pub struct RouteSpec {
    pub(crate) description: String,
    pub(crate) summary: Option<String>,
    pub(crate) tags: Vec<String>,
    pub(crate) operation_id: Option<String>,
    pub(crate) status: Option<StatusCode>,
    pub(crate) deprecated: bool,
}

impl RouteSpec {
    /// Start from the description shown in the document.
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            summary: None,
            tags: Vec::new(),
            operation_id: None,
            status: None,
            deprecated: false,
        }
    }

    /// Short summary; defaults to the first line of the description.
    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    /// OpenAPI tag; a route group's tag applies when none is set.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Explicit operation id, replacing the `<method>_<path>` default.
    pub fn operation_id(mut self, id: impl Into<String>) -> Self {
        self.operation_id = Some(id.into());
        self
    }

    /// Success status; defaults to `200`, or `204` for `NoContent`.
    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    /// Mark the operation deprecated in the document.
    pub fn deprecated(mut self) -> Self {
        self.deprecated = true;
        self
    }

    pub(crate) fn summary_text(&self) -> String {
        self.summary.clone().unwrap_or_else(|| {
            self.description
                .lines()
                .next()
                .unwrap_or_default()
                .trim()
                .to_string()
        })
    }
}

impl From<&str> for RouteSpec {
    fn from(description: &str) -> Self {
        Self::new(description)
    }
}

impl From<String> for RouteSpec {
    fn from(description: String) -> Self {
        Self::new(description)
    }
}

/// Everything a handler gets besides its validated input.
#[derive(Debug, Clone)]
pub struct RouteContext<S> {
    pub state: S,
    pub headers: HeaderMap,
    pub request: RequestContext,
}

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// An async route handler taking the context and the validated input.
///
/// Implemented for every `Fn(RouteContext<S>, I) -> impl Future<Output = Result<R, E>>`
/// where `E: Into<AppError>`, so both `AppError` and `anyhow::Error` work.
pub trait RouteHandler<S, I, R>: Clone + Send + Sync + 'static {
    fn call(&self, ctx: RouteContext<S>, input: I) -> BoxFuture<Result<R, AppError>>;
}

impl<F, Fut, S, I, R, E> RouteHandler<S, I, R> for F
where
    F: Fn(RouteContext<S>, I) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    R: 'static,
    E: Into<AppError> + 'static,
{
    fn call(&self, ctx: RouteContext<S>, input: I) -> BoxFuture<Result<R, AppError>> {
        let fut = (self)(ctx, input);
        Box::pin(async move { fut.await.map_err(Into::into) })
    }
}

/// Marker response for routes that answer `204 No Content`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoContent;

/// A value a handler can return, plus how it is documented.
pub trait ResponseSchema: Send + 'static {
    fn default_status() -> StatusCode {
        StatusCode::OK
    }

    /// Render the success response. Serialization failures are internal errors.
    fn respond(self, status: StatusCode) -> Result<Response, AppError>;

    /// Response body schema; `None` for empty responses.
    fn response_schema(registry: &mut SchemaRegistry) -> Option<RefOr<Schema>>;
}

impl<T> ResponseSchema for T
where
    T: Serialize + ToSchema + Send + 'static,
{
    fn respond(self, status: StatusCode) -> Result<Response, AppError> {
        let body = serde_json::to_vec(&self)
            .map_err(|err| anyhow!("failed to serialize response body: {err}"))?;
        Ok((
            status,
            [(header::CONTENT_TYPE, HeaderValue::from_static(JSON))],
            body,
        )
            .into_response())
    }

    fn response_schema(registry: &mut SchemaRegistry) -> Option<RefOr<Schema>> {
        Some(registry.register::<T>())
    }
}

impl ResponseSchema for NoContent {
    fn default_status() -> StatusCode {
        StatusCode::NO_CONTENT
    }

    fn respond(self, status: StatusCode) -> Result<Response, AppError> {
        Ok(status.into_response())
    }

    fn response_schema(_registry: &mut SchemaRegistry) -> Option<RefOr<Schema>> {
        None
    }
}

/// Raw per-request material, before merging.
pub(crate) struct RawRequest {
    pub path: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub context: RequestContext,
    pub body: Bytes,
}

/// Build the axum endpoint for one route.
pub(crate) fn endpoint<S, I, R, H>(
    router: MethodRouter<S>,
    method: Method,
    status: StatusCode,
    handler: H,
) -> MethodRouter<S>
where
    S: Clone + Send + Sync + 'static,
    I: RequestSchema,
    R: ResponseSchema,
    H: RouteHandler<S, I, R>,
{
    let coercions = Arc::new(I::coercions());

    router.on(
        method.filter(),
        move |State(state): State<S>, request: Request| {
            let handler = handler.clone();
            let coercions = Arc::clone(&coercions);
            async move {
                let raw = match collect(request, &state).await {
                    Ok(raw) => raw,
                    Err(response) => return response,
                };
                dispatch::<S, I, R, H>(handler, &coercions, status, state, raw)
                    .await
                    .unwrap_or_else(IntoResponse::into_response)
            }
        },
    )
}

/// Pull path params, query pairs, headers, context and body out of the request.
async fn collect<S>(request: Request, state: &S) -> Result<RawRequest, Response>
where
    S: Clone + Send + Sync + 'static,
{
    let (mut parts, body) = request.into_parts();

    let path = match Path::<Vec<(String, String)>>::from_request_parts(&mut parts, state).await {
        Ok(Path(params)) => params,
        Err(PathRejection::MissingPathParams(_)) => Vec::new(),
        Err(rejection) => {
            return Err(AppError::invalid("path", rejection.body_text()).into_response());
        }
    };

    let query = match Query::<Vec<(String, String)>>::try_from_uri(&parts.uri) {
        Ok(Query(pairs)) => pairs,
        Err(rejection) => {
            return Err(AppError::invalid("query", rejection.body_text()).into_response());
        }
    };

    let context = parts
        .extensions
        .get::<RequestContext>()
        .cloned()
        .unwrap_or_default();
    let headers = parts.headers.clone();

    // Bytes honours DefaultBodyLimit, so read it through the extractor.
    let body = Bytes::from_request(Request::from_parts(parts, body), state)
        .await
        .map_err(IntoResponse::into_response)?;

    Ok(RawRequest {
        path,
        query,
        headers,
        context,
        body,
    })
}

/// Merge, validate, run the handler and render its result.
pub(crate) async fn dispatch<S, I, R, H>(
    handler: H,
    coercions: &Coercions,
    status: StatusCode,
    state: S,
    raw: RawRequest,
) -> Result<Response, AppError>
where
    I: RequestSchema,
    R: ResponseSchema,
    H: RouteHandler<S, I, R>,
{
    let merged = input::merge(raw.path, raw.query, &raw.body, coercions)?;
    let input = I::from_merged(merged).map_err(AppError::Validation)?;

    let ctx = RouteContext {
        state,
        headers: raw.headers,
        request: raw.context,
    };

    let value = handler.call(ctx, input).await?;
    value.respond(status)
}
