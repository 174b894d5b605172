//! Middleware for request context propagation and structured logging.
//!
//! This module provides:
//! - `RequestContext` - Request metadata handed to every route handler
//! - `request_context_middleware_fn` - Axum middleware for context extraction
//! - `request_logging_middleware` - Tower-http TraceLayer for structured logging

use axum::{
    extract::Request,
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use serde::{Deserialize, Serialize};
use tower_http::LatencyUnit;
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::trace::{DefaultOnResponse, TraceLayer};
use tracing::{Level, Span, field, info_span};
use utoipa::ToSchema;
use uuid::Uuid;

const CORRELATION_HEADER: &str = "x-correlation-id";

/// Request context propagated through the request lifecycle.
///
/// Handlers receive it as `RouteContext::request`. Without the
/// `request_context()` middleware every request gets a fresh default.
///
/// - `correlation_id` - from `X-Correlation-ID` when it is a valid UUID, else generated.
/// - `language` - from `Accept-Language`, defaults to "en".
/// - `request_id` - always generated.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RequestContext {
    pub correlation_id: Uuid,
    pub language: String,
    pub request_id: Uuid,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            language: "en".to_string(),
            request_id: Uuid::new_v4(),
        }
    }
}

impl RequestContext {
    fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            correlation_id: extract_correlation_id(headers),
            language: extract_language(headers),
            request_id: Uuid::new_v4(),
        }
    }
}

fn extract_correlation_id(headers: &HeaderMap) -> Uuid {
    headers
        .get(CORRELATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::new_v4)
}

fn extract_language(headers: &HeaderMap) -> String {
    headers
        .get("accept-language")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.split(';').next().unwrap_or(s).trim())
        .filter(|s| !s.is_empty())
        .unwrap_or("en")
        .to_string()
}

/// Axum middleware function for request context propagation.
///
/// Stores a `RequestContext` in the request extensions, where route handlers
/// pick it up, and echoes the correlation ID in `X-Correlation-ID`. When a
/// `request_logging()` span is active its `correlation_id` and `request_id`
/// fields are filled in, so every log line of the request carries them.
pub async fn request_context_middleware_fn(mut req: Request, next: Next) -> Response {
    let ctx = RequestContext::from_headers(req.headers());
    let correlation_id = ctx.correlation_id;

    let span = Span::current();
    span.record("correlation_id", field::display(ctx.correlation_id));
    span.record("request_id", field::display(ctx.request_id));

    req.extensions_mut().insert(ctx);
    let mut response = next.run(req).await;

    if let Ok(value) = HeaderValue::from_str(&correlation_id.to_string()) {
        response.headers_mut().insert(CORRELATION_HEADER, value);
    }
    response
}

/// `TraceLayer` with a per-request span and millisecond latency on completion.
pub type RequestLogLayer =
    TraceLayer<SharedClassifier<ServerErrorsAsFailures>, fn(&Request) -> Span>;

/// Structured request logging.
///
/// Each request runs inside a `request` span holding method, path and the
/// context ids; the response is logged at INFO with status and latency.
///
/// ```text
/// request{method=POST path=/users correlation_id=6f1c.. request_id=93ab..}: finished processing request latency=3 ms status=201
/// ```
pub fn request_logging_middleware() -> RequestLogLayer {
    TraceLayer::new_for_http()
        .make_span_with(request_span as fn(&Request) -> Span)
        .on_response(
            DefaultOnResponse::new()
                .level(Level::INFO)
                .latency_unit(LatencyUnit::Millis),
        )
}

fn request_span(req: &Request) -> Span {
    info_span!(
        "request",
        method = %req.method(),
        path = %req.uri().path(),
        correlation_id = field::Empty,
        request_id = field::Empty,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_extract_correlation_id_from_header() {
        let mut headers = HeaderMap::new();
        let uuid = Uuid::new_v4();
        headers.insert(
            "x-correlation-id",
            HeaderValue::from_str(&uuid.to_string()).unwrap(),
        );

        assert_eq!(extract_correlation_id(&headers), uuid);
    }

    #[test]
    fn test_extract_correlation_id_ignores_garbage() {
        let mut headers = HeaderMap::new();
        headers.insert("x-correlation-id", HeaderValue::from_static("not-a-uuid"));

        let result = extract_correlation_id(&headers);
        assert_eq!(result.get_version(), Some(uuid::Version::Random));
    }

    #[test]
    fn test_extract_language_takes_first_tag() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "accept-language",
            HeaderValue::from_static("it-IT,it;q=0.9,en;q=0.8"),
        );

        assert_eq!(extract_language(&headers), "it-IT");
    }

    #[test]
    fn test_extract_language_default() {
        assert_eq!(extract_language(&HeaderMap::new()), "en");
    }

    #[tokio::test]
    async fn test_context_echoes_correlation_id_inside_logging_span() {
        use axum::body::Body;
        use tower::ServiceExt;

        let router = axum::Router::new()
            .route("/", axum::routing::get(|| async { "ok" }))
            .layer(axum::middleware::from_fn(request_context_middleware_fn))
            .layer(request_logging_middleware());

        let id = Uuid::new_v4();
        let request = axum::http::Request::builder()
            .uri("/")
            .header(CORRELATION_HEADER, id.to_string())
            .body(Body::empty())
            .unwrap();
        let response = router.oneshot(request).await.unwrap();

        assert_eq!(response.status(), axum::http::StatusCode::OK);
        assert_eq!(response.headers()[CORRELATION_HEADER], id.to_string().as_str());
    }

    #[test]
    fn test_request_context_default() {
        let ctx = RequestContext::default();
        assert_eq!(ctx.language, "en");
        assert_ne!(ctx.correlation_id, ctx.request_id);
    }
}
