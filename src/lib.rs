//! # schema-axum
//!
//! Schema-first route registration for Axum services with automatic OpenAPI.
//!
//! ## Features
//!
//! - **Typed Routes**: Bind request and response schemas to a handler in one call
//! - **Merged Input**: Path params, query string and JSON body validated as one value
//! - **Uniform Errors**: `400` with a field/message list for bad input, a generic `500` otherwise
//! - **Automatic OpenAPI**: Every route documented and served at `/openapi.json`
//! - **Scalar UI**: Interactive API documentation at `/scalar` (with `scalar` feature)
//! - **Health Checks**: Liveness endpoints at `/health` and `/health/live`
//! - **Request Context**: Correlation ID, request ID and language propagation
//! - **Request Logging**: Structured logging through `tracing`
//!
//! ## Quick Start
//!
//! ```ignore
//! use schema_axum::prelude::*;
//!
//! #[derive(Deserialize, Validate, ToSchema)]
//! struct GetUser {
//!     id: u64,
//! }
//!
//! #[derive(Serialize, ToSchema)]
//! struct User {
//!     id: u64,
//!     name: String,
//! }
//!
//! async fn get_user(_ctx: RouteContext<()>, input: GetUser) -> Result<User> {
//!     Ok(User { id: input.id, name: "Ada".into() })
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     SchemaApp::new(())
//!         .info("My API", "1.0.0", "API description")
//!         .get("/users/:id", "Fetch a user", get_user)
//!         .serve("0.0.0.0:8080")
//!         .await
//! }
//! ```

mod app;
pub mod coerce;
pub mod config;
pub mod docs;
mod error;
mod health;
pub mod input;
pub mod middleware;
pub mod path;
pub mod route;
pub mod telemetry;
mod traits;
pub mod validation;

pub use app::SchemaApp;
pub use error::{AppError, ErrorResponse};
pub use traits::RouteGroup;

/// Result alias used by handlers and the builder.
pub type Result<T> = std::result::Result<T, AppError>;

pub use config::{AppConfig, ConfigLoader, DocsConfig, LogConfig, ServerConfig};
pub use health::{HealthResponse, HealthStatus};
pub use input::{NoSchema, Parts, RequestSchema, SchemaPart};
pub use middleware::{RequestContext, request_context_middleware_fn};
pub use route::{Method, NoContent, ResponseSchema, RouteContext, RouteHandler, RouteSpec};
pub use validation::{FieldError, ValidationReport};

// Re-export common dependencies
pub use axum::{
    self, Router,
    http::{HeaderMap, StatusCode},
};
pub use serde::{Deserialize, Serialize};
pub use serde_json::{self, json};
pub use tokio;
pub use tracing::{debug, error, info, instrument, warn};
pub use utoipa::{self, ToSchema, openapi::OpenApi};
pub use validator::{self, Validate};

/// Prelude for easy importing
pub mod prelude {
    pub use super::{
        AppError,
        Deserialize,
        FieldError,
        HeaderMap,
        Method,
        NoContent,
        NoSchema,
        OpenApi,
        Parts,
        RequestContext,
        Result,
        RouteContext,
        RouteGroup,
        RouteSpec,
        SchemaApp,
        Serialize,
        StatusCode,
        ToSchema,
        Validate,
        debug,
        error,
        info,
        json,
        warn,
    };
    pub use uuid::Uuid;
}
