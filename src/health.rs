//! Health check endpoints for liveness probes.
//!
//! - `/health` - Basic health check
//! - `/health/live` - Liveness probe
//!
//! Both are plain typed routes, so they show up in the generated document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::AppError;
use crate::input::NoSchema;
use crate::route::RouteContext;

/// Health status enum
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum HealthStatus {
    #[serde(rename = "healthy")]
    Healthy,
    #[serde(rename = "unhealthy")]
    Unhealthy,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub timestamp: DateTime<Utc>,
}

impl HealthResponse {
    fn healthy() -> Self {
        Self {
            status: HealthStatus::Healthy,
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Utc::now(),
        }
    }
}

#[allow(clippy::unused_async)]
pub(crate) async fn health<S>(_ctx: RouteContext<S>, _input: NoSchema) -> Result<HealthResponse, AppError> {
    Ok(HealthResponse::healthy())
}

#[allow(clippy::unused_async)]
pub(crate) async fn live<S>(_ctx: RouteContext<S>, _input: NoSchema) -> Result<HealthResponse, AppError> {
    Ok(HealthResponse::healthy())
}
