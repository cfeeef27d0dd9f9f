/// Health check endpoints
///
/// # Endpoints
///
/// ```text
/// GET /health        liveness
/// GET /health/ready  database + store sync readiness
/// ```
///
/// Readiness answers 503 while any configured dependency is down:
///
/// ```json
/// {
///   "status": "not_ready",
///   "checks": { "database": "down", "store_sync": "up" }
/// }
/// ```

use crate::{app::AppState, error::ApiResult};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Liveness response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReadinessResponse {
    /// `ready` or `not_ready`
    pub status: String,

    /// Per-dependency `up` / `down`
    pub checks: BTreeMap<String, String>,
}

impl ReadinessResponse {
    fn from_checks(checks: BTreeMap<String, bool>) -> Self {
        let ready = checks.values().all(|up| *up);
        Self {
            status: if ready { "ready" } else { "not_ready" }.to_string(),
            checks: checks
                .into_iter()
                .map(|(name, up)| (name, if up { "up" } else { "down" }.to_string()))
                .collect(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status == "ready"
    }
}

/// Liveness: the process is up and serving requests
pub async fn health_check() -> ApiResult<Json<HealthResponse>> {
    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}

/// Readiness: database round trip plus the store sync health check
///
/// The store sync check only runs when a sync URL is configured.
pub async fn readiness(State(state): State<AppState>) -> Response {
    let mut checks = BTreeMap::new();

    let database_up = sqlx::query("SELECT 1").execute(&state.db).await.is_ok();
    checks.insert("database".to_string(), database_up);

    if let Some(result) = state.store_sync.check().await {
        if let Err(e) = &result {
            tracing::warn!(error = %e, "Store sync health check failed");
        }
        checks.insert("store_sync".to_string(), result.is_ok());
    }

    let body = ReadinessResponse::from_checks(checks);
    let status = if body.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readiness_all_up() {
        let checks = BTreeMap::from([("database".to_string(), true), ("store_sync".to_string(), true)]);
        let response = ReadinessResponse::from_checks(checks);
        assert!(response.is_ready());
        assert_eq!(response.checks["database"], "up");
    }

    #[test]
    fn test_readiness_one_down() {
        let checks = BTreeMap::from([("database".to_string(), true), ("store_sync".to_string(), false)]);
        let response = ReadinessResponse::from_checks(checks);
        assert!(!response.is_ready());
        assert_eq!(response.status, "not_ready");
        assert_eq!(response.checks["store_sync"], "down");
    }

    #[tokio::test]
    async fn test_liveness_reports_version() {
        let Json(body) = health_check().await.unwrap();
        assert_eq!(body.status, "healthy");
        assert_eq!(body.version, env!("CARGO_PKG_VERSION"));
    }
}
