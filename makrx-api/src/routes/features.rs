/// Feature flag endpoints
///
/// - `GET /api/v1/features` - Flags evaluated for the caller
/// - `GET /api/v1/admin/features` - Raw flag rows (realm admin)
/// - `PUT /api/v1/admin/features/:key` - Upsert a flag (realm admin)

use crate::{app::AppState, error::ApiResult};
use axum::{
    extract::{Path, State},
    Extension, Json,
};
use makrx_shared::{
    auth::{authorization::require_admin, middleware::AuthContext},
    models::feature_flag::{FeatureFlag, UpsertFeatureFlag},
};
use serde::Deserialize;
use std::collections::HashMap;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct UpsertFlagRequest {
    pub enabled: bool,

    #[validate(range(min = 0, max = 100, message = "Rollout must be between 0 and 100"))]
    #[serde(default = "full_rollout")]
    pub rollout_percentage: i32,

    /// Empty means every role
    #[serde(default)]
    pub allowed_roles: Vec<String>,

    pub description: Option<String>,
}

fn full_rollout() -> i32 {
    100
}

/// Evaluated `{key: bool}` map for the caller
pub async fn my_features(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<HashMap<String, bool>>> {
    let flags = state.flags.evaluate_all(&state.db, &auth.user_id, &auth.roles).await?;
    Ok(Json(flags))
}

pub async fn list_flags(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<Vec<FeatureFlag>>> {
    require_admin(&auth)?;
    Ok(Json(FeatureFlag::list_all(&state.db).await?))
}

/// Create or replace a flag and drop the cached flag set
pub async fn upsert_flag(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(key): Path<String>,
    Json(req): Json<UpsertFlagRequest>,
) -> ApiResult<Json<FeatureFlag>> {
    require_admin(&auth)?;
    req.validate()?;

    let flag = FeatureFlag::upsert(
        &state.db,
        &key,
        UpsertFeatureFlag {
            enabled: req.enabled,
            rollout_percentage: req.rollout_percentage,
            allowed_roles: req.allowed_roles,
            description: req.description,
        },
    )
    .await?;

    state.flags.invalidate().await;

    tracing::info!(
        key = %flag.key,
        enabled = flag.enabled,
        rollout = flag.rollout_percentage,
        updated_by = %auth.user_id,
        "Feature flag updated"
    );

    Ok(Json(flag))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rollout_defaults_to_full() {
        let req: UpsertFlagRequest = serde_json::from_str(r#"{"enabled":true}"#).unwrap();
        assert_eq!(req.rollout_percentage, 100);
        assert!(req.allowed_roles.is_empty());
    }

    #[test]
    fn test_rollout_out_of_range() {
        let req: UpsertFlagRequest =
            serde_json::from_str(r#"{"enabled":true,"rollout_percentage":101}"#).unwrap();
        assert!(req.validate().is_err());
    }
}
