/// Admin dispatch endpoints
///
/// - `GET /api/v1/dispatch/orders/:id/candidates` - Ranking preview, no side effects
/// - `POST /api/v1/dispatch/orders/:id` - Dispatch a pending order now
///
/// Both require the `admin` realm role.

use crate::{app::AppState, error::ApiResult};
use axum::{
    extract::{Path, State},
    Extension, Json,
};
use makrx_shared::{
    auth::{authorization::require_admin, middleware::AuthContext},
    dispatch::{DispatchOutcome, MatchResult},
};
use uuid::Uuid;

pub async fn preview_candidates(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<MatchResult>> {
    require_admin(&auth)?;
    Ok(Json(state.dispatch.preview(id).await?))
}

/// Dispatch immediately, bypassing `next_dispatch_at`
///
/// A failed attempt still counts toward the retry schedule and answers 409
/// with the rejection summary.
pub async fn dispatch_now(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<DispatchOutcome>> {
    require_admin(&auth)?;

    let outcome = state.dispatch.dispatch_order(id).await?;

    tracing::info!(
        order_id = %id,
        provider_id = %outcome.matched.provider_id,
        score = outcome.matched.score.total,
        dispatched_by = %auth.user_id,
        "Manual dispatch"
    );

    Ok(Json(outcome))
}
