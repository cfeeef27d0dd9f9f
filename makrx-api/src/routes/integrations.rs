/// Service-to-store integration endpoint
///
/// Receives fabrication status pushed by the services backend (see
/// `makrx_shared::integration::HttpStoreSync`) and records it on the store
/// order.
///
/// ```text
/// POST /api/v1/integrations/service-orders/status
/// Authorization: Bearer <service or admin token>
///
/// {
///   "store_order_id": "uuid",
///   "service_order_id": "uuid",
///   "status": "in_progress"
/// }
/// ```

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{extract::State, Extension, Json};
use makrx_shared::{
    auth::{authorization::require_realm_role, middleware::AuthContext, roles},
    integration::StatusUpdate,
    models::store_order::StoreOrder,
};

/// Record a service order status on its store order
///
/// Requires the `service` or `admin` realm role. Unknown store orders
/// answer 404 so the sender can log the mismatch.
pub async fn receive_service_status(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(update): Json<StatusUpdate>,
) -> ApiResult<Json<StoreOrder>> {
    require_realm_role(&auth, &[roles::SERVICE, roles::ADMIN])?;

    let order = StoreOrder::set_service_status(
        &state.db,
        update.store_order_id,
        update.service_order_id,
        update.status.as_str(),
    )
    .await?
    .ok_or_else(|| ApiError::not_found("Store order"))?;

    tracing::info!(
        store_order_id = %order.id,
        service_order_id = %update.service_order_id,
        status = update.status.as_str(),
        "Service status recorded"
    );

    Ok(Json(order))
}
