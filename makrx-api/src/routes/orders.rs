/// Store order endpoints
///
/// - `GET /api/v1/orders` - The caller's orders, newest first
/// - `GET /api/v1/orders/:id` - Owner or admin; includes items and history
/// - `POST /api/v1/orders/:id/cancel` - Owner; restocks items
/// - `PUT /api/v1/admin/orders/:id/status` - Admin status change
///
/// Orders that belong to another user answer 404.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use makrx_shared::{
    auth::{authorization::require_admin, middleware::AuthContext},
    models::{
        notification::Notification,
        store_order::{StoreOrder, StoreOrderDetail, StoreOrderStatus},
    },
    notifications::NotificationKind,
    pagination::{Page, PageParams},
};
use serde::Deserialize;
use std::collections::HashMap;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Default, Deserialize, Validate)]
pub struct CancelOrderRequest {
    #[validate(length(max = 500, message = "Reason must be at most 500 characters"))]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateStatusRequest {
    pub status: StoreOrderStatus,

    #[validate(length(max = 500, message = "Note must be at most 500 characters"))]
    pub note: Option<String>,
}

pub async fn list_orders(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(page): Query<PageParams>,
) -> ApiResult<Json<Page<StoreOrder>>> {
    let pagination = page.validate()?;
    let (orders, total) = StoreOrder::list_for_user(&state.db, &auth.user_id, pagination).await?;
    Ok(Json(Page::new(orders, pagination, total)))
}

pub async fn get_order(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<StoreOrderDetail>> {
    let detail = StoreOrder::detail(&state.db, id)
        .await?
        .filter(|d| d.order.user_id == auth.user_id || auth.is_admin())
        .ok_or_else(|| ApiError::not_found("Order"))?;

    Ok(Json(detail))
}

/// Cancel one of the caller's orders
///
/// Only `pending` and `confirmed` orders can be cancelled (409 otherwise).
/// The body is optional.
pub async fn cancel_order(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    body: Option<Json<CancelOrderRequest>>,
) -> ApiResult<Json<StoreOrder>> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    req.validate()?;

    let note = req.reason.as_deref().unwrap_or("Cancelled by customer");
    let order = StoreOrder::transition(
        &state.db,
        id,
        StoreOrderStatus::Cancelled,
        Some(&auth.user_id),
        &auth.user_id,
        Some(note),
    )
    .await?;

    Ok(Json(order))
}

/// Move an order along its lifecycle (realm admin)
///
/// ```text
/// pending → confirmed → processing → shipped → delivered
/// pending | confirmed → cancelled   (restocks)
/// ```
///
/// The order's owner receives an `order_status` notification.
pub async fn update_status(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateStatusRequest>,
) -> ApiResult<Json<StoreOrder>> {
    require_admin(&auth)?;
    req.validate()?;

    let order = StoreOrder::transition(
        &state.db,
        id,
        req.status,
        None,
        &auth.user_id,
        req.note.as_deref(),
    )
    .await?;

    Notification::notify(
        &state.db,
        &order.user_id,
        NotificationKind::OrderStatus,
        HashMap::from([
            ("order_number".to_string(), order.order_number.clone()),
            ("status".to_string(), order.status.as_str().to_string()),
        ]),
    )
    .await;

    Ok(Json(order))
}
