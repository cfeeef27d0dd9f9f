/// Cart and checkout endpoints
///
/// Each user has exactly one cart, created on first use. Totals are
/// recomputed from current product prices on every read.

use crate::{app::AppState, error::ApiResult};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use makrx_shared::{
    auth::middleware::AuthContext,
    models::{
        cart::{Cart, CartView},
        store_order::{StoreOrder, StoreOrderDetail},
    },
};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct AddItemRequest {
    pub product_id: Uuid,

    #[validate(range(min = 1, max = 1000, message = "Quantity must be between 1 and 1000"))]
    pub quantity: i32,
}

/// `quantity: 0` removes the line
#[derive(Debug, Deserialize, Validate)]
pub struct SetQuantityRequest {
    #[validate(range(min = 0, max = 1000, message = "Quantity must be between 0 and 1000"))]
    pub quantity: i32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CheckoutRequest {
    /// Stored verbatim on the order
    pub shipping_address: JsonValue,

    #[validate(length(max = 1000, message = "Notes must be at most 1000 characters"))]
    pub notes: Option<String>,
}

pub async fn get_cart(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<CartView>> {
    Ok(Json(Cart::view(&state.db, &auth.user_id, &state.config.pricing).await?))
}

/// Add to the cart, merging with an existing line
///
/// The merged quantity may not exceed stock (409).
pub async fn add_item(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<AddItemRequest>,
) -> ApiResult<Json<CartView>> {
    req.validate()?;
    Cart::add_item(&state.db, &auth.user_id, req.product_id, req.quantity).await?;
    Ok(Json(Cart::view(&state.db, &auth.user_id, &state.config.pricing).await?))
}

pub async fn set_item_quantity(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(product_id): Path<Uuid>,
    Json(req): Json<SetQuantityRequest>,
) -> ApiResult<Json<CartView>> {
    req.validate()?;
    Cart::set_quantity(&state.db, &auth.user_id, product_id, req.quantity).await?;
    Ok(Json(Cart::view(&state.db, &auth.user_id, &state.config.pricing).await?))
}

pub async fn remove_item(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(product_id): Path<Uuid>,
) -> ApiResult<Json<CartView>> {
    Cart::remove_item(&state.db, &auth.user_id, product_id).await?;
    Ok(Json(Cart::view(&state.db, &auth.user_id, &state.config.pricing).await?))
}

/// Convert the cart into an order
///
/// # Errors
///
/// - `400 Bad Request`: empty cart
/// - `409 Conflict`: a product went inactive or out of stock (named in the message)
pub async fn checkout(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<CheckoutRequest>,
) -> ApiResult<(StatusCode, Json<StoreOrderDetail>)> {
    req.validate()?;

    let detail = StoreOrder::checkout(
        &state.db,
        &auth.user_id,
        req.shipping_address,
        req.notes,
        &state.config.pricing,
    )
    .await?;

    tracing::info!(
        order_id = %detail.order.id,
        order_number = %detail.order.order_number,
        total_cents = detail.order.total_cents,
        items = detail.items.len(),
        "Checkout completed"
    );

    Ok((StatusCode::CREATED, Json(detail)))
}
