/// Service marketplace endpoints (customer side)
///
/// Every route here sits behind the `service_marketplace` flag (see
/// `app::build_router`). Quoting or ordering a service type additionally
/// requires that type's own flag, e.g. `services.laser_cutting`.
///
/// # Endpoints
///
/// - `POST /api/v1/services/quote` - Price a job without storing anything
/// - `POST /api/v1/services/orders` - Place an order at the quoted price
/// - `GET /api/v1/services/orders` - The caller's orders
/// - `GET /api/v1/services/orders/:id` - Customer, assigned provider or admin
/// - `POST /api/v1/services/orders/:id/cancel` - Customer or admin

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use makrx_shared::{
    auth::middleware::AuthContext,
    dispatch::Requester,
    models::{
        provider::Provider,
        service_order::{
            CreateServiceOrder, JobAssignment, ServiceOrder, ServiceOrderEvent, ServicePriority, ServiceType,
        },
    },
    pagination::{Page, PageParams},
    pricing::{self, Quote, QuoteRequest},
};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;
use validator::Validate;

/// Quote inputs
///
/// ```json
/// {
///   "service_type": "printing_3d",
///   "material": "PLA",
///   "quantity": 2,
///   "volume_cm3": 20.0,
///   "priority": "normal"
/// }
/// ```
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct QuoteInput {
    pub service_type: ServiceType,

    #[validate(length(min = 1, max = 50, message = "Material must be 1-50 characters"))]
    pub material: String,

    #[validate(range(min = 1, max = 1000, message = "Quantity must be between 1 and 1000"))]
    pub quantity: i32,

    #[validate(range(max = 1000000.0, message = "Volume must not exceed 1000000 cm³"))]
    pub volume_cm3: Option<f64>,

    #[validate(range(max = 100000.0, message = "Area must not exceed 100000 cm²"))]
    pub area_cm2: Option<f64>,

    #[validate(range(max = 100000.0, message = "Cut length must not exceed 100000 cm"))]
    pub cut_length_cm: Option<f64>,

    #[serde(default)]
    pub priority: ServicePriority,
}

impl QuoteInput {
    fn to_request(&self) -> QuoteRequest {
        QuoteRequest {
            service_type: self.service_type,
            material: self.material.clone(),
            quantity: self.quantity,
            volume_cm3: self.volume_cm3,
            area_cm2: self.area_cm2,
            cut_length_cm: self.cut_length_cm,
            priority: self.priority,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrderRequest {
    #[serde(flatten)]
    #[validate(nested)]
    pub quote: QuoteInput,

    /// Free-form job details (file links, tolerances, finish)
    pub specifications: Option<JsonValue>,

    #[validate(range(min = -90.0, max = 90.0, message = "Latitude must be between -90 and 90"))]
    pub delivery_latitude: Option<f64>,

    #[validate(range(min = -180.0, max = 180.0, message = "Longitude must be between -180 and 180"))]
    pub delivery_longitude: Option<f64>,

    /// Store order this job fulfils; status changes are pushed back to it
    pub store_order_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct CreateOrderResponse {
    pub order: ServiceOrder,
    pub quote: Quote,
}

#[derive(Debug, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: ServiceOrder,
    pub events: Vec<ServiceOrderEvent>,

    /// Offer history, admins only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignments: Option<Vec<JobAssignment>>,
}

pub async fn quote(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<QuoteInput>,
) -> ApiResult<Json<Quote>> {
    req.validate()?;
    state.require_feature(&auth, req.service_type.feature_key()).await?;

    Ok(Json(pricing::quote(&req.to_request())?))
}

/// Place an order
///
/// The quote is recomputed server-side and its total stored with the order.
/// The order starts `pending`; the dispatcher picks it up on its next poll.
pub async fn create_order(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<CreateOrderRequest>,
) -> ApiResult<(StatusCode, Json<CreateOrderResponse>)> {
    req.validate()?;
    state.require_feature(&auth, req.quote.service_type.feature_key()).await?;

    if req.delivery_latitude.is_some() != req.delivery_longitude.is_some() {
        return Err(ApiError::invalid(
            "delivery_latitude",
            "Latitude and longitude must be given together",
        ));
    }

    let quote = pricing::quote(&req.quote.to_request())?;

    let order = ServiceOrder::create(
        &state.db,
        &auth.user_id,
        CreateServiceOrder {
            service_type: req.quote.service_type,
            material: req.quote.material,
            quantity: req.quote.quantity,
            priority: req.quote.priority,
            specifications: req.specifications.unwrap_or_else(|| serde_json::json!({})),
            quoted_total_cents: quote.total_cents,
            delivery_latitude: req.delivery_latitude,
            delivery_longitude: req.delivery_longitude,
            store_order_id: req.store_order_id,
        },
    )
    .await?;

    tracing::info!(
        order_id = %order.id,
        service_type = order.service_type.as_str(),
        total_cents = order.quoted_total_cents,
        "Service order placed"
    );

    Ok((StatusCode::CREATED, Json(CreateOrderResponse { order, quote })))
}

pub async fn list_orders(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(page): Query<PageParams>,
) -> ApiResult<Json<Page<ServiceOrder>>> {
    let pagination = page.validate()?;
    let (orders, total) = ServiceOrder::list_for_customer(&state.db, &auth.user_id, pagination).await?;
    Ok(Json(Page::new(orders, pagination, total)))
}

pub async fn get_order(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<OrderDetail>> {
    let order = ServiceOrder::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Service order"))?;

    let is_admin = auth.is_admin();
    if order.customer_id != auth.user_id && !is_admin && !is_assigned_provider(&state, &auth, &order).await? {
        return Err(ApiError::not_found("Service order"));
    }

    let events = ServiceOrderEvent::list(&state.db, id).await?;
    let assignments = if is_admin {
        Some(JobAssignment::list_for_order(&state.db, id).await?)
    } else {
        None
    };

    Ok(Json(OrderDetail {
        order,
        events,
        assignments,
    }))
}

/// Cancel an order that has not started production
///
/// Only `pending`, `assigned` and `accepted` orders can be cancelled; a
/// held provider slot is released.
pub async fn cancel_order(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ServiceOrder>> {
    let order = state
        .dispatch
        .cancel(
            id,
            Requester {
                user_id: &auth.user_id,
                is_admin: auth.is_admin(),
            },
        )
        .await?;

    Ok(Json(order))
}

async fn is_assigned_provider(state: &AppState, auth: &AuthContext, order: &ServiceOrder) -> ApiResult<bool> {
    let Some(provider_id) = order.provider_id else {
        return Ok(false);
    };

    let provider = Provider::find_by_user(&state.db, &auth.user_id).await?;
    Ok(provider.is_some_and(|p| p.id == provider_id))
}
