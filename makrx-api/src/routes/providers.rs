/// Fabrication provider endpoints
///
/// A provider profile belongs to exactly one user. Job actions resolve the
/// caller's profile first; an order assigned to someone else answers 404.
///
/// # Job lifecycle (provider side)
///
/// ```text
/// assigned ──accept──> accepted ──start──> in_progress ──complete──> completed
///    └──decline──> pending (provider excluded from re-dispatch)
/// ```

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
    auth::{authorization::require_realm_role, middleware::AuthContext, roles},
    models::{
        provider::{CreateProvider, Provider, UpdateProvider},
        service_order::{ServiceOrder, ServiceOrderStatus, ServiceType},
    },
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterProviderRequest {
    #[validate(length(min = 1, max = 200, message = "Business name must be 1-200 characters"))]
    pub business_name: String,

    #[validate(length(min = 1, message = "At least one service is required"))]
    pub services: Vec<ServiceType>,

    #[validate(length(min = 1, message = "At least one material is required"))]
    pub materials: Vec<String>,

    #[validate(range(min = -90.0, max = 90.0, message = "Latitude must be between -90 and 90"))]
    pub latitude: Option<f64>,

    #[validate(range(min = -180.0, max = 180.0, message = "Longitude must be between -180 and 180"))]
    pub longitude: Option<f64>,

    #[validate(range(min = 0.0, message = "Radius must not be negative"))]
    pub service_radius_km: Option<f64>,

    #[validate(range(min = 1, max = 100, message = "Concurrent jobs must be 1-100"))]
    pub max_concurrent_jobs: Option<i32>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProviderRequest {
    #[validate(length(min = 1, max = 200, message = "Business name must be 1-200 characters"))]
    pub business_name: Option<String>,
    #[validate(length(min = 1, message = "At least one service is required"))]
    pub services: Option<Vec<ServiceType>>,
    #[validate(length(min = 1, message = "At least one material is required"))]
    pub materials: Option<Vec<String>>,
    #[validate(range(min = -90.0, max = 90.0, message = "Latitude must be between -90 and 90"))]
    pub latitude: Option<f64>,
    #[validate(range(min = -180.0, max = 180.0, message = "Longitude must be between -180 and 180"))]
    pub longitude: Option<f64>,
    #[validate(range(min = 0.0, message = "Radius must not be negative"))]
    pub service_radius_km: Option<f64>,
    #[validate(range(min = 1, max = 100, message = "Concurrent jobs must be 1-100"))]
    pub max_concurrent_jobs: Option<i32>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct JobsQuery {
    pub status: Option<ServiceOrderStatus>,
}

/// Register the caller as a provider
///
/// Requires the `service_provider` or `admin` realm role. A second profile
/// for the same user is a 409.
pub async fn register_provider(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<RegisterProviderRequest>,
) -> ApiResult<(StatusCode, Json<Provider>)> {
    require_realm_role(&auth, &[roles::SERVICE_PROVIDER, roles::ADMIN])?;
    req.validate()?;

    if req.latitude.is_some() != req.longitude.is_some() {
        return Err(ApiError::invalid("latitude", "Latitude and longitude must be given together"));
    }

    let provider = Provider::create(
        &state.db,
        &auth.user_id,
        CreateProvider {
            business_name: req.business_name,
            services: req.services,
            materials: req.materials,
            latitude: req.latitude,
            longitude: req.longitude,
            service_radius_km: req.service_radius_km,
            max_concurrent_jobs: req.max_concurrent_jobs,
        },
    )
    .await?;

    tracing::info!(provider_id = %provider.id, user_id = %auth.user_id, "Provider registered");

    Ok((StatusCode::CREATED, Json(provider)))
}

pub async fn get_my_provider(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<Provider>> {
    Ok(Json(my_provider(&state, &auth).await?))
}

pub async fn update_my_provider(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<UpdateProviderRequest>,
) -> ApiResult<Json<Provider>> {
    let provider = my_provider(&state, &auth).await?;
    req.validate()?;

    let updated = Provider::update(
        &state.db,
        provider.id,
        UpdateProvider {
            business_name: req.business_name,
            services: req.services,
            materials: req.materials,
            latitude: req.latitude,
            longitude: req.longitude,
            service_radius_km: req.service_radius_km,
            max_concurrent_jobs: req.max_concurrent_jobs,
            is_active: req.is_active,
        },
    )
    .await?
    .ok_or_else(|| ApiError::not_found("Provider"))?;

    Ok(Json(updated))
}

/// Orders currently or previously held by the caller, optionally by status
pub async fn list_my_jobs(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<JobsQuery>,
) -> ApiResult<Json<Vec<ServiceOrder>>> {
    let provider = my_provider(&state, &auth).await?;
    Ok(Json(ServiceOrder::list_for_provider(&state.db, provider.id, query.status).await?))
}

/// Accept an offered job; the response time feeds the provider's average
pub async fn accept_job(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(order_id): Path<Uuid>,
) -> ApiResult<Json<ServiceOrder>> {
    let provider = my_provider(&state, &auth).await?;
    Ok(Json(state.dispatch.accept(order_id, &provider).await?))
}

pub async fn decline_job(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(order_id): Path<Uuid>,
) -> ApiResult<Json<ServiceOrder>> {
    let provider = my_provider(&state, &auth).await?;
    Ok(Json(state.dispatch.decline(order_id, &provider).await?))
}

pub async fn start_job(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(order_id): Path<Uuid>,
) -> ApiResult<Json<ServiceOrder>> {
    let provider = my_provider(&state, &auth).await?;
    Ok(Json(state.dispatch.start(order_id, &provider).await?))
}

pub async fn complete_job(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(order_id): Path<Uuid>,
) -> ApiResult<Json<ServiceOrder>> {
    let provider = my_provider(&state, &auth).await?;
    Ok(Json(state.dispatch.complete(order_id, &provider).await?))
}

async fn my_provider(state: &AppState, auth: &AuthContext) -> ApiResult<Provider> {
    Provider::find_by_user(&state.db, &auth.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Provider profile"))
}
