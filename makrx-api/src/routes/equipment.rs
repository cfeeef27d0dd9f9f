/// Equipment and reservation endpoints
///
/// Equipment lives under `/api/v1/makerspaces/:id/equipment` (read viewer+,
/// write admin+). Reservations are booked by members and cancelled by the
/// reserver or a makerspace admin.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use makrx_shared::{
    auth::{
        authorization::{require_permission, ResourcePermission},
        middleware::AuthContext,
    },
    models::{
        equipment::{
            CreateEquipment, CreateReservation, Equipment, EquipmentStatus, Reservation, UpdateEquipment,
        },
        notification::Notification,
    },
    notifications::NotificationKind,
};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateEquipmentRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: String,

    /// e.g. `printer_3d`, `laser_cutter`, `cnc_mill`
    #[validate(length(min = 1, max = 100, message = "Equipment type must be 1-100 characters"))]
    pub equipment_type: String,

    pub status: Option<EquipmentStatus>,
    pub location: Option<String>,

    #[validate(range(min = 0, message = "Hourly rate must not be negative"))]
    #[serde(default)]
    pub hourly_rate_cents: i64,

    #[serde(default)]
    pub requires_certification: bool,

    pub specifications: Option<JsonValue>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateEquipmentRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: Option<String>,
    pub equipment_type: Option<String>,
    pub status: Option<EquipmentStatus>,
    pub location: Option<String>,
    #[validate(range(min = 0, message = "Hourly rate must not be negative"))]
    pub hourly_rate_cents: Option<i64>,
    pub requires_certification: Option<bool>,
    pub specifications: Option<JsonValue>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EquipmentQuery {
    pub status: Option<EquipmentStatus>,
    pub equipment_type: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateReservationRequest {
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,

    #[validate(length(max = 500, message = "Purpose must be at most 500 characters"))]
    pub purpose: Option<String>,
}

/// `?from&to` window for reservation listings
#[derive(Debug, Default, Deserialize)]
pub struct WindowQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

pub async fn list_equipment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(makerspace_id): Path<Uuid>,
    Query(query): Query<EquipmentQuery>,
) -> ApiResult<Json<Vec<Equipment>>> {
    require_permission(&state.db, makerspace_id, &auth, ResourcePermission::Read).await?;

    let equipment = Equipment::list(
        &state.db,
        makerspace_id,
        query.status,
        query.equipment_type.as_deref(),
    )
    .await?;

    Ok(Json(equipment))
}

pub async fn create_equipment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(makerspace_id): Path<Uuid>,
    Json(req): Json<CreateEquipmentRequest>,
) -> ApiResult<(StatusCode, Json<Equipment>)> {
    require_permission(&state.db, makerspace_id, &auth, ResourcePermission::Manage).await?;
    req.validate()?;

    let equipment = Equipment::create(
        &state.db,
        makerspace_id,
        CreateEquipment {
            name: req.name,
            equipment_type: req.equipment_type,
            status: req.status,
            location: req.location,
            hourly_rate_cents: req.hourly_rate_cents,
            requires_certification: req.requires_certification,
            specifications: req.specifications,
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(equipment)))
}

pub async fn get_equipment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path((makerspace_id, equipment_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<Equipment>> {
    require_permission(&state.db, makerspace_id, &auth, ResourcePermission::Read).await?;

    let equipment = Equipment::find(&state.db, makerspace_id, equipment_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Equipment"))?;

    Ok(Json(equipment))
}

pub async fn update_equipment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path((makerspace_id, equipment_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<UpdateEquipmentRequest>,
) -> ApiResult<Json<Equipment>> {
    require_permission(&state.db, makerspace_id, &auth, ResourcePermission::Manage).await?;
    req.validate()?;

    let equipment = Equipment::update(
        &state.db,
        makerspace_id,
        equipment_id,
        UpdateEquipment {
            name: req.name,
            equipment_type: req.equipment_type,
            status: req.status,
            location: req.location,
            hourly_rate_cents: req.hourly_rate_cents,
            requires_certification: req.requires_certification,
            specifications: req.specifications,
        },
    )
    .await?
    .ok_or_else(|| ApiError::not_found("Equipment"))?;

    Ok(Json(equipment))
}

pub async fn delete_equipment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path((makerspace_id, equipment_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    require_permission(&state.db, makerspace_id, &auth, ResourcePermission::Manage).await?;

    if !Equipment::delete(&state.db, makerspace_id, equipment_id).await? {
        return Err(ApiError::not_found("Equipment"));
    }

    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_reservations(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path((makerspace_id, equipment_id)): Path<(Uuid, Uuid)>,
    Query(window): Query<WindowQuery>,
) -> ApiResult<Json<Vec<Reservation>>> {
    require_permission(&state.db, makerspace_id, &auth, ResourcePermission::Read).await?;

    Equipment::find(&state.db, makerspace_id, equipment_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Equipment"))?;

    let reservations = Reservation::list_confirmed(&state.db, equipment_id, window.from, window.to).await?;
    Ok(Json(reservations))
}

/// Book equipment (member+)
///
/// # Errors
///
/// - `409 Conflict`: equipment under maintenance/offline, or the window
///   overlaps a confirmed reservation
/// - `422 Unprocessable Entity`: window reversed, longer than 12 hours, or
///   starting in the past
pub async fn create_reservation(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path((makerspace_id, equipment_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<CreateReservationRequest>,
) -> ApiResult<(StatusCode, Json<Reservation>)> {
    require_permission(&state.db, makerspace_id, &auth, ResourcePermission::Write).await?;
    req.validate()?;

    let (reservation, equipment) = Reservation::create(
        &state.db,
        makerspace_id,
        equipment_id,
        &auth.user_id,
        CreateReservation {
            starts_at: req.starts_at,
            ends_at: req.ends_at,
            purpose: req.purpose,
        },
    )
    .await?;

    Notification::notify(
        &state.db,
        &reservation.user_id,
        NotificationKind::ReservationConfirmed,
        reservation_vars(&reservation, &equipment),
    )
    .await;

    Ok((StatusCode::CREATED, Json(reservation)))
}

/// Cancel a confirmed reservation
///
/// The reserver may cancel their own booking; anyone else needs admin+.
pub async fn cancel_reservation(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path((makerspace_id, reservation_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<Reservation>> {
    require_permission(&state.db, makerspace_id, &auth, ResourcePermission::Read).await?;

    let existing = Reservation::find(&state.db, makerspace_id, reservation_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Reservation"))?;

    if existing.user_id != auth.user_id {
        require_permission(&state.db, makerspace_id, &auth, ResourcePermission::Manage).await?;
    }

    let reservation = Reservation::cancel(&state.db, makerspace_id, reservation_id).await?;

    if let Some(equipment) = Equipment::find(&state.db, makerspace_id, reservation.equipment_id).await? {
        Notification::notify(
            &state.db,
            &reservation.user_id,
            NotificationKind::ReservationCancelled,
            reservation_vars(&reservation, &equipment),
        )
        .await;
    }

    Ok(Json(reservation))
}

fn reservation_vars(reservation: &Reservation, equipment: &Equipment) -> HashMap<String, String> {
    HashMap::from([
        ("equipment_name".to_string(), equipment.name.clone()),
        ("starts_at".to_string(), reservation.starts_at.format("%Y-%m-%d %H:%M UTC").to_string()),
        ("ends_at".to_string(), reservation.ends_at.format("%Y-%m-%d %H:%M UTC").to_string()),
    ])
}
