/// Makerspace and membership endpoints
///
/// # Endpoints
///
/// - `POST /api/v1/makerspaces` - Create a makerspace (realm admin)
/// - `GET /api/v1/makerspaces` - Makerspaces the caller belongs to
/// - `GET /api/v1/makerspaces/:id` - Get one (viewer+)
/// - `PUT /api/v1/makerspaces/:id` - Update (admin+)
/// - `GET|POST /api/v1/makerspaces/:id/members` - List (viewer+) / add (admin+)
/// - `PUT|DELETE /api/v1/makerspaces/:id/members/:user_id` - Change role / remove (admin+)

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use makrx_shared::{
    auth::{
        authorization::{check_role, require_permission, require_realm_role, ResourcePermission},
        middleware::AuthContext,
        roles,
    },
    models::makerspace::{CreateMakerspace, Makerspace, MakerspaceMember, MemberRole, UpdateMakerspace},
};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateMakerspaceRequest {
    /// URL-safe identifier, unique across the platform
    #[validate(length(min = 2, max = 64, message = "Slug must be 2-64 characters"))]
    pub slug: String,

    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: String,

    pub description: Option<String>,
    pub location: Option<String>,

    /// IANA zone name, defaults to `Asia/Kolkata`
    pub timezone: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateMakerspaceRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub timezone: Option<String>,
    pub settings: Option<JsonValue>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddMemberRequest {
    #[validate(length(min = 1, message = "user_id is required"))]
    pub user_id: String,
    pub role: MemberRole,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMemberRequest {
    pub role: MemberRole,
}

/// Create a makerspace
///
/// The caller becomes its first `owner`.
///
/// # Errors
///
/// - `403 Forbidden`: caller lacks the `admin` realm role
/// - `409 Conflict`: slug already taken
/// - `422 Unprocessable Entity`: validation failed
pub async fn create_makerspace(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<CreateMakerspaceRequest>,
) -> ApiResult<(StatusCode, Json<Makerspace>)> {
    require_realm_role(&auth, &[roles::ADMIN])?;
    req.validate()?;

    let makerspace = Makerspace::create(
        &state.db,
        CreateMakerspace {
            slug: req.slug,
            name: req.name,
            description: req.description,
            location: req.location,
            timezone: req.timezone,
        },
        &auth.user_id,
    )
    .await?;

    tracing::info!(makerspace_id = %makerspace.id, slug = %makerspace.slug, "Makerspace created");

    Ok((StatusCode::CREATED, Json(makerspace)))
}

pub async fn list_makerspaces(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<Vec<Makerspace>>> {
    let makerspaces = Makerspace::list_for_user(&state.db, &auth.user_id).await?;
    Ok(Json(makerspaces))
}

pub async fn get_makerspace(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Makerspace>> {
    require_permission(&state.db, id, &auth, ResourcePermission::Read).await?;

    let makerspace = Makerspace::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Makerspace"))?;

    Ok(Json(makerspace))
}

pub async fn update_makerspace(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateMakerspaceRequest>,
) -> ApiResult<Json<Makerspace>> {
    require_permission(&state.db, id, &auth, ResourcePermission::Manage).await?;
    req.validate()?;

    let makerspace = Makerspace::update(
        &state.db,
        id,
        UpdateMakerspace {
            name: req.name,
            description: req.description,
            location: req.location,
            timezone: req.timezone,
            settings: req.settings,
        },
    )
    .await?
    .ok_or_else(|| ApiError::not_found("Makerspace"))?;

    Ok(Json(makerspace))
}

pub async fn list_members(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<MakerspaceMember>>> {
    require_permission(&state.db, id, &auth, ResourcePermission::Read).await?;
    Ok(Json(MakerspaceMember::list(&state.db, id).await?))
}

/// Add a member
///
/// Only owners may add another owner. An existing membership is a 409.
pub async fn add_member(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(req): Json<AddMemberRequest>,
) -> ApiResult<(StatusCode, Json<MakerspaceMember>)> {
    let caller_role = require_permission(&state.db, id, &auth, ResourcePermission::Manage).await?;
    req.validate()?;

    if req.role == MemberRole::Owner {
        check_role(caller_role, MemberRole::Owner)?;
    }

    let member = MakerspaceMember::add(&state.db, id, &req.user_id, req.role).await?;

    tracing::info!(makerspace_id = %id, user_id = %member.user_id, role = member.role.as_str(), "Member added");

    Ok((StatusCode::CREATED, Json(member)))
}

/// Change a member's role
///
/// Granting or revoking `owner` requires the caller to be an owner, and the
/// last owner cannot be demoted.
pub async fn update_member(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path((id, user_id)): Path<(Uuid, String)>,
    Json(req): Json<UpdateMemberRequest>,
) -> ApiResult<Json<MakerspaceMember>> {
    let caller_role = require_permission(&state.db, id, &auth, ResourcePermission::Manage).await?;

    let current = MakerspaceMember::get_role(&state.db, id, &user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Member"))?;

    if req.role == MemberRole::Owner || current == MemberRole::Owner {
        check_role(caller_role, MemberRole::Owner)?;
    }

    let member = MakerspaceMember::update_role(&state.db, id, &user_id, req.role).await?;

    Ok(Json(member))
}

pub async fn remove_member(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path((id, user_id)): Path<(Uuid, String)>,
) -> ApiResult<StatusCode> {
    let caller_role = require_permission(&state.db, id, &auth, ResourcePermission::Manage).await?;

    let current = MakerspaceMember::get_role(&state.db, id, &user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Member"))?;

    if current == MemberRole::Owner {
        check_role(caller_role, MemberRole::Owner)?;
    }

    MakerspaceMember::remove(&state.db, id, &user_id).await?;

    tracing::info!(makerspace_id = %id, user_id = %user_id, "Member removed");

    Ok(StatusCode::NO_CONTENT)
}
