/// Project endpoints
///
/// Projects a caller cannot see answer 404 rather than 403, so private
/// project ids do not leak.

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
    auth::{
        authorization::{require_permission, AuthzError, ResourcePermission},
        middleware::AuthContext,
    },
    models::project::{
        CollaboratorRole, CreateProject, Project, ProjectAccess, ProjectCollaborator, ProjectStatus,
        ProjectVisibility, UpdateProject,
    },
    pagination::PageParams,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateProjectRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: String,

    pub description: Option<String>,

    /// Defaults to `private`
    pub visibility: Option<ProjectVisibility>,

    /// Caller must be a member+ of this makerspace
    pub makerspace_id: Option<Uuid>,

    #[validate(length(max = 20, message = "At most 20 tags"))]
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProjectRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<ProjectStatus>,
    pub visibility: Option<ProjectVisibility>,
    #[validate(length(max = 20, message = "At most 20 tags"))]
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddCollaboratorRequest {
    #[validate(length(min = 1, message = "user_id is required"))]
    pub user_id: String,
    pub role: CollaboratorRole,
}

pub async fn create_project(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<CreateProjectRequest>,
) -> ApiResult<(StatusCode, Json<Project>)> {
    req.validate()?;

    if let Some(makerspace_id) = req.makerspace_id {
        require_permission(&state.db, makerspace_id, &auth, ResourcePermission::Write).await?;
    }

    let project = Project::create(
        &state.db,
        &auth.user_id,
        CreateProject {
            name: req.name,
            description: req.description,
            visibility: req.visibility,
            makerspace_id: req.makerspace_id,
            tags: req.tags,
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(project)))
}

/// Projects visible to the caller, newest first
pub async fn list_projects(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(page): Query<PageParams>,
) -> ApiResult<Json<Vec<Project>>> {
    let pagination = page.validate()?;
    Ok(Json(Project::list_visible(&state.db, &auth.user_id, pagination).await?))
}

pub async fn get_project(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Project>> {
    let (project, _) = load_with_access(&state, &auth, id).await?;
    Ok(Json(project))
}

/// Update a project (owner or editor)
pub async fn update_project(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateProjectRequest>,
) -> ApiResult<Json<Project>> {
    let (_, access) = load_with_access(&state, &auth, id).await?;
    if !access.can_edit {
        return Err(AuthzError::NotAuthorized.into());
    }
    req.validate()?;

    let project = Project::update(
        &state.db,
        id,
        UpdateProject {
            name: req.name,
            description: req.description,
            status: req.status,
            visibility: req.visibility,
            tags: req.tags,
        },
    )
    .await?
    .ok_or_else(|| ApiError::not_found("Project"))?;

    Ok(Json(project))
}

pub async fn delete_project(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    require_owner(&state, &auth, id).await?;

    if !Project::delete(&state.db, id).await? {
        return Err(ApiError::not_found("Project"));
    }

    tracing::info!(project_id = %id, "Project deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_collaborators(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<ProjectCollaborator>>> {
    load_with_access(&state, &auth, id).await?;
    Ok(Json(ProjectCollaborator::list(&state.db, id).await?))
}

pub async fn add_collaborator(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(req): Json<AddCollaboratorRequest>,
) -> ApiResult<(StatusCode, Json<ProjectCollaborator>)> {
    let project = require_owner(&state, &auth, id).await?;
    req.validate()?;

    if req.user_id == project.owner_id {
        return Err(ApiError::Conflict("The owner cannot be added as a collaborator".to_string()));
    }

    let collaborator = ProjectCollaborator::add(&state.db, id, &req.user_id, req.role).await?;
    Ok((StatusCode::CREATED, Json(collaborator)))
}

pub async fn remove_collaborator(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path((id, user_id)): Path<(Uuid, String)>,
) -> ApiResult<StatusCode> {
    require_owner(&state, &auth, id).await?;

    if !ProjectCollaborator::remove(&state.db, id, &user_id).await? {
        return Err(ApiError::not_found("Collaborator"));
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Loads a project the caller may view; super admins see everything
async fn load_with_access(state: &AppState, auth: &AuthContext, id: Uuid) -> ApiResult<(Project, ProjectAccess)> {
    let (project, mut access) = Project::access_for(&state.db, id, &auth.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Project"))?;

    if auth.is_super_admin() {
        access.can_view = true;
        access.can_edit = true;
    }

    if !access.can_view {
        return Err(ApiError::not_found("Project"));
    }

    Ok((project, access))
}

async fn require_owner(state: &AppState, auth: &AuthContext, id: Uuid) -> ApiResult<Project> {
    let (project, access) = load_with_access(state, auth, id).await?;
    if !access.is_owner && !auth.is_super_admin() {
        return Err(AuthzError::NotAuthorized.into());
    }
    Ok(project)
}
