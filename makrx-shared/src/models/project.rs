/// Projects and collaborators
///
/// A project is visible to a user when any of these holds:
///
/// - it is `public`
/// - the user owns it or collaborates on it
/// - it is `makerspace`-visible and the user belongs to its makerspace

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::pagination::Pagination;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "project_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Planning,
    InProgress,
    OnHold,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "project_visibility", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ProjectVisibility {
    Private,
    Makerspace,
    Public,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "collaborator_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CollaboratorRole {
    Editor,
    Viewer,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub status: ProjectStatus,
    pub visibility: ProjectVisibility,
    pub owner_id: String,
    pub makerspace_id: Option<Uuid>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProject {
    pub name: String,
    pub description: Option<String>,
    pub visibility: Option<ProjectVisibility>,
    pub makerspace_id: Option<Uuid>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateProject {
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<ProjectStatus>,
    pub visibility: Option<ProjectVisibility>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProjectCollaborator {
    pub project_id: Uuid,
    pub user_id: String,
    pub role: CollaboratorRole,
    pub added_at: DateTime<Utc>,
}

/// What a caller may do with a project
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProjectAccess {
    pub can_view: bool,
    pub can_edit: bool,
    pub is_owner: bool,
}

impl ProjectAccess {
    /// Derives access from the caller's relationship to the project
    ///
    /// `collaborator` is the caller's collaborator role (if any) and
    /// `is_makerspace_member` whether they belong to the project's makerspace.
    pub fn resolve(
        project: &Project,
        user_id: &str,
        collaborator: Option<CollaboratorRole>,
        is_makerspace_member: bool,
    ) -> Self {
        let is_owner = project.owner_id == user_id;
        let can_edit = is_owner || collaborator == Some(CollaboratorRole::Editor);
        let can_view = is_owner
            || collaborator.is_some()
            || project.visibility == ProjectVisibility::Public
            || (project.visibility == ProjectVisibility::Makerspace && is_makerspace_member);

        Self {
            can_view,
            can_edit,
            is_owner,
        }
    }
}

const PROJECT_COLUMNS: &str =
    "id, name, description, status, visibility, owner_id, makerspace_id, tags, created_at, updated_at";

impl Project {
    pub async fn create(pool: &PgPool, owner_id: &str, data: CreateProject) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Project>(&format!(
            r#"
            INSERT INTO projects (name, description, visibility, owner_id, makerspace_id, tags)
            VALUES ($1, $2, COALESCE($3, 'private'::project_visibility), $4, $5, $6)
            RETURNING {PROJECT_COLUMNS}
            "#
        ))
        .bind(&data.name)
        .bind(&data.description)
        .bind(data.visibility)
        .bind(owner_id)
        .bind(data.makerspace_id)
        .bind(&data.tags)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Project>(&format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Projects visible to the user, most recently updated first
    pub async fn list_visible(pool: &PgPool, user_id: &str, pagination: Pagination) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Project>(
            r#"
            SELECT p.id, p.name, p.description, p.status, p.visibility, p.owner_id,
                   p.makerspace_id, p.tags, p.created_at, p.updated_at
            FROM projects p
            WHERE p.visibility = 'public'
               OR p.owner_id = $1
               OR EXISTS (
                    SELECT 1 FROM project_collaborators c
                    WHERE c.project_id = p.id AND c.user_id = $1
               )
               OR (p.visibility = 'makerspace' AND EXISTS (
                    SELECT 1 FROM makerspace_members m
                    WHERE m.makerspace_id = p.makerspace_id AND m.user_id = $1
               ))
            ORDER BY p.updated_at DESC, p.id
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(pool)
        .await
    }

    /// Loads the project with the caller's access rights
    pub async fn access_for(
        pool: &PgPool,
        id: Uuid,
        user_id: &str,
    ) -> Result<Option<(Self, ProjectAccess)>, sqlx::Error> {
        let Some(project) = Self::find_by_id(pool, id).await? else {
            return Ok(None);
        };

        let collaborator = ProjectCollaborator::role_of(pool, id, user_id).await?;

        let is_member = match project.makerspace_id {
            Some(makerspace_id) => {
                super::makerspace::MakerspaceMember::get_role(pool, makerspace_id, user_id)
                    .await?
                    .is_some()
            }
            None => false,
        };

        let access = ProjectAccess::resolve(&project, user_id, collaborator, is_member);
        Ok(Some((project, access)))
    }

    pub async fn update(pool: &PgPool, id: Uuid, data: UpdateProject) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Project>(&format!(
            r#"
            UPDATE projects
            SET name = COALESCE($2, name),
                description = COALESCE($3, description),
                status = COALESCE($4, status),
                visibility = COALESCE($5, visibility),
                tags = COALESCE($6, tags),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {PROJECT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(data.name)
        .bind(data.description)
        .bind(data.status)
        .bind(data.visibility)
        .bind(data.tags)
        .fetch_optional(pool)
        .await
    }

    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM projects WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

impl ProjectCollaborator {
    pub async fn add(
        pool: &PgPool,
        project_id: Uuid,
        user_id: &str,
        role: CollaboratorRole,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, ProjectCollaborator>(
            r#"
            INSERT INTO project_collaborators (project_id, user_id, role)
            VALUES ($1, $2, $3)
            RETURNING project_id, user_id, role, added_at
            "#,
        )
        .bind(project_id)
        .bind(user_id)
        .bind(role)
        .fetch_one(pool)
        .await
    }

    pub async fn list(pool: &PgPool, project_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, ProjectCollaborator>(
            "SELECT project_id, user_id, role, added_at FROM project_collaborators WHERE project_id = $1 ORDER BY added_at",
        )
        .bind(project_id)
        .fetch_all(pool)
        .await
    }

    pub async fn role_of(pool: &PgPool, project_id: Uuid, user_id: &str) -> Result<Option<CollaboratorRole>, sqlx::Error> {
        let row: Option<(CollaboratorRole,)> =
            sqlx::query_as("SELECT role FROM project_collaborators WHERE project_id = $1 AND user_id = $2")
                .bind(project_id)
                .bind(user_id)
                .fetch_optional(pool)
                .await?;

        Ok(row.map(|(role,)| role))
    }

    pub async fn remove(pool: &PgPool, project_id: Uuid, user_id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM project_collaborators WHERE project_id = $1 AND user_id = $2")
            .bind(project_id)
            .bind(user_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project(visibility: ProjectVisibility) -> Project {
        Project {
            id: Uuid::new_v4(),
            name: "CNC clock".to_string(),
            description: None,
            status: ProjectStatus::Planning,
            visibility,
            owner_id: "owner".to_string(),
            makerspace_id: Some(Uuid::new_v4()),
            tags: vec![],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_owner_has_full_access() {
        let access = ProjectAccess::resolve(&project(ProjectVisibility::Private), "owner", None, false);
        assert!(access.can_view && access.can_edit && access.is_owner);
    }

    #[test]
    fn test_private_hidden_from_strangers() {
        let access = ProjectAccess::resolve(&project(ProjectVisibility::Private), "stranger", None, true);
        assert!(!access.can_view);
        assert!(!access.can_edit);
    }

    #[test]
    fn test_makerspace_visibility_requires_membership() {
        let p = project(ProjectVisibility::Makerspace);
        assert!(ProjectAccess::resolve(&p, "member", None, true).can_view);
        assert!(!ProjectAccess::resolve(&p, "outsider", None, false).can_view);
    }

    #[test]
    fn test_collaborator_roles() {
        let p = project(ProjectVisibility::Private);
        let editor = ProjectAccess::resolve(&p, "ed", Some(CollaboratorRole::Editor), false);
        assert!(editor.can_view && editor.can_edit && !editor.is_owner);

        let viewer = ProjectAccess::resolve(&p, "vi", Some(CollaboratorRole::Viewer), false);
        assert!(viewer.can_view && !viewer.can_edit);
    }

    #[test]
    fn test_public_is_read_only_for_others() {
        let access = ProjectAccess::resolve(&project(ProjectVisibility::Public), "anyone", None, false);
        assert!(access.can_view);
        assert!(!access.can_edit);
    }
}
