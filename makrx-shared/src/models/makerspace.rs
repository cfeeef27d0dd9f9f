/// Makerspace (tenant) and membership models
///
/// A makerspace owns inventory, equipment and members. Users are identified
/// by their Keycloak subject, so `user_id` columns are text.
///
/// # Roles
///
/// - **owner**: full control, may grant ownership
/// - **admin**: manage members, equipment, inventory deletion
/// - **member**: create/update inventory, reserve equipment
/// - **viewer**: read-only
///
/// # Example
///
/// ```no_run
/// use makrx_shared::models::makerspace::{CreateMakerspace, Makerspace};
/// use sqlx::PgPool;
///
/// # async fn example(pool: PgPool) -> Result<(), sqlx::Error> {
/// let space = Makerspace::create(&pool, CreateMakerspace {
///     slug: "bangalore-central".to_string(),
///     name: "Bangalore Central".to_string(),
///     description: None,
///     location: Some("Bengaluru".to_string()),
///     timezone: None,
/// }, "keycloak-user-id").await?;
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use uuid::Uuid;

/// RBAC roles for makerspace memberships
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "member_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Owner,
    Admin,
    Member,
    Viewer,
}

impl MemberRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberRole::Owner => "owner",
            MemberRole::Admin => "admin",
            MemberRole::Member => "member",
            MemberRole::Viewer => "viewer",
        }
    }

    /// Checks if this role meets the required role
    ///
    /// Hierarchy: Owner > Admin > Member > Viewer
    pub fn has_permission(&self, required: &MemberRole) -> bool {
        self.permission_level() >= required.permission_level()
    }

    pub fn can_manage_members(&self) -> bool {
        matches!(self, MemberRole::Owner | MemberRole::Admin)
    }

    fn permission_level(&self) -> u8 {
        match self {
            MemberRole::Owner => 4,
            MemberRole::Admin => 3,
            MemberRole::Member => 2,
            MemberRole::Viewer => 1,
        }
    }
}

/// Makerspace model
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Makerspace {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub timezone: String,
    pub settings: JsonValue,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a makerspace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMakerspace {
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub timezone: Option<String>,
}

/// Partial update; `None` fields are left unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateMakerspace {
    pub name: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub timezone: Option<String>,
    pub settings: Option<JsonValue>,
}

/// Membership row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MakerspaceMember {
    pub makerspace_id: Uuid,
    pub user_id: String,
    pub role: MemberRole,
    pub created_at: DateTime<Utc>,
}

const MAKERSPACE_COLUMNS: &str =
    "id, slug, name, description, location, timezone, settings, created_by, created_at, updated_at";

impl Makerspace {
    /// Creates a makerspace and makes the creator its owner
    ///
    /// Both rows are written in one transaction.
    ///
    /// # Errors
    ///
    /// Returns a database error on slug conflict (`makerspaces_slug_key`).
    pub async fn create(pool: &PgPool, data: CreateMakerspace, creator_id: &str) -> Result<Self, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let makerspace = sqlx::query_as::<_, Makerspace>(&format!(
            r#"
            INSERT INTO makerspaces (slug, name, description, location, timezone, created_by)
            VALUES ($1, $2, $3, $4, COALESCE($5, 'UTC'), $6)
            RETURNING {MAKERSPACE_COLUMNS}
            "#
        ))
        .bind(&data.slug)
        .bind(&data.name)
        .bind(&data.description)
        .bind(&data.location)
        .bind(&data.timezone)
        .bind(creator_id)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO makerspace_members (makerspace_id, user_id, role) VALUES ($1, $2, $3)",
        )
        .bind(makerspace.id)
        .bind(creator_id)
        .bind(MemberRole::Owner)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(makerspace_id = %makerspace.id, slug = %makerspace.slug, "Makerspace created");
        Ok(makerspace)
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Makerspace>(&format!(
            "SELECT {MAKERSPACE_COLUMNS} FROM makerspaces WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Lists makerspaces the user belongs to, alphabetically
    pub async fn list_for_user(pool: &PgPool, user_id: &str) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Makerspace>(
            r#"
            SELECT m.id, m.slug, m.name, m.description, m.location, m.timezone,
                   m.settings, m.created_by, m.created_at, m.updated_at
            FROM makerspaces m
            JOIN makerspace_members mm ON mm.makerspace_id = m.id
            WHERE mm.user_id = $1
            ORDER BY m.name ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    pub async fn update(pool: &PgPool, id: Uuid, data: UpdateMakerspace) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Makerspace>(&format!(
            r#"
            UPDATE makerspaces
            SET name = COALESCE($2, name),
                description = COALESCE($3, description),
                location = COALESCE($4, location),
                timezone = COALESCE($5, timezone),
                settings = COALESCE($6, settings),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {MAKERSPACE_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(data.name)
        .bind(data.description)
        .bind(data.location)
        .bind(data.timezone)
        .bind(data.settings)
        .fetch_optional(pool)
        .await
    }
}

impl MakerspaceMember {
    /// Adds a user to a makerspace
    ///
    /// # Errors
    ///
    /// Primary key violation when the user is already a member.
    pub async fn add(
        pool: &PgPool,
        makerspace_id: Uuid,
        user_id: &str,
        role: MemberRole,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, MakerspaceMember>(
            r#"
            INSERT INTO makerspace_members (makerspace_id, user_id, role)
            VALUES ($1, $2, $3)
            RETURNING makerspace_id, user_id, role, created_at
            "#,
        )
        .bind(makerspace_id)
        .bind(user_id)
        .bind(role)
        .fetch_one(pool)
        .await
    }

    /// Gets a user's role in a makerspace
    pub async fn get_role(
        pool: &PgPool,
        makerspace_id: Uuid,
        user_id: &str,
    ) -> Result<Option<MemberRole>, sqlx::Error> {
        let role: Option<(MemberRole,)> = sqlx::query_as(
            "SELECT role FROM makerspace_members WHERE makerspace_id = $1 AND user_id = $2",
        )
        .bind(makerspace_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

        Ok(role.map(|(r,)| r))
    }

    pub async fn list(pool: &PgPool, makerspace_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, MakerspaceMember>(
            r#"
            SELECT makerspace_id, user_id, role, created_at
            FROM makerspace_members
            WHERE makerspace_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(makerspace_id)
        .fetch_all(pool)
        .await
    }

    /// User IDs holding any of the given roles (notification fan-out)
    pub async fn user_ids_with_roles(
        pool: &PgPool,
        makerspace_id: Uuid,
        roles: &[MemberRole],
    ) -> Result<Vec<String>, sqlx::Error> {
        let members = Self::list(pool, makerspace_id).await?;
        Ok(members
            .into_iter()
            .filter(|m| roles.contains(&m.role))
            .map(|m| m.user_id)
            .collect())
    }

    /// Changes a member's role
    ///
    /// Demoting the last owner fails with [`MembershipError::LastOwner`].
    pub async fn update_role(
        pool: &PgPool,
        makerspace_id: Uuid,
        user_id: &str,
        role: MemberRole,
    ) -> Result<Self, MembershipError> {
        let mut tx = pool.begin().await?;
        let current = lock_member(&mut tx, makerspace_id, user_id).await?;

        if current == MemberRole::Owner && role != MemberRole::Owner {
            ensure_other_owner(&mut tx, makerspace_id).await?;
        }

        let member = sqlx::query_as::<_, MakerspaceMember>(
            r#"
            UPDATE makerspace_members
            SET role = $3
            WHERE makerspace_id = $1 AND user_id = $2
            RETURNING makerspace_id, user_id, role, created_at
            "#,
        )
        .bind(makerspace_id)
        .bind(user_id)
        .bind(role)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(member)
    }

    /// Removes a member; the last owner cannot be removed
    pub async fn remove(pool: &PgPool, makerspace_id: Uuid, user_id: &str) -> Result<(), MembershipError> {
        let mut tx = pool.begin().await?;
        let current = lock_member(&mut tx, makerspace_id, user_id).await?;

        if current == MemberRole::Owner {
            ensure_other_owner(&mut tx, makerspace_id).await?;
        }

        sqlx::query("DELETE FROM makerspace_members WHERE makerspace_id = $1 AND user_id = $2")
            .bind(makerspace_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn count_owners<'e, E: sqlx::PgExecutor<'e>>(
        executor: E,
        makerspace_id: Uuid,
    ) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM makerspace_members WHERE makerspace_id = $1 AND role = 'owner'",
        )
        .bind(makerspace_id)
        .fetch_one(executor)
        .await?;

        Ok(count)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MembershipError {
    #[error("Member not found")]
    NotFound,

    #[error("A makerspace must keep at least one owner")]
    LastOwner,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

// Role changes take the makerspace row lock first, so owner counts
// cannot change between the check and the write.
async fn lock_member(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    makerspace_id: Uuid,
    user_id: &str,
) -> Result<MemberRole, MembershipError> {
    sqlx::query("SELECT id FROM makerspaces WHERE id = $1 FOR UPDATE")
        .bind(makerspace_id)
        .execute(&mut **tx)
        .await?;

    let role: Option<(MemberRole,)> = sqlx::query_as(
        "SELECT role FROM makerspace_members WHERE makerspace_id = $1 AND user_id = $2",
    )
    .bind(makerspace_id)
    .bind(user_id)
    .fetch_optional(&mut **tx)
    .await?;

    role.map(|(r,)| r).ok_or(MembershipError::NotFound)
}

async fn ensure_other_owner(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    makerspace_id: Uuid,
) -> Result<(), MembershipError> {
    if MakerspaceMember::count_owners(&mut **tx, makerspace_id).await? <= 1 {
        return Err(MembershipError::LastOwner);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_hierarchy() {
        assert!(MemberRole::Owner.has_permission(&MemberRole::Admin));
        assert!(MemberRole::Admin.has_permission(&MemberRole::Member));
        assert!(MemberRole::Member.has_permission(&MemberRole::Viewer));
        assert!(MemberRole::Member.has_permission(&MemberRole::Member));
        assert!(!MemberRole::Viewer.has_permission(&MemberRole::Member));
        assert!(!MemberRole::Admin.has_permission(&MemberRole::Owner));
    }

    #[test]
    fn test_can_manage_members() {
        assert!(MemberRole::Owner.can_manage_members());
        assert!(MemberRole::Admin.can_manage_members());
        assert!(!MemberRole::Member.can_manage_members());
        assert!(!MemberRole::Viewer.can_manage_members());
    }

    #[test]
    fn test_role_serde() {
        assert_eq!(serde_json::to_string(&MemberRole::Admin).unwrap(), "\"admin\"");
        let role: MemberRole = serde_json::from_str("\"viewer\"").unwrap();
        assert_eq!(role, MemberRole::Viewer);
        assert_eq!(role.as_str(), "viewer");
    }
}
