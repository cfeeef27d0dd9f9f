/// Authorization helpers and permission checks
///
/// Two layers of access control exist:
///
/// 1. **Realm roles** carried in the Keycloak token (`super_admin`, `admin`,
///    `service_provider`, `service`)
/// 2. **Makerspace roles** stored in `makerspace_members`
///    (Owner > Admin > Member > Viewer)
///
/// `super_admin` passes every makerspace check.
///
/// # Example
///
/// ```no_run
/// use makrx_shared::auth::authorization::{require_permission, ResourcePermission};
/// use makrx_shared::auth::middleware::AuthContext;
/// use sqlx::PgPool;
/// use uuid::Uuid;
///
/// async fn check(pool: &PgPool, auth: &AuthContext, makerspace_id: Uuid) -> Result<(), Box<dyn std::error::Error>> {
///     require_permission(pool, makerspace_id, auth, ResourcePermission::Write).await?;
///     Ok(())
/// }
/// ```

use sqlx::PgPool;
use uuid::Uuid;

use super::middleware::AuthContext;
use crate::models::makerspace::{MakerspaceMember, MemberRole};

/// Error type for authorization checks
#[derive(Debug, thiserror::Error)]
pub enum AuthzError {
    /// User is not a member of the makerspace
    #[error("Not a member of makerspace {0}")]
    NotMember(Uuid),

    /// User doesn't have required role
    #[error("Insufficient permissions: requires {required:?}, has {actual:?}")]
    InsufficientRole {
        required: MemberRole,
        actual: MemberRole,
    },

    /// Caller lacks every accepted realm role
    #[error("Requires one of the realm roles: {0}")]
    MissingRealmRole(String),

    /// User doesn't own the resource
    #[error("Not authorized to access this resource")]
    NotAuthorized,

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

/// Permission types for makerspace resources
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourcePermission {
    /// Viewer+
    Read,

    /// Member+
    Write,

    /// Admin+
    Manage,

    /// Owner only
    Own,
}

impl ResourcePermission {
    /// Gets the minimum role required for this permission
    pub fn min_role(&self) -> MemberRole {
        match self {
            ResourcePermission::Read => MemberRole::Viewer,
            ResourcePermission::Write => MemberRole::Member,
            ResourcePermission::Manage => MemberRole::Admin,
            ResourcePermission::Own => MemberRole::Owner,
        }
    }
}

/// Checks if a user has a specific role in a makerspace
///
/// Returns the caller's effective role. Super admins are treated as owners
/// without a database lookup.
///
/// # Errors
///
/// - `NotMember` if the user has no membership row
/// - `InsufficientRole` if the membership role is below `required_role`
pub async fn require_role(
    pool: &PgPool,
    makerspace_id: Uuid,
    auth: &AuthContext,
    required_role: MemberRole,
) -> Result<MemberRole, AuthzError> {
    if auth.is_super_admin() {
        return Ok(MemberRole::Owner);
    }

    let user_role = MakerspaceMember::get_role(pool, makerspace_id, &auth.user_id)
        .await?
        .ok_or(AuthzError::NotMember(makerspace_id))?;

    check_role(user_role, required_role)?;
    Ok(user_role)
}

/// Role-level check without a database round trip
pub fn check_role(actual: MemberRole, required: MemberRole) -> Result<(), AuthzError> {
    if !actual.has_permission(&required) {
        return Err(AuthzError::InsufficientRole { required, actual });
    }

    Ok(())
}

/// Checks a makerspace permission level
pub async fn require_permission(
    pool: &PgPool,
    makerspace_id: Uuid,
    auth: &AuthContext,
    permission: ResourcePermission,
) -> Result<MemberRole, AuthzError> {
    require_role(pool, makerspace_id, auth, permission.min_role()).await
}

/// Requires at least one of the given realm roles
///
/// Super admins always pass.
pub fn require_realm_role(auth: &AuthContext, accepted: &[&str]) -> Result<(), AuthzError> {
    if auth.is_super_admin() || accepted.iter().any(|role| auth.has_role(role)) {
        return Ok(());
    }

    Err(AuthzError::MissingRealmRole(accepted.join(", ")))
}

/// Requires the platform `admin` realm role
pub fn require_admin(auth: &AuthContext) -> Result<(), AuthzError> {
    require_realm_role(auth, &[super::roles::ADMIN])
}

/// Checks if user owns a resource
pub fn require_ownership(auth: &AuthContext, resource_owner_id: &str) -> Result<(), AuthzError> {
    if auth.user_id != resource_owner_id {
        return Err(AuthzError::NotAuthorized);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::roles;

    fn context(roles: &[&str]) -> AuthContext {
        AuthContext {
            user_id: "user-1".to_string(),
            email: None,
            username: None,
            roles: roles.iter().map(|r| r.to_string()).collect(),
        }
    }

    #[test]
    fn test_resource_permission_min_role() {
        assert_eq!(ResourcePermission::Read.min_role(), MemberRole::Viewer);
        assert_eq!(ResourcePermission::Write.min_role(), MemberRole::Member);
        assert_eq!(ResourcePermission::Manage.min_role(), MemberRole::Admin);
        assert_eq!(ResourcePermission::Own.min_role(), MemberRole::Owner);
    }

    #[test]
    fn test_check_role() {
        assert!(check_role(MemberRole::Admin, MemberRole::Member).is_ok());
        assert!(matches!(
            check_role(MemberRole::Viewer, MemberRole::Member),
            Err(AuthzError::InsufficientRole {
                required: MemberRole::Member,
                actual: MemberRole::Viewer
            })
        ));
    }

    #[test]
    fn test_require_realm_role() {
        assert!(require_realm_role(&context(&[roles::SERVICE]), &[roles::SERVICE, roles::ADMIN]).is_ok());
        assert!(require_realm_role(&context(&[roles::SUPER_ADMIN]), &[roles::SERVICE]).is_ok());
        assert!(require_realm_role(&context(&[]), &[roles::SERVICE]).is_err());
    }

    #[test]
    fn test_require_admin() {
        assert!(require_admin(&context(&[roles::ADMIN])).is_ok());
        assert!(require_admin(&context(&[roles::SUPER_ADMIN])).is_ok());
        assert!(require_admin(&context(&[roles::SERVICE_PROVIDER])).is_err());
    }

    #[test]
    fn test_require_ownership() {
        let auth = context(&[]);
        assert!(require_ownership(&auth, "user-1").is_ok());
        assert!(matches!(
            require_ownership(&auth, "user-2"),
            Err(AuthzError::NotAuthorized)
        ));
    }

    #[tokio::test]
    async fn test_super_admin_skips_membership_lookup() {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgresql://localhost/unused")
            .unwrap();
        let role = require_role(&pool, Uuid::new_v4(), &context(&[roles::SUPER_ADMIN]), MemberRole::Owner)
            .await
            .unwrap();
        assert_eq!(role, MemberRole::Owner);
    }
}
