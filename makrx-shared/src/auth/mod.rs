/// Authentication and authorization utilities
///
/// Tokens are issued by the platform's Keycloak realm; this crate only
/// verifies them and turns their claims into an [`middleware::AuthContext`].
///
/// # Modules
///
/// - [`jwt`]: Claims, token verification (RS256 realm key or HS256 secret)
/// - [`middleware`]: Axum middleware that authenticates bearer tokens
/// - [`authorization`]: Realm-role and makerspace-role checks
///
/// # Example
///
/// ```
/// use makrx_shared::auth::jwt::{create_token, Claims, TokenVerifier};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let secret = "development-secret-at-least-32-bytes!";
/// let issuer = "https://auth.makrx.org/realms/makrx";
///
/// let claims = Claims::new("user-123", issuer, vec!["admin".to_string()]);
/// let token = create_token(&claims, secret)?;
///
/// let verifier = TokenVerifier::hs256(secret, issuer, None);
/// let verified = verifier.verify(&token)?;
/// assert!(verified.has_role("admin"));
/// # Ok(())
/// # }
/// ```

pub mod authorization;
pub mod jwt;
pub mod middleware;

/// Realm roles understood by the platform
pub mod roles {
    /// Bypasses every tenant-level check
    pub const SUPER_ADMIN: &str = "super_admin";

    /// Platform administrator (catalog, feature flags, dispatch)
    pub const ADMIN: &str = "admin";

    /// May register and operate a fabrication provider profile
    pub const SERVICE_PROVIDER: &str = "service_provider";

    /// Service-to-service caller
    pub const SERVICE: &str = "service";
}
