/// Bearer-token authentication for Axum
///
/// Extracts the `Authorization: Bearer <token>` header, verifies the token
/// with a [`TokenVerifier`], and exposes the caller as an [`AuthContext`]
/// request extension.
///
/// # Example
///
/// ```no_run
/// use axum::{routing::get, Extension, Router};
/// use makrx_shared::auth::jwt::TokenVerifier;
/// use makrx_shared::auth::middleware::{jwt_auth_middleware, AuthContext};
/// use std::sync::Arc;
///
/// async fn whoami(Extension(auth): Extension<AuthContext>) -> String {
///     auth.user_id
/// }
///
/// let verifier = Arc::new(TokenVerifier::hs256("secret", "https://issuer", None));
/// let app: Router = Router::new()
///     .route("/me", get(whoami))
///     .layer(axum::middleware::from_fn(
///         move |req: axum::extract::Request, next: axum::middleware::Next| {
///             jwt_auth_middleware(verifier.clone(), req, next)
///         },
///     ));
/// ```

use axum::{
    extract::Request,
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::jwt::{Claims, JwtError, TokenVerifier};
use super::roles;

/// Authenticated caller, added to request extensions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthContext {
    /// Keycloak subject
    pub user_id: String,

    pub email: Option<String>,

    pub username: Option<String>,

    /// Realm roles
    pub roles: Vec<String>,
}

impl AuthContext {
    /// Creates auth context from verified claims
    pub fn from_claims(claims: Claims) -> Self {
        let roles = claims.roles().to_vec();
        Self {
            user_id: claims.sub,
            email: claims.email,
            username: claims.preferred_username,
            roles,
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn is_super_admin(&self) -> bool {
        self.has_role(roles::SUPER_ADMIN)
    }

    /// Platform admin (super admins included)
    pub fn is_admin(&self) -> bool {
        self.is_super_admin() || self.has_role(roles::ADMIN)
    }
}

/// Error type for authentication
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Missing authorization header
    #[error("Missing credentials")]
    MissingCredentials,

    /// Authorization header is not a bearer token
    #[error("Invalid authorization header: {0}")]
    InvalidFormat(String),

    /// Token validation failed
    #[error("Invalid token: {0}")]
    InvalidToken(String),
}

impl From<JwtError> for AuthError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::Expired => AuthError::InvalidToken("Token expired".to_string()),
            JwtError::InvalidIssuer { .. } => AuthError::InvalidToken("Invalid issuer".to_string()),
            JwtError::InvalidAudience => AuthError::InvalidToken("Invalid audience".to_string()),
            other => AuthError::InvalidToken(other.to_string()),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AuthError::MissingCredentials | AuthError::InvalidToken(_) => {
                (StatusCode::UNAUTHORIZED, "unauthorized")
            }
            AuthError::InvalidFormat(_) => (StatusCode::BAD_REQUEST, "bad_request"),
        };

        let body = Json(serde_json::json!({
            "error": code,
            "message": self.to_string(),
        }));

        (status, body).into_response()
    }
}

/// Extracts the bearer token from request headers
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::MissingCredentials)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AuthError::InvalidFormat("Expected Bearer token".to_string()))?
        .trim();

    if token.is_empty() {
        return Err(AuthError::MissingCredentials);
    }

    Ok(token)
}

/// Verifies the request's bearer token and builds the caller context
pub fn authenticate(headers: &HeaderMap, verifier: &TokenVerifier) -> Result<AuthContext, AuthError> {
    let token = bearer_token(headers)?;
    let claims = verifier.verify(token)?;
    Ok(AuthContext::from_claims(claims))
}

/// JWT authentication middleware
///
/// Rejects the request with 401/400 unless a valid bearer token is present.
pub async fn jwt_auth_middleware(
    verifier: Arc<TokenVerifier>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let auth_context = authenticate(req.headers(), &verifier)?;

    tracing::debug!(user_id = %auth_context.user_id, "Authenticated request");
    req.extensions_mut().insert(auth_context);

    Ok(next.run(req).await)
}
