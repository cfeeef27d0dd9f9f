/// Keycloak access token verification
///
/// The platform does not issue tokens; Keycloak does. This module decodes
/// and validates them with `jsonwebtoken`:
///
/// - **RS256** with the realm's public key (production)
/// - **HS256** with a shared secret (development and tests)
///
/// Validation covers the signature, `exp`, `iss` and, when configured, `aud`.
///
/// # Example
///
/// ```
/// use makrx_shared::auth::jwt::{create_token, Claims, TokenVerifier};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let issuer = "https://auth.makrx.org/realms/makrx";
/// let secret = "development-secret-at-least-32-bytes!";
///
/// let token = create_token(&Claims::new("user-1", issuer, vec![]), secret)?;
/// let claims = TokenVerifier::hs256(secret, issuer, None).verify(&token)?;
/// assert_eq!(claims.sub, "user-1");
/// # Ok(())
/// # }
/// ```

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Error type for JWT operations
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    /// Failed to create token
    #[error("Failed to create token: {0}")]
    CreateError(String),

    /// Failed to validate token
    #[error("Failed to validate token: {0}")]
    ValidationError(String),

    /// Token has expired
    #[error("Token has expired")]
    Expired,

    /// Issuer did not match the configured realm
    #[error("Invalid issuer: expected {expected}")]
    InvalidIssuer { expected: String },

    /// Audience did not match
    #[error("Invalid audience")]
    InvalidAudience,

    /// Verification key could not be loaded
    #[error("Invalid verification key: {0}")]
    InvalidKey(String),
}

/// `realm_access` claim as emitted by Keycloak
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealmAccess {
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Access token claims
///
/// Only the claims the platform reads are modelled; Keycloak adds many more
/// and they are ignored on decode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject - Keycloak user ID
    pub sub: String,

    /// Issuer - realm URL
    pub iss: String,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration time (Unix timestamp)
    pub exp: i64,

    /// Audience (string or array in Keycloak tokens)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Realm roles
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realm_access: Option<RealmAccess>,
}

impl Claims {
    /// Creates claims valid for one hour
    pub fn new(sub: impl Into<String>, issuer: impl Into<String>, roles: Vec<String>) -> Self {
        Self::with_expiration(sub, issuer, roles, Duration::hours(1))
    }

    /// Creates claims with a custom lifetime (negative = already expired)
    pub fn with_expiration(
        sub: impl Into<String>,
        issuer: impl Into<String>,
        roles: Vec<String>,
        expires_in: Duration,
    ) -> Self {
        let now = Utc::now();

        Self {
            sub: sub.into(),
            iss: issuer.into(),
            iat: now.timestamp(),
            exp: (now + expires_in).timestamp(),
            aud: None,
            email: None,
            preferred_username: None,
            name: None,
            realm_access: Some(RealmAccess { roles }),
        }
    }

    /// Realm roles carried by the token
    pub fn roles(&self) -> &[String] {
        self.realm_access
            .as_ref()
            .map(|access| access.roles.as_slice())
            .unwrap_or(&[])
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles().iter().any(|r| r == role)
    }

    /// Checks if token has expired
    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() >= self.exp
    }
}

/// Signs claims with HS256
///
/// Only used for development tokens and tests; production tokens come from
/// Keycloak.
pub fn create_token(claims: &Claims, secret: &str) -> Result<String, JwtError> {
    let header = Header::new(Algorithm::HS256);
    let key = EncodingKey::from_secret(secret.as_bytes());

    encode(&header, claims, &key)
        .map_err(|e| JwtError::CreateError(format!("Token encoding failed: {}", e)))
}

/// Verifies access tokens against one realm
///
/// Built once at startup and shared through application state.
#[derive(Clone)]
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
    issuer: String,
}

impl std::fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("algorithm", &self.validation.algorithms)
            .field("issuer", &self.issuer)
            .finish()
    }
}

impl TokenVerifier {
    /// Verifier for HS256 tokens signed with a shared secret
    pub fn hs256(secret: &str, issuer: &str, audience: Option<&str>) -> Self {
        Self::build(
            DecodingKey::from_secret(secret.as_bytes()),
            Algorithm::HS256,
            issuer,
            audience,
        )
    }

    /// Verifier for RS256 tokens signed by the realm key
    ///
    /// # Errors
    ///
    /// Returns `JwtError::InvalidKey` if the PEM cannot be parsed.
    pub fn rs256_pem(public_key_pem: &str, issuer: &str, audience: Option<&str>) -> Result<Self, JwtError> {
        let key = DecodingKey::from_rsa_pem(public_key_pem.as_bytes())
            .map_err(|e| JwtError::InvalidKey(e.to_string()))?;

        Ok(Self::build(key, Algorithm::RS256, issuer, audience))
    }

    fn build(key: DecodingKey, algorithm: Algorithm, issuer: &str, audience: Option<&str>) -> Self {
        let mut validation = Validation::new(algorithm);
        validation.set_issuer(&[issuer]);
        validation.validate_exp = true;

        match audience {
            Some(aud) => validation.set_audience(&[aud]),
            // Keycloak always stamps `aud`; without a configured audience it is not checked
            None => validation.validate_aud = false,
        }

        Self {
            key,
            validation,
            issuer: issuer.to_string(),
        }
    }

    /// Validates a token and returns its claims
    pub fn verify(&self, token: &str) -> Result<Claims, JwtError> {
        let token_data = decode::<Claims>(token, &self.key, &self.validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::Expired,
                jsonwebtoken::errors::ErrorKind::InvalidIssuer => JwtError::InvalidIssuer {
                    expected: self.issuer.clone(),
                },
                jsonwebtoken::errors::ErrorKind::InvalidAudience => JwtError::InvalidAudience,
                _ => JwtError::ValidationError(format!("Token validation failed: {}", e)),
            }
        })?;

        Ok(token_data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-key-at-least-32-bytes-long";
    const ISSUER: &str = "https://auth.makrx.test/realms/makrx";

    #[test]
    fn test_claims_roles() {
        let claims = Claims::new("user-1", ISSUER, vec!["admin".to_string()]);
        assert!(claims.has_role("admin"));
        assert!(!claims.has_role("super_admin"));
        assert!(!claims.is_expired());

        let mut bare = claims.clone();
        bare.realm_access = None;
        assert!(bare.roles().is_empty());
    }

    #[test]
    fn test_create_and_verify_token() {
        let claims = Claims::new("user-1", ISSUER, vec!["service_provider".to_string()]);
        let token = create_token(&claims, SECRET).expect("Should create token");

        let verified = TokenVerifier::hs256(SECRET, ISSUER, None)
            .verify(&token)
            .expect("Should verify token");

        assert_eq!(verified.sub, "user-1");
        assert_eq!(verified.iss, ISSUER);
        assert!(verified.has_role("service_provider"));
    }

    #[test]
    fn test_verify_with_wrong_secret() {
        let token = create_token(&Claims::new("user-1", ISSUER, vec![]), SECRET).unwrap();

        let result = TokenVerifier::hs256("another-secret-that-is-32-bytes-long", ISSUER, None).verify(&token);
        assert!(matches!(result, Err(JwtError::ValidationError(_))));
    }

    #[test]
    fn test_verify_expired_token() {
        let claims = Claims::with_expiration("user-1", ISSUER, vec![], Duration::seconds(-3600));
        assert!(claims.is_expired());

        let token = create_token(&claims, SECRET).unwrap();
        let result = TokenVerifier::hs256(SECRET, ISSUER, None).verify(&token);
        assert!(matches!(result, Err(JwtError::Expired)));
    }

    #[test]
    fn test_verify_wrong_issuer() {
        let token = create_token(&Claims::new("user-1", "https://evil.example/realms/x", vec![]), SECRET).unwrap();

        let result = TokenVerifier::hs256(SECRET, ISSUER, None).verify(&token);
        assert!(matches!(result, Err(JwtError::InvalidIssuer { .. })));
    }

    #[test]
    fn test_audience_checked_only_when_configured() {
        let mut claims = Claims::new("user-1", ISSUER, vec![]);
        claims.aud = Some(serde_json::json!("account"));
        let token = create_token(&claims, SECRET).unwrap();

        assert!(TokenVerifier::hs256(SECRET, ISSUER, None).verify(&token).is_ok());
        assert!(TokenVerifier::hs256(SECRET, ISSUER, Some("account")).verify(&token).is_ok());
        assert!(matches!(
            TokenVerifier::hs256(SECRET, ISSUER, Some("makrx-store")).verify(&token),
            Err(JwtError::InvalidAudience)
        ));
    }

    #[test]
    fn test_keycloak_shaped_payload_decodes() {
        let payload = serde_json::json!({
            "sub": "f3b1c2d4",
            "iss": ISSUER,
            "iat": 1_700_000_000,
            "exp": 1_700_000_300,
            "aud": ["account", "makrx-store"],
            "azp": "makrx-web",
            "email": "maker@makrx.org",
            "preferred_username": "maker",
            "realm_access": { "roles": ["offline_access", "admin"] },
            "resource_access": { "account": { "roles": ["view-profile"] } }
        });

        let claims: Claims = serde_json::from_value(payload).unwrap();
        assert_eq!(claims.email.as_deref(), Some("maker@makrx.org"));
        assert!(claims.has_role("admin"));
    }

    #[test]
    fn test_rs256_rejects_garbage_key() {
        let result = TokenVerifier::rs256_pem("not a pem", ISSUER, None);
        assert!(matches!(result, Err(JwtError::InvalidKey(_))));
    }
}
