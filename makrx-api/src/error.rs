/// Error handling for the API server
///
/// Every handler returns `ApiResult<T>`; errors render as
///
/// ```json
/// { "error": "not_found", "message": "Service order not found" }
/// ```
///
/// with an optional `details` array for validation failures. Internal
/// error details are logged, never returned to the client.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use makrx_shared::auth::authorization::AuthzError;
use makrx_shared::auth::jwt::JwtError;
use makrx_shared::auth::middleware::AuthError;
use makrx_shared::dispatch::DispatchError;
use makrx_shared::models::cart::CartError;
use makrx_shared::models::equipment::ReservationError;
use makrx_shared::models::event::EventError;
use makrx_shared::models::inventory::AdjustError;
use makrx_shared::models::makerspace::MembershipError;
use makrx_shared::models::service_order::TransitionError;
use makrx_shared::models::store_order::{CheckoutError, OrderError};
use makrx_shared::notifications::TemplateError;
use makrx_shared::pagination::PaginationError;
use makrx_shared::pricing::QuoteError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// API result type alias
pub type ApiResult<T> = Result<T, ApiError>;

/// Unified API error type
#[derive(Debug)]
pub enum ApiError {
    /// Bad request (400)
    BadRequest(String),

    /// Unauthorized (401)
    Unauthorized(String),

    /// Forbidden (403)
    Forbidden(String),

    /// A gated feature is switched off for the caller (403)
    FeatureDisabled(String),

    /// Not found (404)
    NotFound(String),

    /// Conflict (409)
    Conflict(String),

    /// Unprocessable entity (422)
    ValidationError(Vec<ValidationErrorDetail>),

    /// Internal server error (500)
    InternalError(String),

    /// Service unavailable (503)
    ServiceUnavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationErrorDetail {
    pub field: String,
    pub message: String,
}

impl ValidationErrorDetail {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable code, e.g. `not_found`
    pub error: String,

    /// Human-readable message
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<ValidationErrorDetail>>,
}

impl ApiError {
    /// 422 for a single field
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        ApiError::ValidationError(vec![ValidationErrorDetail::new(field, message)])
    }

    pub fn not_found(what: &str) -> Self {
        ApiError::NotFound(format!("{what} not found"))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) | ApiError::FeatureDisabled(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::ValidationError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::FeatureDisabled(_) => "feature_disabled",
            ApiError::NotFound(_) => "not_found",
            ApiError::Conflict(_) => "conflict",
            ApiError::ValidationError(_) => "validation_error",
            ApiError::InternalError(_) => "internal_error",
            ApiError::ServiceUnavailable(_) => "service_unavailable",
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            ApiError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ApiError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            ApiError::FeatureDisabled(key) => write!(f, "Feature disabled: {}", key),
            ApiError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ApiError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            ApiError::ValidationError(errors) => {
                write!(f, "Validation failed: {} errors", errors.len())
            }
            ApiError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            ApiError::ServiceUnavailable(msg) => write!(f, "Service unavailable: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        let (message, details) = match self {
            ApiError::ValidationError(errors) => ("Request validation failed".to_string(), Some(errors)),
            ApiError::FeatureDisabled(key) => (format!("Feature '{}' is not enabled", key), None),
            ApiError::InternalError(msg) => {
                // Logged inside the request span, so it carries the request id
                tracing::error!(error = %msg, "Internal error");
                ("An internal error occurred".to_string(), None)
            }
            ApiError::BadRequest(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::Forbidden(msg)
            | ApiError::NotFound(msg)
            | ApiError::Conflict(msg)
            | ApiError::ServiceUnavailable(msg) => (msg, None),
        };

        let body = Json(ErrorResponse {
            error: code.to_string(),
            message,
            details,
        });

        (status, body).into_response()
    }
}

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";
const CHECK_VIOLATION: &str = "23514";

/// Convert sqlx errors to API errors
impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound("Resource not found".to_string()),
            sqlx::Error::Database(db_err) => {
                let constraint = db_err.constraint().unwrap_or("unknown").to_string();
                match db_err.code().as_deref() {
                    Some(UNIQUE_VIOLATION) => ApiError::Conflict(format!("Already exists ({})", constraint)),
                    Some(FOREIGN_KEY_VIOLATION) => {
                        ApiError::Conflict(format!("Referenced resource missing or in use ({})", constraint))
                    }
                    Some(CHECK_VIOLATION) => ApiError::invalid(&constraint, "Value violates a constraint"),
                    _ => ApiError::InternalError(format!("Database error: {}", db_err)),
                }
            }
            _ => ApiError::InternalError(format!("Database error: {}", err)),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut details: Vec<ValidationErrorDetail> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |error| ValidationErrorDetail {
                    field: field.to_string(),
                    message: error
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("Invalid value ({})", error.code)),
                })
            })
            .collect();
        details.sort_by(|a, b| a.field.cmp(&b.field));
        ApiError::ValidationError(details)
    }
}

impl From<PaginationError> for ApiError {
    fn from(err: PaginationError) -> Self {
        let field = match err {
            PaginationError::InvalidPage => "page",
            PaginationError::InvalidPerPage => "per_page",
        };
        ApiError::invalid(field, err.to_string())
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingCredentials => ApiError::Unauthorized("Missing credentials".to_string()),
            AuthError::InvalidFormat(msg) => ApiError::BadRequest(msg),
            AuthError::InvalidToken(msg) => ApiError::Unauthorized(msg),
        }
    }
}

impl From<AuthzError> for ApiError {
    fn from(err: AuthzError) -> Self {
        match err {
            AuthzError::NotMember(_) => ApiError::Forbidden("Not a member of this makerspace".to_string()),
            AuthzError::InsufficientRole { .. } => ApiError::Forbidden("Insufficient permissions".to_string()),
            AuthzError::MissingRealmRole(roles) => ApiError::Forbidden(format!("Requires one of: {}", roles)),
            AuthzError::NotAuthorized => {
                ApiError::Forbidden("Not authorized to access this resource".to_string())
            }
            AuthzError::DatabaseError(err) => err.into(),
        }
    }
}

impl From<JwtError> for ApiError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::Expired => ApiError::Unauthorized("Token expired".to_string()),
            JwtError::InvalidIssuer { .. } => ApiError::Unauthorized("Invalid token issuer".to_string()),
            JwtError::CreateError(msg) | JwtError::InvalidKey(msg) => ApiError::InternalError(msg),
            _ => ApiError::Unauthorized(format!("Invalid token: {}", err)),
        }
    }
}

impl From<TemplateError> for ApiError {
    fn from(err: TemplateError) -> Self {
        match &err {
            TemplateError::MissingVariable(name) => ApiError::invalid(&format!("variables.{name}"), err.to_string()),
        }
    }
}

impl From<QuoteError> for ApiError {
    fn from(err: QuoteError) -> Self {
        let field = match &err {
            QuoteError::InvalidQuantity => "quantity",
            QuoteError::MissingGeometry(field)
            | QuoteError::InvalidGeometry(field)
            | QuoteError::GeometryTooLarge { field, .. } => *field,
            QuoteError::TotalOutOfRange => "quantity",
        };
        ApiError::invalid(field, err.to_string())
    }
}

impl From<AdjustError> for ApiError {
    fn from(err: AdjustError) -> Self {
        match err {
            AdjustError::NotFound => ApiError::not_found("Inventory item"),
            AdjustError::InsufficientQuantity { .. } | AdjustError::QuantityOverflow { .. } => {
                ApiError::Conflict(err.to_string())
            }
            AdjustError::NegativeQuantity => ApiError::invalid("quantity", err.to_string()),
            AdjustError::Database(e) => e.into(),
        }
    }
}

impl From<MembershipError> for ApiError {
    fn from(err: MembershipError) -> Self {
        match err {
            MembershipError::NotFound => ApiError::not_found("Member"),
            MembershipError::LastOwner => ApiError::Conflict(err.to_string()),
            MembershipError::Database(e) => e.into(),
        }
    }
}

impl From<ReservationError> for ApiError {
    fn from(err: ReservationError) -> Self {
        match err {
            ReservationError::InvalidWindow(msg) => ApiError::invalid("ends_at", msg),
            ReservationError::EquipmentNotFound => ApiError::not_found("Equipment"),
            ReservationError::NotFound => ApiError::not_found("Reservation"),
            ReservationError::EquipmentUnavailable(_)
            | ReservationError::Overlap(_)
            | ReservationError::NotCancellable => ApiError::Conflict(err.to_string()),
            ReservationError::Database(e) => e.into(),
        }
    }
}

impl From<EventError> for ApiError {
    fn from(err: EventError) -> Self {
        match err {
            EventError::NotFound => ApiError::not_found("Event"),
            EventError::TeamNotFound => ApiError::not_found("Team"),
            EventError::InvalidSlug(_) => ApiError::invalid("slug", err.to_string()),
            EventError::InvalidSchedule => ApiError::invalid("ends_at", err.to_string()),
            EventError::NotPublished
            | EventError::AlreadyStarted
            | EventError::Full
            | EventError::AlreadyRegistered
            | EventError::NotRegistered
            | EventError::TeamFull
            | EventError::AlreadyInTeam
            | EventError::InvalidTransition { .. } => ApiError::Conflict(err.to_string()),
            EventError::Database(e) => e.into(),
        }
    }
}

impl From<CartError> for ApiError {
    fn from(err: CartError) -> Self {
        match err {
            CartError::ProductNotFound => ApiError::not_found("Product"),
            CartError::ItemNotFound => ApiError::not_found("Cart item"),
            CartError::InvalidQuantity => ApiError::invalid("quantity", err.to_string()),
            CartError::ProductInactive(_) | CartError::InsufficientStock { .. } => {
                ApiError::Conflict(err.to_string())
            }
            CartError::Database(e) => e.into(),
        }
    }
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        match err {
            CheckoutError::EmptyCart => ApiError::BadRequest(err.to_string()),
            CheckoutError::ProductUnavailable(_) | CheckoutError::InsufficientStock { .. } => {
                ApiError::Conflict(err.to_string())
            }
            CheckoutError::Database(e) => e.into(),
        }
    }
}

impl From<OrderError> for ApiError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::NotFound => ApiError::not_found("Order"),
            OrderError::InvalidTransition { .. } => ApiError::Conflict(err.to_string()),
            OrderError::Database(e) => e.into(),
        }
    }
}

impl From<TransitionError> for ApiError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::NotFound => ApiError::not_found("Service order"),
            TransitionError::InvalidTransition { .. } => ApiError::Conflict(err.to_string()),
            TransitionError::Database(e) => e.into(),
        }
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::NotFound => ApiError::not_found("Service order"),
            DispatchError::NotPending(_) | DispatchError::Busy | DispatchError::NoEligibleProvider { .. } => {
                ApiError::Conflict(err.to_string())
            }
            DispatchError::Transition(e) => e.into(),
            DispatchError::Database(e) => e.into(),
        }
    }
}
