use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Standard error envelope returned by every failing endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Unprocessable Entity")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// Stable machine-readable code for redemption failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// ISO 8601 timestamp when the error occurred
    pub timestamp: String,
}

/// Typed outcome of a failed coupon redemption, issuance, or campaign
/// specification. Every variant is a recoverable, user-facing result — the
/// checkout flow surfaces a specific message per kind rather than a generic
/// failure.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize)]
pub enum RedemptionError {
    #[error("coupon code does not match any issued coupon")]
    CouponNotFound,

    #[error("coupon is expired or no longer active")]
    CouponExpiredOrInactive,

    #[error("campaign has been deactivated")]
    CampaignInactive,

    #[error("cart subtotal {subtotal} is below the campaign minimum of {required}")]
    BelowMinimumPurchase { required: Decimal, subtotal: Decimal },

    #[error("no items in the cart are eligible for this campaign")]
    ItemsNotEligible,

    #[error("user does not meet the campaign eligibility requirements")]
    UserNotEligible,

    #[error("coupon has reached its per-user usage limit")]
    PerUserLimitReached,

    #[error("campaign has reached its global usage limit")]
    GlobalLimitReached,

    #[error("coupon usage limit was claimed by a concurrent redemption")]
    ConcurrentLimitExceeded,

    #[error("invalid campaign specification: {0}")]
    InvalidCampaignSpec(String),

    #[error("user already holds a coupon for this campaign")]
    DuplicateIssuance,
}

impl RedemptionError {
    /// Stable machine code surfaced in the error envelope so integrating
    /// carts can branch on the failure kind without parsing messages.
    pub fn code(&self) -> &'static str {
        match self {
            Self::CouponNotFound => "COUPON_NOT_FOUND",
            Self::CouponExpiredOrInactive => "COUPON_EXPIRED_OR_INACTIVE",
            Self::CampaignInactive => "CAMPAIGN_INACTIVE",
            Self::BelowMinimumPurchase { .. } => "BELOW_MINIMUM_PURCHASE",
            Self::ItemsNotEligible => "ITEMS_NOT_ELIGIBLE",
            Self::UserNotEligible => "USER_NOT_ELIGIBLE",
            Self::PerUserLimitReached => "PER_USER_LIMIT_REACHED",
            Self::GlobalLimitReached => "GLOBAL_LIMIT_REACHED",
            Self::ConcurrentLimitExceeded => "CONCURRENT_LIMIT_EXCEEDED",
            Self::InvalidCampaignSpec(_) => "INVALID_CAMPAIGN_SPEC",
            Self::DuplicateIssuance => "DUPLICATE_ISSUANCE",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::CouponNotFound => StatusCode::NOT_FOUND,
            Self::ConcurrentLimitExceeded | Self::DuplicateIssuance => StatusCode::CONFLICT,
            Self::InvalidCampaignSpec(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}

#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(
        #[from]
        #[serde(skip)]
        DbErr,
    ),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Redemption(#[from] RedemptionError),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Other error: {0}")]
    Other(
        #[from]
        #[serde(skip)]
        anyhow::Error,
    ),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::DatabaseError(_)
            | Self::EventError(_)
            | Self::InternalError(_)
            | Self::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_) | Self::InvalidOperation(_) | Self::InvalidInput(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Redemption(kind) => kind.status_code(),
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::EventError(_) | Self::InternalError(_) | Self::Other(_) => {
                "Internal server error".to_string()
            }
            Self::ServiceUnavailable(msg) => format!("Service unavailable: {}", msg),
            _ => self.to_string(),
        }
    }

    /// Stable machine code, present only for the redemption taxonomy.
    pub fn machine_code(&self) -> Option<&'static str> {
        match self {
            Self::Redemption(kind) => Some(kind.code()),
            _ => None,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(),
            code: self.machine_code().map(str::to_string),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}

/// API Error type for HTTP responses
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Service error: {0}")]
    ServiceError(#[from] ServiceError),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, code) = match &self {
            ApiError::ServiceError(service_error) => (
                service_error.status_code(),
                service_error.response_message(),
                service_error.machine_code(),
            ),
            ApiError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg.clone(), None),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone(), None),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone(), None),
        };

        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message,
            code: code.map(str::to_string),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}
