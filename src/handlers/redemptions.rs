use crate::handlers::common::{map_service_error, success_response, validate_input};
use crate::{
    entities::campaign::EligibilityTag,
    errors::ApiError,
    services::redemption::{CartItemRef, CartSnapshot},
    AppState,
};
use axum::{
    extract::{Json, State},
    routing::post,
    Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Creates the router for the redemption engine endpoints
pub fn redemptions_routes() -> Router<AppState> {
    Router::new()
        .route("/apply", post(apply_coupon))
        .route("/preview", post(preview_discount))
}

/// Apply a coupon to a cart, committing usage.
///
/// The caller must not subtract the discount from its cart unless this
/// returns 200; retried checkout attempts should resend the same
/// Idempotency-Key header to observe the committed result.
async fn apply_coupon(
    State(state): State<AppState>,
    Json(payload): Json<RedeemRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    validate_input(&payload)?;

    let (code, user_id, cart) = payload.into_parts();
    let outcome = state
        .services
        .redemption
        .apply_coupon(&code, user_id, &cart)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(outcome))
}

/// Validate and price a coupon without committing usage (cart-page display)
async fn preview_discount(
    State(state): State<AppState>,
    Json(payload): Json<RedeemRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    validate_input(&payload)?;

    let (code, user_id, cart) = payload.into_parts();
    let outcome = state
        .services
        .redemption
        .preview_discount(&code, user_id, &cart)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(outcome))
}

// Request DTOs

#[derive(Debug, Deserialize, Serialize, Validate, ToSchema)]
pub struct RedeemRequest {
    #[validate(length(min = 1, max = 64))]
    pub coupon_code: String,
    pub user_id: Uuid,
    #[validate(custom = "validate_non_negative")]
    pub cart_subtotal: Decimal,
    #[serde(default)]
    #[validate]
    pub cart_items: Vec<CartItemPayload>,
    /// Eligibility flags already computed by the caller (e.g. IS_NEW_USER
    /// derived from prior order count); the engine does no lookups.
    #[serde(default)]
    pub user_profile_flags: Vec<EligibilityTag>,
}

#[derive(Debug, Deserialize, Serialize, Validate, ToSchema)]
pub struct CartItemPayload {
    pub item_id: Uuid,
    pub category_id: Option<Uuid>,
    #[validate(range(min = 1))]
    pub quantity: i32,
    #[validate(custom = "validate_non_negative")]
    pub unit_price: Decimal,
}

fn validate_non_negative(value: &Decimal) -> Result<(), ValidationError> {
    if *value < Decimal::ZERO {
        return Err(ValidationError::new("must be non-negative"));
    }
    Ok(())
}

impl RedeemRequest {
    fn into_parts(self) -> (String, Uuid, CartSnapshot) {
        let cart = CartSnapshot {
            subtotal: self.cart_subtotal,
            items: self
                .cart_items
                .into_iter()
                .map(|item| CartItemRef {
                    item_id: item.item_id,
                    category_id: item.category_id,
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                })
                .collect(),
            user_profile_flags: self.user_profile_flags,
        };

        (self.coupon_code, self.user_id, cart)
    }
}
