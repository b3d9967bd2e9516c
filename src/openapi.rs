use axum::{routing::get, Json, Router};
use utoipa::OpenApi;

use crate::entities::campaign::{DiscountType, EligibilityTag};
use crate::entities::coupon::CouponState;
use crate::errors::ErrorResponse;
use crate::handlers::redemptions::{CartItemPayload, RedeemRequest};
use crate::services::campaigns::{CreateCampaignInput, UpdateCampaignInput};
use crate::services::coupons::IssueCouponInput;
use crate::services::redemption::{CartItemRef, CartSnapshot, RedemptionOutcome};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Promo API",
        version = "0.3.0",
        description = r#"
Coupon campaign and redemption engine.

Campaigns define discount rules, eligibility, usage limits, and validity
windows. Coupons are per-user instances of a campaign with their own usage
ledger. The redemption endpoints validate a coupon against a cart snapshot,
price the discount, and commit usage atomically so a coupon can never be
redeemed more times than its campaign allows — even under concurrent
checkout attempts.

Redemption failures are returned with a stable machine code in the error
envelope (e.g. `PER_USER_LIMIT_REACHED`, `GLOBAL_LIMIT_REACHED`) so the
checkout flow can surface a specific message per kind.
"#,
        license(name = "Apache-2.0")
    ),
    components(schemas(
        CreateCampaignInput,
        UpdateCampaignInput,
        IssueCouponInput,
        RedeemRequest,
        CartItemPayload,
        CartSnapshot,
        CartItemRef,
        RedemptionOutcome,
        DiscountType,
        EligibilityTag,
        CouponState,
        ErrorResponse,
    )),
    tags(
        (name = "campaigns", description = "Campaign administration"),
        (name = "coupons", description = "Coupon issuance and lookup"),
        (name = "redemptions", description = "Coupon validation and redemption")
    )
)]
pub struct ApiDoc;

/// Serves the OpenAPI document as plain JSON.
pub fn docs_routes<S: Clone + Send + Sync + 'static>() -> Router<S> {
    Router::new().route(
        "/api-docs/openapi.json",
        get(|| async { Json(ApiDoc::openapi()) }),
    )
}
