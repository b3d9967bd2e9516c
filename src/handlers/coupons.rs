use crate::handlers::common::{
    created_response, map_service_error, success_response, PaginatedResponse, PaginationParams,
};
use crate::{errors::ApiError, services::coupons::IssueCouponInput, AppState};
use axum::{
    extract::{Json, Path, Query, State},
    routing::{get, post},
    Router,
};
use uuid::Uuid;

/// Creates the router for coupon issuance and lookup endpoints
pub fn coupons_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(issue_coupon))
        .route("/:id", get(get_coupon))
        .route("/by-code/:code", get(get_coupon_by_code))
        .route("/user/:user_id", get(list_user_coupons))
        .route("/:id/deactivate", post(deactivate_coupon))
}

/// Issue a coupon for a campaign to a user
async fn issue_coupon(
    State(state): State<AppState>,
    Json(payload): Json<IssueCouponInput>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let entry = state
        .services
        .coupons
        .issue(payload)
        .await
        .map_err(map_service_error)?;

    Ok(created_response(entry))
}

/// Get a ledger entry by id
async fn get_coupon(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let entry = state
        .services
        .coupons
        .get_entry(id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(entry))
}

/// Resolve a presented code to its ledger entry
async fn get_coupon_by_code(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let entry = state
        .services
        .coupons
        .find_by_code(&code)
        .await
        .map_err(map_service_error)?
        .ok_or_else(|| ApiError::NotFound(format!("Coupon '{}' not found", code)))?;

    Ok(success_response(entry))
}

/// List the coupons held by a user, newest first
async fn list_user_coupons(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(pagination): Query<PaginationParams>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let (entries, total) = state
        .services
        .coupons
        .list_for_user(user_id, pagination.page, pagination.per_page)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(PaginatedResponse::new(
        entries,
        pagination.page,
        pagination.per_page,
        total,
    )))
}

/// Per-entry administrative kill switch; the row is retained for audit
async fn deactivate_coupon(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let entry = state
        .services
        .coupons
        .deactivate(id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(entry))
}
