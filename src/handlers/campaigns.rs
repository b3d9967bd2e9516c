use crate::handlers::common::{
    created_response, map_service_error, success_response, validate_input, PaginatedResponse,
    PaginationParams,
};
use crate::{
    errors::ApiError,
    services::campaigns::{CreateCampaignInput, UpdateCampaignInput},
    AppState,
};
use axum::{
    extract::{Json, Path, Query, State},
    routing::{get, post},
    Router,
};
use uuid::Uuid;

/// Creates the router for campaign administration endpoints
pub fn campaigns_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_campaign).get(list_campaigns))
        .route("/:id", get(get_campaign).put(update_campaign))
        .route("/by-slug/:slug", get(get_campaign_by_slug))
        .route("/:id/activate", post(activate_campaign))
        .route("/:id/deactivate", post(deactivate_campaign))
}

/// Create a new campaign
async fn create_campaign(
    State(state): State<AppState>,
    Json(payload): Json<CreateCampaignInput>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    validate_input(&payload)?;

    let campaign = state
        .services
        .campaigns
        .create_campaign(payload)
        .await
        .map_err(map_service_error)?;

    Ok(created_response(campaign))
}

/// List campaigns, newest first
async fn list_campaigns(
    State(state): State<AppState>,
    Query(pagination): Query<PaginationParams>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let (campaigns, total) = state
        .services
        .campaigns
        .list_campaigns(pagination.page, pagination.per_page)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(PaginatedResponse::new(
        campaigns,
        pagination.page,
        pagination.per_page,
        total,
    )))
}

/// Get a campaign by id
async fn get_campaign(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let campaign = state
        .services
        .campaigns
        .get_campaign(id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(campaign))
}

/// Get a campaign by its human slug
async fn get_campaign_by_slug(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let campaign = state
        .services
        .campaigns
        .get_by_slug(&slug)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(campaign))
}

/// Apply administrative rule/limit changes
async fn update_campaign(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateCampaignInput>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let campaign = state
        .services
        .campaigns
        .update_campaign(id, payload)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(campaign))
}

/// Re-enable a deactivated campaign
async fn activate_campaign(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let campaign = state
        .services
        .campaigns
        .set_active(id, true)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(campaign))
}

/// Administrative kill switch; campaigns are never deleted
async fn deactivate_campaign(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let campaign = state
        .services
        .campaigns
        .set_active(id, false)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(campaign))
}
