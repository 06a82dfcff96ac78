// 🌐 HTTP API - JSON adapter over the AccessController
//
// Handlers only translate HTTP ↔ controller calls. Every business rule lives
// in the controller; typed rejections map to 4xx, persistence loss to 503.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::access::{AccessController, PlateStatus, Receipt, ResidentAccess, VisitorTicket};
use crate::entities::{ParkingSpot, VisitorSession};
use crate::error::ParkingError;
use crate::stats::{ParkingStats, DEFAULT_HISTORY_LIMIT};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<AccessController>,
}

impl AppState {
    pub fn new(controller: Arc<AccessController>) -> Self {
        AppState { controller }
    }
}

/// API Response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            kind: None,
        }
    }
}

/// Rejection carried back to the client
pub struct ApiError(ParkingError);

impl From<ParkingError> for ApiError {
    fn from(err: ParkingError) -> Self {
        ApiError(err)
    }
}

pub fn status_for(err: &ParkingError) -> StatusCode {
    match err {
        ParkingError::NotAResident(_)
        | ParkingError::NotActive(_)
        | ParkingError::SessionNotOpen(_)
        | ParkingError::UnknownSpot(_) => StatusCode::NOT_FOUND,
        ParkingError::AlreadyOccupied(_)
        | ParkingError::AlreadyFree(_)
        | ParkingError::IsResident(_)
        | ParkingError::AlreadyActive(_)
        | ParkingError::NoSpotAvailable
        | ParkingError::SpotInUse(_) => StatusCode::CONFLICT,
        ParkingError::InvalidPlate | ParkingError::InvalidTimeRange => StatusCode::BAD_REQUEST,
        ParkingError::PersistenceFailure(_) => StatusCode::SERVICE_UNAVAILABLE,
        ParkingError::InvalidSpotLayout(_) | ParkingError::StatePoisoned => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(self.0.to_string()),
            kind: Some(self.0.kind().to_string()),
        };
        (status_for(&self.0), Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<usize>,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::ok(state.controller.backend()))
}

/// POST /api/residents/:plate/entry
async fn resident_entry(
    State(state): State<AppState>,
    Path(plate): Path<String>,
) -> ApiResult<ResidentAccess> {
    Ok(Json(ApiResponse::ok(state.controller.resident_entry(&plate)?)))
}

/// POST /api/residents/:plate/exit
async fn resident_exit(
    State(state): State<AppState>,
    Path(plate): Path<String>,
) -> ApiResult<ResidentAccess> {
    Ok(Json(ApiResponse::ok(state.controller.resident_exit(&plate)?)))
}

/// POST /api/visitors/:plate/entry
async fn visitor_entry(
    State(state): State<AppState>,
    Path(plate): Path<String>,
) -> Result<(StatusCode, Json<ApiResponse<VisitorTicket>>), ApiError> {
    let ticket = state.controller.visitor_entry(&plate)?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(ticket))))
}

/// POST /api/visitors/:plate/settle
async fn visitor_settle(
    State(state): State<AppState>,
    Path(plate): Path<String>,
) -> ApiResult<Receipt> {
    Ok(Json(ApiResponse::ok(state.controller.visitor_settle(&plate)?)))
}

/// GET /api/visitors/:plate/quote
async fn visitor_quote(
    State(state): State<AppState>,
    Path(plate): Path<String>,
) -> ApiResult<Receipt> {
    Ok(Json(ApiResponse::ok(state.controller.quote(&plate)?)))
}

/// GET /api/plates/:plate
async fn plate_status(
    State(state): State<AppState>,
    Path(plate): Path<String>,
) -> ApiResult<PlateStatus> {
    Ok(Json(ApiResponse::ok(state.controller.plate_status(&plate)?)))
}

/// GET /api/spots
async fn get_spots(State(state): State<AppState>) -> ApiResult<Vec<ParkingSpot>> {
    Ok(Json(ApiResponse::ok(state.controller.snapshot()?)))
}

/// GET /api/sessions/active
async fn get_active_sessions(State(state): State<AppState>) -> ApiResult<Vec<VisitorSession>> {
    Ok(Json(ApiResponse::ok(state.controller.stats().active_visitors()?)))
}

/// GET /api/sessions/history?limit=N
async fn get_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> ApiResult<Vec<VisitorSession>> {
    let limit = params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    Ok(Json(ApiResponse::ok(
        state.controller.stats().recent_sessions(limit)?,
    )))
}

/// GET /api/stats
async fn get_stats(State(state): State<AppState>) -> ApiResult<ParkingStats> {
    let now = state.controller.now();
    Ok(Json(ApiResponse::ok(state.controller.stats().summary(now)?)))
}

// ============================================================================
// Router
// ============================================================================

pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/residents/:plate/entry", post(resident_entry))
        .route("/residents/:plate/exit", post(resident_exit))
        .route("/visitors/:plate/entry", post(visitor_entry))
        .route("/visitors/:plate/settle", post(visitor_settle))
        .route("/visitors/:plate/quote", get(visitor_quote))
        .route("/plates/:plate", get(plate_status))
        .route("/spots", get(get_spots))
        .route("/sessions/active", get(get_active_sessions))
        .route("/sessions/history", get(get_history))
        .route("/stats", get(get_stats))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
