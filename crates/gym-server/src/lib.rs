pub mod config;
pub mod remote_db;

use axum::{
    extract::{Path, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use gym_proto::{ApplyRequest, ApplyResponse, EntityKind, EntityRecord, ErrorBody};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use remote_db::{RemoteDb, StoreError};

#[derive(Clone)]
pub struct AppState {
    pub db: RemoteDb,
    pub api_token: Option<Arc<str>>,
}

impl AppState {
    pub fn new(db: RemoteDb, api_token: Option<String>) -> Self {
        Self {
            db,
            api_token: api_token.map(Arc::from),
        }
    }
}

/// Error returned by handlers, rendered as `{"error": ...}`
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::MissingPayload { .. } | StoreError::Payload(_) => {
                ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, err.to_string())
            }
            other => {
                tracing::error!("store failure: {other}");
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal storage error")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { error: self.message })).into_response()
    }
}

/// Build the full `/api` router
pub fn router(state: AppState) -> Router {
    let sync_router = Router::new()
        .route("/sync/apply", post(apply_handler))
        .route("/entities/{entity}", get(entities_handler))
        .layer(middleware::from_fn_with_state(state.clone(), require_token));

    let api_router = Router::new()
        .route("/health", get(health_handler))
        .merge(sync_router);

    Router::new()
        .nest("/api", api_router)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_handler() -> &'static str {
    "OK"
}

async fn apply_handler(
    State(state): State<AppState>,
    Json(req): Json<ApplyRequest>,
) -> Result<Json<ApplyResponse>, ApiError> {
    let op = &req.operation;
    let outcome = state.db.apply(&req.device_id, op).await?;
    tracing::info!(
        device = %req.device_id,
        op_id = %op.op_id,
        kind = %op.kind,
        entity = %op.entity,
        id = %op.entity_id,
        ?outcome,
        "applied operation"
    );
    Ok(Json(ApplyResponse {
        op_id: op.op_id,
        outcome,
    }))
}

async fn entities_handler(
    State(state): State<AppState>,
    Path(entity): Path<String>,
) -> Result<Json<Vec<EntityRecord>>, ApiError> {
    let kind: EntityKind = entity
        .parse()
        .map_err(|e: gym_proto::UnknownKind| ApiError::new(StatusCode::NOT_FOUND, e.to_string()))?;
    Ok(Json(state.db.list(kind).await?))
}

async fn require_token(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected) = state.api_token.as_deref() else {
        return Ok(next.run(req).await);
    };
    let presented = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));
    if presented == Some(expected) {
        Ok(next.run(req).await)
    } else {
        tracing::warn!("rejected request without a valid token");
        Err(ApiError::new(StatusCode::UNAUTHORIZED, "missing or invalid token"))
    }
}
