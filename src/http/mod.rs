//! JSON API over the engine.
//!
//! Handlers translate request bodies into engine inputs and engine results
//! into camelCase JSON. Status codes are decided here and nowhere else.

pub mod auth;
mod cars;
mod reservations;

use std::sync::Arc;
use std::time::Instant;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{MatchedPath, Request};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use ulid::Ulid;

use crate::auth::Authenticator;
use crate::engine::{Engine, EngineError, ErrorKind};
use crate::observability;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub auth: Arc<Authenticator>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/cars", cars::routes())
        .nest("/api/reservations", reservations::routes())
        .nest("/api/auth", auth::routes())
        .route_layer(middleware::from_fn(track_metrics))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn track_metrics(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_owned());

    let response = next.run(req).await;

    let status = observability::status_label(response.status().as_u16());
    metrics::counter!(
        observability::HTTP_REQUESTS_TOTAL,
        "method" => method.clone(),
        "route" => route.clone(),
        "status" => status
    )
    .increment(1);
    metrics::histogram!(
        observability::HTTP_REQUEST_DURATION_SECONDS,
        "method" => method,
        "route" => route
    )
    .record(start.elapsed().as_secs_f64());
    response
}

// ── Errors ──────────────────────────────────────────────

/// An engine error on its way out as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub EngineError);

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        ApiError(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError(EngineError::validation(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError(EngineError::validation(rejection.body_text()))
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: ErrorDetail<'a>,
}

#[derive(Serialize)]
struct ErrorDetail<'a> {
    kind: &'a str,
    message: String,
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let message = match kind {
            // WAL and hashing details stay in the log.
            ErrorKind::Internal => {
                tracing::error!("request failed: {}", self.0);
                "internal server error".to_string()
            }
            _ => self.0.to_string(),
        };
        let body = ErrorBody {
            error: ErrorDetail {
                kind: kind.as_str(),
                message,
            },
        };
        (status_for(kind), Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

pub(crate) fn parse_id(raw: &str) -> ApiResult<Ulid> {
    Ulid::from_string(raw).map_err(|_| ApiError(EngineError::validation(format!("invalid id: {raw}"))))
}

pub(crate) fn parse_date(raw: &str) -> ApiResult<crate::model::Ms> {
    crate::dates::parse_instant(raw)
        .ok_or_else(|| ApiError(EngineError::validation("Invalid date format. Use YYYY-MM-DD")))
}

/// Fail with the "missing fields" message when any required value is absent.
pub(crate) fn required<T>(value: Option<T>) -> ApiResult<T> {
    value.ok_or_else(|| ApiError(EngineError::validation("Please provide all required fields")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_statuses() {
        assert_eq!(status_for(ErrorKind::Validation), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorKind::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_for(ErrorKind::Conflict), StatusCode::CONFLICT);
        assert_eq!(status_for(ErrorKind::Unauthorized), StatusCode::UNAUTHORIZED);
        assert_eq!(status_for(ErrorKind::Internal), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn internal_details_hidden() {
        let response = ApiError(EngineError::WalError("disk full".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn malformed_ids_rejected() {
        let err = parse_id("not-a-ulid").unwrap_err();
        assert_eq!(err.0.kind(), ErrorKind::Validation);
        let id = Ulid::new();
        assert_eq!(parse_id(&id.to_string()).unwrap(), id);
    }

    #[test]
    fn date_parsing() {
        assert_eq!(parse_date("1970-01-02").unwrap(), 86_400_000);
        let err = parse_date("01/02/2024").unwrap_err();
        assert_eq!(err.0.to_string(), "Invalid date format. Use YYYY-MM-DD");
    }

    #[test]
    fn missing_field_message() {
        let err = required::<String>(None).unwrap_err();
        assert_eq!(err.0.to_string(), "Please provide all required fields");
    }
}
