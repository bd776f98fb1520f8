use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequestParts, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{async_trait, Json, Router};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::{hash_password, verify_password, Claims};
use crate::engine::{Engine, EngineError};
use crate::model::Admin;
use crate::observability;

use super::{required, ApiError, ApiResult, AppState};

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}

/// Claims of a verified admin bearer token. Handlers that take this
/// extractor reject anonymous requests with 401.
pub struct AdminClaims(pub Claims);

fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    scheme.eq_ignore_ascii_case("bearer").then(|| token.trim())
}

fn reject(e: EngineError) -> ApiError {
    metrics::counter!(observability::AUTH_FAILURES_TOTAL).increment(1);
    ApiError(e)
}

#[async_trait]
impl FromRequestParts<AppState> for AdminClaims {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .ok_or_else(|| reject(EngineError::Unauthorized("Not authorized, no token")))?;
        state.auth.verify(token).map(AdminClaims).map_err(reject)
    }
}

/// Like [`AdminClaims`] but lets anonymous requests through.
pub struct MaybeAdmin(pub Option<Claims>);

#[async_trait]
impl FromRequestParts<AppState> for MaybeAdmin {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match bearer_token(parts) {
            None => Ok(MaybeAdmin(None)),
            Some(token) => state.auth.verify(token).map(|c| MaybeAdmin(Some(c))).map_err(reject),
        }
    }
}

#[derive(Deserialize)]
pub(super) struct RegisterBody {
    name: Option<String>,
    email: Option<String>,
    password: Option<String>,
}

#[derive(Deserialize)]
pub(super) struct LoginBody {
    email: Option<String>,
    password: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct SessionResponse {
    id: String,
    name: String,
    email: String,
    is_admin: bool,
    token: String,
}

fn session_response(admin: &Admin, token: String) -> SessionResponse {
    SessionResponse {
        id: admin.id.to_string(),
        name: admin.name.clone(),
        email: admin.email.clone(),
        is_admin: true,
        token,
    }
}

async fn hash_off_thread(password: String) -> ApiResult<String> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| ApiError(EngineError::Internal(format!("hashing task failed: {e}"))))?
        .map_err(ApiError)
}

/// Cheap pre-check before any hashing work. The engine repeats it under its
/// admin lock.
fn ensure_may_register(engine: &Engine, caller: &MaybeAdmin) -> ApiResult<()> {
    if caller.0.is_none() && engine.admin_count() > 0 {
        return Err(reject(EngineError::Unauthorized("admin token required")));
    }
    Ok(())
}

/// The first admin may register anonymously; after that only an admin can
/// add another.
async fn register(
    State(state): State<AppState>,
    caller: MaybeAdmin,
    body: Result<Json<RegisterBody>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<SessionResponse>)> {
    let Json(body) = body?;
    let name = required(body.name)?;
    let email = required(body.email)?;
    let password = required(body.password)?;
    ensure_may_register(&state.engine, &caller)?;

    let password_hash = hash_off_thread(password).await?;
    let admin = state
        .engine
        .register_admin(&name, &email, password_hash, caller.0.is_none())
        .await?;
    let token = state.auth.issue(&admin);
    Ok((StatusCode::CREATED, Json(session_response(&admin, token))))
}

async fn login(
    State(state): State<AppState>,
    body: Result<Json<LoginBody>, JsonRejection>,
) -> ApiResult<Json<SessionResponse>> {
    let Json(body) = body?;
    let email = required(body.email)?;
    let password = required(body.password)?;

    let invalid = || reject(EngineError::Unauthorized("Invalid email or password"));
    let admin = state.engine.find_admin(&email).ok_or_else(invalid)?;
    let hash = admin.password_hash.clone();
    let ok = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .unwrap_or(false);
    if !ok {
        return Err(invalid());
    }

    let token = state.auth.issue(&admin);
    info!("admin {} logged in", admin.id);
    Ok(Json(session_response(&admin, token)))
}
