//! HTTP surface
//!
//! | Method | Path | Body |
//! |--------|------|------|
//! | POST | `/calls` | `{callee_id, type}` |
//! | POST | `/calls/{call_id}/accept` | `{caller_id}` |
//! | POST | `/calls/{call_id}/reject` | `{caller_id}` |
//! | POST | `/streams` | none |
//! | DELETE | `/streams/{stream_id}` | none |
//! | GET | `/stats` | none |
//! | GET | `/ws` | WebSocket upgrade |
//!
//! Every route authenticates with `Authorization: Bearer <token>`.

use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Path, State},
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Semaphore;

use super::auth::bearer_token;
use super::hub::Hub;
use super::ws;
use crate::call::{CallError, CallId, CallKind};
use crate::connection::{ConnectionError, UserId};
use crate::error::Error;
use crate::stats::HubStats;
use crate::stream::{StreamError, StreamId, StreamSlot};

/// State shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<Hub>,
    /// Permits for concurrent WebSocket sessions (None = unlimited)
    pub(super) connection_limit: Option<Arc<Semaphore>>,
}

impl AppState {
    pub fn new(hub: Arc<Hub>) -> Self {
        let max = hub.config().max_connections;
        let connection_limit = (max > 0).then(|| Arc::new(Semaphore::new(max)));

        Self {
            hub,
            connection_limit,
        }
    }
}

/// Build the router for all routes
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/calls", post(start_call))
        .route("/calls/{call_id}/accept", post(accept_call))
        .route("/calls/{call_id}/reject", post(reject_call))
        .route("/streams", post(create_stream))
        .route("/streams/{stream_id}", delete(end_stream))
        .route("/stats", get(stats))
        .route("/ws", get(ws::upgrade))
        .with_state(state)
}

// ========== Errors ==========

/// API error type with structured responses
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Hub(#[from] Error),

    #[error("connection limit reached")]
    Unavailable,
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Hub(e) => match e {
                Error::Unauthenticated => StatusCode::UNAUTHORIZED,
                Error::Call(CallError::Busy(_)) => StatusCode::CONFLICT,
                Error::Call(CallError::Offline(_)) => StatusCode::NOT_FOUND,
                Error::Call(CallError::CannotCallSelf) => StatusCode::BAD_REQUEST,
                Error::Call(CallError::UnknownSession(_)) => StatusCode::NOT_FOUND,
                Error::Stream(StreamError::BroadcasterAlreadyPresent(_)) => StatusCode::CONFLICT,
                Error::Stream(StreamError::NotBroadcaster(_) | StreamError::NotOwner(_)) => {
                    StatusCode::FORBIDDEN
                }
                Error::Stream(StreamError::UnknownStream(_) | StreamError::UnknownSession(_)) => {
                    StatusCode::NOT_FOUND
                }
                Error::Connection(ConnectionError::AlreadyAttached { .. }) => StatusCode::CONFLICT,
                Error::Connection(ConnectionError::UnknownConnection(_)) => StatusCode::NOT_FOUND,
                Error::Malformed(_) => StatusCode::BAD_REQUEST,
                Error::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            ApiError::Unavailable => "SERVICE_UNAVAILABLE",
            ApiError::Hub(Error::Unauthenticated) => "UNAUTHENTICATED",
            ApiError::Hub(Error::Call(CallError::Busy(_))) => "BUSY",
            ApiError::Hub(Error::Call(CallError::Offline(_))) => "OFFLINE",
            ApiError::Hub(Error::Stream(StreamError::BroadcasterAlreadyPresent(_))) => {
                "BROADCASTER_ALREADY_PRESENT"
            }
            _ => match self.status_code() {
                StatusCode::BAD_REQUEST => "BAD_REQUEST",
                StatusCode::FORBIDDEN => "FORBIDDEN",
                StatusCode::NOT_FOUND => "NOT_FOUND",
                StatusCode::CONFLICT => "CONFLICT",
                _ => "INTERNAL_ERROR",
            },
        }
    }
}

/// Structured error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(error_code = code, message = %message, "API error");
        } else {
            tracing::debug!(error_code = code, message = %message, "Client error");
        }

        (status, Json(ErrorResponse { error: message, code })).into_response()
    }
}

// ========== Authentication ==========

/// The user behind a request's bearer token
#[derive(Debug, Clone)]
pub struct AuthUser(pub UserId);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(bearer_token);

        Ok(AuthUser(state.hub.authenticate(token)?))
    }
}

// ========== Calls ==========

#[derive(Debug, Deserialize)]
pub struct StartCallRequest {
    pub callee_id: UserId,
    #[serde(rename = "type", default)]
    pub kind: CallKind,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StartCallResponse {
    pub call_id: CallId,
}

#[derive(Debug, Deserialize)]
pub struct CallAnswerRequest {
    pub caller_id: UserId,
}

async fn start_call(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Json(req): Json<StartCallRequest>,
) -> Result<Json<StartCallResponse>, ApiError> {
    let call_id = state.hub.start_call(&caller, &req.callee_id, req.kind).await?;
    Ok(Json(StartCallResponse { call_id }))
}

async fn accept_call(
    State(state): State<AppState>,
    AuthUser(callee): AuthUser,
    Path(call_id): Path<CallId>,
    Json(req): Json<CallAnswerRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .hub
        .accept_call(&callee, &call_id, &req.caller_id)
        .await?;
    Ok(StatusCode::OK)
}

async fn reject_call(
    State(state): State<AppState>,
    AuthUser(callee): AuthUser,
    Path(call_id): Path<CallId>,
    Json(req): Json<CallAnswerRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .hub
        .reject_call(&callee, &call_id, &req.caller_id)
        .await?;
    Ok(StatusCode::OK)
}

// ========== Streams ==========

#[derive(Debug, Serialize, Deserialize)]
pub struct EndStreamResponse {
    /// Room members that received `stream_ended`
    pub notified: usize,
}

async fn create_stream(
    State(state): State<AppState>,
    AuthUser(owner): AuthUser,
) -> Json<StreamSlot> {
    Json(state.hub.create_stream_slot(&owner).await)
}

async fn end_stream(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(stream_id): Path<StreamId>,
) -> Result<Json<EndStreamResponse>, ApiError> {
    let notified = state.hub.end_stream(&stream_id, &user).await?;
    Ok(Json(EndStreamResponse { notified }))
}

// ========== Stats ==========

async fn stats(State(state): State<AppState>, AuthUser(_): AuthUser) -> Json<HubStats> {
    Json(state.hub.stats().await)
}
