//! WebSocket sessions
//!
//! One task reads client frames into the hub. A second task drains the
//! connection's outbound queue onto the socket, so a slow reader never
//! blocks fan-out.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{header::AUTHORIZATION, HeaderMap},
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::OwnedSemaphorePermit;

use super::auth::bearer_token;
use super::http::{ApiError, AppState};
use super::hub::Hub;
use crate::connection::{Outbound, UserId};

#[derive(Debug, Default, Deserialize)]
pub struct WsParams {
    /// Session token for clients that cannot set headers
    pub token: Option<String>,
}

/// Upgrade handler for `/ws`
///
/// A supplied token must resolve; without one the client attaches later
/// with `attach_user_session`, which carries its own token.
pub async fn upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let permit = match &state.connection_limit {
        Some(sem) => match Arc::clone(sem).try_acquire_owned() {
            Ok(permit) => Some(permit),
            Err(_) => {
                tracing::warn!("Connection rejected: limit reached");
                return Err(ApiError::Unavailable);
            }
        },
        None => None,
    };

    let token = headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(bearer_token)
        .or(params.token.as_deref());

    let user = match token {
        Some(token) => Some(state.hub.authenticate(Some(token))?),
        None => None,
    };

    let hub = Arc::clone(&state.hub);
    Ok(ws.on_upgrade(move |socket| serve(socket, hub, user, permit)))
}

async fn serve(
    socket: WebSocket,
    hub: Arc<Hub>,
    user: Option<UserId>,
    _permit: Option<OwnedSemaphorePermit>,
) {
    let (conn, mut outbound) = hub.open_connection().await;
    tracing::debug!(connection = %conn, "WebSocket opened");

    if let Some(user) = user {
        if let Err(e) = hub.attach(conn, &user).await {
            tracing::warn!(connection = %conn, error = %e, "Attach on upgrade failed");
        }
    }

    let (mut sink, mut stream) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            let message = match frame {
                Outbound::Event(event) => match event.to_json() {
                    Ok(text) => Message::Text(text.into()),
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to serialize event");
                        continue;
                    }
                },
                Outbound::Audio(pcm) => Message::Binary(pcm),
            };

            if sink.send(message).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => hub.handle_text(conn, text.as_str()).await,
            Ok(Message::Binary(_)) => {
                tracing::debug!(connection = %conn, "Ignoring binary frame from client");
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(connection = %conn, error = %e, "WebSocket read failed");
                break;
            }
        }
    }

    hub.disconnect(conn).await;
    writer.abort();
    tracing::debug!(connection = %conn, "WebSocket closed");
}
