use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::jwt::{verify_typed, TokenType};
use crate::error::AppResult;
use crate::services::chat_catalog::CatalogState;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    token: Option<String>,
}

/// Live chat list. Browsers can't set headers on upgrade, so the access
/// token comes in `?token=`.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
) -> Response {
    let user_id = match authenticate_ws(&state, query.token.as_deref()) {
        Ok(id) => id,
        Err(e) => {
            tracing::warn!("WebSocket auth failed: {}", e);
            return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
        }
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state, user_id))
}

fn authenticate_ws(state: &AppState, token: Option<&str>) -> Result<Uuid, &'static str> {
    let token = token.ok_or("Missing token query parameter")?;
    let claims = verify_typed(token, TokenType::Access, &state.config)
        .map_err(|_| "Invalid or expired access token")?;
    Ok(claims.sub)
}

fn snapshot_frame(snapshot: AppResult<CatalogState>) -> Option<String> {
    match snapshot {
        Ok(state) => serde_json::to_string(&state).ok(),
        Err(e) => {
            tracing::warn!(error = %e, "Chat snapshot failed");
            serde_json::to_string(&serde_json::json!({
                "status": "error",
                "message": e.client_message(),
            }))
            .ok()
        }
    }
}

async fn handle_socket(socket: WebSocket, state: AppState, user_id: Uuid) {
    let (mut sender, mut receiver) = socket.split();

    tracing::debug!(user_id = %user_id, "WebSocket connection established");

    let catalog = state.catalog();
    let mut subscription = catalog.subscription(user_id);
    // subscribe before the first read so no change slips between them
    subscription.subscribe();

    let mut send_task = tokio::spawn(async move {
        let initial = catalog.fetch_data(user_id).await;
        if let Some(frame) = snapshot_frame(initial) {
            if sender.send(Message::Text(frame)).await.is_err() {
                return;
            }
        }
        while let Some(snapshot) = subscription.next_snapshot().await {
            let Some(frame) = snapshot_frame(snapshot) else {
                continue;
            };
            if sender.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    tracing::debug!(user_id = %user_id, "WebSocket connection closed");
}
