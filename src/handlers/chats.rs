use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    Extension, Json,
};
use futures_util::Stream;
use serde_json::json;
use std::convert::Infallible;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::auth::middleware::AuthUser;
use crate::dto::{
    validate_body, ChatDetailResponse, ExchangeResponse, IdResponse, MessageResponse,
    SendMessageRequest, UpdateTitleRequest,
};
use crate::error::AppResult;
use crate::services::chat_catalog::CatalogState;
use crate::services::chat_session::{ChatSession, StreamSummary};
use crate::AppState;

pub async fn list_chats(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<CatalogState>> {
    Ok(Json(state.catalog().fetch_data(auth_user.id).await?))
}

pub async fn create_chat(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<(StatusCode, Json<IdResponse>)> {
    let id = state.catalog().create_chat(auth_user.id).await?;
    Ok((StatusCode::CREATED, Json(IdResponse { id })))
}

pub async fn update_chat_title(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateTitleRequest>,
) -> AppResult<Json<MessageResponse>> {
    validate_body(&body)?;
    state
        .catalog()
        .update_chat_title(auth_user.id, id, &body.title)
        .await?;
    Ok(Json(MessageResponse::new("Title updated")))
}

pub async fn delete_chat(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state.catalog().delete_chat(auth_user.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn open_session(state: &AppState, owner: Uuid, chat_id: Uuid) -> AppResult<ChatSession> {
    ChatSession::open(
        state.chats.clone(),
        state.gateway.clone(),
        state.chat_feed.clone(),
        owner,
        chat_id,
    )
    .await
}

pub async fn get_messages(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ChatDetailResponse>> {
    let session = open_session(&state, auth_user.id, id).await?;
    Ok(Json(ChatDetailResponse {
        topic: session.chat().display_topic().to_string(),
        chat: session.chat().clone(),
        messages: session.transcript().messages.clone(),
    }))
}

/// Sends a message and waits for the complete reply.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(body): Json<SendMessageRequest>,
) -> AppResult<Json<ExchangeResponse>> {
    validate_body(&body)?;
    let mut session = open_session(&state, auth_user.id, id).await?;

    let sent = session.send_message(&body.text, body.model).await?;
    let reply = session.generate_response().await?;
    Ok(Json(ExchangeResponse { sent, reply }))
}

enum Outgoing {
    Delta(String),
    Done(StreamSummary),
    Failed(String),
}

fn event(name: &str, data: serde_json::Value) -> Event {
    Event::default().event(name).data(data.to_string())
}

/// Sends a message and streams the reply as server-sent events:
/// `sent`, then `delta`s, then `done` or `error`. Dropping the connection
/// cancels the stream; whatever arrived by then is kept.
pub async fn stream_message(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(body): Json<SendMessageRequest>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    validate_body(&body)?;
    let mut session = open_session(&state, auth_user.id, id).await?;
    let sent = session.send_message(&body.text, body.model).await?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();
    let idle_timeout = state.config.stream_idle_timeout();

    tokio::spawn(async move {
        let deltas = tx.clone();
        let result = session
            .stream_response(cancel, idle_timeout, move |delta| {
                let _ = deltas.send(Outgoing::Delta(delta.to_string()));
            })
            .await;

        let outcome = match result {
            Ok(summary) => Outgoing::Done(summary),
            Err(e) => {
                tracing::warn!(chat_id = %id, error = %e, "Reply stream failed");
                Outgoing::Failed(e.client_message())
            }
        };
        let _ = tx.send(outcome);
    });

    let sent = json!(sent);
    let stream = async_stream::stream! {
        // cancels the producer when the client goes away
        let _guard = guard;
        yield Ok(event("sent", sent));

        while let Some(outgoing) = rx.recv().await {
            match outgoing {
                Outgoing::Delta(text) => yield Ok(event("delta", json!({ "text": text }))),
                Outgoing::Done(summary) => {
                    yield Ok(event(
                        "done",
                        json!({ "message": summary.message, "cancelled": summary.cancelled }),
                    ));
                    break;
                }
                Outgoing::Failed(message) => {
                    yield Ok(event("error", json!({ "message": message })));
                    break;
                }
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
