//! One advisor conversation: its transcript and the AI replies to it.

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::chat_catalog::ChatFeed;
use crate::ai::{ChatTurn, FunctionGateway, RemoteFunction};
use crate::error::{AppError, AppResult};
use crate::models::chat::{AiModel, AppChat, AppMessage, Role};
use crate::store::ChatStore;

/// Ordered messages of a chat.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Transcript {
    pub messages: Vec<AppMessage>,
}

impl Transcript {
    /// Folds a streamed chunk into the transcript: extends a trailing
    /// assistant message or starts a new one. Empty deltas are ignored.
    pub fn apply_delta(&mut self, chat_id: Uuid, delta: &str) -> bool {
        if delta.is_empty() {
            return false;
        }
        match self.messages.last_mut() {
            Some(last) if last.role == Role::Assistant => last.text.push_str(delta),
            _ => self
                .messages
                .push(AppMessage::draft(chat_id, Role::Assistant, delta)),
        }
        true
    }

    pub fn turns(&self) -> Vec<ChatTurn> {
        self.messages
            .iter()
            .map(|m| ChatTurn {
                role: m.role,
                content: m.text.clone(),
            })
            .collect()
    }

    fn awaiting_reply(&self) -> bool {
        matches!(self.messages.last(), Some(m) if m.role == Role::User)
    }
}

#[derive(Debug, Deserialize)]
struct GeneratedReply {
    content: String,
}

/// How a streamed reply ended.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSummary {
    /// The persisted assistant message, if any text arrived.
    pub message: Option<AppMessage>,
    pub cancelled: bool,
}

enum StreamEnd {
    Finished,
    Cancelled,
    Stalled,
    Failed(AppError),
}

pub struct ChatSession {
    store: Arc<dyn ChatStore>,
    gateway: Arc<dyn FunctionGateway>,
    feed: ChatFeed,
    chat: AppChat,
    transcript: Transcript,
}

impl ChatSession {
    /// Opens `chat_id` for `owner` and loads its transcript.
    pub async fn open(
        store: Arc<dyn ChatStore>,
        gateway: Arc<dyn FunctionGateway>,
        feed: ChatFeed,
        owner: Uuid,
        chat_id: Uuid,
    ) -> AppResult<Self> {
        let chat = Self::load_chat(store.as_ref(), owner, chat_id).await?;
        let mut session = Self {
            store,
            gateway,
            feed,
            chat,
            transcript: Transcript::default(),
        };
        session.fetch_data().await?;
        Ok(session)
    }

    async fn load_chat(store: &dyn ChatStore, owner: Uuid, chat_id: Uuid) -> AppResult<AppChat> {
        let record = store
            .get_chat(chat_id)
            .await?
            .filter(|c| c.owner == owner)
            .ok_or(AppError::NotFound("Chat not found".into()))?;
        AppChat::try_from(record).map_err(|e| anyhow::anyhow!("Undecodable chat {chat_id}: {e}").into())
    }

    pub fn chat(&self) -> &AppChat {
        &self.chat
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Reloads chat metadata and messages.
    pub async fn fetch_data(&mut self) -> AppResult<()> {
        self.chat = Self::load_chat(self.store.as_ref(), self.chat.owner, self.chat.id).await?;
        self.transcript.messages = self
            .store
            .messages_for_chat(self.chat.id)
            .await?
            .into_iter()
            .filter_map(|record| {
                let id = record.id;
                AppMessage::try_from(record)
                    .map_err(|e| tracing::warn!(message_id = %id, error = %e, "Skipping undecodable message"))
                    .ok()
            })
            .collect();
        Ok(())
    }

    fn model(&self) -> AiModel {
        self.chat.model.unwrap_or_default()
    }

    /// Persists and appends a user message. The first message of a chat binds
    /// `model` to it.
    pub async fn send_message(&mut self, text: &str, model: AiModel) -> AppResult<AppMessage> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::Validation("Message cannot be empty".into()));
        }

        let first = self.transcript.messages.is_empty();
        let mut message = AppMessage::draft(self.chat.id, Role::User, text);
        message.id = self.store.add_message(&message).await?;
        self.chat.last_message_sent = self.chat.last_message_sent.max(message.created_at);
        self.transcript.messages.push(message.clone());

        if first && self.chat.model.is_none() {
            self.store.bind_chat_model(self.chat.id, model).await?;
            self.chat.model = Some(model);
            tracing::debug!(chat_id = %self.chat.id, model = model.as_str(), "Model bound to chat");
        }

        self.feed.publish(self.chat.owner);
        Ok(message)
    }

    async fn persist_reply(&mut self, index: usize) -> AppResult<AppMessage> {
        let id = self.store.add_message(&self.transcript.messages[index]).await?;
        let message = &mut self.transcript.messages[index];
        message.id = id;
        self.chat.last_message_sent = self.chat.last_message_sent.max(message.created_at);
        let message = message.clone();
        self.feed.publish(self.chat.owner);
        Ok(message)
    }

    /// Asks for a complete reply and appends it.
    pub async fn generate_response(&mut self) -> AppResult<AppMessage> {
        if !self.transcript.awaiting_reply() {
            return Err(AppError::Validation("No user message to reply to".into()));
        }

        let payload = json!({
            "messages": self.transcript.turns(),
            "model": self.model(),
        });
        let reply = self
            .gateway
            .call(RemoteFunction::GenerateResponse, payload)
            .await?;
        let reply: GeneratedReply = serde_json::from_value(reply)
            .map_err(|e| anyhow::anyhow!("generateResponse returned an unexpected shape: {e}"))?;

        self.transcript
            .messages
            .push(AppMessage::draft(self.chat.id, Role::Assistant, reply.content));
        let index = self.transcript.messages.len() - 1;
        self.persist_reply(index).await
    }

    /// Streams a reply, calling `on_delta` for every applied chunk. The reply
    /// is persisted once, after the stream ends, is cancelled, or fails; a
    /// failure is still returned after partial text has been saved.
    pub async fn stream_response<F>(
        &mut self,
        cancel: CancellationToken,
        idle_timeout: Duration,
        mut on_delta: F,
    ) -> AppResult<StreamSummary>
    where
        F: FnMut(&str) + Send,
    {
        if !self.transcript.awaiting_reply() {
            return Err(AppError::Validation("No user message to reply to".into()));
        }

        let mut deltas = self
            .gateway
            .stream_response(self.transcript.turns(), self.model())
            .await?;
        let reply_index = self.transcript.messages.len();

        let end = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break StreamEnd::Cancelled,
                next = tokio::time::timeout(idle_timeout, deltas.next()) => match next {
                    Err(_) => break StreamEnd::Stalled,
                    Ok(None) => break StreamEnd::Finished,
                    Ok(Some(Err(e))) => break StreamEnd::Failed(e),
                    Ok(Some(Ok(delta))) => {
                        if self.transcript.apply_delta(self.chat.id, &delta) {
                            on_delta(&delta);
                        }
                    }
                },
            }
        };

        let message = if self.transcript.messages.len() > reply_index {
            Some(self.persist_reply(reply_index).await?)
        } else {
            None
        };

        match end {
            StreamEnd::Finished => Ok(StreamSummary {
                message,
                cancelled: false,
            }),
            StreamEnd::Cancelled => {
                tracing::info!(chat_id = %self.chat.id, partial = message.is_some(), "Reply stream cancelled");
                Ok(StreamSummary {
                    message,
                    cancelled: true,
                })
            }
            StreamEnd::Stalled => Err(AppError::Upstream("AI stream went idle".into())),
            StreamEnd::Failed(e) => Err(e),
        }
    }
}
