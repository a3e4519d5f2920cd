//! The list of advisor chats a user owns, plus live updates.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::chat::{AppChat, ChatRecord};
use crate::store::ChatStore;

/// Something changed in `owner`'s chat list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatEvent {
    pub owner: Uuid,
}

/// Process-wide fan-out of chat changes.
#[derive(Clone)]
pub struct ChatFeed {
    tx: broadcast::Sender<ChatEvent>,
}

impl ChatFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, owner: Uuid) {
        // no receivers is fine
        let _ = self.tx.send(ChatEvent { owner });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.tx.subscribe()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "chats", rename_all = "snake_case")]
pub enum CatalogState {
    NoResults,
    Found(Vec<AppChat>),
}

#[derive(Clone)]
pub struct ChatCatalog {
    store: Arc<dyn ChatStore>,
    feed: ChatFeed,
}

impl ChatCatalog {
    pub fn new(store: Arc<dyn ChatStore>, feed: ChatFeed) -> Self {
        Self { store, feed }
    }

    /// Chats of `owner`, most recently active first.
    pub async fn fetch_data(&self, owner: Uuid) -> AppResult<CatalogState> {
        let mut chats: Vec<AppChat> = self
            .store
            .chats_for_owner(owner)
            .await?
            .into_iter()
            .filter_map(|record| {
                let id = record.id;
                AppChat::try_from(record)
                    .map_err(|e| tracing::warn!(chat_id = %id, error = %e, "Skipping undecodable chat"))
                    .ok()
            })
            .collect();

        if chats.is_empty() {
            return Ok(CatalogState::NoResults);
        }
        chats.sort_by(|a, b| b.last_message_sent.cmp(&a.last_message_sent));
        Ok(CatalogState::Found(chats))
    }

    pub async fn create_chat(&self, owner: Uuid) -> AppResult<Uuid> {
        let chat = self.store.create_chat(owner, Utc::now()).await?;
        tracing::info!(user_id = %owner, chat_id = %chat.id, "Chat created");
        self.feed.publish(owner);
        Ok(chat.id)
    }

    pub async fn delete_chat(&self, owner: Uuid, chat_id: Uuid) -> AppResult<()> {
        self.owned(owner, chat_id).await?;
        self.store.delete_chat(chat_id).await?;
        tracing::info!(user_id = %owner, chat_id = %chat_id, "Chat deleted");
        self.feed.publish(owner);
        Ok(())
    }

    pub async fn update_chat_title(&self, owner: Uuid, chat_id: Uuid, title: &str) -> AppResult<()> {
        let title = title.trim();
        if title.is_empty() {
            return Err(AppError::Validation("Title cannot be empty".into()));
        }
        self.owned(owner, chat_id).await?;
        self.store.update_chat_title(chat_id, title).await?;
        self.feed.publish(owner);
        Ok(())
    }

    async fn owned(&self, owner: Uuid, chat_id: Uuid) -> AppResult<ChatRecord> {
        self.store
            .get_chat(chat_id)
            .await?
            .filter(|c| c.owner == owner)
            .ok_or(AppError::NotFound("Chat not found".into()))
    }

    pub fn subscription(&self, owner: Uuid) -> CatalogSubscription {
        CatalogSubscription {
            catalog: self.clone(),
            owner,
            rx: None,
        }
    }
}

/// A live view of one owner's catalog.
pub struct CatalogSubscription {
    catalog: ChatCatalog,
    owner: Uuid,
    rx: Option<broadcast::Receiver<ChatEvent>>,
}

impl CatalogSubscription {
    /// Starts listening. Returns `false` if already subscribed.
    pub fn subscribe(&mut self) -> bool {
        if self.rx.is_some() {
            return false;
        }
        self.rx = Some(self.catalog.feed.subscribe());
        true
    }

    pub fn is_subscribed(&self) -> bool {
        self.rx.is_some()
    }

    /// Waits for the next change to this owner's chats and returns a fresh
    /// snapshot. `None` once the feed is gone or before `subscribe`.
    pub async fn next_snapshot(&mut self) -> Option<AppResult<CatalogState>> {
        let rx = self.rx.as_mut()?;
        loop {
            match rx.recv().await {
                Ok(event) if event.owner == self.owner => break,
                Ok(_) => continue,
                // missed events may include ours
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Chat feed lagged");
                    break;
                }
                Err(RecvError::Closed) => return None,
            }
        }
        Some(self.catalog.fetch_data(self.owner).await)
    }
}
