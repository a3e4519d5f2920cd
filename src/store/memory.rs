//! In-process store used by unit and router tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{ChatStore, MealStore, UserStore};
use crate::error::{AppError, AppResult};
use crate::models::chat::{AiModel, AppMessage, ChatRecord, MessageRecord};
use crate::models::meal::{FoodItem, Meal, MealType, NewFoodItem};
use crate::models::user::{ProfileUpdate, RefreshToken, User};

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, User>,
    refresh_tokens: HashMap<Uuid, RefreshToken>,
    reset_tokens: Vec<(String, Uuid, DateTime<Utc>, bool)>,
    // (meal, created_at); insertion order is kept for stable reads
    meals: Vec<(Meal, DateTime<Utc>)>,
    food_items: Vec<FoodItem>,
    chats: Vec<ChatRecord>,
    messages: Vec<MessageRecord>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a raw meal row, bypassing meal-type validation.
    pub async fn insert_raw_meal(&self, meal: Meal) {
        self.inner.lock().await.meals.push((meal, Utc::now()));
    }

    /// Inserts a raw chat row, bypassing model validation.
    pub async fn insert_raw_chat(&self, chat: ChatRecord) {
        self.inner.lock().await.chats.push(chat);
    }

    /// Inserts a raw message row, bypassing role validation.
    pub async fn insert_raw_message(&self, message: MessageRecord) {
        self.inner.lock().await.messages.push(message);
    }

    pub async fn meal_count(&self) -> usize {
        self.inner.lock().await.meals.len()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }

    async fn create_user(&self, user: &User) -> AppResult<()> {
        let mut inner = self.inner.lock().await;
        if inner
            .users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(&user.email))
        {
            return Err(AppError::Conflict("Email already registered".into()));
        }
        inner.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn get_user(&self, id: Uuid) -> AppResult<Option<User>> {
        Ok(self.inner.lock().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        Ok(self
            .inner
            .lock()
            .await
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> AppResult<User> {
        let mut inner = self.inner.lock().await;
        let user = inner
            .users
            .get_mut(&id)
            .ok_or(AppError::NotFound("User not found".into()))?;
        update.apply_to(user);
        Ok(user.clone())
    }

    async fn set_password_hash(&self, id: Uuid, password_hash: &str) -> AppResult<()> {
        if let Some(user) = self.inner.lock().await.users.get_mut(&id) {
            user.password_hash = password_hash.to_string();
        }
        Ok(())
    }

    async fn store_refresh_token(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
        _parent_token_id: Option<Uuid>,
    ) -> AppResult<Uuid> {
        let id = Uuid::new_v4();
        self.inner.lock().await.refresh_tokens.insert(
            id,
            RefreshToken {
                id,
                user_id,
                token_hash: token_hash.to_string(),
                expires_at,
                revoked: false,
                created_at: Utc::now(),
            },
        );
        Ok(id)
    }

    async fn find_refresh_token(&self, token_hash: &str) -> AppResult<Option<RefreshToken>> {
        Ok(self
            .inner
            .lock()
            .await
            .refresh_tokens
            .values()
            .find(|t| t.token_hash == token_hash)
            .cloned())
    }

    async fn revoke_refresh_token(&self, id: Uuid) -> AppResult<()> {
        if let Some(t) = self.inner.lock().await.refresh_tokens.get_mut(&id) {
            t.revoked = true;
        }
        Ok(())
    }

    async fn revoke_all_refresh_tokens(&self, user_id: Uuid) -> AppResult<()> {
        for t in self.inner.lock().await.refresh_tokens.values_mut() {
            if t.user_id == user_id {
                t.revoked = true;
            }
        }
        Ok(())
    }

    async fn store_reset_token(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> AppResult<()> {
        self.inner
            .lock()
            .await
            .reset_tokens
            .push((token_hash.to_string(), user_id, expires_at, false));
        Ok(())
    }

    async fn consume_reset_token(&self, token_hash: &str) -> AppResult<Option<Uuid>> {
        let now = Utc::now();
        let mut inner = self.inner.lock().await;
        let found = inner
            .reset_tokens
            .iter_mut()
            .find(|(hash, _, expires_at, used)| hash == token_hash && !*used && *expires_at > now);
        Ok(found.map(|entry| {
            entry.3 = true;
            entry.1
        }))
    }
}

#[async_trait]
impl MealStore for MemoryStore {
    async fn meals_in_range(
        &self,
        user_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<Vec<Meal>> {
        Ok(self
            .inner
            .lock()
            .await
            .meals
            .iter()
            .map(|(m, _)| m)
            .filter(|m| m.user_id == user_id && m.date >= start && m.date < end)
            .cloned()
            .collect())
    }

    async fn get_meal(&self, id: Uuid) -> AppResult<Option<Meal>> {
        Ok(self
            .inner
            .lock()
            .await
            .meals
            .iter()
            .find(|(m, _)| m.id == id)
            .map(|(m, _)| m.clone()))
    }

    async fn get_or_create_meal(
        &self,
        user_id: Uuid,
        meal_type: MealType,
        date: DateTime<Utc>,
    ) -> AppResult<Meal> {
        let mut inner = self.inner.lock().await;
        if let Some((existing, _)) = inner
            .meals
            .iter()
            .find(|(m, _)| m.user_id == user_id && m.date == date && m.kind() == Some(meal_type))
        {
            return Ok(existing.clone());
        }
        let meal = Meal {
            id: Uuid::new_v4(),
            user_id,
            date,
            meal_type: meal_type.as_str().to_string(),
        };
        inner.meals.push((meal.clone(), Utc::now()));
        Ok(meal)
    }

    async fn delete_meal(&self, id: Uuid) -> AppResult<bool> {
        let mut inner = self.inner.lock().await;
        let before = inner.meals.len();
        inner.meals.retain(|(m, _)| m.id != id);
        inner.food_items.retain(|f| f.meal_id != id);
        Ok(inner.meals.len() < before)
    }

    async fn delete_empty_meals(&self, before: DateTime<Utc>) -> AppResult<u64> {
        let mut inner = self.inner.lock().await;
        let occupied: Vec<Uuid> = inner.food_items.iter().map(|f| f.meal_id).collect();
        let count = inner.meals.len();
        inner
            .meals
            .retain(|(m, created_at)| *created_at >= before || occupied.contains(&m.id));
        Ok((count - inner.meals.len()) as u64)
    }

    async fn food_items_for_meal(&self, meal_id: Uuid) -> AppResult<Vec<FoodItem>> {
        Ok(self
            .inner
            .lock()
            .await
            .food_items
            .iter()
            .filter(|f| f.meal_id == meal_id)
            .cloned()
            .collect())
    }

    async fn get_food_item(&self, id: Uuid) -> AppResult<Option<FoodItem>> {
        Ok(self
            .inner
            .lock()
            .await
            .food_items
            .iter()
            .find(|f| f.id == id)
            .cloned())
    }

    async fn insert_food_item(&self, item: NewFoodItem) -> AppResult<FoodItem> {
        let item = FoodItem {
            id: Uuid::new_v4(),
            meal_id: item.meal_id,
            calorie_number: item.calorie_number,
            calorie_estimate: item.calorie_estimate,
            food_name: item.food_name,
            image_url: item.image_url,
            percentage_consumed: item.percentage_consumed,
        };
        self.inner.lock().await.food_items.push(item.clone());
        Ok(item)
    }

    async fn update_food_item(&self, item: &FoodItem) -> AppResult<()> {
        let mut inner = self.inner.lock().await;
        let slot = inner
            .food_items
            .iter_mut()
            .find(|f| f.id == item.id)
            .ok_or(AppError::NotFound("Food item not found".into()))?;
        *slot = item.clone();
        Ok(())
    }

    async fn delete_food_item(&self, id: Uuid) -> AppResult<bool> {
        let mut inner = self.inner.lock().await;
        let before = inner.food_items.len();
        inner.food_items.retain(|f| f.id != id);
        Ok(inner.food_items.len() < before)
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn chats_for_owner(&self, owner: Uuid) -> AppResult<Vec<ChatRecord>> {
        Ok(self
            .inner
            .lock()
            .await
            .chats
            .iter()
            .filter(|c| c.owner == owner)
            .cloned()
            .collect())
    }

    async fn get_chat(&self, id: Uuid) -> AppResult<Option<ChatRecord>> {
        Ok(self
            .inner
            .lock()
            .await
            .chats
            .iter()
            .find(|c| c.id == id)
            .cloned())
    }

    async fn create_chat(&self, owner: Uuid, at: DateTime<Utc>) -> AppResult<ChatRecord> {
        let chat = ChatRecord {
            id: Uuid::new_v4(),
            owner,
            topic: None,
            model: None,
            last_message_sent: at,
        };
        self.inner.lock().await.chats.push(chat.clone());
        Ok(chat)
    }

    async fn delete_chat(&self, id: Uuid) -> AppResult<bool> {
        let mut inner = self.inner.lock().await;
        let before = inner.chats.len();
        inner.chats.retain(|c| c.id != id);
        inner.messages.retain(|m| m.chat_id != id);
        Ok(inner.chats.len() < before)
    }

    async fn update_chat_title(&self, id: Uuid, title: &str) -> AppResult<bool> {
        let mut inner = self.inner.lock().await;
        match inner.chats.iter_mut().find(|c| c.id == id) {
            Some(chat) => {
                chat.topic = Some(title.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn bind_chat_model(&self, id: Uuid, model: AiModel) -> AppResult<()> {
        if let Some(chat) = self.inner.lock().await.chats.iter_mut().find(|c| c.id == id) {
            chat.model = Some(model.as_str().to_string());
        }
        Ok(())
    }

    async fn messages_for_chat(&self, chat_id: Uuid) -> AppResult<Vec<MessageRecord>> {
        let mut messages: Vec<MessageRecord> = self
            .inner
            .lock()
            .await
            .messages
            .iter()
            .filter(|m| m.chat_id == chat_id)
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.created_at);
        Ok(messages)
    }

    async fn add_message(&self, message: &AppMessage) -> AppResult<Uuid> {
        let id = Uuid::new_v4();
        let mut inner = self.inner.lock().await;
        inner.messages.push(MessageRecord {
            id,
            chat_id: message.chat_id,
            text: message.text.clone(),
            role: message.role.as_str().to_string(),
            created_at: message.created_at,
        });
        if let Some(chat) = inner.chats.iter_mut().find(|c| c.id == message.chat_id) {
            chat.last_message_sent = chat.last_message_sent.max(message.created_at);
        }
        Ok(id)
    }
}
