//! Persistence seams.
//!
//! Handlers and services only ever see these traits; `main` wires in the
//! Postgres implementation and tests wire in [`memory::MemoryStore`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::chat::{AiModel, AppMessage, ChatRecord, MessageRecord};
use crate::models::meal::{FoodItem, Meal, MealType, NewFoodItem};
use crate::models::user::{ProfileUpdate, RefreshToken, User};

#[cfg(test)]
pub mod memory;
pub mod postgres;

pub use postgres::PgStore;

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Cheap round-trip used by readiness checks.
    async fn ping(&self) -> AppResult<()>;

    /// Fails with `Conflict` when the email is already registered.
    async fn create_user(&self, user: &User) -> AppResult<()>;

    async fn get_user(&self, id: Uuid) -> AppResult<Option<User>>;

    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>>;

    async fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> AppResult<User>;

    async fn set_password_hash(&self, id: Uuid, password_hash: &str) -> AppResult<()>;

    async fn store_refresh_token(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
        parent_token_id: Option<Uuid>,
    ) -> AppResult<Uuid>;

    async fn find_refresh_token(&self, token_hash: &str) -> AppResult<Option<RefreshToken>>;

    async fn revoke_refresh_token(&self, id: Uuid) -> AppResult<()>;

    async fn revoke_all_refresh_tokens(&self, user_id: Uuid) -> AppResult<()>;

    async fn store_reset_token(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> AppResult<()>;

    /// Marks an unexpired, unused reset token as used and returns its user.
    async fn consume_reset_token(&self, token_hash: &str) -> AppResult<Option<Uuid>>;
}

#[async_trait]
pub trait MealStore: Send + Sync {
    /// Meals of `user_id` with `start <= date < end`.
    async fn meals_in_range(
        &self,
        user_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<Vec<Meal>>;

    async fn get_meal(&self, id: Uuid) -> AppResult<Option<Meal>>;

    /// Returns the meal for (user, type, day start), creating it if absent.
    /// Atomic: concurrent callers get the same meal.
    async fn get_or_create_meal(
        &self,
        user_id: Uuid,
        meal_type: MealType,
        date: DateTime<Utc>,
    ) -> AppResult<Meal>;

    /// Deletes the meal and its food items.
    async fn delete_meal(&self, id: Uuid) -> AppResult<bool>;

    /// Deletes meals that have no food items and were created before `before`.
    async fn delete_empty_meals(&self, before: DateTime<Utc>) -> AppResult<u64>;

    async fn food_items_for_meal(&self, meal_id: Uuid) -> AppResult<Vec<FoodItem>>;

    async fn get_food_item(&self, id: Uuid) -> AppResult<Option<FoodItem>>;

    async fn insert_food_item(&self, item: NewFoodItem) -> AppResult<FoodItem>;

    async fn update_food_item(&self, item: &FoodItem) -> AppResult<()>;

    async fn delete_food_item(&self, id: Uuid) -> AppResult<bool>;
}

#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn chats_for_owner(&self, owner: Uuid) -> AppResult<Vec<ChatRecord>>;

    async fn get_chat(&self, id: Uuid) -> AppResult<Option<ChatRecord>>;

    async fn create_chat(&self, owner: Uuid, at: DateTime<Utc>) -> AppResult<ChatRecord>;

    /// Deletes the chat and its messages.
    async fn delete_chat(&self, id: Uuid) -> AppResult<bool>;

    async fn update_chat_title(&self, id: Uuid, title: &str) -> AppResult<bool>;

    async fn bind_chat_model(&self, id: Uuid, model: AiModel) -> AppResult<()>;

    /// Messages ordered by `created_at` ascending.
    async fn messages_for_chat(&self, chat_id: Uuid) -> AppResult<Vec<MessageRecord>>;

    /// Persists the message, bumps the chat's `last_message_sent`, and returns
    /// the storage-assigned id.
    async fn add_message(&self, message: &AppMessage) -> AppResult<Uuid>;
}
