use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{ChatStore, MealStore, UserStore};
use crate::error::{AppError, AppResult};
use crate::models::chat::{AiModel, AppMessage, ChatRecord, MessageRecord};
use crate::models::meal::{FoodItem, Meal, MealType, NewFoodItem};
use crate::models::user::{ProfileUpdate, RefreshToken, User};

#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn ping(&self) -> AppResult<()> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.db)
            .await?;
        Ok(())
    }

    async fn create_user(&self, user: &User) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO users (
                id, email, password_hash, max_calorie_api_usage_num,
                max_assistant_token_num, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.max_calorie_api_usage_num)
        .bind(user.max_assistant_token_num)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::Conflict("Email already registered".into()));
        }
        Ok(())
    }

    async fn get_user(&self, id: Uuid) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE lower(email) = lower($1)")
            .bind(email)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> AppResult<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET
                username = COALESCE($2, username),
                first_name = COALESCE($3, first_name),
                last_name = COALESCE($4, last_name),
                phone_number = COALESCE($5, phone_number),
                address = COALESCE($6, address),
                description = COALESCE($7, description),
                profile_image_url = COALESCE($8, profile_image_url),
                target_calories = COALESCE($9, target_calories),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&update.username)
        .bind(&update.first_name)
        .bind(&update.last_name)
        .bind(&update.phone_number)
        .bind(&update.address)
        .bind(&update.description)
        .bind(&update.profile_image_url)
        .bind(&update.target_calories)
        .fetch_optional(&self.db)
        .await?
        .ok_or(AppError::NotFound("User not found".into()))?;

        Ok(user)
    }

    async fn set_password_hash(&self, id: Uuid, password_hash: &str) -> AppResult<()> {
        sqlx::query("UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn store_refresh_token(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
        parent_token_id: Option<Uuid>,
    ) -> AppResult<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (id, user_id, token_hash, expires_at, parent_token_id)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(token_hash)
        .bind(expires_at)
        .bind(parent_token_id)
        .execute(&self.db)
        .await?;
        Ok(id)
    }

    async fn find_refresh_token(&self, token_hash: &str) -> AppResult<Option<RefreshToken>> {
        let token = sqlx::query_as::<_, RefreshToken>(
            r#"
            SELECT id, user_id, token_hash, expires_at, revoked, created_at
            FROM refresh_tokens
            WHERE token_hash = $1
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.db)
        .await?;
        Ok(token)
    }

    async fn revoke_refresh_token(&self, id: Uuid) -> AppResult<()> {
        sqlx::query(
            "UPDATE refresh_tokens SET revoked = true, revoked_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn revoke_all_refresh_tokens(&self, user_id: Uuid) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked = true, revoked_at = NOW()
            WHERE user_id = $1 AND revoked = false
            "#,
        )
        .bind(user_id)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn store_reset_token(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO password_reset_tokens (id, user_id, token_hash, expires_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(token_hash)
        .bind(expires_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn consume_reset_token(&self, token_hash: &str) -> AppResult<Option<Uuid>> {
        let user_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            UPDATE password_reset_tokens SET used_at = NOW()
            WHERE token_hash = $1 AND used_at IS NULL AND expires_at > NOW()
            RETURNING user_id
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.db)
        .await?;
        Ok(user_id)
    }
}

#[async_trait]
impl MealStore for PgStore {
    async fn meals_in_range(
        &self,
        user_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<Vec<Meal>> {
        let meals = sqlx::query_as::<_, Meal>(
            r#"
            SELECT id, user_id, date, meal_type FROM meals
            WHERE user_id = $1 AND date >= $2 AND date < $3
            ORDER BY date ASC, created_at ASC
            "#,
        )
        .bind(user_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.db)
        .await?;
        Ok(meals)
    }

    async fn get_meal(&self, id: Uuid) -> AppResult<Option<Meal>> {
        let meal = sqlx::query_as::<_, Meal>(
            "SELECT id, user_id, date, meal_type FROM meals WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(meal)
    }

    async fn get_or_create_meal(
        &self,
        user_id: Uuid,
        meal_type: MealType,
        date: DateTime<Utc>,
    ) -> AppResult<Meal> {
        // No-op update so RETURNING yields the existing row on conflict
        let meal = sqlx::query_as::<_, Meal>(
            r#"
            INSERT INTO meals (id, user_id, meal_type, date)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, meal_type, date) DO UPDATE
                SET meal_type = meals.meal_type
            RETURNING id, user_id, date, meal_type
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(meal_type.as_str())
        .bind(date)
        .fetch_one(&self.db)
        .await?;
        Ok(meal)
    }

    async fn delete_meal(&self, id: Uuid) -> AppResult<bool> {
        // food_items.meal_id is ON DELETE CASCADE
        let result = sqlx::query("DELETE FROM meals WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_empty_meals(&self, before: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM meals m
            WHERE m.created_at < $1
              AND NOT EXISTS (SELECT 1 FROM food_items f WHERE f.meal_id = m.id)
            "#,
        )
        .bind(before)
        .execute(&self.db)
        .await?;
        Ok(result.rows_affected())
    }

    async fn food_items_for_meal(&self, meal_id: Uuid) -> AppResult<Vec<FoodItem>> {
        let items = sqlx::query_as::<_, FoodItem>(
            r#"
            SELECT id, meal_id, calorie_number, calorie_estimate, food_name, image_url, percentage_consumed
            FROM food_items
            WHERE meal_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(meal_id)
        .fetch_all(&self.db)
        .await?;
        Ok(items)
    }

    async fn get_food_item(&self, id: Uuid) -> AppResult<Option<FoodItem>> {
        let item = sqlx::query_as::<_, FoodItem>(
            r#"
            SELECT id, meal_id, calorie_number, calorie_estimate, food_name, image_url, percentage_consumed
            FROM food_items WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(item)
    }

    async fn insert_food_item(&self, item: NewFoodItem) -> AppResult<FoodItem> {
        let item = sqlx::query_as::<_, FoodItem>(
            r#"
            INSERT INTO food_items (id, meal_id, calorie_number, calorie_estimate, food_name, image_url, percentage_consumed)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, meal_id, calorie_number, calorie_estimate, food_name, image_url, percentage_consumed
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(item.meal_id)
        .bind(item.calorie_number)
        .bind(item.calorie_estimate)
        .bind(&item.food_name)
        .bind(&item.image_url)
        .bind(item.percentage_consumed)
        .fetch_one(&self.db)
        .await?;
        Ok(item)
    }

    async fn update_food_item(&self, item: &FoodItem) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE food_items SET
                meal_id = $2,
                calorie_number = $3,
                calorie_estimate = $4,
                food_name = $5,
                image_url = $6,
                percentage_consumed = $7
            WHERE id = $1
            "#,
        )
        .bind(item.id)
        .bind(item.meal_id)
        .bind(item.calorie_number)
        .bind(item.calorie_estimate)
        .bind(&item.food_name)
        .bind(&item.image_url)
        .bind(item.percentage_consumed)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Food item not found".into()));
        }
        Ok(())
    }

    async fn delete_food_item(&self, id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM food_items WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl ChatStore for PgStore {
    async fn chats_for_owner(&self, owner: Uuid) -> AppResult<Vec<ChatRecord>> {
        let chats = sqlx::query_as::<_, ChatRecord>(
            "SELECT id, owner, topic, model, last_message_sent FROM chats WHERE owner = $1",
        )
        .bind(owner)
        .fetch_all(&self.db)
        .await?;
        Ok(chats)
    }

    async fn get_chat(&self, id: Uuid) -> AppResult<Option<ChatRecord>> {
        let chat = sqlx::query_as::<_, ChatRecord>(
            "SELECT id, owner, topic, model, last_message_sent FROM chats WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(chat)
    }

    async fn create_chat(&self, owner: Uuid, at: DateTime<Utc>) -> AppResult<ChatRecord> {
        let chat = sqlx::query_as::<_, ChatRecord>(
            r#"
            INSERT INTO chats (id, owner, last_message_sent)
            VALUES ($1, $2, $3)
            RETURNING id, owner, topic, model, last_message_sent
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(owner)
        .bind(at)
        .fetch_one(&self.db)
        .await?;
        Ok(chat)
    }

    async fn delete_chat(&self, id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM chats WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_chat_title(&self, id: Uuid, title: &str) -> AppResult<bool> {
        let result = sqlx::query("UPDATE chats SET topic = $2 WHERE id = $1")
            .bind(id)
            .bind(title)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn bind_chat_model(&self, id: Uuid, model: AiModel) -> AppResult<()> {
        sqlx::query("UPDATE chats SET model = $2 WHERE id = $1")
            .bind(id)
            .bind(model.as_str())
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn messages_for_chat(&self, chat_id: Uuid) -> AppResult<Vec<MessageRecord>> {
        let messages = sqlx::query_as::<_, MessageRecord>(
            r#"
            SELECT id, chat_id, text, role, created_at FROM messages
            WHERE chat_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(chat_id)
        .fetch_all(&self.db)
        .await?;
        Ok(messages)
    }

    async fn add_message(&self, message: &AppMessage) -> AppResult<Uuid> {
        let mut tx = self.db.begin().await?;

        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO messages (id, chat_id, text, role, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(message.chat_id)
        .bind(&message.text)
        .bind(message.role.as_str())
        .bind(message.created_at)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE chats SET last_message_sent = GREATEST(last_message_sent, $2) WHERE id = $1",
        )
        .bind(message.chat_id)
        .bind(message.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(id)
    }
}
