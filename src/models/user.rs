use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

pub const DEFAULT_MAX_CALORIE_API_USAGE: i32 = 5;
pub const DEFAULT_MAX_ASSISTANT_TOKENS: i32 = 10000;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone_number: Option<String>,
    pub address: Option<String>,
    pub description: Option<String>,
    pub profile_image_url: Option<String>,
    // Quota ceilings; stored but not enforced yet.
    pub max_calorie_api_usage_num: i32,
    pub max_assistant_token_num: i32,
    pub target_calories: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(email: String, password_hash: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            email,
            password_hash,
            username: None,
            first_name: None,
            last_name: None,
            phone_number: None,
            address: None,
            description: None,
            profile_image_url: None,
            max_calorie_api_usage_num: DEFAULT_MAX_CALORIE_API_USAGE,
            max_assistant_token_num: DEFAULT_MAX_ASSISTANT_TOKENS,
            target_calories: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Daily target as an integer. `None` when unset or unparsable.
    pub fn target_calories_value(&self) -> Option<i64> {
        self.target_calories
            .as_deref()
            .and_then(|t| t.trim().parse().ok())
    }
}

/// Partial profile update; `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone_number: Option<String>,
    pub address: Option<String>,
    pub description: Option<String>,
    pub profile_image_url: Option<String>,
    pub target_calories: Option<String>,
}

impl ProfileUpdate {
    pub fn apply_to(self, user: &mut User) {
        if let Some(v) = self.username {
            user.username = Some(v);
        }
        if let Some(v) = self.first_name {
            user.first_name = Some(v);
        }
        if let Some(v) = self.last_name {
            user.last_name = Some(v);
        }
        if let Some(v) = self.phone_number {
            user.phone_number = Some(v);
        }
        if let Some(v) = self.address {
            user.address = Some(v);
        }
        if let Some(v) = self.description {
            user.description = Some(v);
        }
        if let Some(v) = self.profile_image_url {
            user.profile_image_url = Some(v);
        }
        if let Some(v) = self.target_calories {
            user.target_calories = Some(v);
        }
        user.updated_at = Utc::now();
    }
}

#[derive(Debug, Serialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone_number: Option<String>,
    pub address: Option<String>,
    pub description: Option<String>,
    pub profile_image_url: Option<String>,
    pub max_calorie_api_usage_num: i32,
    pub max_assistant_token_num: i32,
    pub target_calories: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserProfile {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            email: u.email,
            username: u.username,
            first_name: u.first_name,
            last_name: u.last_name,
            phone_number: u.phone_number,
            address: u.address,
            description: u.description,
            profile_image_url: u.profile_image_url,
            max_calorie_api_usage_num: u.max_calorie_api_usage_num,
            max_assistant_token_num: u.max_assistant_token_num,
            target_calories: u.target_calories,
            created_at: u.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub created_at: DateTime<Utc>,
}
