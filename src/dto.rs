//! Request and response bodies of the HTTP API.
//!
//! - `*Request` is deserialized from a JSON body or query string
//! - `*Response` is serialized back to the client
//! - field rules are expressed with `validator` derives

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::error::{AppError, AppResult};
use crate::models::chat::{AiModel, AppChat, AppMessage};
use crate::models::meal::{DayWindow, MealType};
use crate::services::meal_aggregator::FoodItemDraft;

pub const INVALID_FORM: &str = "Please fill in all required fields";
pub const INVALID_EMAIL: &str = "Please enter a valid email address";
pub const INVALID_PASSWORD: &str = "Password must be at least 8 characters";

/// Runs the derive rules and reports the first failure as a `Validation`
/// error. Fields are visited in name order so the message is stable.
pub fn validate_body<T: Validate>(body: &T) -> AppResult<()> {
    body.validate()
        .map_err(|errors| AppError::Validation(first_message(&errors)))
}

fn first_message(errors: &ValidationErrors) -> String {
    let fields = errors.field_errors();
    let mut names: Vec<&&str> = fields.keys().collect();
    names.sort();
    names
        .first()
        .and_then(|name| fields[**name].first())
        .and_then(|e| e.message.as_ref())
        .map(|m| m.to_string())
        .unwrap_or_else(|| INVALID_FORM.to_string())
}

fn require_all(fields: &[&str]) -> AppResult<()> {
    if fields.iter().any(|f| f.trim().is_empty()) {
        return Err(AppError::Validation(INVALID_FORM.into()));
    }
    Ok(())
}

fn whole_number(value: &str) -> Result<(), ValidationError> {
    match value.trim().parse::<u32>() {
        Ok(_) => Ok(()),
        Err(_) => {
            let mut err = ValidationError::new("whole_number");
            err.message = Some("Target calories must be a whole number".into());
            Err(err)
        }
    }
}

// ---------------------------------------------------------------------------
// Common
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct IdResponse {
    pub id: Uuid,
}

/// `?date=YYYY-MM-DD&utc_offset_minutes=N`; both optional.
#[derive(Debug, Default, Deserialize)]
pub struct DayQuery {
    pub date: Option<NaiveDate>,
    pub utc_offset_minutes: Option<i32>,
}

impl DayQuery {
    /// Defaults to today in the client's offset, or UTC.
    pub fn window(&self) -> AppResult<DayWindow> {
        let now = Utc::now();
        let window = DayWindow::new(
            self.date.unwrap_or_else(|| now.date_naive()),
            self.utc_offset_minutes.unwrap_or(0),
        )
        .ok_or_else(|| AppError::Validation("utc_offset_minutes out of range".into()))?;

        let window = match self.date {
            Some(_) => window,
            None => DayWindow::containing(now, window.offset),
        };
        if window.checked_bounds().is_none() {
            return Err(AppError::Validation("date out of range".into()));
        }
        Ok(window)
    }
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

/// POST /api/auth/register and /api/auth/login
#[derive(Debug, Deserialize, Validate)]
pub struct CredentialsRequest {
    #[validate(email(message = "Please enter a valid email address"))]
    pub email: String,

    #[validate(length(min = 8, max = 128, message = "Password must be at least 8 characters"))]
    pub password: String,
}

impl CredentialsRequest {
    pub fn check(&self) -> AppResult<()> {
        require_all(&[&self.email, &self.password])?;
        validate_body(self)
    }
}

/// POST /api/auth/refresh
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// POST /api/auth/password-reset
#[derive(Debug, Deserialize, Validate)]
pub struct PasswordResetRequest {
    #[validate(email(message = "Please enter a valid email address"))]
    pub email: String,
}

/// POST /api/auth/password-reset/confirm
#[derive(Debug, Deserialize, Validate)]
pub struct PasswordResetConfirmRequest {
    pub token: String,

    #[validate(length(min = 8, max = 128, message = "Password must be at least 8 characters"))]
    pub new_password: String,
}

// ---------------------------------------------------------------------------
// Profile
// ---------------------------------------------------------------------------

/// PUT /api/me
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(max = 50))]
    pub username: Option<String>,
    #[validate(length(max = 100))]
    pub first_name: Option<String>,
    #[validate(length(max = 100))]
    pub last_name: Option<String>,
    #[validate(length(max = 30))]
    pub phone_number: Option<String>,
    #[validate(length(max = 500))]
    pub address: Option<String>,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
    #[validate(custom = "whole_number")]
    pub target_calories: Option<String>,
}

// ---------------------------------------------------------------------------
// Meals
// ---------------------------------------------------------------------------

/// POST /api/food-items
#[derive(Debug, Deserialize)]
pub struct CreateFoodItemRequest {
    #[serde(flatten)]
    pub item: FoodItemDraft,
    #[serde(flatten)]
    pub day: DayQuery,
}

/// POST /api/food-items/:id/move
#[derive(Debug, Deserialize)]
pub struct MoveFoodItemRequest {
    pub meal_type: MealType,
    pub utc_offset_minutes: Option<i32>,
}

// ---------------------------------------------------------------------------
// Chats
// ---------------------------------------------------------------------------

/// PUT /api/chats/:id/title
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateTitleRequest {
    #[validate(length(min = 1, max = 100, message = "Title must be 1-100 characters"))]
    pub title: String,
}

/// POST /api/chats/:id/messages and /messages/stream
#[derive(Debug, Deserialize, Validate)]
pub struct SendMessageRequest {
    #[validate(length(min = 1, max = 4000, message = "Message must be 1-4000 characters"))]
    pub text: String,
    /// Bound to the chat on its first message.
    #[serde(default)]
    pub model: AiModel,
}

#[derive(Debug, Serialize)]
pub struct ChatDetailResponse {
    pub chat: AppChat,
    pub topic: String,
    pub messages: Vec<AppMessage>,
}

#[derive(Debug, Serialize)]
pub struct ExchangeResponse {
    pub sent: AppMessage,
    pub reply: AppMessage,
}
