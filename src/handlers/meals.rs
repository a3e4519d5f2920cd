use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use uuid::Uuid;

use crate::auth::middleware::AuthUser;
use crate::dto::{CreateFoodItemRequest, DayQuery, MoveFoodItemRequest};
use crate::error::{AppError, AppResult};
use crate::models::meal::{DayWindow, FoodItem};
use crate::services::food_analysis::AnalyzedFood;
use crate::services::meal_aggregator::{DashboardState, FoodItemPatch, MealAggregator};
use crate::AppState;

async fn target_calories(state: &AppState, user_id: Uuid) -> AppResult<Option<String>> {
    Ok(state
        .users
        .get_user(user_id)
        .await?
        .and_then(|u| u.target_calories))
}

/// Fetches the day and flags it against the user's target.
async fn dashboard_for(
    state: &AppState,
    user_id: Uuid,
    window: DayWindow,
) -> AppResult<DashboardState> {
    let mut aggregator = MealAggregator::new(state.meals.clone(), user_id, window);
    aggregator.fetch_meals().await?;
    aggregator.check_calorie_target(target_calories(state, user_id).await?.as_deref());
    Ok(aggregator.into_state())
}

pub async fn dashboard(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<DayQuery>,
) -> AppResult<Json<DashboardState>> {
    let window = query.window()?;
    Ok(Json(dashboard_for(&state, auth_user.id, window).await?))
}

/// Raw image body. Rejects non-food photos before any estimate is made.
pub async fn analyze_photo(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    body: Bytes,
) -> AppResult<Json<AnalyzedFood>> {
    if body.is_empty() {
        return Err(AppError::Validation("Image body is required".into()));
    }
    tracing::debug!(user_id = %auth_user.id, size = body.len(), "Analyzing photo");
    Ok(Json(state.analysis.analyze(body).await?))
}

pub async fn create_food_item(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(body): Json<CreateFoodItemRequest>,
) -> AppResult<(StatusCode, Json<FoodItem>)> {
    let window = body.day.window()?;
    let mut aggregator = MealAggregator::new(state.meals.clone(), auth_user.id, window);
    let item = aggregator.save_food_item(body.item).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn update_food_item(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(body): Json<FoodItemPatch>,
) -> AppResult<Json<FoodItem>> {
    let window = DayWindow::utc(Utc::now().date_naive());
    let mut aggregator = MealAggregator::new(state.meals.clone(), auth_user.id, window);
    Ok(Json(aggregator.update_food_item(id, body).await?))
}

pub async fn delete_food_item(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let window = DayWindow::utc(Utc::now().date_naive());
    let mut aggregator = MealAggregator::new(state.meals.clone(), auth_user.id, window);
    aggregator.delete_food_item(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Moves the item within the day it was logged on and returns that day.
pub async fn move_food_item(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(body): Json<MoveFoodItemRequest>,
) -> AppResult<Json<DashboardState>> {
    let offset = DayQuery {
        date: None,
        utc_offset_minutes: body.utc_offset_minutes,
    }
    .window()?
    .offset;

    let (_, meal) = MealAggregator::locate(state.meals.as_ref(), auth_user.id, id).await?;
    let window = DayWindow::containing(meal.date, offset);

    let mut aggregator = MealAggregator::new(state.meals.clone(), auth_user.id, window);
    aggregator.fetch_meals().await?;
    aggregator.move_food_item(body.meal_type, id).await?;
    aggregator.check_calorie_target(target_calories(&state, auth_user.id).await?.as_deref());
    Ok(Json(aggregator.into_state()))
}

/// Removes the meal and every food item in it.
pub async fn delete_meal(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let window = DayWindow::utc(Utc::now().date_naive());
    let mut aggregator = MealAggregator::new(state.meals.clone(), auth_user.id, window);
    aggregator.delete_meal(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
