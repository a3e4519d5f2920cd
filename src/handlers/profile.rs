use axum::{body::Bytes, extract::State, Extension, Json};

use crate::auth::middleware::AuthUser;
use crate::dto::{validate_body, UpdateProfileRequest};
use crate::error::{AppError, AppResult};
use crate::models::user::{ProfileUpdate, UserProfile};
use crate::storage::PROFILE_IMAGES_FOLDER;
use crate::AppState;

pub async fn me(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<UserProfile>> {
    let user = state
        .users
        .get_user(auth_user.id)
        .await?
        .ok_or(AppError::NotFound("User not found".into()))?;
    Ok(Json(user.into()))
}

pub async fn update_me(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(body): Json<UpdateProfileRequest>,
) -> AppResult<Json<UserProfile>> {
    validate_body(&body)?;

    let update = ProfileUpdate {
        username: body.username,
        first_name: body.first_name,
        last_name: body.last_name,
        phone_number: body.phone_number,
        address: body.address,
        description: body.description,
        profile_image_url: None,
        target_calories: body.target_calories.map(|t| t.trim().to_string()),
    };
    let user = state.users.update_profile(auth_user.id, update).await?;
    Ok(Json(user.into()))
}

/// Raw image body; stored under `profile_images/`.
pub async fn upload_profile_image(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    body: Bytes,
) -> AppResult<Json<UserProfile>> {
    if body.is_empty() {
        return Err(AppError::Validation("Image body is required".into()));
    }

    let uploaded = state.images.upload_image(body, PROFILE_IMAGES_FOLDER).await?;
    let user = state
        .users
        .update_profile(
            auth_user.id,
            ProfileUpdate {
                profile_image_url: Some(uploaded.url),
                ..Default::default()
            },
        )
        .await?;
    tracing::info!(user_id = %auth_user.id, key = %uploaded.key, "Profile image updated");
    Ok(Json(user.into()))
}
