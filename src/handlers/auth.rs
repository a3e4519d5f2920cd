use axum::{extract::State, http::StatusCode, Extension, Json};
use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::auth::{
    jwt::{create_token_pair, generate_opaque_token, hash_token, verify_typed, TokenPair, TokenType},
    middleware::AuthUser,
    password::{hash_password, verify_password},
};
use crate::dto::{
    validate_body, CredentialsRequest, MessageResponse, PasswordResetConfirmRequest,
    PasswordResetRequest, RefreshRequest,
};
use crate::error::{AppError, AppResult};
use crate::models::user::User;
use crate::AppState;

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Creates a token pair and persists the refresh token's hash.
async fn issue_token_pair(
    state: &AppState,
    user_id: Uuid,
    email: &str,
    parent_token_id: Option<Uuid>,
) -> AppResult<TokenPair> {
    let tokens = create_token_pair(user_id, email, &state.config)?;
    let expires_at = Utc::now() + Duration::seconds(state.config.jwt_refresh_ttl_secs);
    state
        .users
        .store_refresh_token(
            user_id,
            &hash_token(&tokens.refresh_token),
            expires_at,
            parent_token_id,
        )
        .await?;
    Ok(tokens)
}

pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<CredentialsRequest>,
) -> AppResult<(StatusCode, Json<TokenPair>)> {
    body.check()?;

    let email = normalize_email(&body.email);
    let user = User::new(email, hash_password(&body.password)?);
    state.users.create_user(&user).await?;
    tracing::info!(user_id = %user.id, "User registered");

    let tokens = issue_token_pair(&state, user.id, &user.email, None).await?;
    Ok((StatusCode::CREATED, Json(tokens)))
}

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<CredentialsRequest>,
) -> AppResult<Json<TokenPair>> {
    body.check()?;

    let user = state
        .users
        .find_user_by_email(&normalize_email(&body.email))
        .await?
        .ok_or(AppError::InvalidCredentials)?;

    if !verify_password(&body.password, &user.password_hash)? {
        tracing::debug!(user_id = %user.id, "Password mismatch");
        return Err(AppError::InvalidCredentials);
    }

    let tokens = issue_token_pair(&state, user.id, &user.email, None).await?;
    Ok(Json(tokens))
}

pub async fn refresh(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> AppResult<Json<TokenPair>> {
    let claims = verify_typed(&body.refresh_token, TokenType::Refresh, &state.config)?;

    let stored = state
        .users
        .find_refresh_token(&hash_token(&body.refresh_token))
        .await?
        .ok_or(AppError::Unauthorized)?;

    // A revoked token coming back means it leaked; end every session.
    if stored.revoked {
        tracing::warn!(
            user_id = %stored.user_id,
            token_id = %stored.id,
            "Refresh token reuse detected, revoking all tokens for user"
        );
        state.users.revoke_all_refresh_tokens(stored.user_id).await?;
        return Err(AppError::Unauthorized);
    }

    if stored.user_id != claims.sub || stored.expires_at <= Utc::now() {
        return Err(AppError::Unauthorized);
    }

    state.users.revoke_refresh_token(stored.id).await?;
    let tokens = issue_token_pair(&state, claims.sub, &claims.email, Some(stored.id)).await?;
    Ok(Json(tokens))
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<MessageResponse>> {
    state.users.revoke_all_refresh_tokens(auth_user.id).await?;
    tracing::info!(user_id = %auth_user.id, email = %auth_user.email, "User signed out");
    Ok(Json(MessageResponse::new("Logged out successfully")))
}

/// Always answers the same way so the endpoint cannot be used to probe for
/// registered addresses.
pub async fn request_password_reset(
    State(state): State<AppState>,
    Json(body): Json<PasswordResetRequest>,
) -> AppResult<Json<MessageResponse>> {
    validate_body(&body)?;

    if let Some(user) = state
        .users
        .find_user_by_email(&normalize_email(&body.email))
        .await?
    {
        let token = generate_opaque_token();
        let expires_at = Utc::now() + Duration::seconds(state.config.password_reset_ttl_secs);
        state
            .users
            .store_reset_token(user.id, &hash_token(&token), expires_at)
            .await?;

        // No mailer is configured; the link is handed to the log pipeline.
        tracing::info!(
            user_id = %user.id,
            reset_link = %format!("{}/reset-password?token={}", state.config.frontend_url, token),
            "Password reset issued"
        );
    }

    Ok(Json(MessageResponse::new(
        "If that address is registered, a reset link has been sent",
    )))
}

pub async fn confirm_password_reset(
    State(state): State<AppState>,
    Json(body): Json<PasswordResetConfirmRequest>,
) -> AppResult<Json<MessageResponse>> {
    validate_body(&body)?;

    let user_id = state
        .users
        .consume_reset_token(&hash_token(body.token.trim()))
        .await?
        .ok_or_else(|| AppError::Validation("Reset link is invalid or has expired".into()))?;

    state
        .users
        .set_password_hash(user_id, &hash_password(&body.new_password)?)
        .await?;
    state.users.revoke_all_refresh_tokens(user_id).await?;
    tracing::info!(user_id = %user_id, "Password reset completed");

    Ok(Json(MessageResponse::new("Password updated")))
}
