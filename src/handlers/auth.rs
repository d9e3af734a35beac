use axum::{body::Bytes, extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::app_state::AppState;
use crate::cache_policy::Invalidation;
use crate::entities::{NewUser, RegistrationDraft};
use crate::error::{AppError, AppResult};
use crate::handlers::{message, parse_body};
use crate::infrastructure::Vc;
use crate::permissions::{check, AUTHENTICATED};

#[derive(Debug, Default, Deserialize)]
struct LoginRequest {
    username: Option<String>,
    password: Option<String>,
}

#[instrument(skip(state, body))]
pub async fn login(State(state): State<AppState>, body: Bytes) -> AppResult<impl IntoResponse> {
    let request: LoginRequest = parse_body(&body)?;
    let (Some(username), Some(password)) = (
        request.username.filter(|u| !u.is_empty()),
        request.password.filter(|p| !p.is_empty()),
    ) else {
        return Err(AppError::BadRequest(
            "Username and password are required.".to_string(),
        ));
    };

    let invalid = || AppError::BadRequest("Invalid credentials.".to_string());
    let user = state
        .store
        .find_user_by_username(&username)
        .await?
        .ok_or_else(invalid)?;
    if !state.security.verify_password(&password, &user.password_hash)? {
        warn!("Failed login for {}", username);
        return Err(invalid());
    }

    let issued = state.security.issue_token(&user)?;
    info!("User {} logged in", user.username);
    Ok(Json(json!({
        "message": "Authentication successful!",
        "token": issued.token,
        "expires_in": issued.expires_in,
        "user": user.view(),
    })))
}

#[instrument(skip(state, body))]
pub async fn register(
    State(state): State<AppState>,
    body: Bytes,
) -> AppResult<impl IntoResponse> {
    let draft: RegistrationDraft = parse_body(&body)?;
    let credentials = draft.validate(state.security.password_min_length())?;

    let password_hash = state.security.hash_password(&credentials.password)?;
    let user = state
        .store
        .create_user(NewUser {
            username: credentials.username,
            email: credentials.email,
            password_hash,
            role: credentials.role,
        })
        .await
        .map_err(|e| match e {
            AppError::Conflict(_) => {
                AppError::field("username", "A user with that username already exists.")
            }
            other => other,
        })?;
    state.cache.invalidate(Invalidation::user_changed()).await;

    let issued = state.security.issue_token(&user)?;
    info!("Registered user {} ({})", user.username, user.id);
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "user": user.view(),
            "token": issued.token,
            "expires_in": issued.expires_in,
        })),
    ))
}

/// Tokens are stateless; logging out only confirms the caller was authenticated.
#[instrument(skip(vc), fields(request_id = %vc.request_id))]
pub async fn logout(vc: Vc) -> AppResult<impl IntoResponse> {
    check(&vc, AUTHENTICATED)?;
    Ok(message("Successfully logged out."))
}

pub async fn protected(vc: Vc) -> AppResult<impl IntoResponse> {
    check(&vc, AUTHENTICATED)?;
    Ok(message("Authenticated!"))
}
