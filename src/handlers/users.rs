use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{StatusCode, Uri},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use tracing::{info, instrument};

use crate::app_state::AppState;
use crate::cache_policy::{Invalidation, ALL_USERS};
use crate::entities::{NewUser, Role, UserDraft, UserView, VIEW_PRIVATE_POST};
use crate::error::{AppError, AppResult};
use crate::handlers::{message, parse_body, to_json_bytes, IdPath};
use crate::infrastructure::Vc;
use crate::pagination::PageParams;
use crate::permissions::{check, ADMIN_ONLY};

#[instrument(skip(state, vc, uri), fields(request_id = %vc.request_id))]
pub async fn list_users(
    State(state): State<AppState>,
    vc: Vc,
    Query(params): Query<PageParams>,
    uri: Uri,
) -> AppResult<impl IntoResponse> {
    check(&vc, ADMIN_ONLY)?;

    let users = match state.cache.get_json::<Vec<UserView>>(ALL_USERS).await {
        Some(users) => users,
        None => {
            let users: Vec<UserView> = state
                .store
                .list_users()
                .await?
                .iter()
                .map(|user| user.view())
                .collect();
            state.cache.set(ALL_USERS, to_json_bytes(&users)?).await;
            users
        }
    };

    Ok(Json(state.paginator.paginate(users, &params, &uri)?))
}

#[instrument(skip(state, vc, body), fields(request_id = %vc.request_id))]
pub async fn create_user(
    State(state): State<AppState>,
    vc: Vc,
    body: Bytes,
) -> AppResult<impl IntoResponse> {
    check(&vc, ADMIN_ONLY)?;
    let credentials = parse_body::<UserDraft>(&body)?.validate()?;

    let password_hash = state.security.hash_password(&credentials.password)?;
    let user = state
        .store
        .create_user(NewUser {
            username: credentials.username,
            email: credentials.email,
            password_hash,
            role: credentials.role,
        })
        .await?;
    state.cache.invalidate(Invalidation::user_changed()).await;

    info!("Admin created user {} ({})", user.username, user.id);
    Ok((StatusCode::CREATED, Json(user.view())))
}

#[instrument(skip(state, vc), fields(request_id = %vc.request_id))]
pub async fn delete_user(
    State(state): State<AppState>,
    vc: Vc,
    IdPath(user_id): IdPath,
) -> AppResult<impl IntoResponse> {
    check(&vc, ADMIN_ONLY)?;
    if !state.store.delete_user(user_id).await? {
        return Err(AppError::NotFound("User not found.".to_string()));
    }
    state.cache.invalidate(Invalidation::user_deleted()).await;

    info!("Deleted user {}", user_id);
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Default, Deserialize)]
struct AssignRoleRequest {
    user_id: Option<i64>,
    role: Option<String>,
}

#[instrument(skip(state, vc, body), fields(request_id = %vc.request_id))]
pub async fn assign_role(
    State(state): State<AppState>,
    vc: Vc,
    body: Bytes,
) -> AppResult<impl IntoResponse> {
    check(&vc, ADMIN_ONLY)?;
    let request: AssignRoleRequest = parse_body(&body)?;
    let (Some(user_id), Some(role)) = (request.user_id, request.role) else {
        return Err(AppError::BadRequest(
            "User ID and role are required.".to_string(),
        ));
    };
    let role: Role = role.parse()?;

    let user = state
        .store
        .set_role(user_id, role)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found.".to_string()))?;
    state.cache.invalidate(Invalidation::user_changed()).await;

    info!("Assigned role {} to {}", role, user.username);
    Ok(message(format!(
        "Role {} assigned to user {}.",
        role, user.username
    )))
}

#[derive(Debug, Default, Deserialize)]
struct GrantPermissionRequest {
    user_id: Option<i64>,
    permission: Option<String>,
}

#[instrument(skip(state, vc, body), fields(request_id = %vc.request_id))]
pub async fn grant_permission(
    State(state): State<AppState>,
    vc: Vc,
    body: Bytes,
) -> AppResult<impl IntoResponse> {
    check(&vc, ADMIN_ONLY)?;
    let request: GrantPermissionRequest = parse_body(&body)?;
    let user_id = request
        .user_id
        .ok_or_else(|| AppError::field("user_id", "This field is required."))?;
    let codename = request
        .permission
        .unwrap_or_else(|| VIEW_PRIVATE_POST.to_string());
    if codename != VIEW_PRIVATE_POST {
        return Err(AppError::field("permission", "Unknown permission."));
    }

    let user = state
        .store
        .find_user(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found.".to_string()))?;
    state.store.grant_permission(user.id, &codename).await?;

    info!("Granted {} to {}", codename, user.username);
    Ok(message(format!(
        "Permission {} granted to user {}.",
        codename, user.username
    )))
}
