use axum::{extract::State, response::IntoResponse, Json};
use tracing::{info, instrument};

use crate::app_state::AppState;
use crate::entities::{FollowOutcome, UnfollowOutcome, User, UserView};
use crate::error::{AppError, AppResult};
use crate::handlers::{message, IdPath};
use crate::infrastructure::Vc;
use crate::permissions::{check, AUTHENTICATED};

async fn find_target(state: &AppState, user_id: i64) -> AppResult<User> {
    state
        .store
        .find_user(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found.".to_string()))
}

#[instrument(skip(state, vc), fields(request_id = %vc.request_id))]
pub async fn follow(
    State(state): State<AppState>,
    vc: Vc,
    IdPath(target_id): IdPath,
) -> AppResult<impl IntoResponse> {
    check(&vc, AUTHENTICATED)?;
    let actor = vc.require_user()?;
    if actor.id == target_id {
        return Err(AppError::BadRequest("You cannot follow yourself.".to_string()));
    }
    let target = find_target(&state, target_id).await?;

    let text = match state.store.follow(actor.id, target.id).await? {
        FollowOutcome::Followed { mutual: true } => {
            info!("Users {} and {} are now friends", actor.id, target.id);
            format!("You and {} are now friends.", target.username)
        }
        FollowOutcome::Followed { mutual: false } => {
            format!("You are now following {}.", target.username)
        }
        FollowOutcome::AlreadyFollowing => {
            format!("You are already following {}.", target.username)
        }
    };
    Ok(message(text))
}

#[instrument(skip(state, vc), fields(request_id = %vc.request_id))]
pub async fn unfollow(
    State(state): State<AppState>,
    vc: Vc,
    IdPath(target_id): IdPath,
) -> AppResult<impl IntoResponse> {
    check(&vc, AUTHENTICATED)?;
    let actor = vc.require_user()?;
    let target = find_target(&state, target_id).await?;

    let text = match state.store.unfollow(actor.id, target.id).await? {
        UnfollowOutcome::Unfollowed => format!("You have unfollowed {}.", target.username),
        UnfollowOutcome::NotFollowing => format!("You are not following {}.", target.username),
    };
    Ok(message(text))
}

#[instrument(skip(state, vc), fields(request_id = %vc.request_id))]
pub async fn friends(
    State(state): State<AppState>,
    vc: Vc,
    IdPath(user_id): IdPath,
) -> AppResult<impl IntoResponse> {
    check(&vc, AUTHENTICATED)?;
    let user = find_target(&state, user_id).await?;

    let mut friends: Vec<UserView> = Vec::new();
    for friend_id in state.store.friends_of(user.id).await? {
        if let Some(friend) = state.store.find_user(friend_id).await? {
            friends.push(friend.view());
        }
    }
    Ok(Json(friends))
}
