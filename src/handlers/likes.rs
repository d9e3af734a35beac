use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{StatusCode, Uri},
    response::IntoResponse,
    Json,
};
use tracing::{info, instrument};

use crate::app_state::AppState;
use crate::cache_policy::{Invalidation, ALL_LIKES};
use crate::entities::{LikeDraft, LikeView};
use crate::error::{AppError, AppResult};
use crate::handlers::{parse_body, to_json_bytes, IdPath};
use crate::infrastructure::Vc;
use crate::pagination::PageParams;
use crate::permissions::{check, check_object, ResourceAccess, AUTHENTICATED, OWNER_OR_ADMIN};

#[instrument(skip(state, vc, uri), fields(request_id = %vc.request_id))]
pub async fn list_likes(
    State(state): State<AppState>,
    vc: Vc,
    Query(params): Query<PageParams>,
    uri: Uri,
) -> AppResult<impl IntoResponse> {
    check(&vc, AUTHENTICATED)?;

    let likes = match state.cache.get_json::<Vec<LikeView>>(ALL_LIKES).await {
        Some(likes) => likes,
        None => {
            let likes: Vec<LikeView> = state
                .store
                .list_likes()
                .await?
                .iter()
                .map(|like| like.view())
                .collect();
            state.cache.set(ALL_LIKES, to_json_bytes(&likes)?).await;
            likes
        }
    };

    Ok(Json(state.paginator.paginate(likes, &params, &uri)?))
}

/// Liking twice yields 400 "You have already liked this post." and leaves the
/// existing like untouched.
#[instrument(skip(state, vc, body), fields(request_id = %vc.request_id))]
pub async fn create_like(
    State(state): State<AppState>,
    vc: Vc,
    body: Bytes,
) -> AppResult<impl IntoResponse> {
    check(&vc, AUTHENTICATED)?;
    let actor = vc.require_user()?;
    let draft: LikeDraft = parse_body(&body)?;
    let post_id = draft
        .post_id
        .ok_or_else(|| AppError::field("post_id", "This field is required."))?;

    if state.store.find_post(post_id).await?.is_none() {
        return Err(AppError::BadRequest("Post not found.".to_string()));
    }

    let like = state.store.create_like(actor.id, post_id).await?;
    state.cache.invalidate(Invalidation::like_changed(post_id)).await;
    info!("User {} liked post {}", actor.id, post_id);

    Ok((StatusCode::CREATED, Json(like.view())))
}

#[instrument(skip(state, vc), fields(request_id = %vc.request_id))]
pub async fn delete_like(
    State(state): State<AppState>,
    vc: Vc,
    IdPath(like_id): IdPath,
) -> AppResult<impl IntoResponse> {
    check(&vc, AUTHENTICATED)?;

    let like = state
        .store
        .find_like(like_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Like not found.".to_string()))?;
    check_object(&vc, OWNER_OR_ADMIN, &ResourceAccess::owned_by(like.user_id))?;

    state.store.delete_like(like.id).await?;
    state
        .cache
        .invalidate(Invalidation::like_changed(like.post_id))
        .await;
    info!("Removed like {} on post {}", like.id, like.post_id);

    Ok(StatusCode::NO_CONTENT)
}
