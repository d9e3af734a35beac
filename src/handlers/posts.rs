use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use tracing::{info, instrument};

use crate::app_state::AppState;
use crate::cache_policy::{list_key, post_detail_key, Invalidation, POSTS_LIST};
use crate::entities::{Post, PostDraft, PostEngagement, PostFilter, PostView};
use crate::error::{AppError, AppResult};
use crate::handlers::{
    parse_body, path_and_query, raw_json, to_json_bytes, CacheStatus, IdPath,
};
use crate::infrastructure::Vc;
use crate::pagination::PageParams;
use crate::permissions::{
    check, check_object, ResourceAccess, EDITOR_OR_ADMIN, OWNER_OR_EDITOR_OR_ADMIN,
};

/// `?author=<id>&post_type=<type>` on the post list
#[derive(Debug, Default, Deserialize)]
pub struct PostListQuery {
    pub author: Option<String>,
    pub post_type: Option<String>,
}

impl PostListQuery {
    fn into_filter(self) -> AppResult<PostFilter> {
        let author_id = match self.author.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(
                raw.parse::<i64>()
                    .map_err(|_| AppError::field("author", "Enter a number."))?,
            ),
        };
        let post_type = match self.post_type.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(raw.parse()?),
        };
        Ok(PostFilter {
            author_id,
            post_type,
        })
    }
}

fn access_of(post: &Post) -> ResourceAccess {
    ResourceAccess {
        author_id: post.author_id,
        privacy: post.privacy,
        actor_is_friend: false,
    }
}

fn access_of_view(view: &PostView) -> ResourceAccess {
    ResourceAccess {
        author_id: view.author,
        privacy: view.privacy,
        actor_is_friend: false,
    }
}

/// Full post payload, including the derived comment and like data.
pub(crate) async fn post_view(state: &AppState, post: Post) -> AppResult<PostView> {
    let engagement = state.store.post_engagement(&post).await?;
    Ok(PostView::new(post, engagement))
}

async fn find_post(state: &AppState, post_id: i64) -> AppResult<Post> {
    state
        .store
        .find_post(post_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Post not found.".to_string()))
}

#[instrument(skip(state, vc, params, query, uri), fields(request_id = %vc.request_id))]
pub async fn list_posts(
    State(state): State<AppState>,
    vc: Vc,
    Query(params): Query<PageParams>,
    Query(query): Query<PostListQuery>,
    uri: Uri,
) -> AppResult<Response> {
    check(&vc, EDITOR_OR_ADMIN)?;

    let key = list_key(POSTS_LIST, path_and_query(&uri));
    if let Some(bytes) = state.cache.get(&key).await {
        return Ok(raw_json(StatusCode::OK, bytes, CacheStatus::Hit));
    }

    let filter = query.into_filter()?;
    let count = state.store.count_posts(&filter).await?;
    let request = state.paginator.request(&params, count)?;
    let posts = state.store.list_posts(&filter, request.window()).await?;

    let mut views = Vec::with_capacity(posts.len());
    for post in posts {
        views.push(post_view(&state, post).await?);
    }

    let bytes = to_json_bytes(&state.paginator.page(request, count, views, &uri))?;
    state.cache.set(&key, bytes.clone()).await;
    Ok(raw_json(StatusCode::OK, bytes, CacheStatus::Miss))
}

#[instrument(skip(state, vc, body), fields(request_id = %vc.request_id))]
pub async fn create_post(
    State(state): State<AppState>,
    vc: Vc,
    body: Bytes,
) -> AppResult<Response> {
    check(&vc, EDITOR_OR_ADMIN)?;
    let actor = vc.require_user()?;
    let draft: PostDraft = parse_body(&body)?;

    let default_privacy = state
        .store
        .privacy_settings(actor.id)
        .await?
        .map(|settings| settings.post_default)
        .unwrap_or_default();
    let new_post = draft.validate(actor.id, default_privacy)?;

    let post = state.store.create_post(new_post).await?;
    state.cache.invalidate(Invalidation::post_created()).await;
    info!("User {} created {} post {}", actor.id, post.post_type, post.id);

    let view = PostView::new(
        post,
        PostEngagement {
            author_username: actor.username.clone(),
            ..Default::default()
        },
    );
    Ok((StatusCode::CREATED, Json(view)).into_response())
}

#[instrument(skip(state, vc), fields(request_id = %vc.request_id))]
pub async fn get_post(
    State(state): State<AppState>,
    vc: Vc,
    IdPath(post_id): IdPath,
) -> AppResult<Response> {
    check(&vc, OWNER_OR_EDITOR_OR_ADMIN)?;

    let key = post_detail_key(post_id);
    if let Some(bytes) = state.cache.get(&key).await {
        // Decoded only to run the object gate; the stored bytes are what gets returned.
        if let Ok(cached) = serde_json::from_slice::<PostView>(&bytes) {
            check_object(&vc, OWNER_OR_EDITOR_OR_ADMIN, &access_of_view(&cached))?;
            return Ok(raw_json(StatusCode::OK, bytes, CacheStatus::Hit));
        }
    }

    let post = find_post(&state, post_id).await?;
    check_object(&vc, OWNER_OR_EDITOR_OR_ADMIN, &access_of(&post))?;

    let bytes = to_json_bytes(&post_view(&state, post).await?)?;
    state.cache.set(&key, bytes.clone()).await;
    Ok(raw_json(StatusCode::OK, bytes, CacheStatus::Miss))
}

#[instrument(skip(state, vc), fields(request_id = %vc.request_id))]
pub async fn delete_post(
    State(state): State<AppState>,
    vc: Vc,
    IdPath(post_id): IdPath,
) -> AppResult<Response> {
    check(&vc, OWNER_OR_EDITOR_OR_ADMIN)?;

    let post = find_post(&state, post_id).await?;
    check_object(&vc, OWNER_OR_EDITOR_OR_ADMIN, &access_of(&post))?;

    if !state.store.delete_post(post.id).await? {
        return Err(AppError::NotFound("Post not found.".to_string()));
    }
    state.cache.invalidate(Invalidation::post_deleted(post.id)).await;
    info!("Deleted post {}", post.id);

    Ok(StatusCode::NO_CONTENT.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_filters_are_ignored() {
        let filter = PostListQuery {
            author: Some(" ".to_string()),
            post_type: None,
        }
        .into_filter()
        .unwrap();
        assert_eq!(filter.author_id, None);
        assert_eq!(filter.post_type, None);
    }

    #[test]
    fn unknown_post_type_filter_is_rejected() {
        let err = PostListQuery {
            author: None,
            post_type: Some("poll".to_string()),
        }
        .into_filter()
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn non_numeric_author_filter_is_rejected() {
        let err = PostListQuery {
            author: Some("alice".to_string()),
            post_type: None,
        }
        .into_filter()
        .unwrap_err();
        assert!(matches!(err, AppError::InvalidFields(_)));
    }
}
