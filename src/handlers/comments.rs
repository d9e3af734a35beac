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
use crate::cache_policy::{list_key, Invalidation, COMMENTS_LIST};
use crate::entities::{CommentDraft, CommentView};
use crate::error::{AppError, AppResult};
use crate::handlers::{parse_body, path_and_query, raw_json, to_json_bytes, CacheStatus};
use crate::infrastructure::Vc;
use crate::pagination::PageParams;
use crate::permissions::{check, AUTHENTICATED};

/// `?post=<id>` on the comment list
#[derive(Debug, Default, Deserialize)]
pub struct CommentListQuery {
    pub post: Option<String>,
}

impl CommentListQuery {
    fn post_id(&self) -> AppResult<Option<i64>> {
        match self.post.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => raw
                .parse()
                .map(Some)
                .map_err(|_| AppError::field("post", "A valid integer is required.")),
        }
    }
}

#[instrument(skip(state, vc, params, query, uri), fields(request_id = %vc.request_id))]
pub async fn list_comments(
    State(state): State<AppState>,
    vc: Vc,
    Query(params): Query<PageParams>,
    Query(query): Query<CommentListQuery>,
    uri: Uri,
) -> AppResult<Response> {
    check(&vc, AUTHENTICATED)?;

    let key = list_key(COMMENTS_LIST, path_and_query(&uri));
    if let Some(bytes) = state.cache.get(&key).await {
        return Ok(raw_json(StatusCode::OK, bytes, CacheStatus::Hit));
    }

    let post_id = query.post_id()?;
    let count = state.store.count_comments(post_id).await?;
    let request = state.paginator.request(&params, count)?;
    let comments: Vec<CommentView> = state
        .store
        .list_comments(post_id, request.window())
        .await?
        .iter()
        .map(|comment| comment.view())
        .collect();

    let bytes = to_json_bytes(&state.paginator.page(request, count, comments, &uri))?;
    state.cache.set(&key, bytes.clone()).await;
    Ok(raw_json(StatusCode::OK, bytes, CacheStatus::Miss))
}

#[instrument(skip(state, vc, body), fields(request_id = %vc.request_id))]
pub async fn create_comment(
    State(state): State<AppState>,
    vc: Vc,
    body: Bytes,
) -> AppResult<Response> {
    check(&vc, AUTHENTICATED)?;
    let actor = vc.require_user()?;
    let new_comment = parse_body::<CommentDraft>(&body)?.validate(actor.id)?;

    if state.store.find_post(new_comment.post_id).await?.is_none() {
        return Err(AppError::field("post", "Post not found."));
    }

    let comment = state.store.create_comment(new_comment).await?;
    state
        .cache
        .invalidate(Invalidation::comment_created(comment.post_id))
        .await;
    info!("User {} commented on post {}", actor.id, comment.post_id);

    Ok((StatusCode::CREATED, Json(comment.view())).into_response())
}
