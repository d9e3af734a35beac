use axum::{
    extract::{Query, State},
    http::Uri,
    response::IntoResponse,
    Json,
};
use std::collections::HashSet;
use tracing::{debug, instrument};

use crate::app_state::AppState;
use crate::cache_policy::NEWSFEED_POSTS;
use crate::entities::PostView;
use crate::error::AppResult;
use crate::handlers::posts::post_view;
use crate::handlers::to_json_bytes;
use crate::infrastructure::Vc;
use crate::pagination::PageParams;
use crate::permissions::{can_view_post, check, ResourceAccess, AUTHENTICATED};

/// Every post, newest first, cached as one collection under `newsfeed_posts`.
#[instrument(skip(state, vc, uri), fields(request_id = %vc.request_id))]
pub async fn newsfeed(
    State(state): State<AppState>,
    vc: Vc,
    Query(params): Query<PageParams>,
    uri: Uri,
) -> AppResult<impl IntoResponse> {
    check(&vc, AUTHENTICATED)?;

    let mut feed = match state.cache.get_json::<Vec<PostView>>(NEWSFEED_POSTS).await {
        Some(feed) => feed,
        None => {
            let posts = state.store.newsfeed_posts().await?;
            let mut feed = Vec::with_capacity(posts.len());
            for post in posts {
                feed.push(post_view(&state, post).await?);
            }
            state.cache.set(NEWSFEED_POSTS, to_json_bytes(&feed)?).await;
            feed
        }
    };

    if state.config.feed.privacy_filter {
        let actor = vc.require_user()?;
        let friends: HashSet<i64> = state.store.friends_of(actor.id).await?.into_iter().collect();
        let before = feed.len();
        feed.retain(|post| {
            can_view_post(
                &vc,
                &ResourceAccess {
                    author_id: post.author,
                    privacy: post.privacy,
                    actor_is_friend: friends.contains(&post.author),
                },
            )
        });
        debug!("Privacy filter hid {} of {} feed posts", before - feed.len(), before);
    }

    Ok(Json(state.paginator.paginate(feed, &params, &uri)?))
}
