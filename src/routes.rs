use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};

use crate::app_state::AppState;
use crate::handlers::{auth, comments, friendships, health, likes, newsfeed, posts, privacy, users};
use crate::infrastructure::middleware::viewer_context_middleware;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Authentication
        .route("/login", post(auth::login))
        .route("/register", post(auth::register))
        .route("/logout", post(auth::logout))
        .route("/protected", get(auth::protected))
        // Users and roles
        .route("/users", get(users::list_users).post(users::create_user))
        .route("/users/{id}", delete(users::delete_user))
        .route("/users/{id}/follow", post(friendships::follow))
        .route("/users/{id}/unfollow", post(friendships::unfollow))
        .route("/users/{id}/friends", get(friendships::friends))
        .route("/assign-role", post(users::assign_role))
        .route("/grant-permission", post(users::grant_permission))
        .route(
            "/privacy-settings",
            get(privacy::get_privacy_settings).patch(privacy::update_privacy_settings),
        )
        // Content
        .route("/posts", get(posts::list_posts).post(posts::create_post))
        .route("/posts/newsfeed", get(newsfeed::newsfeed))
        .route("/posts/{id}", get(posts::get_post).delete(posts::delete_post))
        .route("/comments", get(comments::list_comments).post(comments::create_comment))
        .route("/likes", get(likes::list_likes).post(likes::create_like))
        .route("/likes/{id}", delete(likes::delete_like))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            viewer_context_middleware,
        ))
        .route("/health", get(health))
        .with_state(state)
}
