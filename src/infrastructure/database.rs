// Database Interface - Repository traits for every persisted entity
// Each repository exposes named queries; there is no implicit reverse traversal.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::entities::{
    Comment, FollowOutcome, Like, NewComment, NewPost, NewUser, Post, PostEngagement,
    PostFilter, PrivacySettings, Role, UnfollowOutcome, User,
};
use crate::error::AppResult;

/// Offset window used by paginated list queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub limit: i64,
    pub offset: i64,
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert the user together with default privacy settings and the group for
    /// its role. A taken username yields `AppError::Conflict`.
    async fn create_user(&self, user: NewUser) -> AppResult<User>;
    async fn find_user(&self, id: i64) -> AppResult<Option<User>>;
    async fn find_user_by_username(&self, username: &str) -> AppResult<Option<User>>;
    async fn list_users(&self) -> AppResult<Vec<User>>;
    /// Set the role and replace group membership with the role's group.
    async fn set_role(&self, user_id: i64, role: Role) -> AppResult<Option<User>>;
    async fn grant_permission(&self, user_id: i64, codename: &str) -> AppResult<()>;
    async fn delete_user(&self, user_id: i64) -> AppResult<bool>;
}

#[async_trait]
pub trait PrivacyRepository: Send + Sync {
    async fn privacy_settings(&self, user_id: i64) -> AppResult<Option<PrivacySettings>>;
    async fn save_privacy_settings(&self, settings: &PrivacySettings) -> AppResult<()>;
}

#[async_trait]
pub trait PostRepository: Send + Sync {
    async fn create_post(&self, post: NewPost) -> AppResult<Post>;
    async fn find_post(&self, id: i64) -> AppResult<Option<Post>>;
    async fn count_posts(&self, filter: &PostFilter) -> AppResult<i64>;
    /// Posts ordered by id ascending.
    async fn list_posts(&self, filter: &PostFilter, window: Window) -> AppResult<Vec<Post>>;
    /// All posts, newest first. Ties on `created_at` are broken by id descending.
    async fn newsfeed_posts(&self) -> AppResult<Vec<Post>>;
    async fn post_engagement(&self, post: &Post) -> AppResult<PostEngagement>;
    async fn delete_post(&self, id: i64) -> AppResult<bool>;
}

#[async_trait]
pub trait CommentRepository: Send + Sync {
    async fn create_comment(&self, comment: NewComment) -> AppResult<Comment>;
    async fn count_comments(&self, post_id: Option<i64>) -> AppResult<i64>;
    async fn list_comments(&self, post_id: Option<i64>, window: Window) -> AppResult<Vec<Comment>>;
    async fn find_comments_by_post(&self, post_id: i64) -> AppResult<Vec<Comment>>;
}

#[async_trait]
pub trait LikeRepository: Send + Sync {
    /// A second like for the same (user, post) yields `AppError::Conflict`.
    async fn create_like(&self, user_id: i64, post_id: i64) -> AppResult<Like>;
    async fn find_like(&self, id: i64) -> AppResult<Option<Like>>;
    async fn list_likes(&self) -> AppResult<Vec<Like>>;
    async fn count_likes_for_post(&self, post_id: i64) -> AppResult<i64>;
    async fn delete_like(&self, id: i64) -> AppResult<bool>;
}

#[async_trait]
pub trait FriendshipRepository: Send + Sync {
    async fn follow(&self, from_user_id: i64, to_user_id: i64) -> AppResult<FollowOutcome>;
    async fn unfollow(&self, from_user_id: i64, to_user_id: i64) -> AppResult<UnfollowOutcome>;
    /// Ids of users with an accepted friendship with `user_id`, in either direction.
    async fn friends_of(&self, user_id: i64) -> AppResult<Vec<i64>>;
}

/// Everything the handlers need from persistent storage.
pub trait EntityStore:
    UserRepository
    + PrivacyRepository
    + PostRepository
    + CommentRepository
    + LikeRepository
    + FriendshipRepository
{
}

impl<T> EntityStore for T where
    T: UserRepository
        + PrivacyRepository
        + PostRepository
        + CommentRepository
        + LikeRepository
        + FriendshipRepository
{
}

pub fn current_time_millis() -> i64 {
    Utc::now().timestamp_millis()
}

pub fn from_millis(millis: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(millis).unwrap_or_default()
}
