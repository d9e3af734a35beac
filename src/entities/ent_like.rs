// EntLike - one like per (user, post)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const ALREADY_LIKED: &str = "You have already liked this post.";

#[derive(Debug, Clone, PartialEq)]
pub struct Like {
    pub id: i64,
    pub user_id: i64,
    pub post_id: i64,
    pub created_at: DateTime<Utc>,
}

impl Like {
    pub fn view(&self) -> LikeView {
        LikeView {
            id: self.id,
            user: self.user_id,
            post: self.post_id,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LikeDraft {
    #[serde(alias = "post")]
    pub post_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LikeView {
    pub id: i64,
    pub user: i64,
    pub post: i64,
    pub created_at: DateTime<Utc>,
}
