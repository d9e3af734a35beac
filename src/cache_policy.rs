// Cache keys and the invalidation set for each write
//
// List keys embed the full request path and query so every filter/page combination caches
// on its own. Detail keys embed the id. Aggregate keys cache a whole collection.

pub const ALL_USERS: &str = "all_users";
pub const ALL_LIKES: &str = "all_likes";
pub const NEWSFEED_POSTS: &str = "newsfeed_posts";

pub const POSTS_LIST: &str = "posts_list:";
pub const COMMENTS_LIST: &str = "comments_list:";
pub const LIKES_LIST: &str = "likes_list:";
pub const POST_DETAIL: &str = "post_detail:";

/// `<prefix><path?query>` for a list endpoint.
pub fn list_key(prefix: &str, path_and_query: &str) -> String {
    format!("{}{}", prefix, path_and_query)
}

pub fn post_detail_key(post_id: i64) -> String {
    format!("{}{}", POST_DETAIL, post_id)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheTarget {
    Key(String),
    Prefix(String),
}

/// Keys to drop after a successful write
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invalidation {
    targets: Vec<CacheTarget>,
}

impl Invalidation {
    pub fn targets(&self) -> &[CacheTarget] {
        &self.targets
    }

    fn key(mut self, key: impl Into<String>) -> Self {
        let target = CacheTarget::Key(key.into());
        if !self.targets.contains(&target) {
            self.targets.push(target);
        }
        self
    }

    fn prefix(mut self, prefix: &str) -> Self {
        let target = CacheTarget::Prefix(prefix.to_string());
        if !self.targets.contains(&target) {
            self.targets.push(target);
        }
        self
    }

    fn post_payloads(self) -> Self {
        self.prefix(POSTS_LIST).key(NEWSFEED_POSTS)
    }

    pub fn post_created() -> Self {
        Self::default().post_payloads()
    }

    /// Comments and likes of the post go with it.
    pub fn post_deleted(post_id: i64) -> Self {
        Self::default()
            .post_payloads()
            .key(post_detail_key(post_id))
            .prefix(COMMENTS_LIST)
            .prefix(LIKES_LIST)
            .key(ALL_LIKES)
    }

    /// Post payloads embed their comments.
    pub fn comment_created(post_id: i64) -> Self {
        Self::default()
            .prefix(COMMENTS_LIST)
            .key(post_detail_key(post_id))
            .post_payloads()
    }

    /// Post payloads embed like counts.
    pub fn like_changed(post_id: i64) -> Self {
        Self::default()
            .key(ALL_LIKES)
            .prefix(LIKES_LIST)
            .key(post_detail_key(post_id))
            .post_payloads()
    }

    pub fn user_changed() -> Self {
        Self::default().key(ALL_USERS)
    }

    /// A deleted user cascades through every post, comment and like.
    pub fn user_deleted() -> Self {
        Self::user_changed()
            .post_payloads()
            .prefix(POST_DETAIL)
            .prefix(COMMENTS_LIST)
            .prefix(LIKES_LIST)
            .key(ALL_LIKES)
    }
}
