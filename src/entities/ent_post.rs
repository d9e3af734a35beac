// EntPost - posts, their type-specific validation and serialized view

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::entities::ent_privacy_settings::PrivacyLevel;
use crate::error::{AppError, AppResult};

pub const TITLE_MAX_LENGTH: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostType {
    Text,
    Image,
    Video,
    Link,
}

impl PostType {
    pub const ALL: [PostType; 4] = [PostType::Text, PostType::Image, PostType::Video, PostType::Link];

    pub fn as_str(&self) -> &'static str {
        match self {
            PostType::Text => "text",
            PostType::Image => "image",
            PostType::Video => "video",
            PostType::Link => "link",
        }
    }

    /// Metadata key a post of this type must carry, if any.
    pub fn required_metadata(&self) -> Option<&'static str> {
        match self {
            PostType::Image => Some("file_size"),
            PostType::Video => Some("duration"),
            PostType::Text | PostType::Link => None,
        }
    }
}

impl fmt::Display for PostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PostType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PostType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| {
                let names: Vec<&str> = PostType::ALL.iter().map(PostType::as_str).collect();
                AppError::Validation(format!(
                    "Invalid post type. Must be one of: {}",
                    names.join(", ")
                ))
            })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub post_type: PostType,
    pub metadata: Map<String, Value>,
    pub author_id: i64,
    pub created_at: DateTime<Utc>,
    pub privacy: PrivacyLevel,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    pub post_type: PostType,
    pub metadata: Map<String, Value>,
    pub author_id: i64,
    pub privacy: PrivacyLevel,
}

/// Request body of `POST /posts`. Everything is optional so that missing fields
/// surface as validation errors instead of body rejections.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostDraft {
    pub title: Option<String>,
    pub content: Option<String>,
    pub post_type: Option<String>,
    pub metadata: Option<Value>,
    pub privacy: Option<String>,
}

impl PostDraft {
    /// Validate the draft and bind it to its author. Nothing is persisted here.
    pub fn validate(self, author_id: i64, default_privacy: PrivacyLevel) -> AppResult<NewPost> {
        let title = match self.title.map(|t| t.trim().to_string()) {
            Some(title) if !title.is_empty() => title,
            _ => return Err(AppError::field("title", "This field is required.")),
        };
        if title.chars().count() > TITLE_MAX_LENGTH {
            return Err(AppError::field(
                "title",
                &format!(
                    "Ensure this field has no more than {} characters.",
                    TITLE_MAX_LENGTH
                ),
            ));
        }

        let metadata = match self.metadata {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map,
            Some(_) => {
                return Err(AppError::field(
                    "metadata",
                    "Expected a dictionary of items.",
                ))
            }
        };

        let post_type: PostType = self.post_type.as_deref().unwrap_or("text").parse()?;
        if let Some(key) = post_type.required_metadata() {
            if !metadata.contains_key(key) {
                let kind = match post_type {
                    PostType::Image => "Image",
                    _ => "Video",
                };
                return Err(AppError::Validation(format!(
                    "{} posts require '{}' in metadata",
                    kind, key
                )));
            }
        }

        let privacy = match self.privacy {
            Some(privacy) => privacy.parse()?,
            None => default_privacy,
        };

        Ok(NewPost {
            title,
            content: self.content.unwrap_or_default(),
            post_type,
            metadata,
            author_id,
            privacy,
        })
    }
}

/// Derived data embedded in post payloads. Any write that changes it must
/// invalidate cached post payloads.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostEngagement {
    pub author_username: String,
    pub commenters: Vec<String>,
    pub likers: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PostFilter {
    pub author_id: Option<i64>,
    pub post_type: Option<PostType>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostView {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub post_type: PostType,
    pub metadata: Map<String, Value>,
    pub author: i64,
    pub author_username: String,
    pub privacy: PrivacyLevel,
    pub created_at: DateTime<Utc>,
    pub comments: Vec<String>,
    pub likes: Vec<String>,
    pub comment_count: usize,
    pub like_count: usize,
}

impl PostView {
    pub fn new(post: Post, engagement: PostEngagement) -> Self {
        let comments: Vec<String> = engagement
            .commenters
            .iter()
            .map(|author| format!("Comment by {} on {}", author, post.title))
            .collect();
        let likes: Vec<String> = engagement
            .likers
            .iter()
            .map(|user| format!("{} likes {}", user, post.title))
            .collect();

        Self {
            id: post.id,
            comment_count: comments.len(),
            like_count: likes.len(),
            title: post.title,
            content: post.content,
            post_type: post.post_type,
            metadata: post.metadata,
            author: post.author_id,
            author_username: engagement.author_username,
            privacy: post.privacy,
            created_at: post.created_at,
            comments,
            likes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn draft(post_type: &str, metadata: Value) -> PostDraft {
        PostDraft {
            title: Some("Holiday".to_string()),
            content: Some("At the beach".to_string()),
            post_type: Some(post_type.to_string()),
            metadata: Some(metadata),
            privacy: None,
        }
    }

    #[test]
    fn image_post_requires_file_size() {
        let err = draft("image", json!({ "width": 800 }))
            .validate(1, PrivacyLevel::Public)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Validation error: Image posts require 'file_size' in metadata"
        );
    }

    #[test]
    fn video_post_requires_duration() {
        let err = draft("video", json!({}))
            .validate(1, PrivacyLevel::Public)
            .unwrap_err();
        assert!(err.to_string().contains("'duration'"));

        let ok = draft("video", json!({ "duration": 42 })).validate(1, PrivacyLevel::Public);
        assert!(ok.is_ok());
    }

    #[test]
    fn unknown_post_type_is_rejected() {
        let err = draft("poll", json!({}))
            .validate(1, PrivacyLevel::Public)
            .unwrap_err();
        assert!(err.to_string().contains("text, image, video, link"));
    }

    #[test]
    fn missing_title_is_a_field_error() {
        let mut post = draft("text", json!({}));
        post.title = Some("   ".to_string());
        assert!(matches!(
            post.validate(1, PrivacyLevel::Public),
            Err(AppError::InvalidFields(_))
        ));
    }

    #[test]
    fn privacy_falls_back_to_author_default() {
        let post = PostDraft {
            title: Some("hello".to_string()),
            ..Default::default()
        }
        .validate(9, PrivacyLevel::Friends)
        .unwrap();
        assert_eq!(post.privacy, PrivacyLevel::Friends);
        assert_eq!(post.post_type, PostType::Text);
        assert_eq!(post.author_id, 9);
    }

    #[test]
    fn view_embeds_comment_and_like_strings() {
        let post = Post {
            id: 3,
            title: "Launch".to_string(),
            content: String::new(),
            post_type: PostType::Text,
            metadata: Map::new(),
            author_id: 1,
            created_at: Utc::now(),
            privacy: PrivacyLevel::Public,
        };
        let view = PostView::new(
            post,
            PostEngagement {
                author_username: "alice".to_string(),
                commenters: vec!["bob".to_string()],
                likers: vec!["carol".to_string(), "dave".to_string()],
            },
        );
        assert_eq!(view.comments, vec!["Comment by bob on Launch".to_string()]);
        assert_eq!(view.like_count, 2);
        assert_eq!(view.likes[1], "dave likes Launch");
    }
}
