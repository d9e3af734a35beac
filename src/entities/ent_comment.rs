// EntComment - comments attached to posts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    pub id: i64,
    pub text: String,
    pub author_id: i64,
    pub post_id: i64,
    pub created_at: DateTime<Utc>,
}

impl Comment {
    pub fn view(&self) -> CommentView {
        CommentView {
            id: self.id,
            text: self.text.clone(),
            author: self.author_id,
            post: self.post_id,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub text: String,
    pub author_id: i64,
    pub post_id: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommentDraft {
    pub text: Option<String>,
    #[serde(alias = "post")]
    pub post_id: Option<i64>,
}

impl CommentDraft {
    /// Shape checks only. Whether the post exists is decided against the store.
    pub fn validate(self, author_id: i64) -> AppResult<NewComment> {
        let text = match self.text {
            Some(text) if !text.trim().is_empty() => text,
            _ => return Err(AppError::field("text", "This field is required.")),
        };
        let post_id = self
            .post_id
            .ok_or_else(|| AppError::field("post_id", "This field is required."))?;

        Ok(NewComment {
            text,
            author_id,
            post_id,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentView {
    pub id: i64,
    pub text: String,
    pub author: i64,
    pub post: i64,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_text_is_rejected() {
        let draft = CommentDraft {
            text: Some("  ".to_string()),
            post_id: Some(1),
        };
        assert!(matches!(draft.validate(1), Err(AppError::InvalidFields(_))));
    }

    #[test]
    fn post_accepts_either_field_name() {
        let draft: CommentDraft = serde_json::from_str(r#"{"text":"hi","post":4}"#).unwrap();
        assert_eq!(draft.validate(2).unwrap().post_id, 4);
    }
}
