use crate::entities::{Role, User};
use crate::error::{AppError, AppResult};

pub const NOT_AUTHENTICATED: &str = "Authentication credentials were not provided.";

/// The actor behind one request. Built by the viewer context middleware and
/// handed to handlers through the `Vc` extractor.
#[derive(Debug, Clone)]
pub struct ViewerContext {
    pub request_id: String,
    pub user: Option<User>,
}

impl ViewerContext {
    pub fn anonymous(request_id: String) -> Self {
        ViewerContext {
            request_id,
            user: None,
        }
    }

    pub fn authenticated(user: User, request_id: String) -> Self {
        ViewerContext {
            request_id,
            user: Some(user),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    pub fn user_id(&self) -> Option<i64> {
        self.user.as_ref().map(|u| u.id)
    }

    pub fn role(&self) -> Option<Role> {
        self.user.as_ref().map(|u| u.role)
    }

    /// The authenticated user, or a 401.
    pub fn require_user(&self) -> AppResult<&User> {
        self.user
            .as_ref()
            .ok_or_else(|| AppError::Unauthorized(NOT_AUTHENTICATED.to_string()))
    }
}
