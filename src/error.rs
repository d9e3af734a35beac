use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::fmt;

/// Field name -> list of messages, rendered the way form serializers report errors.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

#[derive(Debug)]
pub enum AppError {
    Database(anyhow::Error),
    DatabaseError(String),
    NotFound(String),
    BadRequest(String),
    Internal(String),
    Validation(String),
    InvalidFields(FieldErrors),
    /// Uniqueness violations. Reported as 400 with a descriptive message.
    Conflict(String),
    SerializationError(String),
    ConfigurationError(String),
    Unauthorized(String),
    Forbidden(String),
}

impl AppError {
    pub fn field(name: &str, message: &str) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(name.to_string(), vec![message.to_string()]);
        AppError::InvalidFields(errors)
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Database(_)
            | AppError::DatabaseError(_)
            | AppError::Internal(_)
            | AppError::SerializationError(_)
            | AppError::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_)
            | AppError::Validation(_)
            | AppError::InvalidFields(_)
            | AppError::Conflict(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Database(err) => write!(f, "Database error: {}", err),
            AppError::DatabaseError(msg) => write!(f, "Database error: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::Validation(msg) => write!(f, "Validation error: {}", msg),
            AppError::InvalidFields(fields) => {
                let names: Vec<&str> = fields.keys().map(String::as_str).collect();
                write!(f, "Validation error on fields: {}", names.join(", "))
            }
            AppError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            AppError::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            AppError::ConfigurationError(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            AppError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            AppError::Database(err) => {
                tracing::error!("Database error: {:#}", err);
                json!({ "error": "Internal server error", "status": status.as_u16() })
            }
            AppError::DatabaseError(msg) => {
                tracing::error!("Database error: {}", msg);
                json!({ "error": "Internal server error", "status": status.as_u16() })
            }
            AppError::Internal(msg) | AppError::ConfigurationError(msg) => {
                tracing::error!("Internal error: {}", msg);
                json!({ "error": "Internal server error", "status": status.as_u16() })
            }
            AppError::SerializationError(msg) => {
                tracing::error!("Serialization error: {}", msg);
                json!({ "error": "Internal server error", "status": status.as_u16() })
            }
            AppError::InvalidFields(fields) => json!({
                "error": "Invalid input.",
                "fields": fields,
                "status": status.as_u16()
            }),
            AppError::NotFound(msg)
            | AppError::BadRequest(msg)
            | AppError::Validation(msg)
            | AppError::Conflict(msg)
            | AppError::Unauthorized(msg)
            | AppError::Forbidden(msg) => json!({ "error": msg, "status": status.as_u16() }),
        };

        (status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Database(err)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::SerializationError(err.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflicts_are_reported_as_bad_requests() {
        let err = AppError::Conflict("You have already liked this post.".to_string());
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn field_errors_keep_the_field_name() {
        match AppError::field("title", "This field is required.") {
            AppError::InvalidFields(fields) => {
                assert_eq!(fields["title"], vec!["This field is required.".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn internal_errors_hide_details() {
        let response = AppError::DatabaseError("disk I/O error".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
