// EntUser - accounts, roles and capability grants

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{AppError, AppResult, FieldErrors};

static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern is a valid regex")
});

/// Capability codename allowing a user to see PRIVATE posts of other authors.
pub const VIEW_PRIVATE_POST: &str = "view_private_post";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Admin,
    Editor,
    Viewer,
    #[default]
    User,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Admin, Role::Editor, Role::Viewer, Role::User];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Editor => "EDITOR",
            Role::Viewer => "VIEWER",
            Role::User => "USER",
        }
    }

    /// Group a user joins when assigned this role.
    pub fn group_name(&self) -> &'static str {
        match self {
            Role::Admin => "Admin",
            Role::Editor => "Editor",
            Role::Viewer => "Viewer",
            Role::User => "User",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ADMIN" => Ok(Role::Admin),
            "EDITOR" => Ok(Role::Editor),
            "VIEWER" => Ok(Role::Viewer),
            "USER" => Ok(Role::User),
            _ => {
                let names: Vec<&str> = Role::ALL.iter().map(Role::as_str).collect();
                Err(AppError::Validation(format!(
                    "Invalid role. Must be one of: {}",
                    names.join(", ")
                )))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub groups: Vec<String>,
    pub permissions: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn has_permission(&self, codename: &str) -> bool {
        self.permissions.iter().any(|p| p == codename)
    }

    pub fn view(&self) -> UserView {
        UserView {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
            role: self.role,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

/// Public representation of a user. Password hashes never leave the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserView {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// Body of the admin-only `POST /users`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserDraft {
    pub username: Option<String>,
    pub password: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
}

/// Validated credentials, password still in clear text.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: Role,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl UserDraft {
    pub fn validate(self) -> AppResult<Credentials> {
        let password = self.password.filter(|p| !p.is_empty());
        let (Some(username), Some(password)) = (non_blank(self.username), password) else {
            return Err(AppError::BadRequest(
                "Username and password are required.".to_string(),
            ));
        };
        let role = match self.role {
            Some(role) => role.parse()?,
            None => Role::default(),
        };
        Ok(Credentials {
            username,
            email: non_blank(self.email).unwrap_or_default(),
            password,
            role,
        })
    }
}

/// Body of the public `POST /register`. Problems are reported per field.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistrationDraft {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    #[serde(alias = "password_confirm")]
    pub password2: Option<String>,
}

impl RegistrationDraft {
    pub fn validate(self, password_min_length: usize) -> AppResult<Credentials> {
        let mut errors = FieldErrors::new();
        let mut reject = |field: &str, message: String| {
            errors.entry(field.to_string()).or_default().push(message);
        };

        let username = non_blank(self.username);
        if username.is_none() {
            reject("username", "This field is required.".to_string());
        }

        let email = non_blank(self.email).unwrap_or_default();
        if !email.is_empty() && !EMAIL_PATTERN.is_match(&email) {
            reject("email", "Enter a valid email address.".to_string());
        }

        let password = self.password.filter(|p| !p.is_empty());
        match &password {
            None => reject("password", "This field is required.".to_string()),
            Some(p) if p.chars().count() < password_min_length => reject(
                "password",
                format!(
                    "This password is too short. It must contain at least {} characters.",
                    password_min_length
                ),
            ),
            Some(p) if p.chars().all(|c| c.is_ascii_digit()) => {
                reject("password", "This password is entirely numeric.".to_string())
            }
            Some(_) => {}
        }
        if let (Some(p), Some(confirm)) = (&password, &self.password2) {
            if p != confirm {
                reject("password2", "Passwords do not match.".to_string());
            }
        }

        match (username, password) {
            (Some(username), Some(password)) if errors.is_empty() => Ok(Credentials {
                username,
                email,
                password,
                role: Role::User,
            }),
            _ => Err(AppError::InvalidFields(errors)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_accounts_default_to_the_user_role() {
        assert_eq!(Role::default(), Role::User);
    }

    fn registration(password: &str, confirm: Option<&str>, email: &str) -> RegistrationDraft {
        RegistrationDraft {
            username: Some("dana".to_string()),
            email: Some(email.to_string()),
            password: Some(password.to_string()),
            password2: confirm.map(str::to_string),
        }
    }

    #[test]
    fn registration_reports_every_bad_field() {
        let err = registration("short", Some("other"), "not-an-email")
            .validate(8)
            .unwrap_err();
        match err {
            AppError::InvalidFields(fields) => {
                assert!(fields.contains_key("password"));
                assert!(fields.contains_key("password2"));
                assert!(fields.contains_key("email"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn valid_registration_becomes_a_plain_user() {
        let creds = registration("s3cure-pass", Some("s3cure-pass"), "dana@example.com")
            .validate(8)
            .unwrap();
        assert_eq!(creds.role, Role::User);
        assert_eq!(creds.email, "dana@example.com");
    }

    #[test]
    fn admin_user_creation_needs_username_and_password() {
        let err = UserDraft {
            username: Some("erin".to_string()),
            ..Default::default()
        }
        .validate()
        .unwrap_err();
        assert_eq!(err.to_string(), "Bad request: Username and password are required.");
    }

    #[test]
    fn roles_parse_case_insensitively() {
        assert_eq!("editor".parse::<Role>().unwrap(), Role::Editor);
        assert_eq!(" ADMIN ".parse::<Role>().unwrap(), Role::Admin);
    }

    #[test]
    fn unknown_role_lists_the_choices() {
        let err = "OWNER".parse::<Role>().unwrap_err();
        assert!(err.to_string().contains("ADMIN, EDITOR, VIEWER, USER"));
    }

    #[test]
    fn roles_serialize_uppercase() {
        assert_eq!(serde_json::to_string(&Role::Viewer).unwrap(), "\"VIEWER\"");
    }
}
