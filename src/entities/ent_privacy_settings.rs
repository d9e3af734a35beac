// Per-user privacy settings and the visibility levels shared with posts

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PrivacyLevel {
    #[default]
    Public,
    Friends,
    Private,
}

impl PrivacyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrivacyLevel::Public => "PUBLIC",
            PrivacyLevel::Friends => "FRIENDS",
            PrivacyLevel::Private => "PRIVATE",
        }
    }
}

impl fmt::Display for PrivacyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PrivacyLevel {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PUBLIC" => Ok(PrivacyLevel::Public),
            "FRIENDS" => Ok(PrivacyLevel::Friends),
            "PRIVATE" => Ok(PrivacyLevel::Private),
            other => Err(AppError::Validation(format!(
                "\"{}\" is not a valid privacy choice. Must be one of: PUBLIC, FRIENDS, PRIVATE",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrivacySettings {
    pub user_id: i64,
    pub profile_visibility: PrivacyLevel,
    pub post_default: PrivacyLevel,
}

impl PrivacySettings {
    pub fn defaults_for(user_id: i64) -> Self {
        Self {
            user_id,
            profile_visibility: PrivacyLevel::Public,
            post_default: PrivacyLevel::Public,
        }
    }
}

/// Partial update accepted by `PATCH /privacy-settings`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PrivacySettingsUpdate {
    pub profile_visibility: Option<String>,
    pub post_default: Option<String>,
}

impl PrivacySettingsUpdate {
    pub fn apply(self, mut settings: PrivacySettings) -> Result<PrivacySettings, AppError> {
        if let Some(visibility) = self.profile_visibility {
            settings.profile_visibility = visibility.parse()?;
        }
        if let Some(post_default) = self.post_default {
            settings.post_default = post_default.parse()?;
        }
        Ok(settings)
    }
}
