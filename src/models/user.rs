// src/models/user.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use validator::{Validate, ValidationError};

/// Represents the 'users' table in the database.
/// Accounts are issued by the identity provider; this table only holds the public profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,

    /// Unique username.
    pub username: String,

    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub website: Option<String>,
    pub avatar_url: Option<String>,

    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// The nested author object embedded in posts and comments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub id: i64,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

pub const AUTHOR_COLUMNS: &[&str] = &["id", "username", "display_name", "avatar_url"];

/// Aggregated public profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    #[serde(flatten)]
    pub user: User,
    pub posts_count: i64,
    pub followers_count: i64,
    pub following_count: i64,
    /// Whether the viewer follows this user. Always false for anonymous viewers.
    pub is_following: bool,
}

/// DTO for editing one's own profile. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(
        min = 1,
        max = 50,
        message = "Display name length must be between 1 and 50 characters."
    ))]
    pub display_name: Option<String>,

    #[validate(length(max = 300, message = "Bio must be at most 300 characters."))]
    pub bio: Option<String>,

    #[validate(custom(function = "validate_url_string"))]
    pub website: Option<String>,

    #[validate(custom(function = "validate_url_string"))]
    pub avatar_url: Option<String>,
}

fn validate_url_string(url: &str) -> Result<(), ValidationError> {
    if url.len() > 500 {
        return Err(ValidationError::new("url_too_long"));
    }
    match Url::parse(url) {
        Ok(u) if matches!(u.scheme(), "http" | "https") => Ok(()),
        _ => Err(ValidationError::new("invalid_url")),
    }
}
