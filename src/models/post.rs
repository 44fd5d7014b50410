use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::models::{tag::TagLink, user::Author};

/// A post as it comes back from the posts query, before relation shaping.
#[derive(Debug, Clone, Deserialize)]
pub struct PostRow {
    pub id: i64,
    pub author_id: i64,
    #[serde(default)]
    pub author: Option<Author>,
    pub content: String,
    pub code: Option<String>,
    pub language: Option<String>,
    #[serde(default)]
    pub review_enabled: bool,
    #[serde(default)]
    pub likes_count: i32,
    #[serde(default)]
    pub comments_count: i32,
    #[serde(default)]
    pub bookmarks_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub post_tags: Vec<TagLink>,
}

/// Represents a post with its author, flattened tags and the viewer's
/// interaction flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub author_id: i64,
    pub author: Option<Author>,
    pub content: String,
    pub code: Option<String>,
    pub language: Option<String>,
    pub tags: Vec<String>,
    pub review_enabled: bool,

    pub likes_count: i32,
    pub comments_count: i32,
    pub bookmarks_count: i32,

    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,

    /// Whether the current viewer has liked this post.
    /// Always false for anonymous viewers.
    #[serde(default)]
    pub is_liked: bool,
    /// Whether the current viewer has bookmarked this post.
    #[serde(default)]
    pub is_bookmarked: bool,
}

impl From<PostRow> for Post {
    fn from(row: PostRow) -> Self {
        let mut tags: Vec<String> = row
            .post_tags
            .into_iter()
            .filter_map(|link| link.tag.map(|t| t.name))
            .collect();
        tags.sort();
        Post {
            id: row.id,
            author_id: row.author_id,
            author: row.author,
            content: row.content,
            code: row.code,
            language: row.language,
            tags,
            review_enabled: row.review_enabled,
            likes_count: row.likes_count,
            comments_count: row.comments_count,
            bookmarks_count: row.bookmarks_count,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
            is_liked: false,
            is_bookmarked: false,
        }
    }
}

impl Post {
    pub fn code_line_count(&self) -> usize {
        self.code.as_deref().map(|c| c.lines().count()).unwrap_or(0)
    }
}

/// DTO for creating a new post.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[validate(schema(function = "validate_review_needs_code"))]
pub struct CreatePostRequest {
    #[validate(length(
        min = 1,
        max = 10000,
        message = "Content length must be between 1 and 10000 chars"
    ))]
    pub content: String,

    #[validate(length(max = 20000, message = "Code must be at most 20000 chars"))]
    pub code: Option<String>,

    #[validate(custom(function = "validate_language"))]
    pub language: Option<String>,

    #[serde(default)]
    #[validate(custom(function = "validate_tags"))]
    pub tags: Vec<String>,

    #[serde(default)]
    pub review_enabled: bool,
}

/// DTO for editing a post. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
pub struct UpdatePostRequest {
    #[validate(length(
        min = 1,
        max = 10000,
        message = "Content length must be between 1 and 10000 chars"
    ))]
    pub content: Option<String>,

    #[validate(length(max = 20000, message = "Code must be at most 20000 chars"))]
    pub code: Option<String>,

    #[validate(custom(function = "validate_language"))]
    pub language: Option<String>,

    #[validate(custom(function = "validate_tags"))]
    pub tags: Option<Vec<String>>,

    pub review_enabled: Option<bool>,
}

fn validate_review_needs_code(req: &CreatePostRequest) -> Result<(), ValidationError> {
    let has_code = req.code.as_deref().is_some_and(|c| !c.trim().is_empty());
    if req.review_enabled && !has_code {
        return Err(ValidationError::new("review_requires_code"));
    }
    Ok(())
}

fn validate_language(language: &str) -> Result<(), ValidationError> {
    let ok = !language.is_empty()
        && language.len() <= 32
        && language
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '#' | '-' | '_' | '.'));
    if !ok {
        return Err(ValidationError::new("invalid_language"));
    }
    Ok(())
}

fn validate_tags(tags: &[String]) -> Result<(), ValidationError> {
    if tags.len() > crate::repositories::tag::MAX_TAGS {
        return Err(ValidationError::new("too_many_tags"));
    }
    for tag in tags {
        if tag.trim().trim_start_matches('#').is_empty() {
            return Err(ValidationError::new("empty_tag"));
        }
        if tag.chars().count() > crate::repositories::tag::MAX_TAG_LEN {
            return Err(ValidationError::new("tag_too_long"));
        }
    }
    Ok(())
}
