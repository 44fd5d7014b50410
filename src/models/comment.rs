use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::models::user::Author;

/// Represents the 'comments' table joined with its author.
/// A comment with a line range is a review comment anchored to the post's code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    pub author_id: i64,
    #[serde(default)]
    pub author: Option<Author>,
    pub content: String,
    pub start_line: Option<i32>,
    pub end_line: Option<i32>,
    #[serde(default)]
    pub likes_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub is_liked: bool,
}

impl Comment {
    pub fn is_review(&self) -> bool {
        self.start_line.is_some()
    }
}

/// DTO for creating a new comment.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[validate(schema(function = "validate_line_range"))]
pub struct CreateCommentRequest {
    #[validate(length(
        min = 1,
        max = 2000,
        message = "Comment must be between 1 and 2000 characters"
    ))]
    pub content: String,

    /// First line (1-based) of the reviewed code range.
    pub start_line: Option<i32>,
    /// Last line of the reviewed code range, inclusive.
    pub end_line: Option<i32>,
}

/// DTO for editing a comment. The anchor never moves.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct UpdateCommentRequest {
    #[validate(length(
        min = 1,
        max = 2000,
        message = "Comment must be between 1 and 2000 characters"
    ))]
    pub content: String,
}

fn validate_line_range(req: &CreateCommentRequest) -> Result<(), ValidationError> {
    match (req.start_line, req.end_line) {
        (None, None) => Ok(()),
        (Some(start), Some(end)) if start >= 1 && start <= end => Ok(()),
        (Some(_), Some(_)) => Err(ValidationError::new("invalid_line_range")),
        _ => Err(ValidationError::new("line_range_must_be_complete")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(start: Option<i32>, end: Option<i32>) -> CreateCommentRequest {
        CreateCommentRequest {
            content: "looks good".into(),
            start_line: start,
            end_line: end,
        }
    }

    #[test]
    fn line_range_must_be_symmetric_and_ordered() {
        assert!(req(None, None).validate().is_ok());
        assert!(req(Some(3), Some(3)).validate().is_ok());
        assert!(req(Some(2), Some(7)).validate().is_ok());
        assert!(req(Some(3), None).validate().is_err());
        assert!(req(None, Some(3)).validate().is_err());
        assert!(req(Some(5), Some(4)).validate().is_err());
        assert!(req(Some(0), Some(4)).validate().is_err());
    }
}
