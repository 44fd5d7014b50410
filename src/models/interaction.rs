//! Interaction rows. Only the referenced ids are ever read back.

use serde::Deserialize;

/// A 'post_likes' or 'bookmarks' row.
#[derive(Debug, Clone, Deserialize)]
pub struct PostRef {
    pub post_id: i64,
}

/// A 'comment_likes' row.
#[derive(Debug, Clone, Deserialize)]
pub struct CommentRef {
    pub comment_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdRef {
    pub id: i64,
}
