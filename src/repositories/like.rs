use std::collections::HashSet;

use crate::{
    error::AppError,
    models::interaction::{CommentRef, PostRef},
    query::{Filter, QueryAdapter, QueryDescriptor},
    repositories::{COMMENT_LIKES, POST_LIKES, comment::CommentRepository, post::PostRepository, toggle_row},
};

#[derive(Clone)]
pub struct LikeRepository {
    db: QueryAdapter,
    posts: PostRepository,
    comments: CommentRepository,
}

impl LikeRepository {
    pub fn new(db: QueryAdapter, posts: PostRepository, comments: CommentRepository) -> Self {
        Self {
            db,
            posts,
            comments,
        }
    }

    /// Which of `post_ids` the user has liked.
    pub async fn liked_post_ids(
        &self,
        user_id: i64,
        post_ids: &[i64],
    ) -> Result<HashSet<i64>, AppError> {
        let q = QueryDescriptor::from(POST_LIKES)
            .select(&["post_id"])
            .filter(Filter::eq("user_id", user_id))
            .filter(Filter::is_in("post_id", post_ids.iter().copied()));
        let rows: Vec<PostRef> = self.db.many(&q).await.require()?;
        Ok(rows.into_iter().map(|r| r.post_id).collect())
    }

    /// Which of `comment_ids` the user has liked.
    pub async fn liked_comment_ids(
        &self,
        user_id: i64,
        comment_ids: &[i64],
    ) -> Result<HashSet<i64>, AppError> {
        let q = QueryDescriptor::from(COMMENT_LIKES)
            .select(&["comment_id"])
            .filter(Filter::eq("user_id", user_id))
            .filter(Filter::is_in("comment_id", comment_ids.iter().copied()));
        let rows: Vec<CommentRef> = self.db.many(&q).await.require()?;
        Ok(rows.into_iter().map(|r| r.comment_id).collect())
    }

    /// Likes or unlikes a live post. Returns the new state.
    pub async fn toggle_post_like(&self, user_id: i64, post_id: i64) -> Result<bool, AppError> {
        self.posts.ensure_available(post_id).await?;
        let liked = toggle_row(&self.db, POST_LIKES, "user_id", user_id, "post_id", post_id).await?;
        tracing::debug!(user_id, post_id, liked, "post like toggled");
        Ok(liked)
    }

    /// Likes or unlikes a live comment on a live post. Returns the new state.
    pub async fn toggle_comment_like(&self, user_id: i64, comment_id: i64) -> Result<bool, AppError> {
        self.comments.ensure_available(comment_id).await?;
        let liked =
            toggle_row(&self.db, COMMENT_LIKES, "user_id", user_id, "comment_id", comment_id).await?;
        tracing::debug!(user_id, comment_id, liked, "comment like toggled");
        Ok(liked)
    }
}
