use std::collections::HashSet;

use crate::{
    error::AppError,
    models::interaction::PostRef,
    query::{Filter, QueryAdapter, QueryDescriptor},
    repositories::{BOOKMARKS, post::PostRepository, toggle_row},
};

#[derive(Clone)]
pub struct BookmarkRepository {
    db: QueryAdapter,
    posts: PostRepository,
}

impl BookmarkRepository {
    pub fn new(db: QueryAdapter, posts: PostRepository) -> Self {
        Self { db, posts }
    }

    /// Which of `post_ids` the user has bookmarked.
    pub async fn bookmarked_post_ids(
        &self,
        user_id: i64,
        post_ids: &[i64],
    ) -> Result<HashSet<i64>, AppError> {
        let q = QueryDescriptor::from(BOOKMARKS)
            .select(&["post_id"])
            .filter(Filter::eq("user_id", user_id))
            .filter(Filter::is_in("post_id", post_ids.iter().copied()));
        let rows: Vec<PostRef> = self.db.many(&q).await.require()?;
        Ok(rows.into_iter().map(|r| r.post_id).collect())
    }

    pub async fn toggle_bookmark(&self, user_id: i64, post_id: i64) -> Result<bool, AppError> {
        self.posts.ensure_available(post_id).await?;
        let bookmarked = toggle_row(&self.db, BOOKMARKS, "user_id", user_id, "post_id", post_id).await?;
        tracing::debug!(user_id, post_id, bookmarked, "bookmark toggled");
        Ok(bookmarked)
    }
}
