//! Annotates entities with the viewer's like/bookmark state.

use crate::{
    error::AppError,
    models::{comment::Comment, post::Post},
    repositories::{BookmarkRepository, LikeRepository},
};

#[derive(Clone)]
pub struct InteractionResolver {
    likes: LikeRepository,
    bookmarks: BookmarkRepository,
}

impl InteractionResolver {
    pub fn new(likes: LikeRepository, bookmarks: BookmarkRepository) -> Self {
        Self { likes, bookmarks }
    }

    /// Sets `is_liked` / `is_bookmarked` on every post. Anonymous viewers get
    /// `false` everywhere without touching the backend. The two lookups run
    /// concurrently and either failing fails the whole call.
    pub async fn resolve_posts(
        &self,
        mut posts: Vec<Post>,
        viewer: Option<i64>,
    ) -> Result<Vec<Post>, AppError> {
        let Some(user_id) = viewer.filter(|_| !posts.is_empty()) else {
            for post in &mut posts {
                post.is_liked = false;
                post.is_bookmarked = false;
            }
            return Ok(posts);
        };

        let ids: Vec<i64> = posts.iter().map(|p| p.id).collect();
        let (liked, bookmarked) = tokio::try_join!(
            self.likes.liked_post_ids(user_id, &ids),
            self.bookmarks.bookmarked_post_ids(user_id, &ids),
        )?;

        for post in &mut posts {
            post.is_liked = liked.contains(&post.id);
            post.is_bookmarked = bookmarked.contains(&post.id);
        }
        Ok(posts)
    }

    pub async fn resolve_comments(
        &self,
        mut comments: Vec<Comment>,
        viewer: Option<i64>,
    ) -> Result<Vec<Comment>, AppError> {
        let Some(user_id) = viewer.filter(|_| !comments.is_empty()) else {
            for comment in &mut comments {
                comment.is_liked = false;
            }
            return Ok(comments);
        };

        let ids: Vec<i64> = comments.iter().map(|c| c.id).collect();
        let liked = self.likes.liked_comment_ids(user_id, &ids).await?;
        for comment in &mut comments {
            comment.is_liked = liked.contains(&comment.id);
        }
        Ok(comments)
    }
}
