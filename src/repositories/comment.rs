use chrono::Utc;
use serde_json::json;

use crate::{
    error::AppError,
    models::{
        comment::{Comment, CreateCommentRequest, UpdateCommentRequest},
        interaction::IdRef,
        user::AUTHOR_COLUMNS,
    },
    query::{Filter, QueryAdapter, QueryDescriptor, Relation, Row},
    repositories::{COMMENTS, POSTS, USERS, post::PostRepository},
};

#[derive(Clone)]
pub struct CommentRepository {
    db: QueryAdapter,
    posts: PostRepository,
}

impl CommentRepository {
    pub fn new(db: QueryAdapter, posts: PostRepository) -> Self {
        Self { db, posts }
    }

    /// Live comments by live authors on live posts.
    fn visible() -> QueryDescriptor {
        QueryDescriptor::live(COMMENTS)
            .with(
                Relation::belongs_to("author", USERS, "author_id")
                    .columns(AUTHOR_COLUMNS)
                    .live()
                    .inner(),
            )
            .with(Relation::belongs_to("post", POSTS, "post_id").live().exists())
    }

    /// Thread order: oldest first, `id` breaking ties.
    pub fn thread_query(post_id: i64, review_only: bool) -> QueryDescriptor {
        let mut q = Self::visible().filter(Filter::eq("post_id", post_id));
        if review_only {
            q = q.exclude(Filter::is_null("start_line"));
        }
        q.order_by("created_at", false).order_by("id", false)
    }

    /// Rows `from..=to` of a post's thread.
    pub async fn list(
        &self,
        post_id: i64,
        review_only: bool,
        from: u64,
        to: u64,
    ) -> Result<Vec<Comment>, AppError> {
        Ok(self
            .db
            .many(&Self::thread_query(post_id, review_only).range(from, to))
            .await
            .require()?)
    }

    pub async fn get(&self, id: i64) -> Result<Comment, AppError> {
        let comment: Option<Comment> = self
            .db
            .maybe_single(&Self::visible().filter(Filter::eq("id", id)))
            .await
            .into_result()?;
        comment.ok_or_else(|| AppError::NotFound("Comment not found".to_string()))
    }

    pub async fn ensure_available(&self, id: i64) -> Result<Comment, AppError> {
        self.get(id).await.map_err(|e| match e {
            AppError::NotFound(_) => {
                AppError::DependencyUnavailable(format!("Comment {} is not available", id))
            }
            other => other,
        })
    }

    /// Adds a comment to a live post. A line range makes it a review comment,
    /// which needs a post with code open for review and a range inside it.
    pub async fn create(
        &self,
        author_id: i64,
        post_id: i64,
        req: CreateCommentRequest,
    ) -> Result<Comment, AppError> {
        let post = self.posts.ensure_available(post_id).await?;

        if let (Some(start), Some(end)) = (req.start_line, req.end_line) {
            if !post.review_enabled || post.code.is_none() {
                return Err(AppError::BadRequest(
                    "This post does not accept review comments".to_string(),
                ));
            }
            let lines = post.code_line_count();
            if start < 1 || end < start || end as usize > lines {
                return Err(AppError::BadRequest(format!(
                    "Line range {}-{} is outside the code (1-{})",
                    start, end, lines
                )));
            }
        } else if req.start_line.is_some() || req.end_line.is_some() {
            return Err(AppError::BadRequest(
                "start_line and end_line must be given together".to_string(),
            ));
        }

        let mut row = Row::new();
        row.insert("post_id".into(), json!(post_id));
        row.insert("author_id".into(), json!(author_id));
        row.insert("content".into(), json!(req.content));
        row.insert("start_line".into(), json!(req.start_line));
        row.insert("end_line".into(), json!(req.end_line));

        let created: IdRef = self.db.insert_one(COMMENTS, row).await.require()?;
        tracing::info!(comment_id = created.id, post_id, "comment created");
        self.get(created.id).await
    }

    /// Author only; content is the only editable field.
    pub async fn update(
        &self,
        caller: i64,
        id: i64,
        req: UpdateCommentRequest,
    ) -> Result<Comment, AppError> {
        self.owned(caller, id).await?;

        let mut patch = Row::new();
        patch.insert("content".into(), json!(req.content));
        patch.insert("updated_at".into(), json!(Utc::now().to_rfc3339()));
        let touched: Vec<IdRef> = self
            .db
            .update(COMMENTS, patch, &[Filter::eq("id", id), Filter::is_null("deleted_at")])
            .await
            .require()?;
        if touched.is_empty() {
            return Err(AppError::NotFound("Comment not found".to_string()));
        }
        self.get(id).await
    }

    /// Author only.
    pub async fn soft_delete(&self, caller: i64, id: i64) -> Result<(), AppError> {
        self.owned(caller, id).await?;

        let mut patch = Row::new();
        patch.insert("deleted_at".into(), json!(Utc::now().to_rfc3339()));
        let touched: Vec<IdRef> = self
            .db
            .update(COMMENTS, patch, &[Filter::eq("id", id), Filter::is_null("deleted_at")])
            .await
            .require()?;
        if touched.is_empty() {
            return Err(AppError::NotFound("Comment not found".to_string()));
        }
        tracing::info!(comment_id = id, "comment soft-deleted");
        Ok(())
    }

    async fn owned(&self, caller: i64, id: i64) -> Result<Comment, AppError> {
        let comment = self.get(id).await?;
        if comment.author_id != caller {
            return Err(AppError::Forbidden(
                "You are not the author of this comment".to_string(),
            ));
        }
        Ok(comment)
    }
}
