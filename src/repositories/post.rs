use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    error::AppError,
    models::{
        interaction::IdRef,
        post::{CreatePostRequest, Post, PostRow, UpdatePostRequest},
        user::AUTHOR_COLUMNS,
    },
    query::{Filter, QueryAdapter, QueryDescriptor, Relation, Row, contains_pattern},
    repositories::{BOOKMARKS, FOLLOWS, POST_LIKES, POST_TAGS, POSTS, TAGS, USERS, tag::normalize_tags},
};

/// Logical post filters. Every set field narrows the result (AND).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeedFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// Keyword matched literally against content and code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Only posts that carry code and accept review comments.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub review_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liked_by: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bookmarked_by: Option<i64>,
    /// Posts by the users this user follows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub following_of: Option<i64>,
}

#[derive(Clone)]
pub struct PostRepository {
    db: QueryAdapter,
}

impl PostRepository {
    pub fn new(db: QueryAdapter) -> Self {
        Self { db }
    }

    /// Live posts by live authors, with the author and tags embedded.
    fn visible() -> QueryDescriptor {
        QueryDescriptor::live(POSTS)
            .with(
                Relation::belongs_to("author", USERS, "author_id")
                    .columns(AUTHOR_COLUMNS)
                    .live()
                    .inner(),
            )
            .with(
                Relation::has_many("post_tags", POST_TAGS, "post_id")
                    .columns(&["tag_id"])
                    .with(Relation::belongs_to("tag", TAGS, "tag_id").columns(&["name"])),
            )
    }

    /// Translates a feed filter into a descriptor, newest first with `id` as
    /// the tie-break so pages never overlap.
    pub fn feed_query(filter: &FeedFilter) -> QueryDescriptor {
        let mut q = Self::visible();

        if let Some(author_id) = filter.author_id {
            q = q.filter(Filter::eq("author_id", author_id));
        }
        if let Some(language) = filter.language.as_deref() {
            q = q.filter(Filter::eq("language", language.to_lowercase()));
        }
        if filter.review_only {
            q = q
                .filter(Filter::eq("review_enabled", true))
                .exclude(Filter::is_null("code"));
        }
        if let Some(tag) = filter.tag.as_deref() {
            let name = normalize_tags(&[tag.to_string()]).pop().unwrap_or_default();
            q = q.with(
                Relation::has_many("tagged", POST_TAGS, "post_id")
                    .with(
                        Relation::belongs_to("tag", TAGS, "tag_id")
                            .filter(Filter::eq("name", name))
                            .inner(),
                    )
                    .exists(),
            );
        }
        if let Some(keyword) = filter.q.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
            let pattern = contains_pattern(keyword);
            q = q.any_of(vec![
                Filter::ilike("content", pattern.clone()),
                Filter::ilike("code", pattern),
            ]);
        }
        if let Some(user_id) = filter.liked_by {
            q = q.with(
                Relation::has_many("liked", POST_LIKES, "post_id")
                    .filter(Filter::eq("user_id", user_id))
                    .exists(),
            );
        }
        if let Some(user_id) = filter.bookmarked_by {
            q = q.with(
                Relation::has_many("bookmarked", BOOKMARKS, "post_id")
                    .filter(Filter::eq("user_id", user_id))
                    .exists(),
            );
        }
        if let Some(user_id) = filter.following_of {
            q = q.with(
                Relation::belongs_to("followed_author", USERS, "author_id")
                    .with(
                        Relation::has_many("followers", FOLLOWS, "following_id")
                            .filter(Filter::eq("follower_id", user_id))
                            .inner(),
                    )
                    .exists(),
            );
        }

        q.order_by("created_at", true).order_by("id", true)
    }

    /// Rows `from..=to` of the filtered feed.
    pub async fn list(&self, filter: &FeedFilter, from: u64, to: u64) -> Result<Vec<Post>, AppError> {
        Ok(self
            .db
            .many::<PostRow>(&Self::feed_query(filter).range(from, to))
            .await
            .map(|rows| rows.into_iter().map(Post::from).collect())
            .require()?)
    }

    pub async fn count(&self, filter: &FeedFilter) -> Result<i64, AppError> {
        Ok(self.db.count(&Self::feed_query(filter)).await.require()?)
    }

    pub async fn get(&self, id: i64) -> Result<Post, AppError> {
        let row: Option<PostRow> = self
            .db
            .maybe_single(&Self::visible().filter(Filter::eq("id", id)))
            .await
            .into_result()?;
        row.map(Post::from)
            .ok_or_else(|| AppError::NotFound("Post not found".to_string()))
    }

    /// Re-checks that a post can still receive comments or interactions.
    pub async fn ensure_available(&self, id: i64) -> Result<Post, AppError> {
        self.get(id).await.map_err(|e| match e {
            AppError::NotFound(_) => {
                AppError::DependencyUnavailable(format!("Post {} is not available", id))
            }
            other => other,
        })
    }

    /// Inserts the post and attaches its tags in one atomic call.
    pub async fn create(&self, author_id: i64, req: CreatePostRequest) -> Result<Post, AppError> {
        let args = json!({
            "author_id": author_id,
            "content": req.content,
            "code": req.code,
            "language": req.language.map(|l| l.to_lowercase()),
            "review_enabled": req.review_enabled,
            "tags": normalize_tags(&req.tags),
        });
        let created: IdRef = self
            .db
            .rpc("create_post_with_tags", args)
            .await
            .require()
            .map_err(|e| {
                tracing::error!("Failed to create post: {:?}", e);
                AppError::from(e)
            })?;
        tracing::info!(post_id = created.id, author_id, "post created");
        self.get(created.id).await
    }

    /// Author only. Tags, when given, replace the current set atomically.
    pub async fn update(
        &self,
        caller: i64,
        id: i64,
        req: UpdatePostRequest,
    ) -> Result<Post, AppError> {
        let post = self.owned(caller, id).await?;

        let code_after = req.code.as_deref().or(post.code.as_deref());
        let review_after = req.review_enabled.unwrap_or(post.review_enabled);
        if review_after && code_after.is_none_or(|c| c.trim().is_empty()) {
            return Err(AppError::BadRequest(
                "Review can only be enabled on posts with code".to_string(),
            ));
        }

        let args = json!({
            "id": id,
            "content": req.content,
            "code": req.code,
            "language": req.language.map(|l| l.to_lowercase()),
            "review_enabled": req.review_enabled,
            "tags": req.tags.as_deref().map(normalize_tags),
        });
        let updated: IdRef = self.db.rpc("update_post_with_tags", args).await.require()?;
        self.get(updated.id).await
    }

    /// Author only. The row stays; it just stops being visible.
    pub async fn soft_delete(&self, caller: i64, id: i64) -> Result<(), AppError> {
        self.owned(caller, id).await?;

        let mut patch = Row::new();
        patch.insert("deleted_at".into(), json!(Utc::now().to_rfc3339()));
        let touched: Vec<IdRef> = self
            .db
            .update(POSTS, patch, &[Filter::eq("id", id), Filter::is_null("deleted_at")])
            .await
            .require()?;
        if touched.is_empty() {
            return Err(AppError::NotFound("Post not found".to_string()));
        }
        tracing::info!(post_id = id, "post soft-deleted");
        Ok(())
    }

    async fn owned(&self, caller: i64, id: i64) -> Result<Post, AppError> {
        let post = self.get(id).await?;
        if post.author_id != caller {
            return Err(AppError::Forbidden(
                "You are not the author of this post".to_string(),
            ));
        }
        Ok(post)
    }
}

