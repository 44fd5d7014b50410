use axum::{
    extract::{Path, Query, State},
    response::Response,
};
use serde::Deserialize;

use crate::{
    error::AppError,
    feed::{FeedAssembler, FeedFilter, PageParams},
    handlers::page_response,
    repositories::Repositories,
    utils::jwt::{CurrentUser, MaybeUser},
};

#[derive(Debug, Deserialize)]
pub struct CommentListParams {
    #[serde(default)]
    pub review_only: bool,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
}

/// Public post feed. Viewer-private filters are ignored here.
pub async fn list_posts(
    State(feed): State<FeedAssembler>,
    MaybeUser(viewer): MaybeUser,
    Query(mut filter): Query<FeedFilter>,
    Query(page): Query<PageParams>,
) -> Response {
    filter.bookmarked_by = None;
    filter.following_of = None;
    page_response(feed.get_page(&filter, page.offset, page.limit, viewer).await)
}

/// Posts open for code review.
pub async fn list_reviews(
    State(feed): State<FeedAssembler>,
    MaybeUser(viewer): MaybeUser,
    Query(page): Query<PageParams>,
) -> Response {
    let filter = FeedFilter {
        review_only: true,
        ..Default::default()
    };
    page_response(feed.get_page(&filter, page.offset, page.limit, viewer).await)
}

/// Keyword search over post content and code.
pub async fn search(
    State(feed): State<FeedAssembler>,
    MaybeUser(viewer): MaybeUser,
    Query(params): Query<SearchParams>,
    Query(page): Query<PageParams>,
) -> Response {
    let Some(q) = params.q.filter(|q| !q.trim().is_empty()) else {
        return page_response::<()>(Err(AppError::BadRequest(
            "Search keyword is required".to_string(),
        )));
    };
    let filter = FeedFilter {
        q: Some(q),
        ..Default::default()
    };
    page_response(feed.get_page(&filter, page.offset, page.limit, viewer).await)
}

/// Posts carrying one tag. Unknown tags are a 404.
pub async fn list_tag_posts(
    State(repos): State<Repositories>,
    State(feed): State<FeedAssembler>,
    MaybeUser(viewer): MaybeUser,
    Path(name): Path<String>,
    Query(page): Query<PageParams>,
) -> Response {
    let result = async {
        let tag = repos.tags.find(&name).await?;
        let filter = FeedFilter {
            tag: Some(tag.name),
            ..Default::default()
        };
        feed.get_page(&filter, page.offset, page.limit, viewer).await
    }
    .await;
    page_response(result)
}

/// A user's posts, newest first.
pub async fn list_user_posts(
    State(repos): State<Repositories>,
    State(feed): State<FeedAssembler>,
    MaybeUser(viewer): MaybeUser,
    Path(user_id): Path<i64>,
    Query(page): Query<PageParams>,
) -> Response {
    let result = async {
        repos.users.get(user_id).await?;
        let filter = FeedFilter {
            author_id: Some(user_id),
            ..Default::default()
        };
        feed.get_page(&filter, page.offset, page.limit, viewer).await
    }
    .await;
    page_response(result)
}

/// Comment thread of a post, oldest first.
pub async fn list_comments(
    State(feed): State<FeedAssembler>,
    MaybeUser(viewer): MaybeUser,
    Path(post_id): Path<i64>,
    Query(params): Query<CommentListParams>,
    Query(page): Query<PageParams>,
) -> Response {
    page_response(
        feed.comment_page(post_id, params.review_only, page.offset, page.limit, viewer)
            .await,
    )
}

/// The caller's bookmarks.
pub async fn my_bookmarks(
    State(feed): State<FeedAssembler>,
    CurrentUser(user_id): CurrentUser,
    Query(page): Query<PageParams>,
) -> Response {
    let filter = FeedFilter {
        bookmarked_by: Some(user_id),
        ..Default::default()
    };
    page_response(feed.get_page(&filter, page.offset, page.limit, Some(user_id)).await)
}

/// Posts the caller has liked.
pub async fn my_likes(
    State(feed): State<FeedAssembler>,
    CurrentUser(user_id): CurrentUser,
    Query(page): Query<PageParams>,
) -> Response {
    let filter = FeedFilter {
        liked_by: Some(user_id),
        ..Default::default()
    };
    page_response(feed.get_page(&filter, page.offset, page.limit, Some(user_id)).await)
}

/// Posts by the users the caller follows.
pub async fn my_following(
    State(feed): State<FeedAssembler>,
    CurrentUser(user_id): CurrentUser,
    Query(page): Query<PageParams>,
) -> Response {
    let filter = FeedFilter {
        following_of: Some(user_id),
        ..Default::default()
    };
    page_response(feed.get_page(&filter, page.offset, page.limit, Some(user_id)).await)
}
