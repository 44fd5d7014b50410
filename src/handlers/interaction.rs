use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use serde_json::json;

use crate::{error::AppError, repositories::Repositories, utils::jwt::CurrentUser};

/// Toggle Like on a post.
pub async fn toggle_post_like(
    State(repos): State<Repositories>,
    CurrentUser(user_id): CurrentUser,
    Path(post_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let liked = repos.likes.toggle_post_like(user_id, post_id).await?;
    Ok(Json(json!({ "liked": liked })))
}

/// Toggle Bookmark on a post.
pub async fn toggle_bookmark(
    State(repos): State<Repositories>,
    CurrentUser(user_id): CurrentUser,
    Path(post_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let bookmarked = repos.bookmarks.toggle_bookmark(user_id, post_id).await?;
    Ok(Json(json!({ "bookmarked": bookmarked })))
}

/// Toggle Like on a comment.
pub async fn toggle_comment_like(
    State(repos): State<Repositories>,
    CurrentUser(user_id): CurrentUser,
    Path(comment_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let liked = repos.likes.toggle_comment_like(user_id, comment_id).await?;
    Ok(Json(json!({ "liked": liked })))
}

/// Follow or unfollow a user.
pub async fn toggle_follow(
    State(repos): State<Repositories>,
    CurrentUser(user_id): CurrentUser,
    Path(target_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let following = repos.follows.toggle_follow(user_id, target_id).await?;
    Ok(Json(json!({ "following": following })))
}
