use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use validator::Validate;

use crate::{
    error::AppError,
    models::comment::{CreateCommentRequest, UpdateCommentRequest},
    repositories::Repositories,
    utils::jwt::CurrentUser,
};

/// Create a new comment. A line range makes it a review comment.
pub async fn create_comment(
    State(repos): State<Repositories>,
    CurrentUser(user_id): CurrentUser,
    Path(post_id): Path<i64>,
    Json(payload): Json<CreateCommentRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let comment = repos.comments.create(user_id, post_id, payload).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

/// Edit a comment (author only).
pub async fn update_comment(
    State(repos): State<Repositories>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateCommentRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let comment = repos.comments.update(user_id, id, payload).await?;
    Ok(Json(comment))
}

/// Soft-delete a comment (author only).
pub async fn delete_comment(
    State(repos): State<Repositories>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    repos.comments.soft_delete(user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
