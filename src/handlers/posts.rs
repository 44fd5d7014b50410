use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use validator::Validate;

use crate::{
    error::AppError,
    feed::FeedAssembler,
    models::post::{CreatePostRequest, UpdatePostRequest},
    repositories::Repositories,
    utils::jwt::{CurrentUser, MaybeUser},
};

/// Get a single post. Missing and soft-deleted posts are both 404.
pub async fn get_post(
    State(repos): State<Repositories>,
    State(feed): State<FeedAssembler>,
    MaybeUser(viewer): MaybeUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let post = repos.posts.get(id).await?;
    let mut posts = feed.resolver().resolve_posts(vec![post], viewer).await?;
    // resolve_posts keeps the input length
    let post = posts
        .pop()
        .ok_or_else(|| AppError::InternalServerError("post lost during annotation".to_string()))?;
    Ok(Json(post))
}

/// Create a new post with its tags.
pub async fn create_post(
    State(repos): State<Repositories>,
    CurrentUser(user_id): CurrentUser,
    Json(payload): Json<CreatePostRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let post = repos.posts.create(user_id, payload).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

/// Edit a post (author only).
pub async fn update_post(
    State(repos): State<Repositories>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<i64>,
    Json(payload): Json<UpdatePostRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let post = repos.posts.update(user_id, id, payload).await?;
    Ok(Json(post))
}

/// Soft-delete a post (author only).
pub async fn delete_post(
    State(repos): State<Repositories>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    repos.posts.soft_delete(user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// List tags, optionally by prefix.
pub async fn list_tags(
    State(repos): State<Repositories>,
    Query(params): Query<TagListParams>,
) -> Result<impl IntoResponse, AppError> {
    let tags = repos.tags.list(params.prefix.as_deref()).await?;
    Ok(Json(tags))
}

#[derive(Debug, Deserialize)]
pub struct TagListParams {
    pub prefix: Option<String>,
}
