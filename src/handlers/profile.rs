use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};

use crate::{
    error::AppError,
    models::user::UpdateProfileRequest,
    repositories::Repositories,
    utils::jwt::{CurrentUser, MaybeUser},
};

/// Public profile with post and follow counts.
pub async fn get_profile(
    State(repos): State<Repositories>,
    MaybeUser(viewer): MaybeUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(repos.profile(id, viewer).await?))
}

/// Edit one's own profile.
pub async fn update_profile(
    State(repos): State<Repositories>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse, AppError> {
    repos.users.update_profile(user_id, id, payload).await?;
    Ok(Json(repos.profile(id, Some(user_id)).await?))
}
