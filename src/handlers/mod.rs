// src/handlers/mod.rs

pub mod comments;
pub mod feed;
pub mod interaction;
pub mod posts;
pub mod profile;

use axum::{
    Json,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::{
    error::AppError,
    feed::{Page, PageResponse},
};

/// Renders a feed page as `{ data, error, has_more }`. Failures keep the same
/// shape with `data: null` and the error's status code.
pub(crate) fn page_response<T: Serialize>(result: Result<Page<T>, AppError>) -> Response {
    match result {
        Ok(page) => Json(PageResponse::from(page)).into_response(),
        Err(e) => {
            let (status, message) = e.status_and_message();
            (status, Json(PageResponse::<T>::failed(message))).into_response()
        }
    }
}
