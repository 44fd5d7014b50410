use serde_json::Value;
use validator::Validate;

use crate::{
    error::AppError,
    models::user::{UpdateProfileRequest, User},
    query::{Filter, QueryAdapter, QueryDescriptor, Row},
    repositories::USERS,
};

#[derive(Clone)]
pub struct UserRepository {
    db: QueryAdapter,
}

impl UserRepository {
    pub fn new(db: QueryAdapter) -> Self {
        Self { db }
    }

    pub async fn get(&self, id: i64) -> Result<User, AppError> {
        let user: Option<User> = self
            .db
            .maybe_single(&QueryDescriptor::live(USERS).filter(Filter::eq("id", id)))
            .await
            .into_result()?;
        user.ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    pub async fn ensure_available(&self, id: i64) -> Result<User, AppError> {
        self.get(id).await.map_err(|e| match e {
            AppError::NotFound(_) => {
                AppError::DependencyUnavailable(format!("User {} is not available", id))
            }
            other => other,
        })
    }

    /// Owner only. Only the fields present in the request change.
    pub async fn update_profile(
        &self,
        caller: i64,
        id: i64,
        req: UpdateProfileRequest,
    ) -> Result<User, AppError> {
        if caller != id {
            return Err(AppError::Forbidden(
                "You can only edit your own profile".to_string(),
            ));
        }
        req.validate()?;
        self.get(id).await?;

        let patch: Row = [
            ("display_name", req.display_name),
            ("bio", req.bio),
            ("website", req.website),
            ("avatar_url", req.avatar_url),
        ]
        .into_iter()
        .filter_map(|(k, v)| v.map(|v| (k.to_string(), Value::String(v))))
        .collect();
        if patch.is_empty() {
            return self.get(id).await;
        }

        let mut updated: Vec<User> = self
            .db
            .update(USERS, patch, &[Filter::eq("id", id), Filter::is_null("deleted_at")])
            .await
            .require()?;
        updated
            .pop()
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }
}
