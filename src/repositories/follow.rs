use crate::{
    error::AppError,
    models::interaction::IdRef,
    query::{Filter, QueryAdapter, QueryDescriptor, Relation},
    repositories::{FOLLOWS, USERS, toggle_row, user::UserRepository},
};

#[derive(Clone)]
pub struct FollowRepository {
    db: QueryAdapter,
    users: UserRepository,
}

impl FollowRepository {
    pub fn new(db: QueryAdapter, users: UserRepository) -> Self {
        Self { db, users }
    }

    /// Follows or unfollows a live user. Returns the new state.
    pub async fn toggle_follow(&self, follower_id: i64, target_id: i64) -> Result<bool, AppError> {
        if follower_id == target_id {
            return Err(AppError::BadRequest("You cannot follow yourself".to_string()));
        }
        self.users.ensure_available(target_id).await?;
        let following =
            toggle_row(&self.db, FOLLOWS, "follower_id", follower_id, "following_id", target_id).await?;
        tracing::debug!(follower_id, target_id, following, "follow toggled");
        Ok(following)
    }

    pub async fn is_following(&self, follower_id: i64, target_id: i64) -> Result<bool, AppError> {
        let row: Option<IdRef> = self
            .db
            .maybe_single(
                &QueryDescriptor::from(FOLLOWS)
                    .select(&["id"])
                    .filter(Filter::eq("follower_id", follower_id))
                    .filter(Filter::eq("following_id", target_id)),
            )
            .await
            .into_result()?;
        Ok(row.is_some())
    }

    /// Live accounts following `user_id`.
    pub async fn follower_count(&self, user_id: i64) -> Result<i64, AppError> {
        let q = QueryDescriptor::from(FOLLOWS)
            .filter(Filter::eq("following_id", user_id))
            .with(Relation::belongs_to("follower", USERS, "follower_id").live().exists());
        Ok(self.db.count(&q).await.require()?)
    }

    /// Live accounts `user_id` follows.
    pub async fn following_count(&self, user_id: i64) -> Result<i64, AppError> {
        let q = QueryDescriptor::from(FOLLOWS)
            .filter(Filter::eq("follower_id", user_id))
            .with(Relation::belongs_to("followed", USERS, "following_id").live().exists());
        Ok(self.db.count(&q).await.require()?)
    }
}
