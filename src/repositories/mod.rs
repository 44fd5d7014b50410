// src/repositories/mod.rs

//! Entity repositories. Each one turns logical requests into query
//! descriptors for its table and shapes the rows that come back. Reads always
//! go through a repository's `visible()` descriptor, which carries the
//! soft-delete predicate.

pub mod bookmark;
pub mod comment;
pub mod follow;
pub mod like;
pub mod post;
pub mod schema;
pub mod tag;
pub mod user;

use crate::{
    error::AppError,
    models::{interaction::IdRef, user::Profile},
    query::{Filter, QueryAdapter, QueryDescriptor, QueryError, Row},
};

pub use bookmark::BookmarkRepository;
pub use comment::CommentRepository;
pub use follow::FollowRepository;
pub use like::LikeRepository;
pub use post::{FeedFilter, PostRepository};
pub use tag::TagRepository;
pub use user::UserRepository;

pub const USERS: &str = "users";
pub const POSTS: &str = "posts";
pub const COMMENTS: &str = "comments";
pub const TAGS: &str = "tags";
pub const POST_TAGS: &str = "post_tags";
pub const POST_LIKES: &str = "post_likes";
pub const COMMENT_LIKES: &str = "comment_likes";
pub const BOOKMARKS: &str = "bookmarks";
pub const FOLLOWS: &str = "follows";

/// Every repository, wired to one adapter.
#[derive(Clone)]
pub struct Repositories {
    pub users: UserRepository,
    pub posts: PostRepository,
    pub comments: CommentRepository,
    pub likes: LikeRepository,
    pub bookmarks: BookmarkRepository,
    pub follows: FollowRepository,
    pub tags: TagRepository,
}

impl Repositories {
    pub fn new(db: QueryAdapter) -> Self {
        let users = UserRepository::new(db.clone());
        let posts = PostRepository::new(db.clone());
        let comments = CommentRepository::new(db.clone(), posts.clone());
        Self {
            likes: LikeRepository::new(db.clone(), posts.clone(), comments.clone()),
            bookmarks: BookmarkRepository::new(db.clone(), posts.clone()),
            follows: FollowRepository::new(db.clone(), users.clone()),
            tags: TagRepository::new(db),
            users,
            posts,
            comments,
        }
    }

    /// Public profile with its counters, fetched concurrently.
    pub async fn profile(&self, user_id: i64, viewer: Option<i64>) -> Result<Profile, AppError> {
        let is_following = async {
            match viewer {
                Some(v) if v != user_id => self.follows.is_following(v, user_id).await,
                _ => Ok(false),
            }
        };
        let posts_filter = FeedFilter {
            author_id: Some(user_id),
            ..Default::default()
        };
        let (user, posts_count, followers_count, following_count, is_following) = tokio::try_join!(
            self.users.get(user_id),
            self.posts.count(&posts_filter),
            self.follows.follower_count(user_id),
            self.follows.following_count(user_id),
            is_following,
        )?;

        Ok(Profile {
            user,
            posts_count,
            followers_count,
            following_count,
            is_following,
        })
    }
}

/// Deletes the `(user, target)` interaction row if present, inserts it
/// otherwise. Returns whether the row exists afterwards. A concurrent insert
/// of the same pair surfaces as `Conflict`.
pub(crate) async fn toggle_row(
    db: &QueryAdapter,
    table: &str,
    user_column: &str,
    user_id: i64,
    target_column: &str,
    target_id: i64,
) -> Result<bool, AppError> {
    let key = [
        Filter::eq(user_column, user_id),
        Filter::eq(target_column, target_id),
    ];
    let existing: Option<IdRef> = db
        .maybe_single(
            &QueryDescriptor::from(table)
                .select(&["id"])
                .filter(key[0].clone())
                .filter(key[1].clone()),
        )
        .await
        .into_result()?;

    if existing.is_some() {
        db.remove(table, &key).await.require()?;
        return Ok(false);
    }

    let mut row = Row::new();
    row.insert(user_column.to_string(), user_id.into());
    row.insert(target_column.to_string(), target_id.into());
    db.insert::<IdRef>(table, vec![row])
        .await
        .require()
        .map_err(|e| match e {
            QueryError::Conflict(_) => AppError::Conflict("Already exists".to_string()),
            other => other.into(),
        })?;
    Ok(true)
}
