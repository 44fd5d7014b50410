//! Table layout for the in-process backend. Mirrors what
//! `migrations/0001_init.sql` sets up in Postgres: column defaults, unique
//! keys, counter triggers and the two post/tag functions.

use anyhow::anyhow;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{
    query::{BackendError, Filter, MemoryBackend, Row, memory::{CounterRule, MemoryTables}},
    repositories::{
        BOOKMARKS, COMMENT_LIKES, COMMENTS, FOLLOWS, POST_LIKES, POST_TAGS, POSTS, TAGS, USERS,
    },
};

pub fn install(backend: &MemoryBackend) {
    backend.set_defaults(
        USERS,
        json!({ "display_name": null, "bio": null, "website": null, "avatar_url": null, "deleted_at": null }),
    );
    backend.set_defaults(
        POSTS,
        json!({
            "code": null,
            "language": null,
            "review_enabled": false,
            "likes_count": 0,
            "comments_count": 0,
            "bookmarks_count": 0,
            "updated_at": null,
            "deleted_at": null,
        }),
    );
    backend.set_defaults(
        COMMENTS,
        json!({
            "start_line": null,
            "end_line": null,
            "likes_count": 0,
            "updated_at": null,
            "deleted_at": null,
        }),
    );

    backend.add_unique_key(USERS, &["username"]);
    backend.add_unique_key(TAGS, &["name"]);
    backend.add_unique_key(POST_TAGS, &["post_id", "tag_id"]);
    backend.add_unique_key(POST_LIKES, &["user_id", "post_id"]);
    backend.add_unique_key(COMMENT_LIKES, &["user_id", "comment_id"]);
    backend.add_unique_key(BOOKMARKS, &["user_id", "post_id"]);
    backend.add_unique_key(FOLLOWS, &["follower_id", "following_id"]);

    for (child, key, parent, column, live_only) in [
        (POST_LIKES, "post_id", POSTS, "likes_count", false),
        (BOOKMARKS, "post_id", POSTS, "bookmarks_count", false),
        (COMMENTS, "post_id", POSTS, "comments_count", true),
        (COMMENT_LIKES, "comment_id", COMMENTS, "likes_count", false),
    ] {
        backend.add_counter(CounterRule {
            child_table: child.to_string(),
            foreign_key: key.to_string(),
            parent_table: parent.to_string(),
            column: column.to_string(),
            live_only,
        });
    }

    backend.register_rpc("create_post_with_tags", create_post_with_tags);
    backend.register_rpc("update_post_with_tags", update_post_with_tags);
}

#[derive(Deserialize)]
struct CreatePostArgs {
    author_id: i64,
    content: String,
    code: Option<String>,
    language: Option<String>,
    #[serde(default)]
    review_enabled: bool,
    #[serde(default)]
    tags: Vec<String>,
}

/// Null fields are left as they are.
#[derive(Deserialize)]
struct UpdatePostArgs {
    id: i64,
    content: Option<String>,
    code: Option<String>,
    language: Option<String>,
    review_enabled: Option<bool>,
    tags: Option<Vec<String>>,
}

fn create_post_with_tags(tables: &mut MemoryTables, args: Value) -> Result<Value, BackendError> {
    let args: CreatePostArgs = serde_json::from_value(args).map_err(anyhow::Error::from)?;

    let mut row = Row::new();
    row.insert("author_id".into(), json!(args.author_id));
    row.insert("content".into(), json!(args.content));
    row.insert("code".into(), json!(args.code));
    row.insert("language".into(), json!(args.language));
    row.insert("review_enabled".into(), json!(args.review_enabled));
    let post = tables.insert(POSTS, row)?;
    let post_id = post
        .get("id")
        .and_then(Value::as_i64)
        .ok_or_else(|| anyhow!("inserted post has no id"))?;

    replace_tags(tables, post_id, &args.tags)?;
    Ok(json!({ "id": post_id }))
}

fn update_post_with_tags(tables: &mut MemoryTables, args: Value) -> Result<Value, BackendError> {
    let args: UpdatePostArgs = serde_json::from_value(args).map_err(anyhow::Error::from)?;
    let key = [Filter::eq("id", args.id), Filter::is_null("deleted_at")];

    let mut patch = Row::new();
    if let Some(content) = args.content {
        patch.insert("content".into(), json!(content));
    }
    if let Some(code) = args.code {
        patch.insert("code".into(), json!(code));
    }
    if let Some(language) = args.language {
        patch.insert("language".into(), json!(language));
    }
    if let Some(review_enabled) = args.review_enabled {
        patch.insert("review_enabled".into(), json!(review_enabled));
    }
    patch.insert("updated_at".into(), json!(Utc::now().to_rfc3339()));

    if tables.update(POSTS, &patch, &key)?.is_empty() {
        return Err(anyhow!("post {} does not exist", args.id).into());
    }
    if let Some(tags) = args.tags {
        tables.delete(POST_TAGS, &[Filter::eq("post_id", args.id)]);
        replace_tags(tables, args.id, &tags)?;
    }
    Ok(json!({ "id": args.id }))
}

/// Attaches `names` to the post, creating missing tags.
fn replace_tags(tables: &mut MemoryTables, post_id: i64, names: &[String]) -> Result<(), BackendError> {
    for name in names {
        let existing = tables.find(TAGS, &[Filter::eq("name", name.as_str())]);
        let tag = match existing.into_iter().next() {
            Some(tag) => tag,
            None => {
                let mut row = Row::new();
                row.insert("name".into(), json!(name));
                tables.insert(TAGS, row)?
            }
        };
        let mut link = Row::new();
        link.insert("post_id".into(), json!(post_id));
        link.insert("tag_id".into(), tag.get("id").cloned().unwrap_or(Value::Null));
        tables.insert(POST_TAGS, link)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Backend;

    #[tokio::test]
    async fn create_rpc_reuses_existing_tags() {
        let backend = MemoryBackend::new();
        install(&backend);
        backend.seed(TAGS, vec![json!({ "name": "rust" })]);

        let created = backend
            .rpc(
                "create_post_with_tags",
                json!({ "author_id": 1, "content": "hi", "tags": ["rust", "async"] }),
            )
            .await
            .unwrap();

        assert_eq!(created, json!({ "id": 1 }));
        assert_eq!(backend.rows(TAGS).len(), 2);
        assert_eq!(backend.rows(POST_TAGS).len(), 2);
    }

    #[tokio::test]
    async fn failed_update_leaves_tags_untouched() {
        let backend = MemoryBackend::new();
        install(&backend);
        backend
            .rpc(
                "create_post_with_tags",
                json!({ "author_id": 1, "content": "hi", "tags": ["rust"] }),
            )
            .await
            .unwrap();

        let err = backend
            .rpc("update_post_with_tags", json!({ "id": 99, "tags": ["go"] }))
            .await;

        assert!(err.is_err());
        assert_eq!(backend.rows(POST_TAGS).len(), 1);
        assert_eq!(backend.rows(TAGS).len(), 1);
    }

    #[tokio::test]
    async fn soft_deleting_a_comment_decrements_the_post_counter() {
        let backend = MemoryBackend::new();
        install(&backend);
        backend.seed(POSTS, vec![json!({ "author_id": 1, "content": "p" })]);
        backend.seed(COMMENTS, vec![json!({ "post_id": 1, "author_id": 1, "content": "c" })]);
        assert_eq!(backend.rows(POSTS)[0]["comments_count"], json!(1));

        let mut patch = Row::new();
        patch.insert("deleted_at".into(), json!(Utc::now().to_rfc3339()));
        backend
            .update(COMMENTS, patch, &[Filter::eq("id", 1)])
            .await
            .unwrap();

        assert_eq!(backend.rows(POSTS)[0]["comments_count"], json!(0));
    }
}
