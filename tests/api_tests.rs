// tests/api_tests.rs

mod common;

use codefeed::repositories::{POST_LIKES, POSTS};
use common::{seed_comment, seed_post, seed_user, spawn_app, token};
use serde_json::{Value, json};

#[tokio::test]
async fn health_check_404() {
    // Arrange
    let app = spawn_app().await;

    // Act
    let response = app
        .client
        .get(app.url("/random_path_that_does_not_exist"))
        .send()
        .await
        .expect("Failed to execute request");

    // Assert
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn anonymous_feed_has_the_page_shape() {
    let app = spawn_app().await;
    let u1 = seed_user(&app.backend, "u1");
    for minute in 0..3 {
        seed_post(&app.backend, u1, "hello", minute);
    }

    let response = app
        .client
        .get(app.url("/api/posts?limit=2"))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
    assert_eq!(body["has_more"], json!(true));
    assert_eq!(body["error"], Value::Null);
    assert_eq!(body["data"][0]["is_liked"], json!(false));
    assert_eq!(body["data"][0]["author"]["username"], json!("u1"));
}

#[tokio::test]
async fn oversized_page_params_are_clamped() {
    let app = spawn_app().await;
    let u1 = seed_user(&app.backend, "u1");
    for minute in 0..55 {
        seed_post(&app.backend, u1, "hello", minute);
    }

    let response = app
        .client
        .get(app.url("/api/posts?limit=100000000000000000000"))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"].as_array().unwrap().len(), 50);
    assert_eq!(body["has_more"], json!(true));

    let response = app
        .client
        .get(app.url("/api/posts?offset=99999999999999999999&limit=abc"))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({ "data": [], "error": null, "has_more": false }));
}

#[tokio::test]
async fn create_post_requires_a_token() {
    let app = spawn_app().await;

    let response = app
        .client
        .post(app.url("/api/posts"))
        .json(&json!({ "content": "hi" }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn create_post_and_find_it_by_tag() {
    let app = spawn_app().await;
    let u1 = seed_user(&app.backend, "u1");

    let response = app
        .client
        .post(app.url("/api/posts"))
        .bearer_auth(token(u1))
        .json(&json!({
            "content": "borrowck tricks",
            "code": "fn main() {}",
            "language": "rust",
            "tags": ["#Rust", " borrowck "]
        }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 201);
    let created: Value = response.json().await.unwrap();
    assert_eq!(created["tags"], json!(["borrowck", "rust"]));

    let body: Value = app
        .client
        .get(app.url("/api/tags/rust/posts"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"][0]["id"], created["id"]);

    let unknown = app.client.get(app.url("/api/tags/cobol/posts")).send().await.unwrap();
    assert_eq!(unknown.status().as_u16(), 404);
    let body: Value = unknown.json().await.unwrap();
    assert_eq!(body["data"], Value::Null);
    assert_eq!(body["has_more"], json!(false));
}

#[tokio::test]
async fn create_post_fails_validation() {
    let app = spawn_app().await;
    let u1 = seed_user(&app.backend, "u1");

    // Review without code
    let response = app
        .client
        .post(app.url("/api/posts"))
        .bearer_auth(token(u1))
        .json(&json!({ "content": "review me", "review_enabled": true }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn missing_post_is_not_found() {
    let app = spawn_app().await;

    let response = app.client.get(app.url("/api/posts/999")).send().await.unwrap();

    assert_eq!(response.status().as_u16(), 404);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], json!("Post not found"));
}

#[tokio::test]
async fn only_the_author_can_edit_or_delete() {
    let app = spawn_app().await;
    let u1 = seed_user(&app.backend, "u1");
    let u2 = seed_user(&app.backend, "u2");
    let post = seed_post(&app.backend, u1, "mine", 1);

    let edit = app
        .client
        .put(app.url(&format!("/api/posts/{}", post)))
        .bearer_auth(token(u2))
        .json(&json!({ "content": "theirs" }))
        .send()
        .await
        .unwrap();
    assert_eq!(edit.status().as_u16(), 403);

    let delete = app
        .client
        .delete(app.url(&format!("/api/posts/{}", post)))
        .bearer_auth(token(u1))
        .send()
        .await
        .unwrap();
    assert_eq!(delete.status().as_u16(), 204);

    let gone = app.client.get(app.url(&format!("/api/posts/{}", post))).send().await.unwrap();
    assert_eq!(gone.status().as_u16(), 404);
}

#[tokio::test]
async fn comment_ownership_leaves_content_unchanged() {
    let app = spawn_app().await;
    let u1 = seed_user(&app.backend, "u1");
    let u2 = seed_user(&app.backend, "u2");
    let post = seed_post(&app.backend, u1, "p", 1);
    let comment = seed_comment(&app.backend, post, u1, "original");

    let response = app
        .client
        .put(app.url(&format!("/api/comments/{}", comment)))
        .bearer_auth(token(u2))
        .json(&json!({ "content": "hijacked" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 403);

    let body: Value = app
        .client
        .get(app.url(&format!("/api/posts/{}/comments", post)))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"][0]["content"], json!("original"));
}

#[tokio::test]
async fn commenting_on_a_deleted_post_is_unprocessable() {
    let app = spawn_app().await;
    let u1 = seed_user(&app.backend, "u1");
    let post = seed_post(&app.backend, u1, "p", 1);
    app.client
        .delete(app.url(&format!("/api/posts/{}", post)))
        .bearer_auth(token(u1))
        .send()
        .await
        .unwrap();

    let response = app
        .client
        .post(app.url(&format!("/api/posts/{}/comments", post)))
        .bearer_auth(token(u1))
        .json(&json!({ "content": "late" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 422);
}

#[tokio::test]
async fn like_toggle_shows_up_for_the_viewer_only() {
    let app = spawn_app().await;
    let u1 = seed_user(&app.backend, "u1");
    let post = seed_post(&app.backend, u1, "p", 1);

    let liked: Value = app
        .client
        .post(app.url(&format!("/api/posts/{}/like", post)))
        .bearer_auth(token(u1))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(liked, json!({ "liked": true }));

    let mine: Value = app
        .client
        .get(app.url(&format!("/api/posts/{}", post)))
        .bearer_auth(token(u1))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(mine["is_liked"], json!(true));
    assert_eq!(mine["likes_count"], json!(1));

    let anonymous: Value = app
        .client
        .get(app.url(&format!("/api/posts/{}", post)))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(anonymous["is_liked"], json!(false));
}

#[tokio::test]
async fn interaction_failure_returns_no_partial_page() {
    let app = spawn_app().await;
    let u1 = seed_user(&app.backend, "u1");
    seed_post(&app.backend, u1, "p", 1);
    app.backend.fail_table(POST_LIKES, "timeout");

    let response = app
        .client
        .get(app.url("/api/posts"))
        .bearer_auth(token(u1))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 500);
    let body: Value = response.json().await.unwrap();
    assert_eq!(
        body,
        json!({ "data": null, "error": "Internal Server Error", "has_more": false })
    );
}

#[tokio::test]
async fn post_query_failure_returns_no_partial_page() {
    let app = spawn_app().await;
    let u1 = seed_user(&app.backend, "u1");
    seed_post(&app.backend, u1, "p", 1);
    app.backend.fail_table(POSTS, "connection refused");

    let response = app
        .client
        .get(app.url("/api/posts"))
        .bearer_auth(token(u1))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 500);
    let body: Value = response.json().await.unwrap();
    assert_eq!(
        body,
        json!({ "data": null, "error": "Internal Server Error", "has_more": false })
    );
    assert_eq!(app.backend.calls_to(POST_LIKES), 0);
}

#[tokio::test]
async fn search_matches_percent_literally() {
    let app = spawn_app().await;
    let u1 = seed_user(&app.backend, "u1");
    let hit = seed_post(&app.backend, u1, "flash sale 50%off", 1);
    seed_post(&app.backend, u1, "50 shades off", 2);

    let body: Value = app
        .client
        .get(app.url("/api/search"))
        .query(&[("q", "50%off")])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let ids: Vec<i64> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![hit]);

    let empty = app.client.get(app.url("/api/search?q=")).send().await.unwrap();
    assert_eq!(empty.status().as_u16(), 400);
}

#[tokio::test]
async fn bookmarks_feed_is_private() {
    let app = spawn_app().await;
    let u1 = seed_user(&app.backend, "u1");
    let post = seed_post(&app.backend, u1, "keep", 1);
    seed_post(&app.backend, u1, "skip", 2);

    let unauthorized = app.client.get(app.url("/api/me/bookmarks")).send().await.unwrap();
    assert_eq!(unauthorized.status().as_u16(), 401);

    app.client
        .post(app.url(&format!("/api/posts/{}/bookmark", post)))
        .bearer_auth(token(u1))
        .send()
        .await
        .unwrap();

    let body: Value = app
        .client
        .get(app.url("/api/me/bookmarks"))
        .bearer_auth(token(u1))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["is_bookmarked"], json!(true));

    // The public feed ignores the viewer-private filter.
    let public: Value = app
        .client
        .get(app.url(&format!("/api/posts?bookmarked_by={}", u1)))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(public["data"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn http_page_source_feeds_the_controller() {
    use codefeed::client::{FeedController, HttpPageSource, LoadOutcome};
    use codefeed::feed::FeedFilter;

    let app = spawn_app().await;
    let u1 = seed_user(&app.backend, "u1");
    for minute in 0..5 {
        seed_post(&app.backend, u1, "post", minute);
    }

    let source = HttpPageSource::new(app.address.clone())
        .expect("Failed to build client")
        .with_token(token(u1));
    let filter = FeedFilter {
        author_id: Some(u1),
        ..Default::default()
    };
    let controller = FeedController::with_page_size(source, filter, 3);

    assert_eq!(controller.load_more().await, LoadOutcome::Appended(3));
    assert_eq!(controller.load_more().await, LoadOutcome::Appended(2));
    assert_eq!(controller.load_more().await, LoadOutcome::Skipped);
    assert_eq!(controller.snapshot().items.len(), 5);
}
