// tests/profile_tests.rs

mod common;

use common::{seed_post, seed_user, spawn_app, token};
use serde_json::{Value, json};

#[tokio::test]
async fn profile_reports_counts_and_follow_state() {
    let app = spawn_app().await;
    let alice = seed_user(&app.backend, "alice");
    let bob = seed_user(&app.backend, "bob");
    seed_post(&app.backend, alice, "hello", 1);

    let follow: Value = app
        .client
        .post(app.url(&format!("/api/users/{}/follow", alice)))
        .bearer_auth(token(bob))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(follow, json!({ "following": true }));

    let profile: Value = app
        .client
        .get(app.url(&format!("/api/users/{}", alice)))
        .bearer_auth(token(bob))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(profile["username"], json!("alice"));
    assert_eq!(profile["posts_count"], json!(1));
    assert_eq!(profile["followers_count"], json!(1));
    assert_eq!(profile["is_following"], json!(true));

    let bobs: Value = app
        .client
        .get(app.url(&format!("/api/users/{}", bob)))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(bobs["following_count"], json!(1));
    assert_eq!(bobs["is_following"], json!(false));
}

#[tokio::test]
async fn following_feed_lists_followed_authors() {
    let app = spawn_app().await;
    let alice = seed_user(&app.backend, "alice");
    let bob = seed_user(&app.backend, "bob");
    let carol = seed_user(&app.backend, "carol");
    let wanted = seed_post(&app.backend, alice, "from alice", 1);
    seed_post(&app.backend, carol, "from carol", 2);

    app.client
        .post(app.url(&format!("/api/users/{}/follow", alice)))
        .bearer_auth(token(bob))
        .send()
        .await
        .unwrap();

    let body: Value = app
        .client
        .get(app.url("/api/me/following"))
        .bearer_auth(token(bob))
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
    assert_eq!(ids, vec![wanted]);
}

#[tokio::test]
async fn cannot_follow_yourself_or_a_missing_user() {
    let app = spawn_app().await;
    let alice = seed_user(&app.backend, "alice");

    let me = app
        .client
        .post(app.url(&format!("/api/users/{}/follow", alice)))
        .bearer_auth(token(alice))
        .send()
        .await
        .unwrap();
    assert_eq!(me.status().as_u16(), 400);

    let ghost = app
        .client
        .post(app.url("/api/users/777/follow"))
        .bearer_auth(token(alice))
        .send()
        .await
        .unwrap();
    assert_eq!(ghost.status().as_u16(), 422);
}

#[tokio::test]
async fn update_profile_validates_and_checks_ownership() {
    let app = spawn_app().await;
    let alice = seed_user(&app.backend, "alice");
    let bob = seed_user(&app.backend, "bob");

    let bad_url = app
        .client
        .put(app.url(&format!("/api/users/{}", alice)))
        .bearer_auth(token(alice))
        .json(&json!({ "website": "javascript:alert(1)" }))
        .send()
        .await
        .unwrap();
    assert_eq!(bad_url.status().as_u16(), 400);

    let not_mine = app
        .client
        .put(app.url(&format!("/api/users/{}", alice)))
        .bearer_auth(token(bob))
        .json(&json!({ "bio": "hacked" }))
        .send()
        .await
        .unwrap();
    assert_eq!(not_mine.status().as_u16(), 403);

    let ok: Value = app
        .client
        .put(app.url(&format!("/api/users/{}", alice)))
        .bearer_auth(token(alice))
        .json(&json!({ "bio": "systems person", "website": "https://example.com" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(ok["bio"], json!("systems person"));
    assert_eq!(ok["website"], json!("https://example.com"));
    assert_eq!(ok["display_name"], Value::Null);
}

#[tokio::test]
async fn user_posts_feed_is_404_for_unknown_users() {
    let app = spawn_app().await;

    let response = app.client.get(app.url("/api/users/404/posts")).send().await.unwrap();

    assert_eq!(response.status().as_u16(), 404);
}
