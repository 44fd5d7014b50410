// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    routing::{get, post, put},
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{comments, feed, interaction, posts, profile},
    state::AppState,
};

/// Assembles the main application router.
///
/// * Reads take an optional identity (`MaybeUser`), writes require one
///   (`CurrentUser`), so there is no separate auth layer.
/// * Applies global middleware (Trace, CORS).
pub fn create_router(state: AppState) -> Router {
    let origins = [
        HeaderValue::from_static("http://localhost:3000"),
        HeaderValue::from_static("http://127.0.0.1:3000"),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let post_routes = Router::new()
        .route(
            "/{id}",
            get(posts::get_post)
                .put(posts::update_post)
                .delete(posts::delete_post),
        )
        .route("/{id}/like", post(interaction::toggle_post_like))
        .route("/{id}/bookmark", post(interaction::toggle_bookmark))
        .route(
            "/{id}/comments",
            get(feed::list_comments).post(comments::create_comment),
        );

    let comment_routes = Router::new()
        .route(
            "/{id}",
            put(comments::update_comment).delete(comments::delete_comment),
        )
        .route("/{id}/like", post(interaction::toggle_comment_like));

    let user_routes = Router::new()
        .route(
            "/{id}",
            get(profile::get_profile).put(profile::update_profile),
        )
        .route("/{id}/posts", get(feed::list_user_posts))
        .route("/{id}/follow", post(interaction::toggle_follow));

    let me_routes = Router::new()
        .route("/bookmarks", get(feed::my_bookmarks))
        .route("/likes", get(feed::my_likes))
        .route("/following", get(feed::my_following));

    Router::new()
        .route("/api/posts", get(feed::list_posts).post(posts::create_post))
        .nest("/api/posts", post_routes)
        .nest("/api/comments", comment_routes)
        .nest("/api/users", user_routes)
        .nest("/api/me", me_routes)
        .route("/api/reviews", get(feed::list_reviews))
        .route("/api/search", get(feed::search))
        .route("/api/tags", get(posts::list_tags))
        .route("/api/tags/{name}/posts", get(feed::list_tag_posts))
        // Global Middleware (applied from outside in)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
