use axum::extract::FromRef;

use crate::{
    config::Config,
    feed::FeedAssembler,
    interaction::InteractionResolver,
    query::QueryAdapter,
    repositories::Repositories,
};

#[derive(Clone)]
pub struct AppState {
    pub repos: Repositories,
    pub feed: FeedAssembler,
    pub config: Config,
}

impl AppState {
    /// Wires every repository and the feed assembler to one adapter.
    pub fn new(db: QueryAdapter, config: Config) -> Self {
        let repos = Repositories::new(db);
        let resolver = InteractionResolver::new(repos.likes.clone(), repos.bookmarks.clone());
        let feed = FeedAssembler::new(repos.posts.clone(), repos.comments.clone(), resolver);
        Self {
            repos,
            feed,
            config,
        }
    }
}

impl FromRef<AppState> for Repositories {
    fn from_ref(state: &AppState) -> Self {
        state.repos.clone()
    }
}

impl FromRef<AppState> for FeedAssembler {
    fn from_ref(state: &AppState) -> Self {
        state.feed.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}
