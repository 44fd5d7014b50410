//! Infinite-scroll state machine.
//!
//! One `FeedController` drives one feed instance through `Idle -> Loading ->
//! Idle | Error`. A load-more trigger while a fetch is in flight is a no-op,
//! so repeated viewport signals never stack requests. `reset` bumps a
//! generation counter; a fetch that completes under an older generation is
//! dropped instead of committed.

use std::{
    collections::HashSet,
    sync::{Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use thiserror::Error;

use crate::{
    feed::DEFAULT_PAGE_SIZE,
    models::{comment::Comment, post::Post},
};

pub trait Identified {
    fn id(&self) -> i64;
}

impl Identified for Post {
    fn id(&self) -> i64 {
        self.id
    }
}

impl Identified for Comment {
    fn id(&self) -> i64 {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("{0}")]
    Server(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchedPage<T> {
    pub items: Vec<T>,
    pub has_more: bool,
}

/// Where pages come from.
#[async_trait]
pub trait PageSource: Send + Sync {
    type Item: Identified + Clone + Send + Sync;
    type Params: Clone + Send + Sync;

    async fn fetch_page(
        &self,
        params: &Self::Params,
        offset: u64,
        limit: u64,
    ) -> Result<FetchedPage<Self::Item>, FetchError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedStatus {
    Idle,
    Loading,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    /// Another fetch was in flight, the feed is exhausted, or it is waiting
    /// for a retry.
    Skipped,
    /// Number of new unique items appended.
    Appended(usize),
    /// The feed was reset while the fetch was outstanding.
    Discarded,
    Failed(FetchError),
}

#[derive(Debug, Clone)]
pub struct FeedSnapshot<T, P> {
    pub params: P,
    pub status: FeedStatus,
    pub items: Vec<T>,
    pub next_offset: u64,
    pub has_more: bool,
    pub error: Option<String>,
    /// The failure happened before anything was loaded.
    pub initial_error: bool,
}

struct FeedState<T, P> {
    params: P,
    status: FeedStatus,
    items: Vec<T>,
    seen: HashSet<i64>,
    next_offset: u64,
    has_more: bool,
    error: Option<String>,
    generation: u64,
}

impl<T, P> FeedState<T, P> {
    fn fresh(params: P, generation: u64) -> Self {
        Self {
            params,
            status: FeedStatus::Idle,
            items: Vec::new(),
            seen: HashSet::new(),
            next_offset: 0,
            has_more: true,
            error: None,
            generation,
        }
    }
}

/// Everything needed to run one fetch outside the lock.
struct Ticket<P> {
    params: P,
    offset: u64,
    generation: u64,
}

pub struct FeedController<S: PageSource> {
    source: S,
    page_size: u64,
    state: Mutex<FeedState<S::Item, S::Params>>,
}

impl<S: PageSource> FeedController<S> {
    pub fn new(source: S, params: S::Params) -> Self {
        Self::with_page_size(source, params, DEFAULT_PAGE_SIZE as u64)
    }

    pub fn with_page_size(source: S, params: S::Params, page_size: u64) -> Self {
        Self {
            source,
            page_size: page_size.max(1),
            state: Mutex::new(FeedState::fresh(params, 0)),
        }
    }

    pub fn snapshot(&self) -> FeedSnapshot<S::Item, S::Params> {
        let state = self.lock();
        FeedSnapshot {
            params: state.params.clone(),
            status: state.status,
            items: state.items.clone(),
            next_offset: state.next_offset,
            has_more: state.has_more,
            error: state.error.clone(),
            initial_error: state.status == FeedStatus::Error && state.items.is_empty(),
        }
    }

    /// Fetches the next page unless one is already in flight.
    pub async fn load_more(&self) -> LoadOutcome {
        let ticket = {
            let mut state = self.lock();
            if state.status != FeedStatus::Idle || !state.has_more {
                return LoadOutcome::Skipped;
            }
            Self::begin(&mut state)
        };
        self.run(ticket).await
    }

    /// Re-attempts the failed fetch at the same offset, keeping loaded items.
    pub async fn retry(&self) -> LoadOutcome {
        let ticket = {
            let mut state = self.lock();
            if state.status != FeedStatus::Error {
                return LoadOutcome::Skipped;
            }
            Self::begin(&mut state)
        };
        self.run(ticket).await
    }

    /// Starts over with new parameters and loads the first page. Any fetch
    /// still running for the old parameters is ignored when it lands.
    pub async fn reset(&self, params: S::Params) -> LoadOutcome {
        {
            let mut state = self.lock();
            let generation = state.generation + 1;
            *state = FeedState::fresh(params, generation);
        }
        self.load_more().await
    }

    fn begin(state: &mut FeedState<S::Item, S::Params>) -> Ticket<S::Params> {
        state.status = FeedStatus::Loading;
        state.error = None;
        Ticket {
            params: state.params.clone(),
            offset: state.next_offset,
            generation: state.generation,
        }
    }

    async fn run(&self, ticket: Ticket<S::Params>) -> LoadOutcome {
        let result = self
            .source
            .fetch_page(&ticket.params, ticket.offset, self.page_size)
            .await;

        let mut state = self.lock();
        if state.generation != ticket.generation {
            tracing::debug!(offset = ticket.offset, "dropping page fetched before reset");
            return LoadOutcome::Discarded;
        }
        match result {
            Ok(page) => {
                let mut appended = 0;
                for item in page.items {
                    if state.seen.insert(item.id()) {
                        state.items.push(item);
                        appended += 1;
                    }
                }
                state.next_offset += appended as u64;
                state.has_more = page.has_more;
                state.status = FeedStatus::Idle;
                LoadOutcome::Appended(appended)
            }
            Err(e) => {
                tracing::warn!(offset = ticket.offset, "feed page failed: {}", e);
                state.status = FeedStatus::Error;
                state.error = Some(e.to_string());
                LoadOutcome::Failed(e)
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, FeedState<S::Item, S::Params>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
