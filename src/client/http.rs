//! `PageSource` over `GET /api/posts`.

use std::time::Duration;

use async_trait::async_trait;

use crate::{
    client::scroll::{FetchError, FetchedPage, PageSource},
    feed::{FeedFilter, PageResponse},
    models::post::Post,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct HttpPageSource {
    base_url: String,
    client: reqwest::Client,
    token: Option<String>,
}

impl HttpPageSource {
    pub fn new(base_url: impl Into<String>) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| FetchError::Transport(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            base_url: base_url.into(),
            client,
            token: None,
        })
    }

    /// Sends `Authorization: Bearer <token>` so pages carry the viewer's flags.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn posts_url(&self) -> String {
        format!("{}/api/posts", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl PageSource for HttpPageSource {
    type Item = Post;
    type Params = FeedFilter;

    async fn fetch_page(
        &self,
        params: &FeedFilter,
        offset: u64,
        limit: u64,
    ) -> Result<FetchedPage<Post>, FetchError> {
        let mut request = self
            .client
            .get(self.posts_url())
            .query(params)
            .query(&[("offset", offset), ("limit", limit)]);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        let status = response.status();
        let body: PageResponse<Post> = response
            .json()
            .await
            .map_err(|e| FetchError::Transport(format!("invalid page response ({}): {}", status, e)))?;

        match (body.error, body.data) {
            (Some(message), _) => Err(FetchError::Server(message)),
            (None, Some(items)) if status.is_success() => Ok(FetchedPage {
                items,
                has_more: body.has_more,
            }),
            _ => Err(FetchError::Server(format!("unexpected response ({})", status))),
        }
    }
}
