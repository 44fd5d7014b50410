//! Paginated feeds: clamp, over-fetch by one, trim, annotate.

use std::num::IntErrorKind;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::{
    error::AppError,
    interaction::InteractionResolver,
    models::{comment::Comment, post::Post},
    repositories::{CommentRepository, PostRepository},
};

pub use crate::repositories::FeedFilter;

pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 50;

/// Out-of-range values are clamped, never rejected.
pub fn clamp_limit(limit: Option<i64>) -> u64 {
    limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE) as u64
}

pub fn clamp_offset(offset: Option<i64>) -> u64 {
    offset.unwrap_or(0).max(0) as u64
}

/// `offset` / `limit` query parameters. Oversized numbers saturate and
/// anything unparsable falls back to the default, so the page size is
/// always clamped rather than the request rejected.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
pub struct PageParams {
    #[serde(default, deserialize_with = "lenient_i64")]
    pub offset: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub limit: Option<i64>,
}

fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| !f.is_nan())
                .map(|f| if f.is_sign_negative() { i64::MIN } else { i64::MAX })
        }),
        Some(Value::String(s)) => parse_saturating(&s),
        _ => None,
    })
}

fn parse_saturating(raw: &str) -> Option<i64> {
    match raw.trim().parse::<i64>() {
        Ok(n) => Some(n),
        Err(e) => match e.kind() {
            IntErrorKind::PosOverflow => Some(i64::MAX),
            IntErrorKind::NegOverflow => Some(i64::MIN),
            _ => None,
        },
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub has_more: bool,
    /// Offset of the row after the last one returned.
    pub next_offset: u64,
}

impl<T> Page<T> {
    /// Builds a page from an over-fetched batch of at most `limit + 1` rows.
    fn from_overfetch(mut rows: Vec<T>, offset: u64, limit: u64) -> Self {
        let has_more = rows.len() as u64 > limit;
        rows.truncate(limit as usize);
        let next_offset = offset + rows.len() as u64;
        Page {
            data: rows,
            has_more,
            next_offset,
        }
    }
}

/// Wire shape of a page: `data` is null whenever `error` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResponse<T> {
    pub data: Option<Vec<T>>,
    pub error: Option<String>,
    #[serde(default)]
    pub has_more: bool,
}

impl<T> From<Page<T>> for PageResponse<T> {
    fn from(page: Page<T>) -> Self {
        PageResponse {
            data: Some(page.data),
            error: None,
            has_more: page.has_more,
        }
    }
}

impl<T> PageResponse<T> {
    pub fn failed(message: impl Into<String>) -> Self {
        PageResponse {
            data: None,
            error: Some(message.into()),
            has_more: false,
        }
    }
}

#[derive(Clone)]
pub struct FeedAssembler {
    posts: PostRepository,
    comments: CommentRepository,
    resolver: InteractionResolver,
}

impl FeedAssembler {
    pub fn new(posts: PostRepository, comments: CommentRepository, resolver: InteractionResolver) -> Self {
        Self {
            posts,
            comments,
            resolver,
        }
    }

    pub fn resolver(&self) -> &InteractionResolver {
        &self.resolver
    }

    /// One page of posts. Interaction lookups only cover the trimmed page.
    pub async fn get_page(
        &self,
        filter: &FeedFilter,
        offset: Option<i64>,
        limit: Option<i64>,
        viewer: Option<i64>,
    ) -> Result<Page<Post>, AppError> {
        let offset = clamp_offset(offset);
        let limit = clamp_limit(limit);

        let rows = self.posts.list(filter, offset, offset + limit).await?;
        let mut page = Page::from_overfetch(rows, offset, limit);
        page.data = self.resolver.resolve_posts(page.data, viewer).await?;

        tracing::debug!(
            offset,
            limit,
            returned = page.data.len(),
            has_more = page.has_more,
            "feed page assembled"
        );
        Ok(page)
    }

    /// One page of a post's comment thread, oldest first.
    pub async fn comment_page(
        &self,
        post_id: i64,
        review_only: bool,
        offset: Option<i64>,
        limit: Option<i64>,
        viewer: Option<i64>,
    ) -> Result<Page<Comment>, AppError> {
        let offset = clamp_offset(offset);
        let limit = clamp_limit(limit);

        // A missing post is a 404, not an empty thread.
        self.posts.get(post_id).await?;
        let rows = self
            .comments
            .list(post_id, review_only, offset, offset + limit)
            .await?;
        let mut page = Page::from_overfetch(rows, offset, limit);
        page.data = self.resolver.resolve_comments(page.data, viewer).await?;
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_are_clamped() {
        assert_eq!(clamp_limit(None), 10);
        assert_eq!(clamp_limit(Some(0)), 1);
        assert_eq!(clamp_limit(Some(-5)), 1);
        assert_eq!(clamp_limit(Some(500)), 50);
        assert_eq!(clamp_offset(Some(-3)), 0);
    }

    #[test]
    fn page_params_saturate_instead_of_failing() {
        let params: PageParams = serde_json::from_value(serde_json::json!({
            "offset": "99999999999999999999",
            "limit": "-99999999999999999999",
        }))
        .unwrap();
        assert_eq!(params.offset, Some(i64::MAX));
        assert_eq!(params.limit, Some(i64::MIN));
        assert_eq!(clamp_limit(params.limit), 1);

        let params: PageParams =
            serde_json::from_value(serde_json::json!({ "offset": "abc", "limit": " 7 " })).unwrap();
        assert_eq!(params.offset, None);
        assert_eq!(params.limit, Some(7));

        let params: PageParams = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(params.limit, None);
    }

    #[test]
    fn sentinel_row_sets_has_more_and_is_dropped() {
        let page = Page::from_overfetch(vec![1, 2, 3], 4, 2);
        assert_eq!(page.data, vec![1, 2]);
        assert!(page.has_more);
        assert_eq!(page.next_offset, 6);

        let exact = Page::from_overfetch(vec![1, 2], 0, 2);
        assert!(!exact.has_more);
    }

    #[test]
    fn failed_response_has_no_data() {
        let resp: PageResponse<i32> = PageResponse::failed("boom");
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json, serde_json::json!({ "data": null, "error": "boom", "has_more": false }));
    }
}
