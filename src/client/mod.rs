//! Consumer side of the feed endpoints: an infinite-scroll controller and
//! an HTTP page source for it.

pub mod http;
pub mod scroll;

pub use http::HttpPageSource;
pub use scroll::{
    FeedController, FeedSnapshot, FeedStatus, FetchError, FetchedPage, Identified, LoadOutcome,
    PageSource,
};
