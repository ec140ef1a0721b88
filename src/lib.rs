//! Paginated feed state with single-flight loading and in-place refresh.

pub mod api;
pub mod config;
pub mod feed;

#[cfg(test)]
mod testing;

pub use api::{ApiError, FeedApi, FeedParams, XrpcClient};
pub use feed::{FeedController, FeedItem, FeedStatus, Interaction};
