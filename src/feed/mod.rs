mod controller;
mod item;

pub use controller::{FeedController, FeedError, FeedStatus, Lifecycle, DEFAULT_PAGE_CAP};
pub use item::{ContentKey, FeedItem, Interaction, ItemKey, ItemState};
