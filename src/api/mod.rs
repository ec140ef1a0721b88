use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod xrpc;

pub use xrpc::XrpcClient;

/// Remote source of feed pages and viewer interactions.
#[async_trait]
pub trait FeedApi: Send + Sync {
    /// Fetch one page of the feed, newest first.
    async fn view(&self, params: &FeedParams) -> Result<FeedResponse, ApiError>;

    async fn like(&self, actor: &str, uri: &str) -> Result<(), ApiError>;
    async fn unlike(&self, actor: &str, uri: &str) -> Result<(), ApiError>;
    async fn repost(&self, actor: &str, uri: &str) -> Result<(), ApiError>;
    async fn unrepost(&self, actor: &str, uri: &str) -> Result<(), ApiError>;
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Scheme(#[from] serde_json::Error),
    #[error("API returned error {status}: {message}")]
    Server { status: u16, message: String },
}

/// Query parameters of the feed view.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    /// Only items indexed strictly before this cursor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedResponse {
    #[serde(default)]
    pub feed: Vec<FeedItemView>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedItemView {
    pub uri: String,
    pub author: User,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reposted_by: Option<User>,
    #[serde(default)]
    pub record: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embed: Option<Embed>,
    #[serde(default)]
    pub reply_count: u32,
    #[serde(default)]
    pub repost_count: u32,
    #[serde(default)]
    pub like_count: u32,
    pub indexed_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub my_state: Option<MyState>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub did: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MyState {
    #[serde(default)]
    pub has_liked: bool,
    #[serde(default)]
    pub has_reposted: bool,
}

/// Embedded content attached to a post. Only the tag is ever inspected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Embed {
    /// A quoted record.
    Record {
        author: User,
        #[serde(default)]
        record: serde_json::Value,
    },
    /// A link card.
    #[serde(rename_all = "camelCase")]
    External {
        uri: String,
        #[serde(default)]
        title: String,
        #[serde(default)]
        description: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        image_uri: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

impl Embed {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Record { .. } => "record",
            Self::External { .. } => "external",
            Self::Unknown => "unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_camel_case_item_with_repost() {
        let raw = r#"{
            "uri": "at://bob.com/post/1",
            "author": {"did": "did:bob", "name": "bob.com", "displayName": "Bob"},
            "repostedBy": {"did": "did:carla", "name": "carla.com"},
            "record": {"text": "hello"},
            "embed": {"type": "external", "uri": "https://example.com", "title": "Example", "description": "", "imageUri": "https://example.com/a.png"},
            "replyCount": 1,
            "repostCount": 2,
            "likeCount": 3,
            "indexedAt": "2022-07-01T00:00:00Z",
            "myState": {"hasLiked": true, "hasReposted": false}
        }"#;
        let item: FeedItemView = serde_json::from_str(raw).expect("valid item");
        assert_eq!(item.reposted_by.as_ref().map(|u| u.name.as_str()), Some("carla.com"));
        assert_eq!(item.author.display_name.as_deref(), Some("Bob"));
        assert_eq!(item.like_count, 3);
        assert_eq!(item.embed.as_ref().map(Embed::tag), Some("external"));
        assert_eq!(
            item.my_state,
            Some(MyState {
                has_liked: true,
                has_reposted: false
            })
        );
    }

    #[test]
    fn unknown_embed_tag_is_preserved_as_unknown() {
        let embed: Embed = serde_json::from_str(r#"{"type": "video", "src": "x"}"#).expect("decodes");
        assert_eq!(embed, Embed::Unknown);
    }

    #[test]
    fn params_skip_absent_fields() {
        let params = FeedParams {
            limit: Some(2),
            ..Default::default()
        };
        assert_eq!(serde_json::to_string(&params).expect("encodes"), r#"{"limit":2}"#);
    }
}
