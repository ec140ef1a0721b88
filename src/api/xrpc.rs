use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ApiError, FeedApi, FeedParams, FeedResponse};

pub const DEFAULT_VIEW_METHOD: &str = "blueskyweb.xyz:FeedView";

/// HTTP gateway speaking `/xrpc/{method}` to a personal data server.
pub struct XrpcClient {
    pub service: String,
    pub token: Option<String>,
    pub view_method: String,
    http: Client,
}

#[derive(Serialize)]
struct InteractionBody<'a> {
    actor: &'a str,
    subject: &'a str,
}

#[derive(Deserialize)]
struct XrpcErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Map a non-2xx reply to [`ApiError::Server`], preferring the xrpc
/// `message`, then `error`, then the status reason.
fn server_error(status: StatusCode, body: &str) -> ApiError {
    let message = match serde_json::from_str::<XrpcErrorBody>(body) {
        Ok(XrpcErrorBody {
            message: Some(message),
            ..
        }) => message,
        Ok(XrpcErrorBody {
            error: Some(error), ..
        }) => error,
        _ => status.canonical_reason().unwrap_or("unknown error").to_owned(),
    };
    ApiError::Server {
        status: status.as_u16(),
        message,
    }
}

impl XrpcClient {
    pub fn new(service: impl Into<String>, token: Option<String>) -> Self {
        Self {
            service: service.into().trim_end_matches('/').to_owned(),
            token,
            view_method: DEFAULT_VIEW_METHOD.to_owned(),
            http: Client::new(),
        }
    }

    pub fn with_view_method(mut self, method: impl Into<String>) -> Self {
        self.view_method = method.into();
        self
    }

    fn url(&self, method: &str) -> String {
        format!("{}/xrpc/{}", self.service, method)
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn send(&self, req: RequestBuilder) -> Result<String, ApiError> {
        let res = self.authorize(req).send().await?;
        let status = res.status();
        let body = res.text().await?;

        if status.is_success() {
            Ok(body)
        } else {
            Err(server_error(status, &body))
        }
    }

    fn view_request(&self, params: &FeedParams) -> RequestBuilder {
        self.http.get(self.url(&self.view_method)).query(params)
    }

    async fn interact(&self, method: &str, actor: &str, uri: &str) -> Result<(), ApiError> {
        debug!(method, actor, uri, "xrpc interaction");
        let req = self
            .http
            .post(self.url(method))
            .json(&InteractionBody {
                actor,
                subject: uri,
            });
        self.send(req).await.map(drop)
    }
}

#[async_trait]
impl FeedApi for XrpcClient {
    async fn view(&self, params: &FeedParams) -> Result<FeedResponse, ApiError> {
        debug!(method = %self.view_method, ?params, "xrpc view");
        let body = self.send(self.view_request(params)).await?;

        Ok(serde_json::from_str(&body)?)
    }

    async fn like(&self, actor: &str, uri: &str) -> Result<(), ApiError> {
        self.interact("app.bsky.like", actor, uri).await
    }

    async fn unlike(&self, actor: &str, uri: &str) -> Result<(), ApiError> {
        self.interact("app.bsky.unlike", actor, uri).await
    }

    async fn repost(&self, actor: &str, uri: &str) -> Result<(), ApiError> {
        self.interact("app.bsky.repost", actor, uri).await
    }

    async fn unrepost(&self, actor: &str, uri: &str) -> Result<(), ApiError> {
        self.interact("app.bsky.unrepost", actor, uri).await
    }
}
