//! Scripted in-memory gateway for unit tests.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::api::{ApiError, FeedApi, FeedItemView, FeedParams, FeedResponse, User};

pub(crate) fn view(uri: &str, indexed_at: &str) -> FeedItemView {
    FeedItemView {
        uri: uri.to_owned(),
        author: User {
            did: "did:bob".to_owned(),
            name: "bob.com".to_owned(),
            display_name: None,
        },
        reposted_by: None,
        record: serde_json::json!({ "text": uri }),
        embed: None,
        reply_count: 0,
        repost_count: 0,
        like_count: 0,
        indexed_at: indexed_at.to_owned(),
        my_state: None,
    }
}

/// Pages are served in the order they were queued; an exhausted script
/// answers with empty pages. Every `view` call is recorded before it waits
/// on the gate, so held calls are observable.
pub(crate) struct MockApi {
    pages: Mutex<VecDeque<Result<Vec<FeedItemView>, String>>>,
    views: Mutex<Vec<FeedParams>>,
    interactions: Mutex<Vec<(String, String, String)>>,
    fail_interactions: AtomicBool,
    gate: Semaphore,
}

impl MockApi {
    fn with_permits(permits: usize) -> Arc<Self> {
        Arc::new(Self {
            pages: Mutex::default(),
            views: Mutex::default(),
            interactions: Mutex::default(),
            fail_interactions: AtomicBool::new(false),
            gate: Semaphore::new(permits),
        })
    }

    pub(crate) fn open() -> Arc<Self> {
        Self::with_permits(Semaphore::MAX_PERMITS)
    }

    /// Every `view` call blocks until [`MockApi::release`] hands out a permit.
    pub(crate) fn gated() -> Arc<Self> {
        Self::with_permits(0)
    }

    pub(crate) fn release(&self, calls: usize) {
        self.gate.add_permits(calls);
    }

    pub(crate) fn push_page(&self, items: Vec<FeedItemView>) {
        self.pages.lock().unwrap().push_back(Ok(items));
    }

    pub(crate) fn push_failure(&self, message: &str) {
        self.pages.lock().unwrap().push_back(Err(message.to_owned()));
    }

    pub(crate) fn fail_interactions(&self, fail: bool) {
        self.fail_interactions.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn views(&self) -> Vec<FeedParams> {
        self.views.lock().unwrap().clone()
    }

    pub(crate) fn interactions(&self) -> Vec<(String, String, String)> {
        self.interactions.lock().unwrap().clone()
    }

    fn interact(&self, method: &str, actor: &str, uri: &str) -> Result<(), ApiError> {
        if self.fail_interactions.load(Ordering::SeqCst) {
            return Err(ApiError::Server {
                status: 500,
                message: format!("{method} rejected"),
            });
        }
        self.interactions
            .lock()
            .unwrap()
            .push((method.to_owned(), actor.to_owned(), uri.to_owned()));
        Ok(())
    }
}

#[async_trait]
impl FeedApi for MockApi {
    async fn view(&self, params: &FeedParams) -> Result<FeedResponse, ApiError> {
        self.views.lock().unwrap().push(params.clone());
        self.gate.acquire().await.expect("gate closed").forget();

        match self.pages.lock().unwrap().pop_front() {
            Some(Ok(feed)) => Ok(FeedResponse { feed }),
            Some(Err(message)) => Err(ApiError::Server {
                status: 502,
                message,
            }),
            None => Ok(FeedResponse::default()),
        }
    }

    async fn like(&self, actor: &str, uri: &str) -> Result<(), ApiError> {
        self.interact("like", actor, uri)
    }

    async fn unlike(&self, actor: &str, uri: &str) -> Result<(), ApiError> {
        self.interact("unlike", actor, uri)
    }

    async fn repost(&self, actor: &str, uri: &str) -> Result<(), ApiError> {
        self.interact("repost", actor, uri)
    }

    async fn unrepost(&self, actor: &str, uri: &str) -> Result<(), ApiError> {
        self.interact("unrepost", actor, uri)
    }
}
