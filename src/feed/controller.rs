use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
};

use futures::future::{BoxFuture, FutureExt, Shared};
use thiserror::Error;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tracing::{debug, info, warn};

use super::item::{lock, ContentKey, FeedItem, ItemKey};
use crate::api::{ApiError, FeedApi, FeedItemView, FeedParams};

/// Upper bound on `limit` for one request issued by [`FeedController::update`].
pub const DEFAULT_PAGE_CAP: usize = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Lifecycle {
    #[default]
    Idle,
    Loading,
}

/// Observable state of a feed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedStatus {
    pub lifecycle: Lifecycle,
    /// Set while a refresh (as opposed to a first load) is running.
    pub is_refreshing: bool,
    pub has_loaded: bool,
    pub error: Option<String>,
}

impl FeedStatus {
    pub fn is_loading(&self) -> bool {
        self.lifecycle == Lifecycle::Loading
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Debug, Error)]
#[error("Failed to {action} feed: {source}")]
pub struct FeedError {
    pub action: &'static str,
    pub source: ApiError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Operation {
    Load,
    LoadMore,
    Update,
}

type Pending = Shared<BoxFuture<'static, ()>>;

/// Locally cached, incrementally fetched feed.
///
/// Concurrent calls of the same operation share one execution. Different
/// operations never overlap: each waits for whatever is running before it
/// touches the network. Operation failures are recorded in
/// [`FeedStatus::error`] instead of being returned.
///
/// Each operation runs on its own tokio task, so it completes even if the
/// caller stops awaiting it. Must be driven from within a tokio runtime.
#[derive(Clone)]
pub struct FeedController {
    inner: Arc<Inner>,
}

struct Inner {
    api: Arc<dyn FeedApi>,
    actor: Arc<str>,
    params: FeedParams,
    page_cap: usize,

    items: Mutex<Vec<FeedItem>>,
    status: watch::Sender<FeedStatus>,

    in_flight: Mutex<HashMap<Operation, Pending>>,
    barrier: AsyncMutex<()>,
}

impl FeedController {
    pub fn new(
        api: Arc<dyn FeedApi>,
        actor: impl Into<Arc<str>>,
        params: FeedParams,
        page_cap: usize,
    ) -> Self {
        let (status, _) = watch::channel(FeedStatus::default());
        Self {
            inner: Arc::new(Inner {
                api,
                actor: actor.into(),
                params,
                page_cap: page_cap.max(1),
                items: Mutex::default(),
                status,
                in_flight: Mutex::default(),
                barrier: AsyncMutex::new(()),
            }),
        }
    }

    /// Load for first render, discarding whatever was loaded before.
    pub async fn setup(&self, is_refreshing: bool) {
        self.single_flight(Operation::Load, move |inner| {
            async move { inner.initial_load(is_refreshing).await }.boxed()
        })
        .await
    }

    pub async fn refresh(&self) {
        self.setup(true).await
    }

    /// Append the page that follows the last loaded item.
    pub async fn load_more(&self) {
        self.single_flight(Operation::LoadMore, |inner| {
            async move { inner.load_more().await }.boxed()
        })
        .await
    }

    /// Refresh counters and viewer state of the loaded items in place.
    pub async fn update(&self) {
        self.single_flight(Operation::Update, |inner| {
            async move { inner.update_in_place().await }.boxed()
        })
        .await
    }

    pub fn status(&self) -> FeedStatus {
        self.inner.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<FeedStatus> {
        self.inner.status.subscribe()
    }

    pub fn items(&self) -> Vec<FeedItem> {
        lock(&self.inner.items).clone()
    }

    pub fn get(&self, index: usize) -> Option<FeedItem> {
        lock(&self.inner.items).get(index).cloned()
    }

    pub fn len(&self) -> usize {
        lock(&self.inner.items).len()
    }

    pub fn has_content(&self) -> bool {
        self.len() != 0
    }

    pub fn has_error(&self) -> bool {
        self.inner.status.borrow().has_error()
    }

    /// Loaded at least once and came back with nothing.
    pub fn is_empty(&self) -> bool {
        self.inner.status.borrow().has_loaded && !self.has_content()
    }

    pub fn load_more_cursor(&self) -> Option<String> {
        self.inner.load_more_cursor()
    }

    async fn single_flight<F>(&self, op: Operation, work: F)
    where
        F: FnOnce(Arc<Inner>) -> BoxFuture<'static, ()> + Send + 'static,
    {
        let pending = {
            let mut in_flight = lock(&self.inner.in_flight);
            match in_flight.get(&op) {
                Some(pending) => {
                    debug!(?op, "joining in-flight operation");
                    pending.clone()
                }
                None => {
                    let inner = Arc::clone(&self.inner);
                    // Detached so the work finishes and releases the barrier
                    // even when every caller stops waiting.
                    let task = tokio::spawn(async move {
                        let _clear = ClearInFlight {
                            inner: Arc::clone(&inner),
                            op,
                        };
                        let _barrier = inner.barrier.lock().await;
                        work(Arc::clone(&inner)).await;
                    });
                    let pending = task
                        .map(move |res| {
                            if let Err(e) = res {
                                warn!(?op, error = %e, "feed operation task failed");
                            }
                        })
                        .boxed()
                        .shared();
                    in_flight.insert(op, pending.clone());
                    pending
                }
            }
        };

        pending.await
    }
}

/// Drops the single-flight handle of `op` when its task ends, panics included.
struct ClearInFlight {
    inner: Arc<Inner>,
    op: Operation,
}

impl Drop for ClearInFlight {
    fn drop(&mut self) {
        lock(&self.inner.in_flight).remove(&self.op);
    }
}

impl Inner {
    fn load_more_cursor(&self) -> Option<String> {
        lock(&self.items)
            .last()
            .map(|item| item.indexed_at().to_owned())
    }

    fn enter_loading(&self, is_refreshing: bool) {
        self.status.send_modify(|s| {
            s.lifecycle = Lifecycle::Loading;
            s.is_refreshing = is_refreshing;
            s.error = None;
        });
    }

    fn enter_idle(&self, error: Option<String>) {
        self.status.send_modify(|s| {
            s.lifecycle = Lifecycle::Idle;
            s.is_refreshing = false;
            s.has_loaded = true;
            s.error = error;
        });
    }

    fn fail(&self, action: &'static str, source: ApiError) {
        let err = FeedError { action, source };
        warn!(error = %err, "feed operation failed");
        self.enter_idle(Some(err.to_string()));
    }

    async fn initial_load(&self, is_refreshing: bool) {
        self.enter_loading(is_refreshing);
        match self.api.view(&self.params).await {
            Ok(res) => {
                let mut items = Vec::with_capacity(res.feed.len());
                self.append_all(&mut items, res.feed);
                info!(items = items.len(), is_refreshing, "feed loaded");
                *lock(&self.items) = items;
                self.enter_idle(None);
            }
            Err(e) => self.fail("load", e),
        }
    }

    async fn load_more(&self) {
        self.enter_loading(false);
        let params = FeedParams {
            before: self.load_more_cursor(),
            ..self.params.clone()
        };
        match self.api.view(&params).await {
            Ok(res) => {
                let added = self.append_all(&mut lock(&self.items), res.feed);
                info!(added, before = ?params.before, "feed extended");
                self.enter_idle(None);
            }
            Err(e) => self.fail("load", e),
        }
    }

    async fn update_in_place(&self) {
        self.enter_loading(false);
        let mut remaining = lock(&self.items).len();
        let mut cursor: Option<String> = None;
        let mut refreshed = 0;

        while remaining > 0 {
            let params = FeedParams {
                before: cursor.take(),
                limit: Some(remaining.min(self.page_cap)),
                ..self.params.clone()
            };
            let page = match self.api.view(&params).await {
                Ok(res) => res.feed,
                Err(e) => return self.fail("update", e),
            };
            let Some(last) = page.last() else {
                debug!(remaining, "empty page, stopping update");
                break;
            };
            cursor = Some(last.indexed_at.clone());
            remaining = remaining.saturating_sub(page.len());
            refreshed += self.update_all(&page);
        }

        info!(refreshed, "feed updated in place");
        self.enter_idle(None);
    }

    /// Push fresh items, numbering them after the current tail. Entries whose
    /// content key is already present are dropped.
    fn append_all(&self, items: &mut Vec<FeedItem>, page: Vec<FeedItemView>) -> usize {
        let before = items.len();
        let fresh: Vec<bool> = {
            let mut seen: HashSet<ContentKey<'_>> =
                items.iter().map(FeedItem::content_key).collect();
            page.iter().map(|v| seen.insert(ContentKey::from(v))).collect()
        };
        for (v, fresh) in page.into_iter().zip(fresh) {
            if !fresh {
                debug!(uri = %v.uri, indexed_at = %v.indexed_at, "skipping duplicate entry");
                continue;
            }
            let key = ItemKey(items.len());
            items.push(FeedItem::new(
                key,
                v,
                Arc::clone(&self.api),
                Arc::clone(&self.actor),
            ));
        }
        items.len() - before
    }

    /// Copy server state onto matching entries. Never inserts.
    fn update_all(&self, page: &[FeedItemView]) -> usize {
        let items = lock(&self.items);
        let by_key: HashMap<ContentKey<'_>, &FeedItem> =
            items.iter().map(|it| (it.content_key(), it)).collect();

        let mut matched = 0;
        for v in page {
            if let Some(existing) = by_key.get(&ContentKey::from(v)) {
                existing.copy_from(v);
                matched += 1;
            }
        }
        matched
    }
}
