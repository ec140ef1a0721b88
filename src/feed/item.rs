use std::{
    fmt::Display,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use tracing::debug;

use crate::api::{ApiError, Embed, FeedApi, FeedItemView, MyState, User};

/// Display key of an item. Only meaningful for list stability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ItemKey(pub usize);

impl Display for ItemKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "item-{}", self.0)
    }
}

/// Reconciliation key. A repost carries the uri of the original post, so
/// `indexed_at` tells repost events of the same post apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentKey<'a> {
    pub uri: &'a str,
    pub indexed_at: &'a str,
}

impl<'a> From<&'a FeedItemView> for ContentKey<'a> {
    fn from(v: &'a FeedItemView) -> Self {
        Self {
            uri: &v.uri,
            indexed_at: &v.indexed_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interaction {
    Like,
    Repost,
}

/// Server-refreshable part of an item.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemState {
    pub record: serde_json::Value,
    pub embed: Option<Embed>,
    pub reply_count: u32,
    pub repost_count: u32,
    pub like_count: u32,
    pub viewer: MyState,
}

/// One entry of a feed. Cloning yields another handle to the same entry.
#[derive(Clone)]
pub struct FeedItem {
    inner: Arc<ItemInner>,
}

struct ItemInner {
    key: ItemKey,
    uri: String,
    indexed_at: String,
    author: User,
    reposted_by: Option<User>,
    state: Mutex<ItemState>,

    api: Arc<dyn FeedApi>,
    actor: Arc<str>,
}

pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ItemState {
    fn from_view(v: &FeedItemView) -> Self {
        Self {
            record: v.record.clone(),
            embed: v.embed.clone(),
            reply_count: v.reply_count,
            repost_count: v.repost_count,
            like_count: v.like_count,
            viewer: v.my_state.unwrap_or_default(),
        }
    }
}

impl FeedItem {
    pub(crate) fn new(key: ItemKey, v: FeedItemView, api: Arc<dyn FeedApi>, actor: Arc<str>) -> Self {
        let state = ItemState::from_view(&v);
        Self {
            inner: Arc::new(ItemInner {
                key,
                uri: v.uri,
                indexed_at: v.indexed_at,
                author: v.author,
                reposted_by: v.reposted_by,
                state: Mutex::new(state),
                api,
                actor,
            }),
        }
    }

    pub fn key(&self) -> ItemKey {
        self.inner.key
    }

    pub fn uri(&self) -> &str {
        &self.inner.uri
    }

    pub fn indexed_at(&self) -> &str {
        &self.inner.indexed_at
    }

    pub fn content_key(&self) -> ContentKey<'_> {
        ContentKey {
            uri: &self.inner.uri,
            indexed_at: &self.inner.indexed_at,
        }
    }

    pub fn author(&self) -> &User {
        &self.inner.author
    }

    pub fn reposted_by(&self) -> Option<&User> {
        self.inner.reposted_by.as_ref()
    }

    pub fn snapshot(&self) -> ItemState {
        lock(&self.inner.state).clone()
    }

    pub fn like_count(&self) -> u32 {
        lock(&self.inner.state).like_count
    }

    pub fn repost_count(&self) -> u32 {
        lock(&self.inner.state).repost_count
    }

    pub fn viewer(&self) -> MyState {
        lock(&self.inner.state).viewer
    }

    /// Overwrite the refreshable fields from a fresh server copy. Viewer
    /// state is kept when the payload does not carry one.
    pub(crate) fn copy_from(&self, v: &FeedItemView) {
        let mut state = lock(&self.inner.state);
        state.record = v.record.clone();
        state.embed = v.embed.clone();
        state.reply_count = v.reply_count;
        state.repost_count = v.repost_count;
        state.like_count = v.like_count;
        if let Some(my_state) = v.my_state {
            state.viewer = my_state;
        }
    }

    pub async fn toggle_like(&self) -> Result<(), ApiError> {
        self.toggle(Interaction::Like).await
    }

    pub async fn toggle_repost(&self) -> Result<(), ApiError> {
        self.toggle(Interaction::Repost).await
    }

    /// Flip the viewer's like or repost. Local state changes only after the
    /// remote call succeeds; on failure the error is returned untouched.
    pub async fn toggle(&self, interaction: Interaction) -> Result<(), ApiError> {
        let ItemInner {
            api, actor, uri, ..
        } = &*self.inner;
        let viewer = self.viewer();

        match interaction {
            Interaction::Like if viewer.has_liked => api.unlike(actor, uri).await?,
            Interaction::Like => api.like(actor, uri).await?,
            Interaction::Repost if viewer.has_reposted => api.unrepost(actor, uri).await?,
            Interaction::Repost => api.repost(actor, uri).await?,
        }

        let mut guard = lock(&self.inner.state);
        let state = &mut *guard;
        let (flag, count) = match interaction {
            Interaction::Like => (&mut state.viewer.has_liked, &mut state.like_count),
            Interaction::Repost => (&mut state.viewer.has_reposted, &mut state.repost_count),
        };
        *flag = !*flag;
        *count = if *flag {
            count.saturating_add(1)
        } else {
            count.saturating_sub(1)
        };
        debug!(key = %self.inner.key, ?interaction, active = *flag, "interaction toggled");

        Ok(())
    }
}

impl std::fmt::Debug for FeedItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedItem")
            .field("key", &self.inner.key)
            .field("uri", &self.inner.uri)
            .field("indexed_at", &self.inner.indexed_at)
            .field("state", &*lock(&self.inner.state))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{view, MockApi};

    fn item(api: &Arc<MockApi>, v: FeedItemView) -> FeedItem {
        FeedItem::new(ItemKey(0), v, api.clone(), Arc::from("alice.com"))
    }

    #[tokio::test]
    async fn like_then_unlike_moves_count_by_one() {
        let api = MockApi::open();
        let it = item(&api, view("at://bob.com/post/1", "t1"));
        let before = it.like_count();

        it.toggle_like().await.expect("like");
        assert!(it.viewer().has_liked);
        assert_eq!(it.like_count(), before + 1);

        it.toggle_like().await.expect("unlike");
        assert!(!it.viewer().has_liked);
        assert_eq!(it.like_count(), before);

        assert_eq!(
            api.interactions(),
            vec![
                ("like".to_owned(), "alice.com".to_owned(), "at://bob.com/post/1".to_owned()),
                ("unlike".to_owned(), "alice.com".to_owned(), "at://bob.com/post/1".to_owned()),
            ]
        );
    }

    #[tokio::test]
    async fn repost_uses_current_viewer_state() {
        let api = MockApi::open();
        let mut v = view("at://bob.com/post/1", "t1");
        v.repost_count = 4;
        v.my_state = Some(MyState {
            has_liked: false,
            has_reposted: true,
        });
        let it = item(&api, v);

        it.toggle_repost().await.expect("unrepost");
        assert!(!it.viewer().has_reposted);
        assert_eq!(it.repost_count(), 3);
        assert_eq!(api.interactions()[0].0, "unrepost");
    }

    #[tokio::test]
    async fn failed_toggle_leaves_item_untouched() {
        let api = MockApi::open();
        api.fail_interactions(true);
        let it = item(&api, view("at://bob.com/post/1", "t1"));
        let before = it.snapshot();

        let err = it.toggle_like().await.expect_err("remote failure");
        assert!(matches!(err, ApiError::Server { status: 500, .. }));
        assert_eq!(it.snapshot(), before);
    }

    #[test]
    fn copy_keeps_viewer_state_when_payload_lacks_it() {
        let api = MockApi::open();
        let mut v = view("at://bob.com/post/1", "t1");
        v.my_state = Some(MyState {
            has_liked: true,
            has_reposted: false,
        });
        let it = item(&api, v.clone());

        v.my_state = None;
        v.like_count = 42;
        it.copy_from(&v);

        assert!(it.viewer().has_liked);
        assert_eq!(it.like_count(), 42);
    }

    #[test]
    fn content_key_distinguishes_repost_events() {
        let a = view("at://bob.com/post/1", "t1");
        let b = view("at://bob.com/post/1", "t2");
        assert_ne!(ContentKey::from(&a), ContentKey::from(&b));
        assert_eq!(ItemKey(7).to_string(), "item-7");
    }
}
