//! services/client/src/cache/store.rs
//!
//! The tagged response cache.
//!
//! Entries are keyed by `Fingerprint`. A secondary index maps each `Tag` to
//! the fingerprints that carry it, so a write can invalidate exactly the
//! reads it supersedes. Every entry keeps an epoch counter: an invalidation
//! bumps it, and a response is only fresh if it was requested in the
//! entry's current epoch. That is what keeps a read that raced a write
//! from being served as current afterwards.
//!
//! Entries nobody subscribes to and nothing is fetching are idle. Once more
//! than `max_idle` of them exist, the least recently used one is dropped
//! before a new entry is added.

use super::{Fingerprint, QueryState, Tag};
use docunexus_core::ports::{PortError, PortResult};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Produces the network request behind a cache entry. Stored with the entry
/// so an invalidation can refetch on behalf of its subscribers.
pub type Fetcher<V> = Arc<dyn Fn() -> BoxFuture<'static, PortResult<V>> + Send + Sync>;

type Pending<V> = Shared<BoxFuture<'static, PortResult<V>>>;

/// Idle entries kept by `TaggedCache::new`.
pub const DEFAULT_MAX_IDLE: usize = 256;

//=========================================================================================
// Internal State
//=========================================================================================

struct Entry<V> {
    tags: HashSet<Tag>,
    fetcher: Fetcher<V>,
    epoch: u64,
    /// Responses requested before this epoch are dropped on arrival.
    floor: u64,
    /// Epoch of the request that produced `state.data`.
    data_epoch: Option<u64>,
    subscribers: usize,
    in_flight: Option<(u64, Pending<V>)>,
    state: watch::Sender<QueryState<V>>,
    last_used: Instant,
}

impl<V> Entry<V> {
    fn new(fetcher: Fetcher<V>) -> Self {
        let (state, _) = watch::channel(QueryState::default());
        Self {
            tags: HashSet::new(),
            fetcher,
            epoch: 0,
            floor: 0,
            data_epoch: None,
            subscribers: 0,
            in_flight: None,
            state,
            last_used: Instant::now(),
        }
    }

    fn is_fresh(&self) -> bool {
        self.data_epoch == Some(self.epoch)
    }

    fn is_idle(&self) -> bool {
        self.subscribers == 0 && self.in_flight.is_none()
    }
}

struct Inner<V> {
    entries: HashMap<Fingerprint, Entry<V>>,
    tag_index: HashMap<Tag, HashSet<Fingerprint>>,
    max_idle: usize,
}

impl<V> Inner<V> {
    fn register(&mut self, fingerprint: &Fingerprint, tags: Vec<Tag>, fetcher: Fetcher<V>) -> &mut Entry<V> {
        if !self.entries.contains_key(fingerprint) {
            self.evict_idle();
        }
        for tag in &tags {
            self.tag_index
                .entry(tag.clone())
                .or_default()
                .insert(fingerprint.clone());
        }
        let entry = self
            .entries
            .entry(fingerprint.clone())
            .or_insert_with(|| Entry::new(Arc::clone(&fetcher)));
        entry.fetcher = fetcher;
        entry.tags.extend(tags);
        entry.last_used = Instant::now();
        entry
    }

    /// Makes room for one more entry by dropping least recently used idle
    /// entries.
    fn evict_idle(&mut self) {
        let mut idle: Vec<(Instant, Fingerprint)> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_idle())
            .map(|(fingerprint, entry)| (entry.last_used, fingerprint.clone()))
            .collect();
        if idle.len() < self.max_idle {
            return;
        }
        idle.sort_by_key(|(used, _)| *used);
        let excess = idle.len() + 1 - self.max_idle.max(1);
        for (_, fingerprint) in idle.into_iter().take(excess) {
            debug!(%fingerprint, "Evicting idle cache entry");
            self.remove(&fingerprint);
        }
    }

    fn remove(&mut self, fingerprint: &Fingerprint) {
        let Some(entry) = self.entries.remove(fingerprint) else {
            return;
        };
        for tag in &entry.tags {
            if let Some(fingerprints) = self.tag_index.get_mut(tag) {
                fingerprints.remove(fingerprint);
                if fingerprints.is_empty() {
                    self.tag_index.remove(tag);
                }
            }
        }
    }
}

enum Lookup<V> {
    Hit(V),
    Pending(Pending<V>),
}

//=========================================================================================
// The Cache
//=========================================================================================

/// A cheaply cloneable handle; clones share the same entries.
pub struct TaggedCache<V> {
    inner: Arc<Mutex<Inner<V>>>,
}

impl<V> Clone for TaggedCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> TaggedCache<V> {
    fn lock(&self) -> MutexGuard<'_, Inner<V>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<V> Default for TaggedCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V> TaggedCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::with_max_idle(DEFAULT_MAX_IDLE)
    }

    /// A cache that keeps at most `max_idle` idle entries. Subscribed and
    /// in-flight entries never count against the bound.
    pub fn with_max_idle(max_idle: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                entries: HashMap::new(),
                tag_index: HashMap::new(),
                max_idle,
            })),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Returns the cached response when it is fresh; otherwise joins the
    /// request already in flight for this epoch, or starts one.
    pub async fn query(
        &self,
        fingerprint: Fingerprint,
        tags: Vec<Tag>,
        fetcher: Fetcher<V>,
    ) -> PortResult<V> {
        let found = {
            let mut inner = self.lock();
            let entry = inner.register(&fingerprint, tags, fetcher);
            lookup(&self.inner, &fingerprint, entry)
        };
        match found {
            Lookup::Hit(data) => Ok(data),
            Lookup::Pending(pending) => pending.await,
        }
    }

    /// Supersedes whatever is cached under `fingerprint` and waits for a
    /// new response.
    pub async fn refetch(
        &self,
        fingerprint: Fingerprint,
        tags: Vec<Tag>,
        fetcher: Fetcher<V>,
    ) -> PortResult<V> {
        let pending = {
            let mut inner = self.lock();
            let entry = inner.register(&fingerprint, tags, fetcher);
            entry.epoch += 1;
            let pending = begin_fetch(&self.inner, &fingerprint, entry);
            entry.state.send_modify(|s| s.is_stale = true);
            pending
        };
        pending.await
    }

    /// Reads an entry through the fetcher it was registered with.
    pub async fn fetch_registered(&self, fingerprint: &Fingerprint) -> PortResult<V> {
        let found = {
            let mut inner = self.lock();
            let Some(entry) = inner.entries.get_mut(fingerprint) else {
                return Err(PortError::Unexpected(format!(
                    "no cache entry registered for {}",
                    fingerprint
                )));
            };
            lookup(&self.inner, fingerprint, entry)
        };
        match found {
            Lookup::Hit(data) => Ok(data),
            Lookup::Pending(pending) => pending.await,
        }
    }

    /// Marks every entry carrying one of `tags` as stale. Entries with live
    /// subscribers start refetching immediately; the rest refetch on their
    /// next read.
    pub fn invalidate_tags(&self, tags: &[Tag]) {
        let mut inner = self.lock();
        let targets: HashSet<Fingerprint> = tags
            .iter()
            .filter_map(|tag| inner.tag_index.get(tag))
            .flat_map(|fingerprints| fingerprints.iter().cloned())
            .collect();

        let labels: Vec<String> = tags.iter().map(Tag::to_string).collect();
        debug!(tags = ?labels, entries = targets.len(), "Invalidating cache tags");

        for fingerprint in targets {
            if let Some(entry) = inner.entries.get_mut(&fingerprint) {
                entry.epoch += 1;
                if entry.subscribers > 0 {
                    let _ = begin_fetch(&self.inner, &fingerprint, entry);
                }
                entry.state.send_modify(|s| s.is_stale = true);
            }
        }
    }

    /// Registers a live reader. The entry is fetched now if it holds no
    /// fresh data, and refetched on every invalidation while any
    /// subscription to it is alive.
    pub fn subscribe(
        &self,
        fingerprint: Fingerprint,
        tags: Vec<Tag>,
        fetcher: Fetcher<V>,
    ) -> Subscription<V> {
        let mut inner = self.lock();
        let entry = inner.register(&fingerprint, tags, fetcher);
        entry.subscribers += 1;
        let receiver = entry.state.subscribe();
        if !entry.is_fresh() {
            let _ = begin_fetch(&self.inner, &fingerprint, entry);
        }
        Subscription {
            cache: self.clone(),
            fingerprint,
            receiver,
        }
    }

    pub fn snapshot(&self, fingerprint: &Fingerprint) -> QueryState<V> {
        self.lock()
            .entries
            .get(fingerprint)
            .map(|entry| entry.state.borrow().clone())
            .unwrap_or_default()
    }

    pub fn subscribers(&self, fingerprint: &Fingerprint) -> usize {
        self.lock()
            .entries
            .get(fingerprint)
            .map_or(0, |entry| entry.subscribers)
    }

    /// Forgets all cached data. Unsubscribed entries are removed; subscribed
    /// ones are emptied and marked stale, and any response still in flight
    /// is discarded when it lands.
    pub fn reset(&self) {
        let mut guard = self.lock();
        let Inner {
            entries, tag_index, ..
        } = &mut *guard;

        entries.retain(|_, entry| entry.subscribers > 0);
        tag_index.clear();
        for (fingerprint, entry) in entries.iter_mut() {
            entry.epoch += 1;
            entry.floor = entry.epoch;
            entry.data_epoch = None;
            entry.in_flight = None;
            entry.state.send_replace(QueryState {
                is_stale: true,
                ..QueryState::default()
            });
            for tag in &entry.tags {
                tag_index
                    .entry(tag.clone())
                    .or_default()
                    .insert(fingerprint.clone());
            }
        }
        debug!(retained = entries.len(), "Cache reset");
    }
}

//=========================================================================================
// Fetch Lifecycle
//=========================================================================================

fn lookup<V>(cache: &Arc<Mutex<Inner<V>>>, fingerprint: &Fingerprint, entry: &mut Entry<V>) -> Lookup<V>
where
    V: Clone + Send + Sync + 'static,
{
    if entry.is_fresh() {
        let cached = entry.state.borrow().data.clone();
        if let Some(data) = cached {
            debug!(%fingerprint, "Cache hit");
            return Lookup::Hit(data);
        }
    }
    Lookup::Pending(begin_fetch(cache, fingerprint, entry))
}

/// Joins the request in flight for the entry's current epoch, or starts a
/// new one. The request is driven to completion by a spawned task, so it
/// settles even if every caller stops waiting.
fn begin_fetch<V>(cache: &Arc<Mutex<Inner<V>>>, fingerprint: &Fingerprint, entry: &mut Entry<V>) -> Pending<V>
where
    V: Clone + Send + Sync + 'static,
{
    if let Some((epoch, pending)) = &entry.in_flight {
        if *epoch == entry.epoch {
            debug!(%fingerprint, "Joining in-flight request");
            return pending.clone();
        }
    }

    debug!(%fingerprint, epoch = entry.epoch, "Fetching");
    let epoch = entry.epoch;
    let request = (entry.fetcher)();
    let weak: Weak<Mutex<Inner<V>>> = Arc::downgrade(cache);
    let key = fingerprint.clone();
    let pending = async move {
        let result = request.await;
        if let Some(cache) = weak.upgrade() {
            settle(&cache, &key, epoch, &result);
        }
        result
    }
    .boxed()
    .shared();

    entry.in_flight = Some((epoch, pending.clone()));
    entry.state.send_modify(|s| s.is_fetching = true);
    tokio::spawn(pending.clone());
    pending
}

fn settle<V>(cache: &Mutex<Inner<V>>, fingerprint: &Fingerprint, epoch: u64, result: &PortResult<V>)
where
    V: Clone,
{
    let mut inner = cache.lock().unwrap_or_else(PoisonError::into_inner);
    let Some(entry) = inner.entries.get_mut(fingerprint) else {
        return;
    };

    if matches!(&entry.in_flight, Some((in_flight, _)) if *in_flight == epoch) {
        entry.in_flight = None;
    }
    let fetching = entry.in_flight.is_some();

    let superseded = epoch < entry.floor || entry.data_epoch.map_or(false, |seen| seen > epoch);
    if superseded {
        debug!(%fingerprint, epoch, "Dropping superseded response");
        entry.state.send_modify(|s| s.is_fetching = fetching);
        return;
    }

    match result {
        Ok(data) => {
            let current = epoch == entry.epoch;
            entry.data_epoch = Some(epoch);
            entry.state.send_modify(|s| {
                s.data = Some(data.clone());
                s.error = None;
                s.is_fetching = fetching;
                s.is_stale = !current;
            });
        }
        Err(err) => {
            warn!(%fingerprint, error = %err, "Fetch failed; keeping previous data");
            entry.state.send_modify(|s| {
                s.error = Some(err.clone());
                s.is_fetching = fetching;
            });
        }
    }
}

//=========================================================================================
// Subscriptions
//=========================================================================================

/// A live reader of one cache entry. Dropping it unsubscribes.
pub struct Subscription<V> {
    cache: TaggedCache<V>,
    fingerprint: Fingerprint,
    receiver: watch::Receiver<QueryState<V>>,
}

impl<V> Subscription<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    pub fn current(&self) -> QueryState<V> {
        self.receiver.borrow().clone()
    }

    /// Waits for the next state change. Returns `false` if the entry is gone.
    pub async fn changed(&mut self) -> bool {
        self.receiver.changed().await.is_ok()
    }

    /// Waits until no fetch is running and the entry holds current data or
    /// a fresh error.
    pub async fn settled(&mut self) -> QueryState<V> {
        let settled = self
            .receiver
            .wait_for(|s| s.is_settled())
            .await
            .map(|state| (*state).clone())
            .ok();
        settled.unwrap_or_else(|| self.current())
    }

    /// Returns current data, refetching first if it has been superseded.
    pub async fn read(&self) -> PortResult<V> {
        self.cache.fetch_registered(&self.fingerprint).await
    }
}

impl<V> Drop for Subscription<V> {
    fn drop(&mut self) {
        let mut inner = self.cache.lock();
        if let Some(entry) = inner.entries.get_mut(&self.fingerprint) {
            entry.subscribers = entry.subscribers.saturating_sub(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn counting(counter: Arc<AtomicUsize>, label: &'static str, delay_ms: u64) -> Fetcher<String> {
        Arc::new(move || {
            let counter = Arc::clone(&counter);
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                Ok(format!("{}#{}", label, n))
            }
            .boxed()
        })
    }

    fn failing_after_first(counter: Arc<AtomicUsize>) -> Fetcher<String> {
        Arc::new(move || {
            let counter = Arc::clone(&counter);
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n == 1 {
                    Ok("first".to_string())
                } else {
                    Err(PortError::Transport("connection reset".to_string()))
                }
            }
            .boxed()
        })
    }

    fn key(name: &str) -> Fingerprint {
        Fingerprint::new(name, &[])
    }

    #[tokio::test]
    async fn concurrent_reads_share_one_request() {
        let cache = TaggedCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = counting(Arc::clone(&calls), "doc", 20);

        let (a, b) = tokio::join!(
            cache.query(key("GET /documents/d1"), vec![], Arc::clone(&fetcher)),
            cache.query(key("GET /documents/d1"), vec![], Arc::clone(&fetcher)),
        );

        assert_eq!(a.unwrap(), "doc#1");
        assert_eq!(b.unwrap(), "doc#1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fresh_entries_are_served_from_cache() {
        let cache = TaggedCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = counting(Arc::clone(&calls), "list", 0);

        cache
            .query(key("GET /documents"), vec![Tag::Documents], Arc::clone(&fetcher))
            .await
            .unwrap();
        let again = cache
            .query(key("GET /documents"), vec![Tag::Documents], fetcher)
            .await
            .unwrap();

        assert_eq!(again, "list#1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalidated_entries_refetch_on_next_read() {
        let cache = TaggedCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = counting(Arc::clone(&calls), "list", 0);

        cache
            .query(key("GET /documents"), vec![Tag::Documents], Arc::clone(&fetcher))
            .await
            .unwrap();
        cache.invalidate_tags(&[Tag::Documents]);
        assert!(cache.snapshot(&key("GET /documents")).is_stale);

        let again = cache
            .query(key("GET /documents"), vec![Tag::Documents], fetcher)
            .await
            .unwrap();
        assert_eq!(again, "list#2");
        assert!(!cache.snapshot(&key("GET /documents")).is_stale);
    }

    #[tokio::test]
    async fn subscribers_refetch_only_for_their_tag() {
        let cache = TaggedCache::new();
        let calls_a = Arc::new(AtomicUsize::new(0));
        let calls_b = Arc::new(AtomicUsize::new(0));

        let mut a = cache.subscribe(
            key("GET /queries?document_id=a"),
            vec![Tag::Queries("a".into())],
            counting(Arc::clone(&calls_a), "a", 0),
        );
        let mut b = cache.subscribe(
            key("GET /queries?document_id=b"),
            vec![Tag::Queries("b".into())],
            counting(Arc::clone(&calls_b), "b", 0),
        );
        a.settled().await;
        b.settled().await;

        cache.invalidate_tags(&[Tag::Queries("a".into())]);
        let state = a.settled().await;

        assert_eq!(state.data.as_deref(), Some("a#2"));
        assert_eq!(calls_a.load(Ordering::SeqCst), 2);
        assert_eq!(calls_b.load(Ordering::SeqCst), 1);
        assert!(!b.current().is_stale);
    }

    #[tokio::test]
    async fn failed_fetch_keeps_previous_data() {
        let cache = TaggedCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = failing_after_first(Arc::clone(&calls));

        cache
            .query(key("GET /documents"), vec![Tag::Documents], Arc::clone(&fetcher))
            .await
            .unwrap();
        cache.invalidate_tags(&[Tag::Documents]);
        let err = cache
            .query(key("GET /documents"), vec![Tag::Documents], fetcher)
            .await
            .unwrap_err();

        assert!(matches!(err, PortError::Transport(_)));
        let state = cache.snapshot(&key("GET /documents"));
        assert_eq!(state.data.as_deref(), Some("first"));
        assert!(state.is_errored());
    }

    #[tokio::test]
    async fn response_racing_an_invalidation_is_not_fresh() {
        let cache = TaggedCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = counting(Arc::clone(&calls), "list", 40);

        let racing = {
            let cache = cache.clone();
            let fetcher = Arc::clone(&fetcher);
            tokio::spawn(async move {
                cache
                    .query(key("GET /documents"), vec![Tag::Documents], fetcher)
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        cache.invalidate_tags(&[Tag::Documents]);

        assert_eq!(racing.await.unwrap().unwrap(), "list#1");
        assert!(cache.snapshot(&key("GET /documents")).is_stale);

        let after = cache
            .query(key("GET /documents"), vec![Tag::Documents], fetcher)
            .await
            .unwrap();
        assert_eq!(after, "list#2");
    }

    #[tokio::test]
    async fn dropping_a_subscription_unsubscribes() {
        let cache = TaggedCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let fp = key("GET /documents");

        let mut sub = cache.subscribe(fp.clone(), vec![Tag::Documents], counting(Arc::clone(&calls), "list", 0));
        sub.settled().await;
        assert_eq!(cache.subscribers(&fp), 1);
        drop(sub);
        assert_eq!(cache.subscribers(&fp), 0);

        cache.invalidate_tags(&[Tag::Documents]);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reset_forgets_data() {
        let cache = TaggedCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let fp = key("GET /documents");

        cache
            .query(fp.clone(), vec![Tag::Documents], counting(Arc::clone(&calls), "list", 0))
            .await
            .unwrap();
        cache.reset();

        assert!(cache.snapshot(&fp).data.is_none());
    }

    #[tokio::test]
    async fn idle_entries_are_bounded() {
        let cache = TaggedCache::with_max_idle(2);
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = counting(Arc::clone(&calls), "doc", 0);

        let mut open = cache.subscribe(key("GET /documents"), vec![Tag::Documents], Arc::clone(&fetcher));
        open.settled().await;
        for id in ["d1", "d2", "d3"] {
            cache
                .query(key(id), vec![Tag::Queries(id.into())], Arc::clone(&fetcher))
                .await
                .unwrap();
        }

        // d1 was the least recently used idle entry; the subscribed list stays.
        assert_eq!(cache.len(), 3);
        assert!(cache.snapshot(&key("d1")).data.is_none());
        assert!(cache.snapshot(&key("d3")).data.is_some());
        assert!(open.current().data.is_some());

        // The evicted entry's tag no longer points anywhere.
        cache.invalidate_tags(&[Tag::Queries("d1".into())]);
        cache
            .query(key("d1"), vec![], Arc::clone(&fetcher))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }
}
