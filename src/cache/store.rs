//! Keyed store of asynchronous query results.
//!
//! Each [`QueryKey`] owns one entry that moves through
//! `Idle -> Fetching -> Fresh -> Stale -> Fetching`, settles `Errored` when a
//! fetch exhausts its attempts, and is evicted once it has gone unobserved for
//! its grace period. State changes happen under one short lock that is never
//! held across an await; observers see them as [`Snapshot`]s published on a
//! `watch` channel.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use metrics::counter;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::config::{QueryOptions, RetryPolicy};
use super::keys::QueryKey;
use super::lock::lock_state;

pub const METRIC_CACHE_HIT: &str = "vitrine_cache_hit_total";
pub const METRIC_CACHE_MISS: &str = "vitrine_cache_miss_total";
pub const METRIC_CACHE_FETCH: &str = "vitrine_cache_fetch_total";
pub const METRIC_CACHE_EVICT: &str = "vitrine_cache_evict_total";

/// Error type a fetch can settle with.
pub trait FetchError: Clone + fmt::Display + Send + Sync + 'static {
    /// Whether another attempt within the retry bound is worth making.
    fn is_retryable(&self) -> bool;

    /// Error for a fetch the store could not schedule at all.
    fn not_scheduled(reason: &str) -> Self;
}

/// Options for entries the store creates on its own, keyed by query key.
pub type OptionsResolver = Arc<dyn Fn(&QueryKey) -> QueryOptions + Send + Sync>;

/// Produces one attempt of a query. Called again for every retry.
pub type Fetcher<V, E> = Arc<dyn Fn() -> BoxFuture<'static, Result<V, E>> + Send + Sync>;

/// Wraps an async closure into a [`Fetcher`].
pub fn fetcher<V, E, F, Fut>(f: F) -> Fetcher<V, E>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<V, E>> + Send + 'static,
{
    Arc::new(move || f().boxed())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryStatus {
    Idle,
    Fetching,
    Fresh,
    Stale,
    Errored,
}

impl QueryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Fetching => "fetching",
            Self::Fresh => "fresh",
            Self::Stale => "stale",
            Self::Errored => "errored",
        }
    }
}

impl fmt::Display for QueryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of one entry.
///
/// `data` survives refetches and failures, so `Fetching`, `Stale` and
/// `Errored` snapshots may still carry the last good value.
#[derive(Debug)]
pub struct Snapshot<V, E> {
    pub status: QueryStatus,
    pub data: Option<Arc<V>>,
    pub error: Option<E>,
    pub fetched_at: Option<Instant>,
    /// Failed attempts of the current (or last) fetch.
    pub failure_count: u32,
    pub observer_count: usize,
}

impl<V, E: Clone> Clone for Snapshot<V, E> {
    fn clone(&self) -> Self {
        Self {
            status: self.status,
            data: self.data.clone(),
            error: self.error.clone(),
            fetched_at: self.fetched_at,
            failure_count: self.failure_count,
            observer_count: self.observer_count,
        }
    }
}

impl<V, E> Snapshot<V, E> {
    fn empty(observer_count: usize) -> Self {
        Self {
            status: QueryStatus::Idle,
            data: None,
            error: None,
            fetched_at: None,
            failure_count: 0,
            observer_count,
        }
    }

    pub fn is_fetching(&self) -> bool {
        self.status == QueryStatus::Fetching
    }
}

struct Entry<V, E> {
    /// Changes whenever the entry is replaced; fetches started under an older
    /// generation are discarded on completion.
    generation: u64,
    data: Option<Arc<V>>,
    status: QueryStatus,
    fetched_at: Option<Instant>,
    error: Option<E>,
    failure_count: u32,
    options: QueryOptions,
    observers: usize,
    invalidated_in_flight: bool,
    gc_epoch: u64,
    fresh_epoch: u64,
    tx: watch::Sender<Snapshot<V, E>>,
}

impl<V, E: Clone> Entry<V, E> {
    fn new(generation: u64, options: QueryOptions) -> Self {
        let (tx, _) = watch::channel(Snapshot::empty(0));
        Self {
            generation,
            data: None,
            status: QueryStatus::Idle,
            fetched_at: None,
            error: None,
            failure_count: 0,
            options,
            observers: 0,
            invalidated_in_flight: false,
            gc_epoch: 0,
            fresh_epoch: 0,
            tx,
        }
    }

    /// Idle entry that inherits the observers and channel of `old`.
    fn replacing(old: Self, generation: u64) -> Self {
        let mut entry = Self {
            tx: old.tx,
            ..Self::new(generation, old.options)
        };
        entry.observers = old.observers;
        entry.gc_epoch = old.gc_epoch + 1;
        entry
    }

    fn effective_status(&self, now: Instant) -> QueryStatus {
        match (self.status, self.fetched_at) {
            (QueryStatus::Fresh, Some(at)) if now.duration_since(at) >= self.options.stale_after => {
                QueryStatus::Stale
            }
            (status, _) => status,
        }
    }

    fn snapshot(&self, now: Instant) -> Snapshot<V, E> {
        Snapshot {
            status: self.effective_status(now),
            data: self.data.clone(),
            error: self.error.clone(),
            fetched_at: self.fetched_at,
            failure_count: self.failure_count,
            observer_count: self.observers,
        }
    }

    fn publish(&self) {
        self.tx.send_replace(self.snapshot(Instant::now()));
    }

    fn begin_fetch(&mut self) -> u64 {
        self.status = QueryStatus::Fetching;
        self.failure_count = 0;
        self.invalidated_in_flight = false;
        self.publish();
        self.generation
    }

    fn store_value(&mut self, value: Arc<V>) {
        self.data = Some(value);
        self.fetched_at = Some(Instant::now());
        self.error = None;
        self.failure_count = 0;
        self.fresh_epoch += 1;
    }
}

struct State<V, E> {
    entries: HashMap<QueryKey, Entry<V, E>>,
    next_generation: u64,
}

impl<V, E: Clone> State<V, E> {
    fn allocate_generation(&mut self) -> u64 {
        let generation = self.next_generation;
        self.next_generation += 1;
        generation
    }

    /// Existing entry for `key`, or a new `Idle` one using `options`.
    fn entry_mut(&mut self, key: &QueryKey, options: QueryOptions) -> &mut Entry<V, E> {
        let generation = self.next_generation;
        let mut created = false;
        let entry = self.entries.entry(key.clone()).or_insert_with(|| {
            created = true;
            Entry::new(generation, options)
        });
        if created {
            self.next_generation += 1;
        }
        entry
    }

    /// Removes every entry for which `remove` holds. Entries that still have
    /// observers come back as fresh `Idle` entries on the same channel.
    fn evict_where(&mut self, mut remove: impl FnMut(&QueryKey) -> bool) -> usize {
        let keys: Vec<QueryKey> = self.entries.keys().filter(|key| remove(*key)).cloned().collect();
        for key in &keys {
            let Some(old) = self.entries.remove(key) else {
                continue;
            };
            if old.observers > 0 {
                let generation = self.allocate_generation();
                let entry = Entry::replacing(old, generation);
                entry.publish();
                self.entries.insert(key.clone(), entry);
            }
        }
        keys.len()
    }
}

struct Inner<V, E> {
    state: Mutex<State<V, E>>,
    defaults: OptionsResolver,
}

/// Generic cache of query results, shared by cloning.
pub struct CacheStore<V, E> {
    inner: Arc<Inner<V, E>>,
}

impl<V, E> Clone for CacheStore<V, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V, E> CacheStore<V, E>
where
    V: Send + Sync + 'static,
    E: FetchError,
{
    /// Store whose self-created entries all use `defaults`.
    pub fn new(defaults: QueryOptions) -> Self {
        Self::with_resolver(Arc::new(move |_: &QueryKey| defaults))
    }

    /// `defaults` picks the options of entries created by
    /// [`set_data`](Self::set_data) or [`subscribe`](Self::subscribe) before
    /// any read supplied its own.
    pub fn with_resolver(defaults: OptionsResolver) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    entries: HashMap::new(),
                    next_generation: 0,
                }),
                defaults,
            }),
        }
    }

    /// Returns the entry as it is now and schedules a fetch when the entry is
    /// `Idle`, `Stale` or `Errored` and nothing is in flight for it.
    pub fn read(
        &self,
        key: &QueryKey,
        fetcher: Fetcher<V, E>,
        options: QueryOptions,
    ) -> Snapshot<V, E> {
        self.read_with(key, fetcher, options, false)
    }

    /// Like [`read`](Self::read), but also refetches `Fresh` entries.
    pub fn refetch(
        &self,
        key: &QueryKey,
        fetcher: Fetcher<V, E>,
        options: QueryOptions,
    ) -> Snapshot<V, E> {
        self.read_with(key, fetcher, options, true)
    }

    fn read_with(
        &self,
        key: &QueryKey,
        fetcher: Fetcher<V, E>,
        options: QueryOptions,
        force: bool,
    ) -> Snapshot<V, E> {
        let runtime = Handle::try_current();
        let mut state = lock_state(&self.inner.state, "read");
        let entry = state.entry_mut(key, options);
        entry.options = options;

        let snapshot = entry.snapshot(Instant::now());
        let needs_fetch = match snapshot.status {
            QueryStatus::Fetching => false,
            QueryStatus::Fresh => force,
            QueryStatus::Idle | QueryStatus::Stale | QueryStatus::Errored => true,
        };

        if snapshot.data.is_some() {
            counter!(METRIC_CACHE_HIT, "family" => family(key)).increment(1);
        } else {
            counter!(METRIC_CACHE_MISS, "family" => family(key)).increment(1);
        }

        if !needs_fetch {
            return snapshot;
        }

        let Ok(runtime) = runtime else {
            warn!(key = %key, "No tokio runtime available; fetch not scheduled");
            return snapshot;
        };

        let generation = entry.begin_fetch();
        drop(state);

        debug!(
            key = %key,
            from = snapshot.status.as_str(),
            forced = force,
            "Scheduling cache fetch"
        );
        runtime.spawn(run_fetch(
            Arc::downgrade(&self.inner),
            key.clone(),
            generation,
            fetcher,
            options.retry,
        ));

        snapshot
    }

    /// Awaitable read: returns fresh data straight away, otherwise waits for
    /// the (possibly already running) fetch to settle.
    pub async fn fetch(
        &self,
        key: &QueryKey,
        fetcher: Fetcher<V, E>,
        options: QueryOptions,
    ) -> Result<Arc<V>, E> {
        if Handle::try_current().is_err() {
            warn!(key = %key, "No tokio runtime available; fetch refused");
            return Err(E::not_scheduled("no tokio runtime available to run the fetch"));
        }

        let mut subscription = self.subscribe(key);
        let snapshot = self.read(key, Arc::clone(&fetcher), options);
        if let (QueryStatus::Fresh, Some(data)) = (snapshot.status, snapshot.data) {
            return Ok(data);
        }

        loop {
            let Some(settled) = subscription.settled().await else {
                subscription = self.subscribe(key);
                self.read(key, Arc::clone(&fetcher), options);
                continue;
            };

            match settled.status {
                QueryStatus::Errored => {
                    if let Some(err) = settled.error {
                        return Err(err);
                    }
                }
                QueryStatus::Fresh | QueryStatus::Stale => {
                    if let Some(data) = settled.data {
                        return Ok(data);
                    }
                }
                QueryStatus::Idle | QueryStatus::Fetching => {}
            }

            // Removed mid-flight or settled without a value: start over.
            self.read(key, Arc::clone(&fetcher), options);
        }
    }

    /// Marks every entry under `prefix` stale without fetching. Entries with a
    /// fetch in flight re-stale as soon as that fetch commits.
    pub fn invalidate(&self, prefix: &QueryKey) -> usize {
        let mut state = lock_state(&self.inner.state, "invalidate");
        let mut touched = 0;

        for (_, entry) in state
            .entries
            .iter_mut()
            .filter(|(key, _)| key.starts_with(prefix))
        {
            match entry.status {
                QueryStatus::Fetching => entry.invalidated_in_flight = true,
                QueryStatus::Idle => {}
                QueryStatus::Fresh | QueryStatus::Stale | QueryStatus::Errored => {
                    entry.status = QueryStatus::Stale;
                    entry.fresh_epoch += 1;
                    entry.publish();
                }
            }
            touched += 1;
        }

        debug!(prefix = %prefix, touched, "Invalidated cache entries");
        touched
    }

    /// Replaces the entry's data and marks it fresh. A fetch still in flight
    /// for the key is superseded and its result dropped.
    pub fn set_data(&self, key: &QueryKey, value: V) {
        let options = (self.inner.defaults)(key);
        let mut state = lock_state(&self.inner.state, "set_data");
        let superseding = state.allocate_generation();
        let entry = state.entry_mut(key, options);

        if entry.status == QueryStatus::Fetching {
            entry.generation = superseding;
        }
        entry.store_value(Arc::new(value));
        entry.status = QueryStatus::Fresh;
        entry.invalidated_in_flight = false;
        entry.publish();

        self.inner.arm_stale(key, entry);
        if entry.observers == 0 {
            self.inner.arm_gc(key, entry);
        }
        debug!(key = %key, "Patched cache entry");
    }

    /// Evicts the entry immediately even when observed. Observers stay
    /// attached and see it come back as `Idle`.
    pub fn remove(&self, key: &QueryKey) -> bool {
        let mut state = lock_state(&self.inner.state, "remove");
        let removed = state.evict_where(|candidate| candidate == key) > 0;
        if removed {
            counter!(METRIC_CACHE_EVICT, "family" => family(key), "reason" => "remove")
                .increment(1);
            debug!(key = %key, "Removed cache entry");
        }
        removed
    }

    pub fn subscribe(&self, key: &QueryKey) -> Subscription<V, E> {
        let options = (self.inner.defaults)(key);
        let mut state = lock_state(&self.inner.state, "subscribe");
        let entry = state.entry_mut(key, options);
        entry.observers += 1;
        // Cancels any pending eviction.
        entry.gc_epoch += 1;
        entry.publish();
        let rx = entry.tx.subscribe();
        drop(state);

        let store = Arc::downgrade(&self.inner);
        let owned_key = key.clone();
        Subscription {
            rx,
            release: Some(Box::new(move || {
                if let Some(inner) = store.upgrade() {
                    inner.release(&owned_key);
                }
            })),
        }
    }

    pub fn snapshot(&self, key: &QueryKey) -> Option<Snapshot<V, E>> {
        let state = lock_state(&self.inner.state, "snapshot");
        state
            .entries
            .get(key)
            .map(|entry| entry.snapshot(Instant::now()))
    }

    pub fn len(&self) -> usize {
        lock_state(&self.inner.state, "len").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every entry; observed keys restart as `Idle`.
    pub fn clear(&self) {
        let mut state = lock_state(&self.inner.state, "clear");
        let cleared = state.evict_where(|_| true);
        debug!(cleared, "Cleared cache store");
    }
}

impl<V, E> Inner<V, E>
where
    V: Send + Sync + 'static,
    E: FetchError,
{
    fn commit(self: &Arc<Self>, key: &QueryKey, generation: u64, value: V) {
        let mut state = lock_state(&self.state, "commit");
        let Some(entry) = current_entry(&mut state, key, generation) else {
            debug!(key = %key, "Discarded fetch result for replaced entry");
            return;
        };

        entry.store_value(Arc::new(value));
        entry.status = if std::mem::take(&mut entry.invalidated_in_flight) {
            QueryStatus::Stale
        } else {
            QueryStatus::Fresh
        };
        entry.publish();
        debug!(key = %key, status = entry.status.as_str(), "Committed fetch result");

        if entry.status == QueryStatus::Fresh {
            self.arm_stale(key, entry);
        }
        if entry.observers == 0 {
            self.arm_gc(key, entry);
        }
    }

    /// Records a failed attempt that will be retried. Returns `false` when the
    /// entry is gone and the fetch should stop.
    fn note_failure(&self, key: &QueryKey, generation: u64, err: &E, failures: u32) -> bool {
        let mut state = lock_state(&self.state, "note_failure");
        let Some(entry) = current_entry(&mut state, key, generation) else {
            return false;
        };
        entry.failure_count = failures;
        entry.error = Some(err.clone());
        entry.publish();
        debug!(key = %key, failures, error = %err, "Fetch attempt failed; retrying");
        true
    }

    fn fail(self: &Arc<Self>, key: &QueryKey, generation: u64, err: E, failures: u32) {
        let mut state = lock_state(&self.state, "fail");
        let Some(entry) = current_entry(&mut state, key, generation) else {
            return;
        };
        warn!(key = %key, failures, error = %err, "Fetch failed after final attempt");
        entry.failure_count = failures;
        entry.error = Some(err);
        entry.status = QueryStatus::Errored;
        entry.invalidated_in_flight = false;
        entry.publish();

        if entry.observers == 0 {
            self.arm_gc(key, entry);
        }
    }

    fn release(self: &Arc<Self>, key: &QueryKey) {
        let mut state = lock_state(&self.state, "release");
        let Some(entry) = state.entries.get_mut(key) else {
            return;
        };
        entry.observers = entry.observers.saturating_sub(1);
        entry.publish();
        if entry.observers == 0 {
            self.arm_gc(key, entry);
        }
    }

    fn arm_stale(self: &Arc<Self>, key: &QueryKey, entry: &Entry<V, E>) {
        let store = Arc::downgrade(self);
        let key = key.clone();
        let generation = entry.generation;
        let epoch = entry.fresh_epoch;
        spawn_timer(entry.options.stale_after, move || {
            if let Some(inner) = store.upgrade() {
                inner.expire(&key, generation, epoch);
            }
        });
    }

    fn arm_gc(self: &Arc<Self>, key: &QueryKey, entry: &mut Entry<V, E>) {
        entry.gc_epoch += 1;
        let store = Arc::downgrade(self);
        let key = key.clone();
        let generation = entry.generation;
        let epoch = entry.gc_epoch;
        spawn_timer(entry.options.gc_after, move || {
            if let Some(inner) = store.upgrade() {
                inner.collect(&key, generation, epoch);
            }
        });
    }

    fn expire(&self, key: &QueryKey, generation: u64, epoch: u64) {
        let mut state = lock_state(&self.state, "expire");
        let Some(entry) = current_entry(&mut state, key, generation) else {
            return;
        };
        if entry.fresh_epoch == epoch && entry.status == QueryStatus::Fresh {
            entry.status = QueryStatus::Stale;
            entry.publish();
            debug!(key = %key, "Cache entry went stale");
        }
    }

    fn collect(&self, key: &QueryKey, generation: u64, epoch: u64) {
        let mut state = lock_state(&self.state, "collect");
        let Some(entry) = current_entry(&mut state, key, generation) else {
            return;
        };
        if entry.gc_epoch != epoch || entry.observers > 0 {
            return;
        }
        if entry.status == QueryStatus::Fetching {
            // Re-armed when the fetch settles.
            debug!(key = %key, "Deferred eviction of fetching entry");
            return;
        }

        state.entries.remove(key);
        counter!(METRIC_CACHE_EVICT, "family" => family(key), "reason" => "gc").increment(1);
        debug!(key = %key, "Evicted unobserved cache entry");
    }
}

fn current_entry<'a, V, E>(
    state: &'a mut State<V, E>,
    key: &QueryKey,
    generation: u64,
) -> Option<&'a mut Entry<V, E>> {
    state
        .entries
        .get_mut(key)
        .filter(|entry| entry.generation == generation)
}

async fn run_fetch<V, E>(
    store: Weak<Inner<V, E>>,
    key: QueryKey,
    generation: u64,
    fetcher: Fetcher<V, E>,
    retry: RetryPolicy,
) where
    V: Send + Sync + 'static,
    E: FetchError,
{
    let max_attempts = retry.max_attempts.get();
    let mut failures = 0;

    loop {
        counter!(METRIC_CACHE_FETCH, "family" => family(&key)).increment(1);
        let result = fetcher().await;

        // The store may be gone while the attempt ran.
        let Some(inner) = store.upgrade() else {
            return;
        };

        match result {
            Ok(value) => {
                inner.commit(&key, generation, value);
                return;
            }
            Err(err) => {
                failures += 1;
                if failures >= max_attempts || !err.is_retryable() {
                    inner.fail(&key, generation, err, failures);
                    return;
                }
                if !inner.note_failure(&key, generation, &err, failures) {
                    return;
                }
            }
        }

        drop(inner);
        tokio::time::sleep(retry.delay_after(failures)).await;
    }
}

fn spawn_timer(delay: Duration, task: impl FnOnce() + Send + 'static) {
    match Handle::try_current() {
        Ok(runtime) => {
            runtime.spawn(async move {
                tokio::time::sleep(delay).await;
                task();
            });
        }
        Err(_) => debug!("No tokio runtime available; cache timer skipped"),
    }
}

fn family(key: &QueryKey) -> String {
    key.segments()
        .first()
        .map(ToString::to_string)
        .unwrap_or_default()
}

/// Observer handle for one key. Dropping it releases the observation and,
/// when it was the last one, starts the eviction grace period.
pub struct Subscription<V, E> {
    rx: watch::Receiver<Snapshot<V, E>>,
    release: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl<V, E: Clone> Subscription<V, E> {
    pub fn current(&self) -> Snapshot<V, E> {
        Snapshot::clone(&self.rx.borrow())
    }

    /// Waits for the next published snapshot. `None` once the entry has been
    /// dropped from the store.
    pub async fn changed(&mut self) -> Option<Snapshot<V, E>> {
        self.rx.changed().await.ok()?;
        Some(Snapshot::clone(&self.rx.borrow_and_update()))
    }

    /// Waits until no fetch is in flight and returns that snapshot.
    pub async fn settled(&mut self) -> Option<Snapshot<V, E>> {
        self.rx
            .wait_for(|snapshot| !snapshot.is_fetching())
            .await
            .ok()
            .map(|snapshot| Snapshot::clone(&snapshot))
    }
}

impl<V, E> Drop for Subscription<V, E> {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}
