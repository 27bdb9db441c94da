//! Memoizing get-or-compute store with TTL expiry and coalesced fills.
//!
//! [`MemoStore`] backs the resolution cache middleware, the configuration
//! facade and the application cache. Its guarantees:
//!
//! - at most one producer runs per key at a time; concurrent misses join the
//!   in-flight fill and all receive its outcome, value or error
//! - a failed fill stores nothing, so the next call runs the producer again
//! - expired entries read as absent and are evicted on the access that finds
//!   them
//! - `set`, `remove` and `flush` issued while a fill is in flight retire that
//!   fill: its callers still get the produced value but it is not stored
//! - a fill whose callers all went away (dropped or cancelled) is abandoned
//!   and stores nothing

use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::time::Instant;

use crate::cancellation::CancellationToken;
use crate::error::{DiError, DiResult};
use crate::internal::sharded::{Shard, ShardedMap};

type Fill<V> = Shared<BoxFuture<'static, DiResult<V>>>;

struct MemoEntry<V> {
    value: V,
    expires_at: Option<Instant>,
}

impl<V> MemoEntry<V> {
    fn new(value: V, ttl: Duration) -> Self {
        let expires_at = if ttl.is_zero() {
            None
        } else {
            Some(Instant::now() + ttl)
        };
        Self { value, expires_at }
    }

    #[inline]
    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(at) if now > at)
    }
}

struct Pending<V> {
    id: u64,
    waiters: usize,
    fill: Fill<V>,
}

struct Slot<V> {
    entry: Option<MemoEntry<V>>,
    pending: Option<Pending<V>>,
}

impl<V> Slot<V> {
    fn empty() -> Self {
        Self {
            entry: None,
            pending: None,
        }
    }

    fn is_empty(&self) -> bool {
        self.entry.is_none() && self.pending.is_none()
    }
}

struct StoreInner<K, V> {
    slots: ShardedMap<K, Slot<V>>,
    next_fill: AtomicU64,
}

/// Reads the live value for `key`, evicting it if it has expired.
fn live_value<K, V>(slots: &mut Shard<K, Slot<V>>, key: &K, now: Instant) -> Option<V>
where
    K: Eq + Hash,
    V: Clone,
{
    let slot = slots.get_mut(key)?;
    match &slot.entry {
        Some(entry) if !entry.is_expired(now) => return Some(entry.value.clone()),
        Some(_) => slot.entry = None,
        None => {}
    }
    if slot.is_empty() {
        slots.remove(key);
    }
    None
}

impl<K, V> StoreInner<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn complete(&self, key: &K, id: u64, ttl: Duration, result: &DiResult<V>) {
        self.slots.with(key, |slots| {
            let Some(slot) = slots.get_mut(key) else {
                tracing::trace!(?key, fill = id, "memo fill discarded, key was flushed");
                return;
            };
            if slot.pending.as_ref().map(|p| p.id) != Some(id) {
                tracing::trace!(?key, fill = id, "memo fill discarded, superseded");
                return;
            }
            slot.pending = None;
            match result {
                Ok(value) => {
                    slot.entry = Some(MemoEntry::new(value.clone(), ttl));
                    tracing::trace!(?key, fill = id, "memo fill stored");
                }
                Err(err) => {
                    tracing::debug!(?key, fill = id, error = %err, "memo fill failed");
                }
            }
            if slot.is_empty() {
                slots.remove(key);
            }
        });
    }

    fn release(&self, key: &K, id: u64) {
        self.slots.with(key, |slots| {
            let Some(slot) = slots.get_mut(key) else { return };
            let abandoned = match slot.pending.as_mut() {
                Some(pending) if pending.id == id => {
                    pending.waiters = pending.waiters.saturating_sub(1);
                    pending.waiters == 0
                }
                _ => false,
            };
            if abandoned {
                tracing::debug!(?key, fill = id, "memo fill abandoned by every caller");
                slot.pending = None;
                if slot.is_empty() {
                    slots.remove(key);
                }
            }
        });
    }
}

/// Drops a caller's interest in a fill; the last one out abandons it.
struct Waiter<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    inner: Arc<StoreInner<K, V>>,
    key: K,
    id: u64,
}

impl<K, V> Drop for Waiter<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.inner.release(&self.key, self.id);
    }
}

enum Lookup<V> {
    Hit(V),
    Wait(Fill<V>, u64),
}

/// Get-or-compute store with per-entry TTL.
///
/// A `ttl` of [`Duration::ZERO`] means the entry never expires. Cloning a
/// `MemoStore` yields another handle onto the same entries.
///
/// # Examples
///
/// ```
/// use ferrous_container::MemoStore;
/// use std::convert::Infallible;
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> ferrous_container::DiResult<()> {
/// let store: MemoStore<&'static str, u64> = MemoStore::new();
///
/// let first = store
///     .remember("answer", Duration::from_secs(60), || async { Ok::<_, Infallible>(42) })
///     .await?;
/// // Live entry: the producer is not invoked again
/// let second = store
///     .remember("answer", Duration::from_secs(60), || async { Ok::<_, Infallible>(0) })
///     .await?;
///
/// assert_eq!((first, second), (42, 42));
/// assert!(store.has(&"answer"));
/// # Ok(())
/// # }
/// ```
pub struct MemoStore<K, V> {
    inner: Arc<StoreInner<K, V>>,
}

impl<K, V> Clone for MemoStore<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> MemoStore<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StoreInner {
                slots: ShardedMap::new(),
                next_fill: AtomicU64::new(1),
            }),
        }
    }

    /// Returns the live value for `key`, or runs `producer` and stores its
    /// output for `ttl`.
    ///
    /// Producer errors are wrapped in [`DiError::ProducerFailure`] and
    /// delivered to every caller coalesced onto the fill.
    pub async fn remember<F, Fut, E>(&self, key: K, ttl: Duration, producer: F) -> DiResult<V>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
        E: Into<Box<dyn std::error::Error + Send + Sync>> + 'static,
    {
        let error_key = key.clone();
        self.try_remember(key, ttl, move || {
            producer().map(move |result| result.map_err(|err| DiError::producer(error_key, err)))
        })
        .await
    }

    /// Like [`remember`](Self::remember), but the producer already speaks
    /// [`DiError`] and its errors are passed through unchanged.
    pub async fn try_remember<F, Fut>(&self, key: K, ttl: Duration, producer: F) -> DiResult<V>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = DiResult<V>> + Send + 'static,
    {
        let now = Instant::now();
        let inner = &self.inner;

        let lookup = inner.slots.with(&key, |slots| {
            if let Some(value) = live_value(slots, &key, now) {
                return Lookup::Hit(value);
            }

            let slot = slots.entry(key.clone()).or_insert_with(Slot::empty);
            let pending = slot.pending.get_or_insert_with(|| {
                let id = inner.next_fill.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(?key, fill = id, "memo fill started");
                Pending {
                    id,
                    waiters: 0,
                    fill: start_fill(Arc::downgrade(inner), key.clone(), id, ttl, producer),
                }
            });
            pending.waiters += 1;
            Lookup::Wait(pending.fill.clone(), pending.id)
        });

        match lookup {
            Lookup::Hit(value) => Ok(value),
            Lookup::Wait(fill, id) => {
                let _waiter = Waiter {
                    inner: Arc::clone(inner),
                    key,
                    id,
                };
                fill.await
            }
        }
    }

    /// [`remember`](Self::remember) that gives up when `token` is cancelled.
    ///
    /// A cancelled call returns [`DiError::Cancelled`]. If it was the last
    /// caller waiting on the fill, the producer is dropped and nothing is
    /// stored.
    pub async fn remember_with_cancel<F, Fut, E>(
        &self,
        key: K,
        ttl: Duration,
        token: &CancellationToken,
        producer: F,
    ) -> DiResult<V>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
        E: Into<Box<dyn std::error::Error + Send + Sync>> + 'static,
    {
        token
            .run_until_cancelled(self.remember(key, ttl, producer))
            .await
    }

    /// Returns the live value for `key`.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        self.inner.slots.with(key, |slots| live_value(slots, key, now))
    }

    /// Stores `value` for `ttl`, replacing any entry and retiring any
    /// in-flight fill for `key`.
    pub fn set(&self, key: K, value: V, ttl: Duration) {
        self.inner.slots.with(&key, |slots| {
            let slot = slots.entry(key.clone()).or_insert_with(Slot::empty);
            slot.entry = Some(MemoEntry::new(value, ttl));
            slot.pending = None;
        });
    }

    /// Removes `key`, retiring any in-flight fill. Returns true if a live
    /// entry was removed.
    pub fn remove(&self, key: &K) -> bool {
        let now = Instant::now();
        self.inner.slots.with(key, |slots| {
            slots
                .remove(key)
                .and_then(|slot| slot.entry)
                .map_or(false, |entry| !entry.is_expired(now))
        })
    }

    /// Returns true if a live entry exists for `key`, evicting it if expired.
    pub fn has(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Removes every entry and retires every in-flight fill.
    pub fn flush(&self) {
        self.inner.slots.for_each_shard(|slots| slots.clear());
        tracing::debug!("memo store flushed");
    }

    /// Evicts every expired entry. Returns the number evicted.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut evicted = 0;
        self.inner.slots.for_each_shard(|slots| {
            slots.retain(|_, slot| {
                if slot.entry.as_ref().is_some_and(|e| e.is_expired(now)) {
                    slot.entry = None;
                    evicted += 1;
                }
                !slot.is_empty()
            });
        });
        evicted
    }

    /// Number of stored entries, live or not yet evicted.
    pub fn len(&self) -> usize {
        let mut count = 0;
        self.inner
            .slots
            .for_each_shard(|slots| count += slots.values().filter(|s| s.entry.is_some()).count());
        count
    }

    /// Returns true if no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, V> Debug for MemoStore<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoStore").field("entries", &self.len()).finish()
    }
}

impl<K, V> Default for MemoStore<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

fn start_fill<K, V, F, Fut>(
    inner: Weak<StoreInner<K, V>>,
    key: K,
    id: u64,
    ttl: Duration,
    producer: F,
) -> Fill<V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = DiResult<V>> + Send + 'static,
{
    async move {
        let result = producer().await;
        if let Some(inner) = inner.upgrade() {
            inner.complete(&key, id, ttl, &result);
        }
        result
    }
    .boxed()
    .shared()
}
