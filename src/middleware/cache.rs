//! Memoizing resolution middleware.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::cache::MemoStore;
use crate::error::DiResult;
use crate::key::ServiceId;
use crate::middleware::{Middleware, Next};
use crate::registration::AnyArc;

type CachePredicate = Arc<dyn Fn(&ServiceId) -> bool + Send + Sync>;

/// Memoizes the instance visible at its position in the pipeline.
///
/// This differs from singleton bindings, which cache the raw factory output:
/// the cache middleware stores whatever the inner layers returned, after any
/// transformation they applied. Concurrent misses for one identifier share a
/// single inner resolution.
///
/// Clones share the memo table, so keep a clone to flush after handing one
/// to the container.
///
/// # Examples
///
/// ```
/// use ferrous_container::{Container, ServiceId};
/// use ferrous_container::middleware::CacheMiddleware;
/// use std::sync::Arc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> ferrous_container::DiResult<()> {
/// let cache = CacheMiddleware::new();
/// let container = Container::new();
/// container.use_middleware(cache.clone());
/// container.bind_transient("report", |_| async { Ok(String::from("expensive")) });
///
/// let a = container.resolve::<String>("report").await?;
/// let b = container.resolve::<String>("report").await?;
/// assert!(Arc::ptr_eq(&a, &b));
///
/// cache.flush(Some(&ServiceId::name("report")));
/// let c = container.resolve::<String>("report").await?;
/// assert!(!Arc::ptr_eq(&a, &c));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct CacheMiddleware {
    store: MemoStore<ServiceId, AnyArc>,
    should_cache: CachePredicate,
    ttl: Duration,
}

impl CacheMiddleware {
    /// Caches every identifier, without expiry.
    pub fn new() -> Self {
        Self {
            store: MemoStore::new(),
            should_cache: Arc::new(|_| true),
            ttl: Duration::ZERO,
        }
    }

    /// Caches only identifiers accepted by `predicate`.
    pub fn with_predicate<P>(predicate: P) -> Self
    where
        P: Fn(&ServiceId) -> bool + Send + Sync + 'static,
    {
        Self {
            should_cache: Arc::new(predicate),
            ..Self::new()
        }
    }

    /// Expires memoized instances after `ttl`; zero never expires.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Clears one memo entry, or all entries when `id` is `None`.
    ///
    /// Resolutions already in flight still complete for their callers, but
    /// their result is not memoized.
    pub fn flush(&self, id: Option<&ServiceId>) {
        match id {
            Some(id) => {
                self.store.remove(id);
                tracing::debug!(id = %id, "resolution cache entry flushed");
            }
            None => self.store.flush(),
        }
    }

    /// Returns true if an instance for `id` is memoized.
    pub fn is_cached(&self, id: &ServiceId) -> bool {
        self.store.has(id)
    }

    /// Number of memoized instances.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

impl Default for CacheMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Middleware for CacheMiddleware {
    async fn handle(&self, id: ServiceId, next: Next) -> DiResult<AnyArc> {
        if !(self.should_cache)(&id) {
            return next.run(id).await;
        }
        if let Some(instance) = self.store.get(&id) {
            return Ok(instance);
        }
        let _wait = next.resolver().wait_for_shared()?;
        let key = id.clone();
        self.store.try_remember(key, self.ttl, move || next.run(id)).await
    }

    fn name(&self) -> &'static str {
        "cache"
    }

    fn on_rebind(&self, id: &ServiceId) {
        if self.store.remove(id) {
            tracing::debug!(id = %id, "resolution cache entry dropped after rebind");
        }
    }
}
