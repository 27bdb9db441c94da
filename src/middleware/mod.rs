//! Resolution middleware pipeline.
//!
//! Middleware wraps every resolution, including the nested resolutions a
//! factory performs. The chain is an ordered list folded into a single
//! [`ResolveFn`] by [`Pipeline::compile`].
//!
//! # Ordering
//!
//! The first middleware added is the outermost layer. With `M1` added
//! before `M2`, a resolution runs:
//!
//! ```text
//! M1:before -> M2:before -> base resolve -> M2:after -> M1:after
//! ```
//!
//! # Failure semantics
//!
//! Errors from inner layers travel outward unchanged. Only middleware built
//! for it, such as [`FallbackMiddleware`], substitutes a value for a failure.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::error::DiResult;
use crate::key::ServiceId;
use crate::provider::Resolver;
use crate::registration::AnyArc;

pub mod cache;
pub mod fallback;
pub mod logging;
pub mod metrics;

pub use cache::CacheMiddleware;
pub use fallback::FallbackMiddleware;
pub use logging::LoggingMiddleware;
pub use metrics::{
    MetricsMiddleware, NoopCollector, ResolutionCollector, ResolutionEvent, ResolutionOutcome,
    TracingCollector,
};

/// A compiled resolve function: identifier plus resolution context in,
/// instance out.
pub type ResolveFn =
    Arc<dyn Fn(ServiceId, Resolver) -> BoxFuture<'static, DiResult<AnyArc>> + Send + Sync>;

/// Continuation handed to a middleware: the rest of the chain.
///
/// Calling [`run`](Next::run) invokes the next middleware, or the base
/// resolver when this is the innermost layer. Not calling it
/// short-circuits the resolution.
pub struct Next {
    inner: ResolveFn,
    resolver: Resolver,
}

impl Next {
    /// Continues the resolution with the remainder of the chain.
    pub fn run(self, id: ServiceId) -> BoxFuture<'static, DiResult<AnyArc>> {
        (self.inner)(id, self.resolver)
    }

    /// The resolution context this continuation will run in.
    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }
}

/// Interceptor wrapped around resolution.
///
/// # Examples
///
/// ```
/// use ferrous_container::{Container, DiResult, ServiceId};
/// use ferrous_container::middleware::{Middleware, Next};
/// use ferrous_container::registration::AnyArc;
/// use async_trait::async_trait;
///
/// struct Audit;
///
/// #[async_trait]
/// impl Middleware for Audit {
///     async fn handle(&self, id: ServiceId, next: Next) -> DiResult<AnyArc> {
///         println!("resolving {}", id);
///         next.run(id).await
///     }
/// }
///
/// let container = Container::new();
/// container.use_middleware(Audit);
/// ```
#[async_trait]
pub trait Middleware: Send + Sync + 'static {
    /// Handles one resolution of `id`.
    async fn handle(&self, id: ServiceId, next: Next) -> DiResult<AnyArc>;

    /// Name for diagnostics.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Called after the binding for `id` is replaced, removed or has its
    /// singleton forgotten. Middleware holding instances for `id` must drop
    /// them here.
    fn on_rebind(&self, id: &ServiceId) {
        let _ = id;
    }
}

/// Middleware built from an async closure. See [`from_fn`].
pub struct FnMiddleware<F> {
    f: F,
}

/// Adapts an async closure into a [`Middleware`].
///
/// ```
/// use ferrous_container::Container;
/// use ferrous_container::middleware::from_fn;
///
/// let container = Container::new();
/// container.use_middleware(from_fn(|id, next| async move {
///     let result = next.run(id).await;
///     result
/// }));
/// ```
pub fn from_fn<F, Fut>(f: F) -> FnMiddleware<F>
where
    F: Fn(ServiceId, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = DiResult<AnyArc>> + Send + 'static,
{
    FnMiddleware { f }
}

#[async_trait]
impl<F, Fut> Middleware for FnMiddleware<F>
where
    F: Fn(ServiceId, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = DiResult<AnyArc>> + Send + 'static,
{
    async fn handle(&self, id: ServiceId, next: Next) -> DiResult<AnyArc> {
        (self.f)(id, next).await
    }
}

/// Ordered middleware chain.
#[derive(Clone, Default)]
pub struct Pipeline {
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl Pipeline {
    /// Creates an empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a middleware as the new innermost layer.
    pub fn use_middleware<M: Middleware>(&mut self, middleware: M) -> &mut Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    /// Appends an already shared middleware.
    pub fn use_shared(&mut self, middleware: Arc<dyn Middleware>) -> &mut Self {
        self.middlewares.push(middleware);
        self
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Middleware names, outermost first.
    pub fn names(&self) -> Vec<&'static str> {
        self.middlewares.iter().map(|m| m.name()).collect()
    }

    /// Tells every middleware that the binding for `id` changed.
    pub fn notify_rebind(&self, id: &ServiceId) {
        for middleware in &self.middlewares {
            middleware.on_rebind(id);
        }
    }

    /// Folds the chain around `base` into a single resolve function.
    ///
    /// Compiling the same chain twice yields functions that behave
    /// identically; both share the same middleware instances.
    pub fn compile(&self, base: ResolveFn) -> ResolveFn {
        self.middlewares.iter().rev().fold(base, |inner, middleware| {
            let middleware = Arc::clone(middleware);
            let layer: ResolveFn = Arc::new(move |id: ServiceId, resolver: Resolver| -> BoxFuture<'static, DiResult<AnyArc>> {
                let middleware = Arc::clone(&middleware);
                let next = Next {
                    inner: Arc::clone(&inner),
                    resolver,
                };
                Box::pin(async move { middleware.handle(id, next).await })
            });
            layer
        })
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
