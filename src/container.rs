//! The service container: bindings, middleware and resolution entry points.

use std::any::Any;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::RwLock;

use crate::cancellation::CancellationToken;
use crate::error::DiResult;
use crate::injectable::Injectable;
use crate::internal::circular::MAX_DEPTH;
use crate::internal::WaitGraph;
use crate::key::ServiceId;
use crate::lifetime::Lifetime;
use crate::middleware::{Middleware, Pipeline, ResolveFn};
use crate::provider::Resolver;
use crate::registration::{AnyArc, Binding, ErasedFactory, Registry};

/// Container tuning knobs.
#[derive(Debug, Clone)]
pub struct ContainerOptions {
    /// Deepest allowed chain of nested resolutions.
    pub max_depth: usize,
}

impl Default for ContainerOptions {
    fn default() -> Self {
        Self {
            max_depth: MAX_DEPTH,
        }
    }
}

pub(crate) struct ContainerInner {
    pub(crate) registry: Registry,
    pub(crate) options: ContainerOptions,
    pub(crate) waits: Arc<WaitGraph>,
    pipeline: RwLock<Pipeline>,
    compiled: RwLock<Option<ResolveFn>>,
}

impl ContainerInner {
    /// The compiled pipeline, recompiled lazily after middleware changes.
    pub(crate) fn pipeline_fn(&self) -> ResolveFn {
        if let Some(compiled) = self.compiled.read().as_ref() {
            return Arc::clone(compiled);
        }
        let mut compiled = self.compiled.write();
        if let Some(existing) = compiled.as_ref() {
            return Arc::clone(existing);
        }
        let pipeline = self.pipeline.read();
        let resolve = pipeline.compile(base_resolve());
        tracing::debug!(middlewares = ?pipeline.names(), "resolution pipeline compiled");
        *compiled = Some(Arc::clone(&resolve));
        resolve
    }
}

fn base_resolve() -> ResolveFn {
    Arc::new(|id: ServiceId, resolver: Resolver| -> BoxFuture<'static, DiResult<AnyArc>> {
        Box::pin(resolver.instantiate(id))
    })
}

/// Service container
///
/// Maps [`ServiceId`]s to bindings and resolves them through an ordered
/// middleware pipeline. Bindings and middleware may be added at any time;
/// the container is cheap to clone and every clone shares the same state.
///
/// Factories receive a [`Resolver`] and are responsible for resolving their
/// own dependencies; nothing is auto-wired.
///
/// # Examples
///
/// ```
/// use ferrous_container::{Container, Resolver};
/// use std::sync::Arc;
///
/// struct Config { port: u16 }
/// struct Server { config: Arc<Config> }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> ferrous_container::DiResult<()> {
/// let container = Container::new();
/// container
///     .bind_instance("config", Config { port: 8080 })
///     .bind_singleton("server", |r: Resolver| async move {
///         Ok(Server { config: r.resolve::<Config>("config").await? })
///     });
///
/// let server = container.resolve::<Server>("server").await?;
/// assert_eq!(server.config.port, 8080);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Container {
    inner: Arc<ContainerInner>,
}

impl Container {
    /// Creates an empty container with default options.
    pub fn new() -> Self {
        Self::with_options(ContainerOptions::default())
    }

    pub fn with_options(options: ContainerOptions) -> Self {
        Self {
            inner: Arc::new(ContainerInner {
                registry: Registry::new(),
                options,
                waits: Arc::new(WaitGraph::new()),
                pipeline: RwLock::new(Pipeline::new()),
                compiled: RwLock::new(None),
            }),
        }
    }

    // ----- Registration -----

    /// Registers `factory` under `id`, replacing any previous binding.
    ///
    /// Rebinding is never an error. The replaced binding's cached singleton,
    /// if any, is dropped with it, and every middleware is told through
    /// [`Middleware::on_rebind`] so memoized copies go too.
    pub fn bind<T, F, Fut>(&self, id: impl Into<ServiceId>, lifetime: Lifetime, factory: F) -> &Self
    where
        T: Send + Sync + 'static,
        F: Fn(Resolver) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = DiResult<T>> + Send + 'static,
    {
        let erased: ErasedFactory = Arc::new(move |resolver| -> BoxFuture<'static, DiResult<AnyArc>> {
            let fut = factory(resolver);
            Box::pin(async move { fut.await.map(|value| Arc::new(value) as AnyArc) })
        });
        self.insert(Binding::new(
            id.into(),
            lifetime,
            erased,
            std::any::type_name::<T>(),
        ))
    }

    /// Registers a singleton factory.
    pub fn bind_singleton<T, F, Fut>(&self, id: impl Into<ServiceId>, factory: F) -> &Self
    where
        T: Send + Sync + 'static,
        F: Fn(Resolver) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = DiResult<T>> + Send + 'static,
    {
        self.bind(id, Lifetime::Singleton, factory)
    }

    /// Registers a transient factory.
    pub fn bind_transient<T, F, Fut>(&self, id: impl Into<ServiceId>, factory: F) -> &Self
    where
        T: Send + Sync + 'static,
        F: Fn(Resolver) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = DiResult<T>> + Send + 'static,
    {
        self.bind(id, Lifetime::Transient, factory)
    }

    /// Registers an already constructed singleton.
    pub fn bind_instance<T>(&self, id: impl Into<ServiceId>, value: T) -> &Self
    where
        T: Send + Sync + 'static,
    {
        self.insert(Binding::with_instance(
            id.into(),
            Arc::new(value),
            std::any::type_name::<T>(),
        ))
    }

    /// Registers an [`Injectable`] under its own identifier.
    pub fn register<T: Injectable>(&self, lifetime: Lifetime) -> &Self {
        self.bind(T::service_id(), lifetime, |resolver| T::inject(resolver))
    }

    fn insert(&self, binding: Binding) -> &Self {
        let id = binding.id.clone();
        let lifetime = binding.lifetime;
        let ty = binding.type_name;
        if self.inner.registry.insert(binding) {
            tracing::debug!(id = %id, ?lifetime, ty, "binding replaced");
        } else {
            tracing::debug!(id = %id, ?lifetime, ty, "binding registered");
        }
        self.notify_rebind(&id);
        self
    }

    // Must follow the registry change, never precede it.
    fn notify_rebind(&self, id: &ServiceId) {
        self.inner.pipeline.read().notify_rebind(id);
    }

    /// Removes the binding for `id`. Returns true if one existed.
    pub fn unbind(&self, id: impl Into<ServiceId>) -> bool {
        let id = id.into();
        let removed = self.inner.registry.remove(&id);
        self.notify_rebind(&id);
        removed
    }

    pub fn is_bound(&self, id: impl Into<ServiceId>) -> bool {
        self.inner.registry.contains(&id.into())
    }

    /// Drops the cached singleton for `id` so the next resolve runs the
    /// factory again. Returns true if an instance was dropped.
    pub fn forget_instance(&self, id: impl Into<ServiceId>) -> bool {
        let id = id.into();
        let forgotten = self.inner.registry.forget_instance(&id);
        self.notify_rebind(&id);
        forgotten
    }

    /// Number of bindings.
    pub fn len(&self) -> usize {
        self.inner.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ----- Middleware -----

    /// Appends `middleware` as the innermost layer of the pipeline.
    ///
    /// The first middleware added is the outermost.
    pub fn use_middleware<M: Middleware>(&self, middleware: M) -> &Self {
        self.use_shared(Arc::new(middleware))
    }

    /// Appends an already shared middleware.
    pub fn use_shared(&self, middleware: Arc<dyn Middleware>) -> &Self {
        let mut compiled = self.inner.compiled.write();
        self.inner.pipeline.write().use_shared(middleware);
        *compiled = None;
        self
    }

    /// Number of middleware in the pipeline.
    pub fn middleware_count(&self) -> usize {
        self.inner.pipeline.read().len()
    }

    /// The container's effective resolve function.
    pub fn compile(&self) -> ResolveFn {
        self.inner.pipeline_fn()
    }

    // ----- Resolution -----

    /// A resolver at the root of a fresh resolution chain.
    pub fn resolver(&self) -> Resolver {
        Resolver::root(Arc::clone(&self.inner))
    }

    /// Resolves `id` to its type-erased instance.
    pub async fn resolve_any(&self, id: impl Into<ServiceId>) -> DiResult<AnyArc> {
        self.resolver().resolve_any(id).await
    }

    /// Resolves `id` and downcasts the instance to `T`.
    ///
    /// Fails with [`DiError::BindingNotFound`](crate::DiError::BindingNotFound)
    /// for unbound identifiers and
    /// [`DiError::TypeMismatch`](crate::DiError::TypeMismatch) when the
    /// instance is not a `T`.
    pub async fn resolve<T>(&self, id: impl Into<ServiceId>) -> DiResult<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.resolver().resolve::<T>(id).await
    }

    /// Resolves `id`, mapping an unbound `id` to `Ok(None)`.
    pub async fn try_resolve<T>(&self, id: impl Into<ServiceId>) -> DiResult<Option<Arc<T>>>
    where
        T: Any + Send + Sync,
    {
        self.resolver().try_resolve::<T>(id).await
    }

    /// Resolves `id` unless `token` is cancelled first.
    pub async fn resolve_with_cancel<T>(
        &self,
        id: impl Into<ServiceId>,
        token: &CancellationToken,
    ) -> DiResult<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.resolver().resolve_with_cancel::<T>(id, token).await
    }

    /// Resolves an [`Injectable`] under its own identifier.
    pub async fn get<T: Injectable>(&self) -> DiResult<Arc<T>> {
        self.resolver().get::<T>().await
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("bindings", &self.len())
            .field("pipeline", &*self.inner.pipeline.read())
            .finish()
    }
}
