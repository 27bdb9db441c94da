//! Resolver handle for factories and middleware.
//!
//! A [`Resolver`] is what factory functions receive. It resolves other
//! services through the container's full middleware pipeline while carrying
//! the chain of identifiers currently being resolved, which is how circular
//! bindings are caught.

use std::any::Any;
use std::sync::Arc;

use crate::cancellation::CancellationToken;
use crate::container::ContainerInner;
use crate::error::{DiError, DiResult};
use crate::injectable::Injectable;
use crate::internal::{ResolutionPath, WaitGuard};
use crate::key::ServiceId;
use crate::registration::AnyArc;

/// Context passed to factory functions for resolving dependencies.
///
/// # Examples
///
/// ```
/// use ferrous_container::{Container, Resolver};
/// use std::sync::Arc;
///
/// struct Database { url: String }
/// struct UserService { db: Arc<Database> }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> ferrous_container::DiResult<()> {
/// let container = Container::new();
/// container.bind_instance("db", Database { url: "postgres://localhost".to_string() });
/// container.bind_transient("users", |resolver: Resolver| async move {
///     Ok(UserService {
///         db: resolver.resolve::<Database>("db").await?,
///     })
/// });
///
/// let users = container.resolve::<UserService>("users").await?;
/// assert_eq!(users.db.url, "postgres://localhost");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Resolver {
    container: Arc<ContainerInner>,
    path: ResolutionPath,
}

impl Resolver {
    pub(crate) fn root(container: Arc<ContainerInner>) -> Self {
        Self {
            container,
            path: ResolutionPath::new(),
        }
    }

    /// Resolves `id` to its type-erased instance.
    ///
    /// The identifier is checked against the current chain before any
    /// middleware runs, so a cycle fails with
    /// [`DiError::CircularResolution`] instead of waiting on itself.
    pub async fn resolve_any(&self, id: impl Into<ServiceId>) -> DiResult<AnyArc> {
        let id = id.into();
        let path = self.path.enter(&id, self.container.options.max_depth)?;
        let child = Resolver {
            container: Arc::clone(&self.container),
            path,
        };
        let pipeline = self.container.pipeline_fn();
        pipeline(id, child).await
    }

    /// Resolves `id` and downcasts it to `T`.
    pub async fn resolve<T>(&self, id: impl Into<ServiceId>) -> DiResult<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        let id = id.into();
        let any = self.resolve_any(id.clone()).await?;
        downcast(&id, any)
    }

    /// Like [`resolve`](Self::resolve), but an unbound `id` yields `Ok(None)`.
    ///
    /// Missing bindings deeper in the chain are still errors.
    pub async fn try_resolve<T>(&self, id: impl Into<ServiceId>) -> DiResult<Option<Arc<T>>>
    where
        T: Any + Send + Sync,
    {
        let id = id.into();
        match self.resolve::<T>(id.clone()).await {
            Ok(instance) => Ok(Some(instance)),
            Err(DiError::BindingNotFound(missing)) if missing == id => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Resolves `id` unless `token` is cancelled first.
    ///
    /// A cancelled singleton construction publishes nothing; the next resolve
    /// runs the factory again.
    pub async fn resolve_with_cancel<T>(
        &self,
        id: impl Into<ServiceId>,
        token: &CancellationToken,
    ) -> DiResult<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        token.run_until_cancelled(self.resolve::<T>(id)).await
    }

    /// Resolves an [`Injectable`] under its own identifier.
    pub async fn get<T: Injectable>(&self) -> DiResult<Arc<T>> {
        self.resolve::<T>(T::service_id()).await
    }

    /// Identifiers currently being resolved on this chain, outermost first.
    pub fn path(&self) -> &[ServiceId] {
        self.path.frames()
    }

    /// Number of enclosing resolutions.
    pub fn depth(&self) -> usize {
        self.path.depth()
    }

    /// Registers this chain as about to wait on a shared construction of the
    /// identifier it is resolving.
    ///
    /// Fails with [`DiError::CircularResolution`] when the construction being
    /// waited on is, through other chains, waiting on this one.
    pub(crate) fn wait_for_shared(&self) -> DiResult<WaitGuard> {
        match self.path.frames().split_last() {
            Some((target, frames)) => self.container.waits.enter(frames, target),
            None => Ok(WaitGuard::detached()),
        }
    }

    /// Base step of every pipeline: look up the binding and produce.
    pub(crate) async fn instantiate(self, id: ServiceId) -> DiResult<AnyArc> {
        let binding = self
            .container
            .registry
            .get(&id)
            .ok_or_else(|| DiError::BindingNotFound(id.clone()))?;
        tracing::trace!(id = %id, depth = self.depth(), "instantiating");
        binding.instantiate(self).await
    }
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver").field("path", &self.path()).finish()
    }
}

pub(crate) fn downcast<T>(id: &ServiceId, any: AnyArc) -> DiResult<Arc<T>>
where
    T: Any + Send + Sync,
{
    any.downcast::<T>().map_err(|_| DiError::TypeMismatch {
        id: id.clone(),
        expected: std::any::type_name::<T>(),
    })
}
