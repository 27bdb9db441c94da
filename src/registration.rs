//! Binding registration types.

use std::any::Any;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::OnceCell;

use crate::error::DiResult;
use crate::internal::ShardedMap;
use crate::key::ServiceId;
use crate::lifetime::Lifetime;
use crate::provider::Resolver;

/// Type-erased instance as stored and passed through the pipeline.
pub type AnyArc = Arc<dyn Any + Send + Sync>;

pub(crate) type ErasedFactory =
    Arc<dyn Fn(Resolver) -> BoxFuture<'static, DiResult<AnyArc>> + Send + Sync>;

/// Binding with lifetime and factory
pub(crate) struct Binding {
    pub(crate) id: ServiceId,
    pub(crate) lifetime: Lifetime,
    pub(crate) factory: ErasedFactory,
    /// Implementation type name for diagnostics
    pub(crate) type_name: &'static str,
    /// Singleton slot; concurrent first resolves share one construction
    instance: Option<OnceCell<AnyArc>>,
}

impl Binding {
    pub(crate) fn new(
        id: ServiceId,
        lifetime: Lifetime,
        factory: ErasedFactory,
        type_name: &'static str,
    ) -> Self {
        let instance = lifetime.is_singleton().then(OnceCell::new);
        Self {
            id,
            lifetime,
            factory,
            type_name,
            instance,
        }
    }

    /// Singleton binding that is already materialized.
    pub(crate) fn with_instance(id: ServiceId, value: AnyArc, type_name: &'static str) -> Self {
        let shared = Arc::clone(&value);
        let factory: ErasedFactory = Arc::new(move |_| -> BoxFuture<'static, DiResult<AnyArc>> {
            let value = Arc::clone(&shared);
            Box::pin(async move { Ok(value) })
        });
        Self {
            id,
            lifetime: Lifetime::Singleton,
            factory,
            type_name,
            instance: Some(OnceCell::new_with(Some(value))),
        }
    }

    /// Same factory and lifetime, empty singleton slot.
    fn reset(&self) -> Self {
        Self::new(
            self.id.clone(),
            self.lifetime,
            Arc::clone(&self.factory),
            self.type_name,
        )
    }

    pub(crate) fn is_materialized(&self) -> bool {
        self.instance.as_ref().is_some_and(OnceCell::initialized)
    }

    /// Produces an instance: the cached singleton, or a fresh factory call.
    pub(crate) async fn instantiate(&self, resolver: Resolver) -> DiResult<AnyArc> {
        match &self.instance {
            Some(cell) => {
                if let Some(instance) = cell.get() {
                    return Ok(Arc::clone(instance));
                }
                let _wait = resolver.wait_for_shared()?;
                let instance = cell
                    .get_or_try_init(|| {
                        tracing::debug!(id = %self.id, ty = self.type_name, "materializing singleton");
                        (self.factory)(resolver)
                    })
                    .await?;
                Ok(Arc::clone(instance))
            }
            None => (self.factory)(resolver).await,
        }
    }
}

/// Binding table keyed by identifier
///
/// Bindings are held behind `Arc` so a resolution keeps the binding it
/// started with even if the identifier is rebound mid-flight.
pub(crate) struct Registry {
    bindings: ShardedMap<ServiceId, Arc<Binding>>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            bindings: ShardedMap::new(),
        }
    }

    /// Inserts or replaces a binding. Returns true if one was replaced.
    ///
    /// Replacing drops the old binding's cached singleton along with it.
    pub(crate) fn insert(&self, binding: Binding) -> bool {
        let id = binding.id.clone();
        let binding = Arc::new(binding);
        self.bindings.with(&id, |bindings| bindings.insert(id.clone(), binding).is_some())
    }

    #[inline]
    pub(crate) fn get(&self, id: &ServiceId) -> Option<Arc<Binding>> {
        self.bindings.with(id, |bindings| bindings.get(id).cloned())
    }

    pub(crate) fn contains(&self, id: &ServiceId) -> bool {
        self.bindings.with(id, |bindings| bindings.contains_key(id))
    }

    pub(crate) fn remove(&self, id: &ServiceId) -> bool {
        self.bindings.with(id, |bindings| bindings.remove(id).is_some())
    }

    /// Swaps in a copy of the binding with an empty singleton slot.
    pub(crate) fn forget_instance(&self, id: &ServiceId) -> bool {
        self.bindings.with(id, |bindings| match bindings.get_mut(id) {
            Some(binding) if binding.is_materialized() => {
                *binding = Arc::new(binding.reset());
                true
            }
            _ => false,
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.bindings.len()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
