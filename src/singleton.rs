//! Process-wide one-instance-per-type registry.
//!
//! Independent of [`Container`](crate::Container): a type implementing
//! [`Singleton`] gets exactly one instance for the life of the process, no
//! matter how many callers race for it.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::{Lazy, OnceCell};
use parking_lot::RwLock;

use crate::error::{DiError, DiResult};
use crate::registration::AnyArc;

type Cell = Arc<OnceCell<AnyArc>>;

static GLOBAL: Lazy<SingletonRegistry> = Lazy::new(SingletonRegistry::new);

/// Per-type instance slots.
///
/// Concurrent first calls for a type block until the first caller has
/// published; the constructor runs once. A failing constructor publishes
/// nothing and the next call tries again.
#[derive(Default)]
pub struct SingletonRegistry {
    cells: RwLock<HashMap<TypeId, Cell, ahash::RandomState>>,
}

impl SingletonRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry used by [`Singleton::instance`].
    pub fn global() -> &'static SingletonRegistry {
        &GLOBAL
    }

    fn cell<T: Any>(&self) -> Cell {
        let type_id = TypeId::of::<T>();
        if let Some(cell) = self.cells.read().get(&type_id) {
            return Arc::clone(cell);
        }
        Arc::clone(self.cells.write().entry(type_id).or_default())
    }

    /// Returns the instance of `T`, constructing it with `ctor` on first use.
    pub fn get_or_init<T, F>(&self, ctor: F) -> Arc<T>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> T,
    {
        let cell = self.cell::<T>();
        let any = cell.get_or_init(|| {
            tracing::debug!(ty = std::any::type_name::<T>(), "constructing singleton");
            Arc::new(ctor()) as AnyArc
        });
        downcast::<T>(any)
    }

    /// Fallible [`get_or_init`](Self::get_or_init).
    pub fn get_or_try_init<T, E, F>(&self, ctor: F) -> DiResult<Arc<T>>
    where
        T: Any + Send + Sync,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
        F: FnOnce() -> Result<T, E>,
    {
        let cell = self.cell::<T>();
        let any = cell.get_or_try_init(|| {
            tracing::debug!(ty = std::any::type_name::<T>(), "constructing singleton");
            ctor()
                .map(|value| Arc::new(value) as AnyArc)
                .map_err(|err| DiError::producer(std::any::type_name::<T>(), err))
        })?;
        Ok(downcast::<T>(any))
    }

    /// The instance of `T`, if it has been constructed.
    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let cells = self.cells.read();
        let any = cells.get(&TypeId::of::<T>())?.get()?;
        Some(downcast::<T>(any))
    }

    pub fn contains<T: Any + Send + Sync>(&self) -> bool {
        self.get::<T>().is_some()
    }
}

impl std::fmt::Debug for SingletonRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingletonRegistry")
            .field("types", &self.cells.read().len())
            .finish()
    }
}

// Cells are keyed by TypeId::of::<T>, so the stored value is always a T.
fn downcast<T: Any + Send + Sync>(any: &AnyArc) -> Arc<T> {
    match Arc::clone(any).downcast::<T>() {
        Ok(instance) => instance,
        Err(_) => unreachable!("singleton cell holds a foreign type"),
    }
}

/// A type with exactly one process-wide instance.
///
/// ```
/// use ferrous_container::Singleton;
/// use std::sync::Arc;
///
/// struct Clock { started: std::time::Instant }
///
/// impl Singleton for Clock {
///     fn construct() -> Self {
///         Clock { started: std::time::Instant::now() }
///     }
/// }
///
/// let a = Clock::instance();
/// let b = Clock::instance();
/// assert!(Arc::ptr_eq(&a, &b));
/// ```
///
/// # Re-entrancy
///
/// `construct` may call `instance()` of *other* singleton types; each type has
/// its own slot. It must never reach `Self::instance()`, directly or through
/// another type's `construct`: the slot is still being initialized, and the
/// call blocks on it forever. The same holds for closures passed to
/// [`SingletonRegistry::get_or_init`].
pub trait Singleton: Any + Send + Sync + Sized {
    /// Builds the instance. Runs at most once per process.
    ///
    /// Must not call `Self::instance()`; see the trait docs.
    fn construct() -> Self;

    /// The process-wide instance, constructed on first call.
    fn instance() -> Arc<Self> {
        SingletonRegistry::global().get_or_init(Self::construct)
    }
}
