//! Binding lifetime definitions.

/// Lifetimes controlling whether a binding's factory output is cached.
///
/// # Examples
///
/// ```rust
/// use ferrous_container::{Container, Lifetime};
/// use std::sync::Arc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> ferrous_container::DiResult<()> {
/// let container = Container::new();
///
/// // Singleton: factory runs once, the instance is shared
/// container.bind("db", Lifetime::Singleton, |_| async { Ok(String::from("postgres://localhost")) });
///
/// // Transient: factory runs on every resolve
/// container.bind("request", Lifetime::Transient, |_| async { Ok(Vec::<u8>::new()) });
///
/// let a = container.resolve::<String>("db").await?;
/// let b = container.resolve::<String>("db").await?;
/// assert!(Arc::ptr_eq(&a, &b));
///
/// let x = container.resolve::<Vec<u8>>("request").await?;
/// let y = container.resolve::<Vec<u8>>("request").await?;
/// assert!(!Arc::ptr_eq(&x, &y));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifetime {
    /// One instance per binding, materialized lazily on first resolve
    ///
    /// The cached instance lives as long as the binding: rebinding the
    /// identifier or calling `forget_instance` drops it.
    Singleton,
    /// New instance per resolution, never cached
    Transient,
}

impl Lifetime {
    /// Returns true for [`Lifetime::Singleton`].
    #[inline]
    pub fn is_singleton(self) -> bool {
        matches!(self, Lifetime::Singleton)
    }
}
