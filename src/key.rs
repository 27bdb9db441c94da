//! Service identifier types for the container.

use std::any::TypeId;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_SYMBOL: AtomicU64 = AtomicU64::new(1);

/// A unique, identity-compared tag.
///
/// Two symbols are equal only if one is a clone of the other, even when they
/// carry the same description. The description is for diagnostics only.
///
/// # Examples
///
/// ```rust
/// use ferrous_container::Symbol;
///
/// let a = Symbol::new("logger");
/// let b = Symbol::new("logger");
///
/// assert_ne!(a, b);
/// assert_eq!(a, a.clone());
/// assert_eq!(a.description(), "logger");
/// ```
#[derive(Clone)]
pub struct Symbol {
    id: u64,
    description: Arc<str>,
}

impl Symbol {
    /// Creates a fresh symbol, distinct from every other symbol in the process.
    pub fn new(description: impl AsRef<str>) -> Self {
        Self {
            id: NEXT_SYMBOL.fetch_add(1, Ordering::Relaxed),
            description: Arc::from(description.as_ref()),
        }
    }

    /// The human-readable description given at creation.
    pub fn description(&self) -> &str {
        &self.description
    }
}

impl PartialEq for Symbol {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Symbol {}

impl std::hash::Hash for Symbol {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({}#{})", self.description, self.id)
    }
}

/// Key for binding storage and lookup.
///
/// Identifiers are a tagged union with a single comparison strategy per
/// variant:
///
/// - **Name**: string tags, compared by value
/// - **Symbol**: unique tags, compared by identity
/// - **Type**: type tokens, compared by `TypeId` (the type name is carried for
///   diagnostics only)
///
/// Variants never compare equal to each other, so the string tag `"u32"` and
/// the type token for `u32` are distinct identifiers.
///
/// # Examples
///
/// ```rust
/// use ferrous_container::{ServiceId, Symbol};
///
/// let by_name: ServiceId = "database".into();
/// let by_type = ServiceId::of::<String>();
/// let by_symbol: ServiceId = Symbol::new("cache").into();
///
/// assert_eq!(by_name, ServiceId::name("database"));
/// assert_eq!(by_type, ServiceId::of::<String>());
/// assert_ne!(by_type, ServiceId::of::<u32>());
/// assert_eq!(by_type.display_name(), "alloc::string::String");
/// assert!(by_symbol.display_name().starts_with("cache"));
/// ```
#[derive(Debug, Clone)]
pub enum ServiceId {
    /// String tag
    Name(Arc<str>),
    /// Identity-compared symbol
    Symbol(Symbol),
    /// Type token with the type name for diagnostics
    Type(TypeId, &'static str),
}

impl ServiceId {
    /// Identifier for a string tag.
    pub fn name(name: impl AsRef<str>) -> Self {
        ServiceId::Name(Arc::from(name.as_ref()))
    }

    /// Identifier for the type token of `T`.
    #[inline(always)]
    pub fn of<T: ?Sized + 'static>() -> Self {
        ServiceId::Type(TypeId::of::<T>(), std::any::type_name::<T>())
    }

    /// Human-readable name for logs and error messages.
    pub fn display_name(&self) -> String {
        match self {
            ServiceId::Name(name) => name.to_string(),
            ServiceId::Symbol(symbol) => format!("{}#{}", symbol.description, symbol.id),
            ServiceId::Type(_, name) => (*name).to_string(),
        }
    }
}

impl PartialEq for ServiceId {
    #[inline(always)]
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            // TypeId only, the name is diagnostic
            (ServiceId::Type(a, _), ServiceId::Type(b, _)) => a == b,
            (ServiceId::Name(a), ServiceId::Name(b)) => a == b,
            (ServiceId::Symbol(a), ServiceId::Symbol(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for ServiceId {}

impl std::hash::Hash for ServiceId {
    #[inline(always)]
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        match self {
            ServiceId::Type(id, _) => {
                0u8.hash(state);
                id.hash(state);
            }
            ServiceId::Name(name) => {
                1u8.hash(state);
                name.hash(state);
            }
            ServiceId::Symbol(symbol) => {
                2u8.hash(state);
                symbol.hash(state);
            }
        }
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceId::Name(name) => write!(f, "'{}'", name),
            ServiceId::Symbol(symbol) => write!(f, "Symbol({})", symbol.description),
            ServiceId::Type(_, name) => write!(f, "{}", name),
        }
    }
}

impl From<&str> for ServiceId {
    fn from(name: &str) -> Self {
        ServiceId::name(name)
    }
}

impl From<String> for ServiceId {
    fn from(name: String) -> Self {
        ServiceId::Name(Arc::from(name))
    }
}

impl From<Symbol> for ServiceId {
    fn from(symbol: Symbol) -> Self {
        ServiceId::Symbol(symbol)
    }
}

impl From<&Symbol> for ServiceId {
    fn from(symbol: &Symbol) -> Self {
        ServiceId::Symbol(symbol.clone())
    }
}

impl From<&ServiceId> for ServiceId {
    fn from(id: &ServiceId) -> Self {
        id.clone()
    }
}

/// Shorthand for [`ServiceId::of`].
#[inline(always)]
pub fn id_of_type<T: ?Sized + 'static>() -> ServiceId {
    ServiceId::of::<T>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn variants_never_collide() {
        let mut set = HashSet::new();
        set.insert(ServiceId::name("u32"));
        set.insert(ServiceId::of::<u32>());
        set.insert(ServiceId::from(Symbol::new("u32")));
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn type_ids_ignore_the_diagnostic_name() {
        let a = ServiceId::Type(TypeId::of::<u8>(), "first");
        let b = ServiceId::Type(TypeId::of::<u8>(), "second");
        assert_eq!(a, b);
    }

    #[test]
    fn display_formats() {
        assert_eq!(ServiceId::name("db").to_string(), "'db'");
        assert_eq!(ServiceId::of::<u64>().to_string(), "u64");
        assert_eq!(ServiceId::from(Symbol::new("clock")).to_string(), "Symbol(clock)");
    }
}
