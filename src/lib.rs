//! # ferrous-container
//!
//! Async service container with an ordered resolution middleware pipeline
//! and a memoizing get-or-compute cache.
//!
//! ## Features
//!
//! - **Bindings by identifier**: names, unique [`Symbol`]s or types
//! - **Singleton and transient lifetimes**: concurrent first resolves of a
//!   singleton share one factory call
//! - **Middleware**: caching, timing and logging wrapped around every
//!   resolution, including nested ones
//! - **Circular dependency detection**: fails with the full resolution path
//! - **Memo store**: `remember`-style caching with TTL and coalesced fills
//! - **Application context**: explicit bootstrap with a guarded accessor
//!
//! ## Quick Start
//!
//! ```rust
//! use ferrous_container::{Container, Resolver};
//! use ferrous_container::middleware::{CacheMiddleware, LoggingMiddleware};
//! use std::sync::Arc;
//!
//! struct Database {
//!     connection_string: String,
//! }
//!
//! struct UserService {
//!     db: Arc<Database>,
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> ferrous_container::DiResult<()> {
//! let container = Container::new();
//! container
//!     .use_middleware(LoggingMiddleware::new())
//!     .use_middleware(CacheMiddleware::new());
//!
//! container.bind_singleton("db", |_| async {
//!     Ok(Database { connection_string: "postgres://localhost".to_string() })
//! });
//! container.bind_transient("users", |resolver: Resolver| async move {
//!     Ok(UserService { db: resolver.resolve::<Database>("db").await? })
//! });
//!
//! let users = container.resolve::<UserService>("users").await?;
//! assert_eq!(users.db.connection_string, "postgres://localhost");
//! # Ok(())
//! # }
//! ```
//!
//! ## Lifetimes
//!
//! - **Singleton**: constructed on first resolve and shared until the
//!   identifier is rebound or the instance is forgotten
//! - **Transient**: the factory runs on every resolve that reaches it
//!
//! A transient resolved through [`CacheMiddleware`](middleware::CacheMiddleware)
//! is memoized by the middleware, not by its binding.

pub mod cache;
pub mod cancellation;
pub mod config;
pub mod container;
pub mod context;
pub mod error;
pub mod injectable;
pub mod key;
pub mod lifetime;
pub mod metrics;
pub mod middleware;
pub mod provider;
pub mod registration;
pub mod singleton;

mod internal;

pub use cache::MemoStore;
pub use cancellation::CancellationToken;
pub use config::{Config, ConfigLoader, ConfigMap, JsonFileLoader, StaticLoader};
pub use container::{Container, ContainerOptions};
pub use context::{AppContext, Application, ApplicationBuilder};
pub use error::{DiError, DiResult};
pub use injectable::Injectable;
pub use key::{id_of_type, ServiceId, Symbol};
pub use lifetime::Lifetime;
pub use metrics::MetricsCollector;
pub use middleware::{
    from_fn, CacheMiddleware, FallbackMiddleware, LoggingMiddleware, Middleware,
    MetricsMiddleware, Next, Pipeline, ResolveFn,
};
pub use provider::Resolver;
pub use registration::AnyArc;
pub use singleton::{Singleton, SingletonRegistry};

pub use async_trait::async_trait;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn symbols_with_same_description_are_distinct() {
        let first = Symbol::new("logger");
        let second = Symbol::new("logger");

        let container = Container::new();
        container
            .bind_instance(&first, String::from("first"))
            .bind_instance(&second, String::from("second"));

        assert_eq!(*container.resolve::<String>(&first).await.unwrap(), "first");
        assert_eq!(*container.resolve::<String>(&second).await.unwrap(), "second");
    }

    #[tokio::test]
    async fn cache_middleware_memoizes_transients() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let container = Container::new();
        container.use_middleware(CacheMiddleware::new());
        container.bind_transient("t", move |_| {
            let counter = Arc::clone(&counter);
            async move { Ok(counter.fetch_add(1, Ordering::SeqCst)) }
        });

        container.resolve::<usize>("t").await.unwrap();
        container.resolve::<usize>("t").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn type_ids_resolve() {
        let container = Container::new();
        container.bind_instance(id_of_type::<u32>(), 5u32);
        assert_eq!(*container.resolve::<u32>(ServiceId::of::<u32>()).await.unwrap(), 5);
    }
}
