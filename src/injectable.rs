//! Self-describing services.

use async_trait::async_trait;

use crate::error::DiResult;
use crate::key::ServiceId;
use crate::provider::Resolver;

/// A service that knows its own identifier and how to build itself.
///
/// This is the explicit replacement for property injection: dependencies
/// are pulled from the [`Resolver`] inside [`inject`](Injectable::inject).
///
/// ```
/// use ferrous_container::{Container, DiResult, Injectable, Lifetime, Resolver};
/// use async_trait::async_trait;
/// use std::sync::Arc;
///
/// struct Greeting(String);
///
/// struct Greeter { greeting: Arc<Greeting> }
///
/// #[async_trait]
/// impl Injectable for Greeter {
///     async fn inject(resolver: Resolver) -> DiResult<Self> {
///         Ok(Greeter { greeting: resolver.resolve("greeting").await? })
///     }
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> DiResult<()> {
/// let container = Container::new();
/// container
///     .bind_instance("greeting", Greeting("hello".into()))
///     .register::<Greeter>(Lifetime::Singleton);
///
/// let greeter = container.get::<Greeter>().await?;
/// assert_eq!(greeter.greeting.0, "hello");
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait Injectable: Send + Sync + Sized + 'static {
    /// Identifier the service is bound under. Defaults to its type.
    fn service_id() -> ServiceId {
        ServiceId::of::<Self>()
    }

    /// Builds the service, resolving its dependencies through `resolver`.
    async fn inject(resolver: Resolver) -> DiResult<Self>;
}
