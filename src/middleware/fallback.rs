//! Opt-in error substitution.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{DiError, DiResult};
use crate::key::ServiceId;
use crate::middleware::{Middleware, Next};
use crate::registration::AnyArc;

type FallbackFn = Arc<dyn Fn(&ServiceId, &DiError) -> Option<AnyArc> + Send + Sync>;

/// Replaces failed resolutions with a fallback instance.
///
/// The handler sees the identifier and the error and returns `Some` to
/// substitute or `None` to let the error through. This is the only built-in
/// middleware that swallows errors, and it only does so when added
/// explicitly.
///
/// ```
/// use ferrous_container::{Container, DiError};
/// use ferrous_container::middleware::FallbackMiddleware;
/// use std::sync::Arc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> ferrous_container::DiResult<()> {
/// let container = Container::new();
/// container.use_middleware(FallbackMiddleware::new(|_id, err| match err {
///     DiError::BindingNotFound(_) => Some(Arc::new(String::from("default")) as _),
///     _ => None,
/// }));
///
/// let value = container.resolve::<String>("unbound").await?;
/// assert_eq!(value.as_str(), "default");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct FallbackMiddleware {
    handler: FallbackFn,
}

impl FallbackMiddleware {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&ServiceId, &DiError) -> Option<AnyArc> + Send + Sync + 'static,
    {
        Self {
            handler: Arc::new(handler),
        }
    }

    /// Substitutes `value` for any failure resolving `id`.
    pub fn for_id<T>(id: impl Into<ServiceId>, value: T) -> Self
    where
        T: Send + Sync + 'static,
    {
        let target = id.into();
        let value: AnyArc = Arc::new(value);
        Self::new(move |id, _| (id == &target).then(|| Arc::clone(&value)))
    }
}

#[async_trait]
impl Middleware for FallbackMiddleware {
    async fn handle(&self, id: ServiceId, next: Next) -> DiResult<AnyArc> {
        match next.run(id.clone()).await {
            Ok(instance) => Ok(instance),
            Err(err) => match (self.handler)(&id, &err) {
                Some(substitute) => {
                    tracing::debug!(id = %id, error = %err, "resolution failure replaced by fallback");
                    Ok(substitute)
                }
                None => Err(err),
            },
        }
    }

    fn name(&self) -> &'static str {
        "fallback"
    }
}
