//! Error types for the container, the memo store and the application context.

use std::sync::Arc;

use thiserror::Error;

use crate::key::ServiceId;

/// Shared, clonable error source.
pub type ErrorCause = Arc<dyn std::error::Error + Send + Sync>;

/// Container errors
///
/// Every failure surfaced by resolution, the middleware pipeline, the memo
/// store and the application context. `DiError` is `Clone` so a single
/// failure can be delivered to every caller coalesced onto the same fill.
///
/// # Examples
///
/// ```rust
/// use ferrous_container::{Container, DiError, ServiceId};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let container = Container::new();
/// match container.resolve::<String>("missing").await {
///     Err(DiError::BindingNotFound(id)) => assert_eq!(id, ServiceId::name("missing")),
///     _ => unreachable!(),
/// }
/// # }
/// ```
///
/// ```rust
/// use ferrous_container::{DiError, ServiceId};
///
/// let circular = DiError::CircularResolution(vec![
///     ServiceId::name("a"),
///     ServiceId::name("b"),
///     ServiceId::name("a"),
/// ]);
/// assert_eq!(circular.to_string(), "Circular resolution: 'a' -> 'b' -> 'a'");
/// ```
#[derive(Debug, Clone, Error)]
pub enum DiError {
    /// No binding registered for the identifier
    #[error("No binding registered for {0}")]
    BindingNotFound(ServiceId),
    /// Cyclic factory dependency (full path, repeated id last)
    #[error("Circular resolution: {}", format_path(.0))]
    CircularResolution(Vec<ServiceId>),
    /// Maximum resolution depth exceeded
    #[error("Max resolution depth {0} exceeded")]
    DepthExceeded(usize),
    /// Resolved instance is not of the requested type
    #[error("Type mismatch for {id}: expected {expected}")]
    TypeMismatch {
        id: ServiceId,
        expected: &'static str,
    },
    /// A memo store producer failed
    #[error("Producer for {key} failed: {cause}")]
    ProducerFailure { key: String, cause: ErrorCause },
    /// A factory reported its own failure
    #[error("{0}")]
    Failed(ErrorCause),
    /// Context accessed before bootstrap
    #[error("{0} accessed before it was initialized")]
    NotInitialized(&'static str),
    /// Bootstrap attempted twice
    #[error("{0} is already initialized")]
    AlreadyInitialized(&'static str),
    /// Operation cancelled through a cancellation token
    #[error("Operation was cancelled")]
    Cancelled,
    /// No registered loader accepts the configuration source
    #[error("No configuration loader accepts source '{0}'")]
    NoConfigLoader(String),
    /// Configuration source could not be read or parsed
    #[error("Configuration source '{source_name}' is invalid: {message}")]
    Config {
        source_name: String,
        message: String,
    },
}

impl DiError {
    /// Wraps any error as [`DiError::Failed`].
    ///
    /// ```rust
    /// use ferrous_container::DiError;
    ///
    /// let err = DiError::failed(std::io::Error::new(std::io::ErrorKind::Other, "disk on fire"));
    /// assert_eq!(err.to_string(), "disk on fire");
    /// ```
    pub fn failed<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        DiError::Failed(Arc::from(err.into()))
    }

    pub(crate) fn producer<E>(key: impl std::fmt::Debug, err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        DiError::ProducerFailure {
            key: format!("{:?}", key),
            cause: Arc::from(err.into()),
        }
    }

    /// Returns true when retrying cannot change the outcome.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            DiError::BindingNotFound(_)
                | DiError::CircularResolution(_)
                | DiError::DepthExceeded(_)
                | DiError::TypeMismatch { .. }
        )
    }
}

fn format_path(path: &[ServiceId]) -> String {
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Result type for container operations
///
/// A convenience alias for `Result<T, DiError>` used throughout the crate.
pub type DiResult<T> = Result<T, DiError>;
