//! Cancellation token support for resolutions and memo fills.
//!
//! A cancelled resolution or `remember` call returns [`DiError::Cancelled`]
//! and publishes nothing: no singleton instance and no memo entry.

use std::future::Future;
use std::time::{Duration, Instant};

use crate::error::{DiError, DiResult};

/// A token that can be used to signal cancellation across async operations.
///
/// Wraps [`tokio_util::sync::CancellationToken`]: tokens form a tree,
/// cancelling a token cancels every child created from it, and cancelling a
/// child leaves the parent untouched. This type adds the mapping onto
/// [`DiError::Cancelled`].
///
/// # Examples
///
/// ```
/// use ferrous_container::{Container, CancellationToken, DiError};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let container = Container::new();
/// container.bind_transient("slow", |_| async {
///     tokio::time::sleep(std::time::Duration::from_secs(60)).await;
///     Ok(0u8)
/// });
///
/// let token = CancellationToken::new();
/// token.cancel();
///
/// let result = container.resolve_with_cancel::<u8>("slow", &token).await;
/// assert!(matches!(result, Err(DiError::Cancelled)));
/// # }
/// ```
#[derive(Clone)]
pub struct CancellationToken {
    inner: tokio_util::sync::CancellationToken,
    created_at: Instant,
}

impl CancellationToken {
    /// Creates a new cancellation token.
    pub fn new() -> Self {
        tokio_util::sync::CancellationToken::new().into()
    }

    /// Creates a child token that will be cancelled when this token is.
    ///
    /// ```
    /// use ferrous_container::CancellationToken;
    ///
    /// let parent_token = CancellationToken::new();
    /// let child_token = parent_token.child_token();
    ///
    /// parent_token.cancel();
    /// assert!(child_token.is_cancelled());
    /// ```
    pub fn child_token(&self) -> Self {
        self.inner.child_token().into()
    }

    /// Cancels the token and every child token.
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    /// Returns true if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// Returns [`DiError::Cancelled`] if the token is cancelled.
    pub fn throw_if_cancelled(&self) -> DiResult<()> {
        if self.is_cancelled() {
            Err(DiError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Completes when cancellation is requested.
    pub async fn cancelled(&self) {
        self.inner.cancelled().await;
    }

    /// Drives `fut` to completion unless the token is cancelled first.
    ///
    /// On cancellation `fut` is dropped and [`DiError::Cancelled`] returned.
    pub async fn run_until_cancelled<F, T>(&self, fut: F) -> DiResult<T>
    where
        F: Future<Output = DiResult<T>>,
    {
        self.throw_if_cancelled()?;
        tokio::select! {
            biased;
            _ = self.inner.cancelled() => Err(DiError::Cancelled),
            result = fut => result,
        }
    }

    /// Returns the elapsed time since this token was created.
    pub fn elapsed(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Creates a token that cancels itself after `timeout`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn with_timeout(timeout: Duration) -> Self {
        let token = Self::new();
        let trigger = token.inner.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = trigger.cancelled() => {}
                _ = tokio::time::sleep(timeout) => trigger.cancel(),
            }
        });

        token
    }

    /// The underlying tokio-util token, for APIs that take one directly.
    pub fn as_tokio(&self) -> &tokio_util::sync::CancellationToken {
        &self.inner
    }
}

impl From<tokio_util::sync::CancellationToken> for CancellationToken {
    fn from(inner: tokio_util::sync::CancellationToken) -> Self {
        Self {
            inner,
            created_at: Instant::now(),
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_token_basic() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());

        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_child_token_cancellation() {
        let parent = CancellationToken::new();
        let child = parent.child_token();
        let grandchild = child.child_token();

        parent.cancel();
        assert!(child.is_cancelled());
        assert!(grandchild.is_cancelled());
    }

    #[test]
    fn test_child_token_independent_cancellation() {
        let parent = CancellationToken::new();
        let child = parent.child_token();

        child.cancel();
        assert!(!parent.is_cancelled());
        assert!(child.is_cancelled());
    }

    #[test]
    fn test_child_of_cancelled_parent_starts_cancelled() {
        let parent = CancellationToken::new();
        parent.cancel();
        assert!(parent.child_token().is_cancelled());
    }

    #[test]
    fn test_throw_if_cancelled() {
        let token = CancellationToken::new();
        assert!(token.throw_if_cancelled().is_ok());

        token.cancel();
        assert!(matches!(token.throw_if_cancelled(), Err(DiError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_cancellation() {
        let token = CancellationToken::with_timeout(Duration::from_millis(10));
        assert!(!token.is_cancelled());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_future() {
        let token = CancellationToken::new();
        let token_clone = token.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            token_clone.cancel();
        });

        token.cancelled().await;
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn wraps_a_tokio_util_token() {
        let shutdown = tokio_util::sync::CancellationToken::new();
        let token = CancellationToken::from(shutdown.child_token());

        shutdown.cancel();
        assert!(token.is_cancelled());
        assert!(token.as_tokio().is_cancelled());
        assert!(matches!(
            token.run_until_cancelled(async { Ok(1) }).await,
            Err(DiError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn test_run_until_cancelled() {
        let token = CancellationToken::new();
        assert_eq!(token.run_until_cancelled(async { Ok(7) }).await.unwrap(), 7);

        let trigger = token.clone();
        let pending = token.run_until_cancelled(async {
            std::future::pending::<()>().await;
            Ok(0)
        });
        trigger.cancel();
        assert!(matches!(pending.await, Err(DiError::Cancelled)));
    }
}
