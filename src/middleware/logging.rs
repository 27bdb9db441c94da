//! Resolution logging middleware.

use std::time::Instant;

use async_trait::async_trait;
use tracing::Level;

use crate::error::DiResult;
use crate::key::ServiceId;
use crate::middleware::{Middleware, Next};
use crate::registration::AnyArc;

macro_rules! event_at {
    ($level:expr, $($arg:tt)+) => {
        match $level {
            Level::TRACE => tracing::trace!($($arg)+),
            Level::DEBUG => tracing::debug!($($arg)+),
            Level::INFO => tracing::info!($($arg)+),
            Level::WARN => tracing::warn!($($arg)+),
            _ => tracing::error!($($arg)+),
        }
    };
}

/// Logs the start and outcome of every resolution.
///
/// Successful resolutions are logged at the configured level (DEBUG by
/// default); failures always at WARN. Purely observational.
#[derive(Debug, Clone)]
pub struct LoggingMiddleware {
    level: Level,
}

impl LoggingMiddleware {
    pub fn new() -> Self {
        Self {
            level: Level::DEBUG,
        }
    }

    /// Logs successful resolutions at `level`.
    pub fn with_level(level: Level) -> Self {
        Self { level }
    }
}

impl Default for LoggingMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Middleware for LoggingMiddleware {
    async fn handle(&self, id: ServiceId, next: Next) -> DiResult<AnyArc> {
        let depth = next.resolver().depth();
        event_at!(self.level, id = %id, depth, "resolving");

        let start = Instant::now();
        let result = next.run(id.clone()).await;
        let elapsed_us = start.elapsed().as_micros() as u64;

        match &result {
            Ok(_) => event_at!(self.level, id = %id, depth, elapsed_us, "resolved"),
            Err(err) => tracing::warn!(id = %id, depth, elapsed_us, error = %err, "resolution failed"),
        }
        result
    }

    fn name(&self) -> &'static str {
        "logging"
    }
}
