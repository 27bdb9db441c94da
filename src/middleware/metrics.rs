//! Timing middleware and the collector seam it reports to.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;

use crate::error::DiResult;
use crate::key::ServiceId;
use crate::middleware::{Middleware, Next};
use crate::registration::AnyArc;

/// Whether a resolution produced an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionOutcome {
    Success,
    Failure,
}

/// One observed resolution.
#[derive(Debug, Clone)]
pub struct ResolutionEvent {
    pub id: ServiceId,
    pub duration: Duration,
    pub outcome: ResolutionOutcome,
}

impl ResolutionEvent {
    /// Elapsed time in whole milliseconds.
    pub fn duration_ms(&self) -> u128 {
        self.duration.as_millis()
    }
}

/// Sink for resolution events.
///
/// Collectors are called synchronously on the resolving task; keep them
/// cheap.
pub trait ResolutionCollector: Send + Sync {
    fn record(&self, event: &ResolutionEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCollector;

impl ResolutionCollector for NoopCollector {
    fn record(&self, _event: &ResolutionEvent) {}
}

/// Logs every event at DEBUG through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingCollector;

impl ResolutionCollector for TracingCollector {
    fn record(&self, event: &ResolutionEvent) {
        tracing::debug!(
            id = %event.id,
            duration_ms = event.duration_ms() as u64,
            outcome = ?event.outcome,
            "resolution timed"
        );
    }
}

/// Observational middleware timing each resolution.
///
/// Calls the rest of the chain exactly once and reports
/// `(id, duration, outcome)` to its collector; the resolved value and any
/// error pass through untouched.
///
/// ```
/// use ferrous_container::Container;
/// use ferrous_container::metrics::MetricsCollector;
/// use ferrous_container::middleware::MetricsMiddleware;
/// use std::sync::Arc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> ferrous_container::DiResult<()> {
/// let collector = Arc::new(MetricsCollector::new());
/// let container = Container::new();
/// container.use_middleware(MetricsMiddleware::new(collector.clone()));
/// container.bind_instance("port", 8080u16);
///
/// container.resolve::<u16>("port").await?;
/// assert_eq!(collector.get_system_metrics().total_resolutions, 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct MetricsMiddleware {
    collector: Arc<dyn ResolutionCollector>,
}

impl MetricsMiddleware {
    pub fn new(collector: Arc<dyn ResolutionCollector>) -> Self {
        Self { collector }
    }
}

impl Default for MetricsMiddleware {
    fn default() -> Self {
        Self::new(Arc::new(TracingCollector))
    }
}

#[async_trait]
impl Middleware for MetricsMiddleware {
    async fn handle(&self, id: ServiceId, next: Next) -> DiResult<AnyArc> {
        let start = Instant::now();
        let result = next.run(id.clone()).await;
        let outcome = match &result {
            Ok(_) => ResolutionOutcome::Success,
            Err(_) => ResolutionOutcome::Failure,
        };
        self.collector.record(&ResolutionEvent {
            id,
            duration: start.elapsed(),
            outcome,
        });
        result
    }

    fn name(&self) -> &'static str {
        "metrics"
    }
}
