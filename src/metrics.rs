//! Resolution metrics collection.
//!
//! [`MetricsCollector`] aggregates the events produced by
//! [`MetricsMiddleware`](crate::middleware::MetricsMiddleware): per-service
//! timing statistics, success and failure totals, and a Prometheus text
//! export.

use std::collections::{HashMap, VecDeque};
use std::fmt::Write as _;
use std::time::{Duration, SystemTime};

use parking_lot::{Mutex, RwLock};

use crate::key::ServiceId;
use crate::middleware::metrics::{ResolutionCollector, ResolutionEvent, ResolutionOutcome};

const RECENT_WINDOW: usize = 100;

/// Aggregated resolution metrics.
#[derive(Debug)]
pub struct MetricsCollector {
    resolution_times: RwLock<HashMap<ServiceId, TimingStats>>,
    system_metrics: Mutex<SystemMetrics>,
    counters: RwLock<HashMap<String, u64>>,
}

/// Timing for one service identifier.
#[derive(Debug, Clone)]
pub struct TimingStats {
    pub count: u64,
    pub failures: u64,
    pub min_duration: Duration,
    pub max_duration: Duration,
    pub total_duration: Duration,
    /// Most recent durations, oldest first
    pub recent_times: VecDeque<Duration>,
}

#[derive(Debug, Clone)]
pub struct SystemMetrics {
    pub start_time: SystemTime,
    pub total_resolutions: u64,
    pub failed_resolutions: u64,
}

impl TimingStats {
    fn new() -> Self {
        Self {
            count: 0,
            failures: 0,
            min_duration: Duration::MAX,
            max_duration: Duration::ZERO,
            total_duration: Duration::ZERO,
            recent_times: VecDeque::with_capacity(RECENT_WINDOW),
        }
    }

    /// Adds one measurement.
    pub fn record(&mut self, duration: Duration) {
        self.count += 1;
        self.min_duration = self.min_duration.min(duration);
        self.max_duration = self.max_duration.max(duration);
        self.total_duration += duration;

        if self.recent_times.len() >= RECENT_WINDOW {
            self.recent_times.pop_front();
        }
        self.recent_times.push_back(duration);
    }

    pub fn average_duration(&self) -> Duration {
        match u32::try_from(self.count) {
            Ok(0) => Duration::ZERO,
            Ok(count) => self.total_duration / count,
            Err(_) => self.total_duration.div_f64(self.count as f64),
        }
    }

    /// 95th percentile over the recent window.
    pub fn p95_duration(&self) -> Duration {
        if self.recent_times.is_empty() {
            return Duration::ZERO;
        }

        let mut sorted: Vec<Duration> = self.recent_times.iter().copied().collect();
        sorted.sort_unstable();
        let index = (sorted.len() as f64 * 0.95) as usize;
        sorted
            .get(index.min(sorted.len() - 1))
            .copied()
            .unwrap_or(Duration::ZERO)
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            resolution_times: RwLock::new(HashMap::new()),
            system_metrics: Mutex::new(SystemMetrics {
                start_time: SystemTime::now(),
                total_resolutions: 0,
                failed_resolutions: 0,
            }),
            counters: RwLock::new(HashMap::new()),
        }
    }

    /// Records one resolution of `id`.
    pub fn record_resolution(&self, id: &ServiceId, duration: Duration, outcome: ResolutionOutcome) {
        {
            let mut times = self.resolution_times.write();
            let stats = times.entry(id.clone()).or_insert_with(TimingStats::new);
            stats.record(duration);
            if outcome == ResolutionOutcome::Failure {
                stats.failures += 1;
            }
        }

        let mut system = self.system_metrics.lock();
        system.total_resolutions += 1;
        if outcome == ResolutionOutcome::Failure {
            system.failed_resolutions += 1;
        }
    }

    /// Increments a named counter.
    pub fn increment_counter(&self, name: &str) {
        *self.counters.write().entry(name.to_string()).or_insert(0) += 1;
    }

    pub fn get_timing_stats(&self, id: &ServiceId) -> Option<TimingStats> {
        self.resolution_times.read().get(id).cloned()
    }

    pub fn get_system_metrics(&self) -> SystemMetrics {
        self.system_metrics.lock().clone()
    }

    pub fn get_counters(&self) -> HashMap<String, u64> {
        self.counters.read().clone()
    }

    /// The `limit` services with the highest average resolution time.
    pub fn get_slowest_services(&self, limit: usize) -> Vec<(ServiceId, Duration)> {
        let mut services: Vec<_> = self
            .resolution_times
            .read()
            .iter()
            .map(|(id, stats)| (id.clone(), stats.average_duration()))
            .collect();

        services.sort_by(|a, b| b.1.cmp(&a.1));
        services.truncate(limit);
        services
    }

    /// Renders all metrics in the Prometheus text exposition format.
    pub fn export_prometheus(&self) -> String {
        let mut output = String::new();

        let system = self.get_system_metrics();
        let _ = write!(
            output,
            "# HELP ferrous_container_resolutions_total Total number of resolutions\n\
             # TYPE ferrous_container_resolutions_total counter\n\
             ferrous_container_resolutions_total {}\n\n\
             # HELP ferrous_container_resolution_failures_total Resolutions that returned an error\n\
             # TYPE ferrous_container_resolution_failures_total counter\n\
             ferrous_container_resolution_failures_total {}\n\n",
            system.total_resolutions, system.failed_resolutions
        );

        output.push_str(
            "# HELP ferrous_container_resolution_duration_seconds Time spent resolving services\n\
             # TYPE ferrous_container_resolution_duration_seconds summary\n",
        );
        for (id, stats) in self.resolution_times.read().iter() {
            let service = id.display_name().replace('"', "\\\"");
            let _ = writeln!(
                output,
                "ferrous_container_resolution_duration_seconds_sum{{service=\"{service}\"}} {}\n\
                 ferrous_container_resolution_duration_seconds_count{{service=\"{service}\"}} {}",
                stats.total_duration.as_secs_f64(),
                stats.count
            );
        }
        output.push('\n');

        for (name, value) in self.counters.read().iter() {
            let _ = write!(
                output,
                "# HELP ferrous_container_{name} Custom counter\n\
                 # TYPE ferrous_container_{name} counter\n\
                 ferrous_container_{name} {value}\n\n"
            );
        }

        output
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl ResolutionCollector for MetricsCollector {
    fn record(&self, event: &ResolutionEvent) {
        self.record_resolution(&event.id, event.duration, event.outcome);
    }
}
