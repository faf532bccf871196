//! Per-operation performance metrics
//!
//! Every store operation that succeeds is recorded under
//! `"<store>.<operation>"`; failures are not recorded.

use chrono::{DateTime, Local};
use mylove_util::format_millis;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::trace;

/// Aggregated timings for one operation name
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    pub name: String,
    pub count: u64,
    pub total: Duration,
    pub min: Duration,
    pub max: Duration,
    pub last_recorded: DateTime<Local>,
}

impl Metric {
    fn new(name: &str, duration: Duration) -> Self {
        Self {
            name: name.to_string(),
            count: 1,
            total: duration,
            min: duration,
            max: duration,
            last_recorded: mylove_util::now(),
        }
    }

    fn observe(&mut self, duration: Duration) {
        self.count += 1;
        self.total += duration;
        self.min = self.min.min(duration);
        self.max = self.max.max(duration);
        self.last_recorded = mylove_util::now();
    }

    pub fn avg(&self) -> Duration {
        if self.count == 0 {
            return Duration::ZERO;
        }
        let nanos = self.total.as_nanos() / u128::from(self.count);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}

/// Shared collector of operation timings
#[derive(Debug, Clone, Default)]
pub struct PerformanceMonitor {
    metrics: Arc<Mutex<HashMap<String, Metric>>>,
}

impl PerformanceMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one observation
    pub fn record(&self, name: &str, duration: Duration) {
        let mut metrics = self.metrics.lock().unwrap_or_else(PoisonError::into_inner);
        match metrics.get_mut(name) {
            Some(metric) => metric.observe(duration),
            None => {
                metrics.insert(name.to_string(), Metric::new(name, duration));
            }
        }
        trace!(metric = name, duration = %format_millis(duration), "Metric recorded");
    }

    /// Time a fallible future, recording it only if it succeeds
    pub async fn measure<T, E, F>(&self, name: &str, op: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
    {
        let started = Instant::now();
        let result = op.await;
        if result.is_ok() {
            self.record(name, started.elapsed());
        }
        result
    }

    pub fn get(&self, name: &str) -> Option<Metric> {
        self.metrics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// All metrics, slowest total first
    pub fn all(&self) -> Vec<Metric> {
        let mut all: Vec<Metric> = self
            .metrics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        all.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.name.cmp(&b.name)));
        all
    }

    pub fn clear(&self) {
        self.metrics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Human-readable report
    pub fn report(&self) -> String {
        let mut lines = vec![
            "Performance Metrics Report".to_string(),
            "=".repeat(50),
            String::new(),
        ];

        for metric in self.all() {
            lines.push(format!("{}:", metric.name));
            lines.push(format!("  count: {}", metric.count));
            lines.push(format!("  avg: {}", format_millis(metric.avg())));
            lines.push(format!("  min: {}", format_millis(metric.min)));
            lines.push(format!("  max: {}", format_millis(metric.max)));
            lines.push(format!("  total: {}", format_millis(metric.total)));
            lines.push(String::new());
        }

        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_aggregates() {
        let monitor = PerformanceMonitor::new();
        monitor.record("moods.get", Duration::from_millis(10));
        monitor.record("moods.get", Duration::from_millis(30));
        monitor.record("moods.get", Duration::from_millis(20));

        let metric = monitor.get("moods.get").unwrap();
        assert_eq!(metric.count, 3);
        assert_eq!(metric.total, Duration::from_millis(60));
        assert_eq!(metric.min, Duration::from_millis(10));
        assert_eq!(metric.max, Duration::from_millis(30));
        assert_eq!(metric.avg(), Duration::from_millis(20));
    }

    #[tokio::test]
    async fn measure_skips_failures() {
        let monitor = PerformanceMonitor::new();

        let ok: Result<u8, String> = monitor.measure("op", async { Ok(1) }).await;
        assert_eq!(ok.unwrap(), 1);
        let err: Result<u8, String> = monitor.measure("op", async { Err("no".into()) }).await;
        assert!(err.is_err());

        assert_eq!(monitor.get("op").unwrap().count, 1);
    }

    #[test]
    fn report_orders_by_total() {
        let monitor = PerformanceMonitor::new();
        monitor.record("fast", Duration::from_millis(1));
        monitor.record("slow", Duration::from_millis(50));

        let report = monitor.report();
        let slow = report.find("slow:").unwrap();
        let fast = report.find("fast:").unwrap();
        assert!(slow < fast);
        assert!(report.contains("  total: 50.00ms"));
    }

    #[test]
    fn clones_share_state() {
        let monitor = PerformanceMonitor::new();
        let shared = monitor.clone();
        shared.record("x", Duration::from_millis(1));
        assert!(monitor.get("x").is_some());

        monitor.clear();
        assert!(shared.all().is_empty());
    }
}
