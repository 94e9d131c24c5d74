//! Performance metrics and statistics tracking for the estimation service.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};
use tracing::info;

/// Width of one predicted-minutes histogram bucket
const MINUTES_BUCKET_WIDTH: f64 = 10.0;
const MINUTES_BUCKETS: usize = 10;

/// Metrics collector for the estimation service
pub struct PipelineMetrics {
    /// Estimates returned
    pub requests_served: AtomicU64,
    /// Requests answered with a failure
    pub requests_failed: AtomicU64,
    /// Failures by kind (invalid_input, prediction, ...)
    failures_by_kind: RwLock<HashMap<String, u64>>,
    /// Processing times (in microseconds)
    processing_times: RwLock<Vec<u64>>,
    /// Predicted minutes in 10-minute buckets; the last bucket is open-ended
    minutes_buckets: RwLock<[u64; MINUTES_BUCKETS]>,
    /// Start time for rate calculation
    start_time: Instant,
}

impl PipelineMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            requests_served: AtomicU64::new(0),
            requests_failed: AtomicU64::new(0),
            failures_by_kind: RwLock::new(HashMap::new()),
            processing_times: RwLock::new(Vec::with_capacity(1000)),
            minutes_buckets: RwLock::new([0; MINUTES_BUCKETS]),
            start_time: Instant::now(),
        }
    }

    /// Record a served estimate
    pub fn record_estimate(&self, processing_time: Duration, predicted_minutes: f64) {
        self.requests_served.fetch_add(1, Ordering::Relaxed);
        self.record_processing_time(processing_time);

        let bucket = ((predicted_minutes / MINUTES_BUCKET_WIDTH).max(0.0) as usize)
            .min(MINUTES_BUCKETS - 1);
        if let Ok(mut buckets) = self.minutes_buckets.write() {
            buckets[bucket] += 1;
        }
    }

    /// Record a failed request
    pub fn record_failure(&self, processing_time: Duration, kind: &str) {
        self.requests_failed.fetch_add(1, Ordering::Relaxed);
        self.record_processing_time(processing_time);

        if let Ok(mut by_kind) = self.failures_by_kind.write() {
            *by_kind.entry(kind.to_string()).or_insert(0) += 1;
        }
    }

    fn record_processing_time(&self, processing_time: Duration) {
        if let Ok(mut times) = self.processing_times.write() {
            times.push(processing_time.as_micros() as u64);
            // Keep only last 10000 for memory efficiency
            if times.len() > 10000 {
                times.drain(0..5000);
            }
        }
    }

    /// Get processing time statistics
    pub fn get_processing_stats(&self) -> ProcessingStats {
        let mut sorted: Vec<u64> = match self.processing_times.read() {
            Ok(times) if !times.is_empty() => times.clone(),
            _ => return ProcessingStats::default(),
        };
        sorted.sort_unstable();

        let sum: u64 = sorted.iter().sum();
        let count = sorted.len();

        ProcessingStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: sorted[count / 2],
            p95_us: sorted[(count as f64 * 0.95) as usize],
            p99_us: sorted[(count as f64 * 0.99) as usize],
            max_us: *sorted.last().unwrap_or(&0),
        }
    }

    /// Get current throughput (requests per second)
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        let total = self.requests_served.load(Ordering::Relaxed)
            + self.requests_failed.load(Ordering::Relaxed);
        if elapsed > 0.0 {
            total as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Get predicted-minutes distribution
    pub fn get_minutes_distribution(&self) -> [u64; MINUTES_BUCKETS] {
        self.minutes_buckets
            .read()
            .map(|b| *b)
            .unwrap_or([0; MINUTES_BUCKETS])
    }

    /// Get failures by kind
    pub fn get_failures_by_kind(&self) -> HashMap<String, u64> {
        self.failures_by_kind
            .read()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    /// Print summary statistics
    pub fn print_summary(&self) {
        let served = self.requests_served.load(Ordering::Relaxed);
        let failed = self.requests_failed.load(Ordering::Relaxed);
        let total = served + failed;
        let failure_rate = if total > 0 {
            (failed as f64 / total as f64) * 100.0
        } else {
            0.0
        };

        let processing = self.get_processing_stats();
        let throughput = self.get_throughput();

        info!("╔══════════════════════════════════════════════════════════════╗");
        info!("║         DELIVERY TIME ESTIMATOR - METRICS SUMMARY            ║");
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Estimates Served: {:>8}  │  Throughput: {:>6.1} req/s      ║",
            served, throughput
        );
        info!(
            "║ Requests Failed:  {:>8}  │  Failure Rate: {:>6.1}%         ║",
            failed, failure_rate
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Processing Time (μs): mean={:>5} p50={:>5} p95={:>5} p99={:>5} ║",
            processing.mean_us, processing.p50_us, processing.p95_us, processing.p99_us
        );
        for (kind, count) in &self.get_failures_by_kind() {
            info!("║   {:14}: {:>6}                                     ║", kind, count);
        }
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Predicted Minutes Distribution:                              ║");
        let dist = self.get_minutes_distribution();
        let dist_total: u64 = dist.iter().sum();
        for (i, &count) in dist.iter().enumerate() {
            let pct = if dist_total > 0 {
                (count as f64 / dist_total as f64) * 100.0
            } else {
                0.0
            };
            let bar: String = "█".repeat(((pct / 2.0) as usize).min(20));
            let low = i as f64 * MINUTES_BUCKET_WIDTH;
            if i == MINUTES_BUCKETS - 1 {
                info!("║   {:>3.0}+   : {:>6} ({:>5.1}%) {}", low, count, pct, bar);
            } else {
                info!(
                    "║   {:>3.0}-{:<3.0}: {:>6} ({:>5.1}%) {}",
                    low,
                    low + MINUTES_BUCKET_WIDTH,
                    count,
                    pct,
                    bar
                );
            }
        }
        info!("╚══════════════════════════════════════════════════════════════╝");
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Processing time statistics
#[derive(Debug, Default)]
pub struct ProcessingStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Real-time metrics reporter that prints periodic summaries
pub struct MetricsReporter {
    metrics: std::sync::Arc<PipelineMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: std::sync::Arc<PipelineMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs.max(1)));
        // First tick fires immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}
