//! Ingest and apply metrics for the subscriber
//!
//! Written only by the ingestion pipeline and the reconstruction engine;
//! everything else reads. Counters are relaxed atomics, latency samples sit
//! behind a mutex that is held only for a push or a percentile read.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;

/// Core metrics for one subscriber session.
pub struct BookMetrics {
    // Ingestion
    pub updates_received: AtomicU64,
    pub frames_malformed: AtomicU64,

    // Reconstruction
    pub updates_dropped: AtomicU64,
    pub batches_applied: AtomicU64,
    pub last_batch_size: AtomicU64,
    pub last_apply_ns: AtomicU64,
    pub apply_latency_ns: Mutex<LatencyTracker>,

    ingest_started: Mutex<Option<Instant>>,
}

impl BookMetrics {
    pub fn new() -> Self {
        Self {
            updates_received: AtomicU64::new(0),
            frames_malformed: AtomicU64::new(0),
            updates_dropped: AtomicU64::new(0),
            batches_applied: AtomicU64::new(0),
            last_batch_size: AtomicU64::new(0),
            last_apply_ns: AtomicU64::new(0),
            apply_latency_ns: Mutex::new(LatencyTracker::new(1000)),
            ingest_started: Mutex::new(None),
        }
    }

    /// Start the ingest-rate clock. Later calls keep the first start time.
    pub fn mark_ingest_started(&self) {
        if let Ok(mut started) = self.ingest_started.lock() {
            started.get_or_insert_with(Instant::now);
        }
    }

    /// Record successfully decoded updates.
    pub fn record_received(&self, count: u64) {
        self.updates_received.fetch_add(count, Ordering::Relaxed);
    }

    /// Record a frame discarded because it failed to decode.
    pub fn record_malformed(&self) {
        self.frames_malformed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record overload signals raised while draining the queue.
    pub fn record_dropped(&self, count: u64) {
        self.updates_dropped.fetch_add(count, Ordering::Relaxed);
    }

    /// Record one applied batch.
    pub fn record_batch(&self, size: usize, duration: Duration) {
        let ns = duration.as_nanos().min(u128::from(u64::MAX)) as u64;
        self.batches_applied.fetch_add(1, Ordering::Relaxed);
        self.last_batch_size.store(size as u64, Ordering::Relaxed);
        self.last_apply_ns.store(ns, Ordering::Relaxed);
        if let Ok(mut tracker) = self.apply_latency_ns.lock() {
            tracker.record(ns);
        }
    }

    /// Updates received per second since ingestion started.
    pub fn ingest_rate(&self) -> f64 {
        let elapsed = match self.ingest_started.lock() {
            Ok(started) => started.map(|s| s.elapsed()),
            Err(_) => None,
        };
        match elapsed {
            Some(elapsed) if elapsed.as_secs_f64() > 0.0 => {
                self.updates_received.load(Ordering::Relaxed) as f64 / elapsed.as_secs_f64()
            }
            _ => 0.0,
        }
    }

    /// Point-in-time copy for rendering.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let (apply_p50_ns, apply_p99_ns) = match self.apply_latency_ns.lock() {
            Ok(tracker) => (tracker.percentile(50), tracker.percentile(99)),
            Err(_) => (None, None),
        };
        MetricsSnapshot {
            updates_received: self.updates_received.load(Ordering::Relaxed),
            updates_dropped: self.updates_dropped.load(Ordering::Relaxed),
            frames_malformed: self.frames_malformed.load(Ordering::Relaxed),
            batches_applied: self.batches_applied.load(Ordering::Relaxed),
            last_batch_size: self.last_batch_size.load(Ordering::Relaxed),
            last_apply_ns: self.last_apply_ns.load(Ordering::Relaxed),
            apply_p50_ns,
            apply_p99_ns,
            ingest_rate: self.ingest_rate(),
        }
    }

    /// Export counters as a BTreeMap for key/value rendering.
    pub fn export(&self) -> BTreeMap<String, u64> {
        let mut m = BTreeMap::new();
        m.insert("updates_received".to_string(), self.updates_received.load(Ordering::Relaxed));
        m.insert("updates_dropped".to_string(), self.updates_dropped.load(Ordering::Relaxed));
        m.insert("frames_malformed".to_string(), self.frames_malformed.load(Ordering::Relaxed));
        m.insert("batches_applied".to_string(), self.batches_applied.load(Ordering::Relaxed));
        m.insert("last_batch_size".to_string(), self.last_batch_size.load(Ordering::Relaxed));
        m.insert("last_apply_ns".to_string(), self.last_apply_ns.load(Ordering::Relaxed));
        m
    }
}

impl Default for BookMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Copy of the metrics at one instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub updates_received: u64,
    pub updates_dropped: u64,
    pub frames_malformed: u64,
    pub batches_applied: u64,
    pub last_batch_size: u64,
    pub last_apply_ns: u64,
    pub apply_p50_ns: Option<u64>,
    pub apply_p99_ns: Option<u64>,
    pub ingest_rate: f64,
}

/// Rolling window of latency samples for percentile calculation.
pub struct LatencyTracker {
    samples: VecDeque<u64>,
    max_samples: usize,
}

impl LatencyTracker {
    pub fn new(max_samples: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(max_samples),
            max_samples,
        }
    }

    /// Record a latency sample, evicting the oldest when full.
    pub fn record(&mut self, value: u64) {
        if self.samples.len() >= self.max_samples {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    /// Get a percentile value (0-100).
    pub fn percentile(&self, p: usize) -> Option<u64> {
        if self.samples.is_empty() {
            return None;
        }

        let mut sorted: Vec<u64> = self.samples.iter().copied().collect();
        sorted.sort_unstable();

        let idx = (p as f64 / 100.0 * (sorted.len() - 1) as f64) as usize;
        Some(sorted[idx.min(sorted.len() - 1)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_recording() {
        let metrics = BookMetrics::new();

        metrics.record_received(3);
        metrics.record_received(1);
        metrics.record_dropped(2);
        metrics.record_malformed();

        let exported = metrics.export();
        assert_eq!(exported["updates_received"], 4);
        assert_eq!(exported["updates_dropped"], 2);
        assert_eq!(exported["frames_malformed"], 1);
    }

    #[test]
    fn test_batch_recording() {
        let metrics = BookMetrics::new();
        metrics.record_batch(12, Duration::from_micros(40));
        metrics.record_batch(3, Duration::from_micros(10));

        let snap = metrics.snapshot();
        assert_eq!(snap.batches_applied, 2);
        assert_eq!(snap.last_batch_size, 3);
        assert_eq!(snap.last_apply_ns, 10_000);
        assert!(snap.apply_p99_ns.unwrap() >= snap.apply_p50_ns.unwrap());
    }

    #[test]
    fn test_ingest_rate_zero_before_start() {
        let metrics = BookMetrics::new();
        metrics.record_received(100);
        assert_eq!(metrics.ingest_rate(), 0.0);
    }

    #[test]
    fn test_ingest_rate_after_start() {
        let metrics = BookMetrics::new();
        metrics.mark_ingest_started();
        metrics.record_received(100);
        std::thread::sleep(Duration::from_millis(5));
        assert!(metrics.ingest_rate() > 0.0);
    }

    #[test]
    fn test_latency_tracker_percentile() {
        let mut tracker = LatencyTracker::new(100);

        for i in 1..=100 {
            tracker.record(i);
        }

        let p50 = tracker.percentile(50).unwrap();
        assert!((49..=51).contains(&p50));

        let p99 = tracker.percentile(99).unwrap();
        assert!((98..=100).contains(&p99));
    }

    #[test]
    fn test_latency_tracker_window_eviction() {
        let mut tracker = LatencyTracker::new(3);

        tracker.record(10);
        tracker.record(20);
        tracker.record(30);
        tracker.record(40);

        // 10 evicted; the lowest remaining sample is 20
        assert_eq!(tracker.percentile(0), Some(20));
        assert_eq!(tracker.percentile(100), Some(40));
    }
}
