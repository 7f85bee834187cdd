use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Run counters shared by every expansion task.
///
/// Counters only move forward; each one is bumped by the component that
/// owns the corresponding event (transport attempts, cache lookups, record
/// creation).
#[derive(Debug, Default)]
pub struct CrawlStats {
    layouts_processed: AtomicU64,
    requests_made: AtomicU64,
    request_errors: AtomicU64,
    retries: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    // 0 = unset
    start_time: AtomicI64,
    end_time: AtomicI64,
}

/// Plain copy of [`CrawlStats`], as persisted in checkpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub layouts_processed: u64,
    pub requests_made: u64,
    pub request_errors: u64,
    pub retries: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    /// Unix milliseconds
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
}

impl CrawlStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: &StatsSnapshot) -> Self {
        let stats = Self::new();
        stats.restore(snapshot);
        stats
    }

    /// Overwrite every counter with the values from a checkpoint.
    pub fn restore(&self, snapshot: &StatsSnapshot) {
        self.layouts_processed.store(snapshot.layouts_processed, Ordering::Relaxed);
        self.requests_made.store(snapshot.requests_made, Ordering::Relaxed);
        self.request_errors.store(snapshot.request_errors, Ordering::Relaxed);
        self.retries.store(snapshot.retries, Ordering::Relaxed);
        self.cache_hits.store(snapshot.cache_hits, Ordering::Relaxed);
        self.cache_misses.store(snapshot.cache_misses, Ordering::Relaxed);
        self.start_time.store(snapshot.start_time.unwrap_or(0), Ordering::Relaxed);
        self.end_time.store(snapshot.end_time.unwrap_or(0), Ordering::Relaxed);
    }

    pub fn record_layout(&self) {
        self.layouts_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Fold the attempt counts of one transport call into the totals.
    pub fn record_attempts(&self, attempts: u32, failures: u32) {
        self.requests_made.fetch_add(attempts as u64, Ordering::Relaxed);
        self.request_errors.fetch_add(failures as u64, Ordering::Relaxed);
        self.retries
            .fetch_add(attempts.saturating_sub(1) as u64, Ordering::Relaxed);
    }

    pub fn record_cache_lookup(&self, hit: bool) {
        if hit {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.cache_misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn start_timer(&self) {
        self.start_time.store(Utc::now().timestamp_millis(), Ordering::Relaxed);
        self.end_time.store(0, Ordering::Relaxed);
    }

    pub fn stop_timer(&self) {
        self.end_time.store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub fn layouts_processed(&self) -> u64 {
        self.layouts_processed.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let time = |v: i64| if v == 0 { None } else { Some(v) };
        StatsSnapshot {
            layouts_processed: self.layouts_processed.load(Ordering::Relaxed),
            requests_made: self.requests_made.load(Ordering::Relaxed),
            request_errors: self.request_errors.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            start_time: time(self.start_time.load(Ordering::Relaxed)),
            end_time: time(self.end_time.load(Ordering::Relaxed)),
        }
    }
}

impl StatsSnapshot {
    /// Wall-clock duration of the run in seconds, 0 when the run has not finished.
    pub fn elapsed_secs(&self) -> f64 {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) if end >= start => (end - start) as f64 / 1000.0,
            _ => 0.0,
        }
    }

    /// Share of cache lookups served from the cache, in percent.
    pub fn cache_efficiency(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64 * 100.0
        }
    }
}
