//! In-process metric handles
//!
//! Every handle is cheap to clone and clones share one value, so a
//! negotiator and its background tasks can hold the same counters.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

/// Monotonic event count
#[derive(Debug, Clone, Default)]
pub struct Counter {
    name: Arc<str>,
    value: Arc<AtomicU64>,
}

impl Counter {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            value: Arc::default(),
        }
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Point-in-time level, e.g. live sessions
#[derive(Debug, Clone, Default)]
pub struct Gauge {
    name: Arc<str>,
    value: Arc<AtomicU64>,
}

impl Gauge {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            value: Arc::default(),
        }
    }

    pub fn set(&self, value: u64) {
        self.value.store(value, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Summary of the samples a [`Histogram`] currently holds
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HistogramSnapshot {
    pub count: usize,
    pub mean: f64,
    pub p50: f64,
    pub p95: f64,
    pub max: f64,
}

/// Keeps the most recent samples, oldest evicted first
#[derive(Debug, Clone)]
pub struct Histogram {
    name: Arc<str>,
    window: usize,
    samples: Arc<Mutex<VecDeque<f64>>>,
}

impl Histogram {
    const DEFAULT_WINDOW: usize = 1024;

    pub fn new(name: &str) -> Self {
        Self::with_window(name, Self::DEFAULT_WINDOW)
    }

    pub fn with_window(name: &str, window: usize) -> Self {
        let window = window.max(1);
        Self {
            name: name.into(),
            window,
            samples: Arc::new(Mutex::new(VecDeque::with_capacity(window.min(Self::DEFAULT_WINDOW)))),
        }
    }

    pub fn record(&self, value: f64) {
        let mut samples = self.samples.lock();
        if samples.len() == self.window {
            samples.pop_front();
        }
        samples.push_back(value);
    }

    /// Records `elapsed` in milliseconds
    pub fn record_duration(&self, elapsed: Duration) {
        self.record(elapsed.as_secs_f64() * 1000.0);
    }

    pub fn count(&self) -> usize {
        self.samples.lock().len()
    }

    pub fn snapshot(&self) -> HistogramSnapshot {
        let mut sorted: Vec<f64> = self.samples.lock().iter().copied().collect();
        if sorted.is_empty() {
            return HistogramSnapshot::default();
        }
        sorted.sort_by(f64::total_cmp);

        let rank = |p: f64| sorted[((sorted.len() - 1) as f64 * p).round() as usize];
        HistogramSnapshot {
            count: sorted.len(),
            mean: sorted.iter().sum::<f64>() / sorted.len() as f64,
            p50: rank(0.50),
            p95: rank(0.95),
            max: sorted[sorted.len() - 1],
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}
