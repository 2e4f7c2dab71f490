//! Throughput sampling for import batches.

use std::time::Duration;

/// Running average of documents per second over sampled batches.
#[derive(Debug, Clone, Default)]
pub struct ThroughputTimer {
    samples: Vec<f64>,
}

impl ThroughputTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one batch. Returns the sample, or `None` when the batch holds no
    /// documents or took no time, in which case it is left out of the average.
    pub fn record(&mut self, docs: usize, elapsed: Duration) -> Option<f64> {
        let seconds = elapsed.as_secs_f64();
        if docs == 0 || seconds <= 0.0 {
            return None;
        }
        let rate = docs as f64 / seconds;
        self.samples.push(rate);
        Some(round2(rate))
    }

    /// Arithmetic mean of the samples, rounded to two decimals.
    pub fn average(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let sum: f64 = self.samples.iter().sum();
        Some(round2(sum / self.samples.len() as f64))
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
