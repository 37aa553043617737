//! Bounded history of CPU and memory utilization samples

use shared::{truncate_to_hundredths, MetricSample, METRICS_CAPACITY};
use std::collections::VecDeque;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Ring buffer feeding the utilization chart. Oldest samples are dropped first.
#[derive(Debug, Clone)]
pub struct MetricsBuffer {
    samples: VecDeque<MetricSample>,
    max_samples: usize,
}

impl MetricsBuffer {
    pub fn new() -> Self {
        Self::with_capacity(METRICS_CAPACITY)
    }

    pub fn with_capacity(max_samples: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(max_samples),
            max_samples,
        }
    }

    /// Records a sample stamped with the current time.
    pub fn record(&mut self, cpu: f64, memory: f64) {
        self.record_at(cpu, memory, get_timestamp());
    }

    /// Records a sample, truncating both readings to two decimal places.
    pub fn record_at(&mut self, cpu: f64, memory: f64, time: u64) {
        self.samples.push_back(MetricSample {
            cpu: truncate_to_hundredths(cpu),
            memory: truncate_to_hundredths(memory),
            time,
        });

        while self.samples.len() > self.max_samples {
            self.samples.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn latest(&self) -> Option<&MetricSample> {
        self.samples.back()
    }

    /// Samples in arrival order, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &MetricSample> {
        self.samples.iter()
    }

    pub fn to_vec(&self) -> Vec<MetricSample> {
        self.samples.iter().cloned().collect()
    }
}

impl Default for MetricsBuffer {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn get_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}
