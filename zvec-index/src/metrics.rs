// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Prometheus metrics for the vector store
//!
//! Counters, histograms and gauges exposed through the default registry.

use lazy_static::lazy_static;
use prometheus::{
    Counter, Gauge, Histogram, register_counter, register_gauge, register_histogram,
};

lazy_static! {
    // Counters - monotonically increasing values
    pub static ref ADD_COUNT: Counter = register_counter!(
        "zvec_add_total",
        "Total number of documents added"
    )
    .unwrap();

    pub static ref SEARCH_COUNT: Counter = register_counter!(
        "zvec_search_total",
        "Total number of searches performed"
    )
    .unwrap();

    pub static ref DELETE_COUNT: Counter = register_counter!(
        "zvec_delete_total",
        "Total number of soft deletes"
    )
    .unwrap();

    pub static ref ERROR_COUNT: Counter = register_counter!(
        "zvec_errors_total",
        "Total number of errors returned to callers"
    )
    .unwrap();

    // Histograms - latency distributions
    pub static ref SEARCH_LATENCY: Histogram = register_histogram!(
        "zvec_search_duration_seconds",
        "Search latency in seconds",
        vec![
            0.0001, // 0.1ms
            0.0005, // 0.5ms
            0.001,  // 1ms
            0.005,  // 5ms
            0.01,   // 10ms
            0.05,   // 50ms
            0.1,    // 100ms
            0.5,    // 500ms
        ]
    )
    .unwrap();

    pub static ref ADD_LATENCY: Histogram = register_histogram!(
        "zvec_add_duration_seconds",
        "Insert latency in seconds",
        vec![0.0001, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]
    )
    .unwrap();

    // Gauges - current values
    pub static ref LIVE_DOCS: Gauge = register_gauge!(
        "zvec_live_documents",
        "Current number of live (non-tombstoned) documents"
    )
    .unwrap();

    pub static ref DELETED_DOCS: Gauge = register_gauge!(
        "zvec_deleted_documents",
        "Current number of tombstoned documents awaiting vacuum"
    )
    .unwrap();
}

/// Times an operation and records it into a histogram on drop.
pub struct TimerGuard {
    histogram: Histogram,
    start: std::time::Instant,
}

impl TimerGuard {
    pub fn new(histogram: Histogram) -> Self {
        Self {
            histogram,
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for TimerGuard {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        self.histogram.observe(duration.as_secs_f64());
    }
}

/// Refresh the population gauges after a mutation.
pub fn update_population(count: i32, deleted_count: i32) {
    LIVE_DOCS.set((count - deleted_count) as f64);
    DELETED_DOCS.set(deleted_count as f64);
}
