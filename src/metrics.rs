// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for region-sync.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The embedding service is responsible for choosing the exporter.
//!
//! # Metric Naming Convention
//! - `region_sync_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//! - `_bytes` suffix for size histograms
//!
//! # Labels
//! - `operation`: latest_info, data_size, get_by_ids, publish
//! - `status`: success, or a [`QueryError::kind`](crate::error::QueryError::kind) label

use metrics::{counter, histogram};
use std::time::{Duration, Instant};

/// Record a completed query operation
pub fn record_operation(operation: &str, status: &str) {
    counter!(
        "region_sync_operations_total",
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record operation latency
pub fn record_latency(operation: &str, duration: Duration) {
    histogram!(
        "region_sync_operation_seconds",
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record how many records a query returned
pub fn record_result_count(operation: &str, count: usize) {
    histogram!(
        "region_sync_result_records",
        "operation" => operation.to_string()
    )
    .record(count as f64);
}

/// Record the serialized size reported to a client
pub fn record_response_bytes(format: &str, bytes: u64) {
    histogram!(
        "region_sync_response_bytes",
        "format" => format.to_string()
    )
    .record(bytes as f64);
}

/// Record ids requested but absent from the store
pub fn record_missing_ids(count: usize) {
    counter!("region_sync_missing_ids_total").increment(count as u64);
}

/// Record a backend retry attempt
pub fn record_retry(operation: &str) {
    counter!(
        "region_sync_store_retries_total",
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// Record data corruption detection. The record id goes to the log, not a label.
pub fn record_corruption() {
    counter!("region_sync_corruption_detected_total").increment(1);
}

/// Records latency for `operation` when dropped.
pub struct LatencyTimer {
    operation: &'static str,
    start: Instant,
}

impl LatencyTimer {
    /// Start a new latency timer
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_latency(self.operation, self.start.elapsed());
    }
}
