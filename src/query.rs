// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Cursor-based incremental sync.
//!
//! A client presents `(region, last_timestamp)` and receives metadata for
//! every record in the region created after the cursor, plus the next cursor:
//!
//! ```text
//! poll(region, 0)     → [a@100, b@200]  max_timestamp = 200
//! poll(region, 200)   → []              max_timestamp = 200   (converged)
//! ...new write c@350...
//! poll(region, 200)   → [c@350]         max_timestamp = 350
//! ```
//!
//! The size query answers "how many bytes would fetching those records
//! cost" by summing per-record sizes the store computed at write time, so
//! no record body is read or rebuilt.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::QueryError;
use crate::metrics::{self, LatencyTimer};
use crate::record::RecordMetadata;
use crate::region::{Region, RegionIndexer};
use crate::size::SizeEstimator;
use crate::storage::traits::RecordStore;

/// Response of a cursor poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatestInfo {
    /// Sorted by `(timestamp, id)`
    pub records: Vec<RecordMetadata>,
    /// Cursor for the next poll
    pub max_timestamp: i64,
}

pub struct SyncCursorQuery {
    store: Arc<dyn RecordStore>,
    indexer: RegionIndexer,
    estimator: SizeEstimator,
}

impl SyncCursorQuery {
    pub fn new(store: Arc<dyn RecordStore>, indexer: RegionIndexer, estimator: SizeEstimator) -> Self {
        Self { store, indexer, estimator }
    }

    /// All records in `region` newer than `last_timestamp`, plus the next cursor.
    ///
    /// An unaligned region triple is floored to its containing cell first.
    /// With no new records the cursor comes back unchanged.
    pub async fn get_latest_info(
        &self,
        region: &Region,
        last_timestamp: i64,
        cancel: &CancellationToken,
    ) -> Result<LatestInfo, QueryError> {
        let _timer = LatencyTimer::new("latest_info");
        let result = self.latest_info_inner(region, last_timestamp, cancel).await;
        match &result {
            Ok(info) => {
                metrics::record_operation("latest_info", "success");
                metrics::record_result_count("latest_info", info.records.len());
            }
            Err(err) => metrics::record_operation("latest_info", err.kind()),
        }
        result
    }

    async fn latest_info_inner(
        &self,
        region: &Region,
        last_timestamp: i64,
        cancel: &CancellationToken,
    ) -> Result<LatestInfo, QueryError> {
        let region = self.prepare(region, last_timestamp, cancel)?;

        let mut records = self
            .store
            .scan_by_region(&region, last_timestamp, cancel)
            .await
            .map_err(|e| {
                warn!(region = %region, error = %e, "Region scan failed");
                QueryError::from(e)
            })?;

        records.sort_unstable_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        let max_timestamp = records.last().map_or(last_timestamp, |r| r.timestamp);

        debug!(
            region = %region,
            last_timestamp,
            max_timestamp,
            count = records.len(),
            "Region scan complete"
        );

        Ok(LatestInfo { records, max_timestamp })
    }

    /// Total encoded size, in the configured [`WireFormat`](crate::size::WireFormat),
    /// of the [`MatchRecord`](crate::match_record::MatchRecord)s for every id
    /// [`get_latest_info`](Self::get_latest_info) would return right now.
    pub async fn get_latest_region_data_size(
        &self,
        region: &Region,
        last_timestamp: i64,
        cancel: &CancellationToken,
    ) -> Result<u64, QueryError> {
        let _timer = LatencyTimer::new("data_size");
        let result = self.data_size_inner(region, last_timestamp, cancel).await;

        match &result {
            Ok(bytes) => {
                metrics::record_operation("data_size", "success");
                metrics::record_response_bytes(self.estimator.format().as_str(), *bytes);
            }
            Err(err) => metrics::record_operation("data_size", err.kind()),
        }
        result
    }

    async fn data_size_inner(
        &self,
        region: &Region,
        last_timestamp: i64,
        cancel: &CancellationToken,
    ) -> Result<u64, QueryError> {
        let region = self.prepare(region, last_timestamp, cancel)?;
        let format = self.estimator.format();

        let sized = self
            .store
            .scan_sizes_by_region(&region, last_timestamp, cancel)
            .await
            .map_err(|e| {
                warn!(region = %region, error = %e, "Region size scan failed");
                QueryError::from(e)
            })?;

        let total = sized
            .iter()
            .try_fold(0u64, |total, entry| total.checked_add(entry.sizes.get(format)))
            .ok_or_else(|| QueryError::invalid(format!("region {region} size overflows u64")))?;

        debug!(region = %region, last_timestamp, count = sized.len(), total, "Region size computed");
        Ok(total)
    }

    /// Shared argument checks: non-negative cursor, region floored to its cell.
    fn prepare(&self, region: &Region, last_timestamp: i64, cancel: &CancellationToken) -> Result<Region, QueryError> {
        if last_timestamp < 0 {
            return Err(QueryError::invalid(format!(
                "last timestamp {last_timestamp} must be non-negative"
            )));
        }
        let region = self.indexer.normalize(region)?;
        if cancel.is_cancelled() {
            return Err(QueryError::Cancelled);
        }
        Ok(region)
    }
}
