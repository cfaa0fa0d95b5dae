// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Region sync engine.
//!
//! The [`RegionSyncEngine`] wires one [`RecordStore`] into the query
//! components and exposes the client-facing surface:
//!
//! ```text
//!                  ┌──────────────────────────────┐
//!   list(r, t) ──► │ SyncCursorQuery              │──┐
//!   size(r, t) ──► │   └─ SizeEstimator           │  │
//!   fetch(ids) ──► │ MessageAggregator            │──┼──► Arc<dyn RecordStore>
//!   publish(rec) ─►│ RegionIndexer (canonical?)   │──┘     InMemoryStore | SqlStore
//!                  └──────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use region_sync::{RegionSyncConfig, RegionSyncEngine, StoredRecord};
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let engine = RegionSyncEngine::connect(RegionSyncConfig::default()).await.unwrap();
//! let region = engine.region_for(40.73, -73.93, 1).unwrap();
//!
//! engine.publish(&StoredRecord::new("r1", 1_000, region)).await.unwrap();
//!
//! let cancel = CancellationToken::new();
//! let info = engine.list(&region, 0, &cancel).await.unwrap();
//! assert_eq!(info.max_timestamp, 1_000);
//! # }
//! ```

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::aggregator::MessageAggregator;
use crate::config::RegionSyncConfig;
use crate::error::QueryError;
use crate::match_record::MatchRecord;
use crate::metrics;
use crate::query::{LatestInfo, SyncCursorQuery};
use crate::record::StoredRecord;
use crate::region::{Region, RegionBoundary, RegionIndexer};
use crate::size::SizeEstimator;
use crate::storage::memory::InMemoryStore;
use crate::storage::sql::SqlStore;
use crate::storage::traits::{RecordStore, StorageError};

/// Query front door over a single record store.
///
/// `Send + Sync`; share it behind an `Arc` and call from any number of tasks.
pub struct RegionSyncEngine {
    config: RegionSyncConfig,
    store: Arc<dyn RecordStore>,
    indexer: RegionIndexer,
    cursor_query: SyncCursorQuery,
    aggregator: MessageAggregator,
}

impl RegionSyncEngine {
    /// Build an engine over an already-open store.
    pub fn new(store: Arc<dyn RecordStore>, config: RegionSyncConfig) -> Self {
        let indexer = RegionIndexer::new();
        let estimator = SizeEstimator::new(config.wire_format);
        let cursor_query = SyncCursorQuery::new(store.clone(), indexer, estimator);
        let aggregator = MessageAggregator::new(store.clone())
            .with_concurrency(config.fetch_concurrency)
            .with_max_ids(config.max_ids_per_fetch);

        Self {
            config,
            store,
            indexer,
            cursor_query,
            aggregator,
        }
    }

    /// Open the store named by `config` and build an engine over it.
    ///
    /// With `sql_url` set this connects to SQL (retrying startup failures);
    /// otherwise records live in memory for the life of the engine.
    pub async fn connect(config: RegionSyncConfig) -> Result<Self, StorageError> {
        let store: Arc<dyn RecordStore> = match &config.sql_url {
            Some(url) => {
                info!(url = %url, "Connecting to SQL record store...");
                let store = SqlStore::new(url).await?;
                info!("SQL record store connected");
                Arc::new(store)
            }
            None => {
                info!("No sql_url configured, using in-memory record store");
                Arc::new(InMemoryStore::with_scan_check_interval(config.scan_check_interval))
            }
        };

        info!(
            wire_format = config.wire_format.as_str(),
            fetch_concurrency = config.fetch_concurrency,
            max_ids_per_fetch = config.max_ids_per_fetch,
            "Region sync engine ready"
        );
        Ok(Self::new(store, config))
    }

    #[must_use]
    pub fn config(&self) -> &RegionSyncConfig {
        &self.config
    }

    /// Shared handle to the underlying store.
    #[must_use]
    pub fn store(&self) -> Arc<dyn RecordStore> {
        self.store.clone()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Region helpers
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn region_for(&self, latitude: f64, longitude: f64, precision: i32) -> Result<Region, QueryError> {
        self.indexer.compute_key(latitude, longitude, precision)
    }

    pub fn boundary(&self, region: &Region) -> Result<RegionBoundary, QueryError> {
        self.indexer.compute_boundary(region)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Query surface
    // ═══════════════════════════════════════════════════════════════════════════

    /// Metadata for every record in `region` newer than `last_timestamp`.
    pub async fn list(
        &self,
        region: &Region,
        last_timestamp: i64,
        cancel: &CancellationToken,
    ) -> Result<LatestInfo, QueryError> {
        self.cursor_query.get_latest_info(region, last_timestamp, cancel).await
    }

    /// Encoded size of the match records that [`fetch`](Self::fetch) would
    /// return for every id [`list`](Self::list) reports. Bodies are not read.
    pub async fn size(
        &self,
        region: &Region,
        last_timestamp: i64,
        cancel: &CancellationToken,
    ) -> Result<u64, QueryError> {
        self.cursor_query
            .get_latest_region_data_size(region, last_timestamp, cancel)
            .await
    }

    /// Full match records for the requested ids. Unknown ids are omitted.
    pub async fn fetch(&self, ids: &[String], cancel: &CancellationToken) -> Result<Vec<MatchRecord>, QueryError> {
        self.aggregator.get_by_ids(ids, cancel).await
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Write path
    // ═══════════════════════════════════════════════════════════════════════════

    /// Validate and store a record, replacing any record with the same id.
    ///
    /// The record's region must already be canonical: records filed under
    /// an unaligned triple would be invisible to every cursor query.
    pub async fn publish(&self, record: &StoredRecord) -> Result<(), QueryError> {
        let result = self.publish_inner(record).await;
        match &result {
            Ok(()) => metrics::record_operation("publish", "success"),
            Err(err) => metrics::record_operation("publish", err.kind()),
        }
        result
    }

    /// Publish several records. Stops at the first invalid record or
    /// store failure; records before it stay written.
    pub async fn publish_batch(&self, records: &[StoredRecord]) -> Result<usize, QueryError> {
        for record in records {
            self.check_publishable(record)?;
        }
        let written = self.store.put_batch(records).await.map_err(|e| {
            warn!(error = %e, count = records.len(), "Batch publish failed");
            QueryError::from(e)
        })?;
        metrics::record_operation("publish_batch", "success");
        debug!(written, "Batch published");
        Ok(written)
    }

    /// Total records across all regions.
    pub async fn record_count(&self) -> Result<u64, QueryError> {
        Ok(self.store.count_all().await?)
    }

    async fn publish_inner(&self, record: &StoredRecord) -> Result<(), QueryError> {
        self.check_publishable(record)?;
        self.store.put(record).await.map_err(|e| {
            warn!(id = %record.id, error = %e, "Publish failed");
            QueryError::from(e)
        })?;
        debug!(id = %record.id, region = %record.region, timestamp = record.timestamp, "Record published");
        Ok(())
    }

    fn check_publishable(&self, record: &StoredRecord) -> Result<(), QueryError> {
        record.validate()?;
        if !self.indexer.is_canonical(&record.region)? {
            return Err(QueryError::invalid(format!(
                "record {} has non-canonical region {}",
                record.id, record.region
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{NarrowcastArea, ProximitySeed, RecordMetadata};
    use crate::region::Coordinate;
    use crate::size::WireFormat;

    async fn engine() -> RegionSyncEngine {
        RegionSyncEngine::connect(RegionSyncConfig::default()).await.unwrap()
    }

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_publish_then_list_and_fetch() {
        let engine = engine().await;
        let region = engine.region_for(48.85, 2.35, 2).unwrap();
        let record = StoredRecord::new("paris", 5_000, region)
            .with_seed(ProximitySeed::new(vec![9, 9], 1, 2))
            .with_area(NarrowcastArea::new(Coordinate::new(48.851, 2.351), 25.0, 1, 2, "Hello"));
        engine.publish(&record).await.unwrap();

        let cancel = CancellationToken::new();
        let info = engine.list(&region, 0, &cancel).await.unwrap();
        assert_eq!(info.records.len(), 1);
        assert_eq!(info.max_timestamp, 5_000);

        let fetched = engine.fetch(&ids(&["paris", "nowhere"]), &cancel).await.unwrap();
        assert_eq!(fetched, vec![MatchRecord::from(record)]);
    }

    #[tokio::test]
    async fn test_publish_rejects_non_canonical_region() {
        let engine = engine().await;
        let raw = Region { latitude_prefix: 48.857, longitude_prefix: 2.352, precision: 2 };

        let err = engine.publish(&StoredRecord::new("x", 1, raw)).await.unwrap_err();
        assert!(matches!(err, QueryError::InvalidArgument(_)));
        assert_eq!(engine.record_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_publish_accepts_signed_zero_region() {
        let engine = engine().await;
        let raw = Region { latitude_prefix: -0.0, longitude_prefix: -0.0, precision: 1 };

        engine.publish(&StoredRecord::new("origin", 7, raw)).await.unwrap();

        let canonical = engine.region_for(0.0, 0.0, 1).unwrap();
        let info = engine.list(&canonical, 0, &CancellationToken::new()).await.unwrap();
        assert_eq!(info.records, vec![RecordMetadata::new("origin", 7)]);
    }

    #[tokio::test]
    async fn test_publish_rejects_invalid_record() {
        let engine = engine().await;
        let region = engine.region_for(0.0, 0.0, 0).unwrap();

        let err = engine.publish(&StoredRecord::new("", 1, region)).await.unwrap_err();
        assert!(matches!(err, QueryError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_publish_batch_validates_before_writing() {
        let engine = engine().await;
        let region = engine.region_for(10.0, 10.0, 1).unwrap();
        let batch = vec![
            StoredRecord::new("ok", 1, region),
            StoredRecord::new("bad", -1, region),
        ];

        assert!(engine.publish_batch(&batch).await.is_err());
        assert_eq!(engine.record_count().await.unwrap(), 0);

        let written = engine.publish_batch(&batch[..1]).await.unwrap();
        assert_eq!(written, 1);
    }

    #[tokio::test]
    async fn test_size_follows_configured_format() {
        let binary = engine().await;
        let json = RegionSyncEngine::connect(RegionSyncConfig {
            wire_format: WireFormat::Json,
            ..Default::default()
        })
        .await
        .unwrap();

        let region = binary.region_for(-33.86, 151.2, 1).unwrap();
        for engine in [&binary, &json] {
            engine.publish(&StoredRecord::new("syd", 42, region)).await.unwrap();
        }

        let cancel = CancellationToken::new();
        let binary_size = binary.size(&region, 0, &cancel).await.unwrap();
        let json_size = json.size(&region, 0, &cancel).await.unwrap();

        let fetched = json.fetch(&ids(&["syd"]), &cancel).await.unwrap();
        assert_eq!(json_size, serde_json::to_vec(&fetched[0]).unwrap().len() as u64);
        assert_eq!(binary_size, postcard::to_allocvec(&fetched[0]).unwrap().len() as u64);
        assert!(binary_size < json_size);
    }

    #[tokio::test]
    async fn test_boundary_of_region_for() {
        let engine = engine().await;
        let region = engine.region_for(40.73, -73.93, 0).unwrap();
        let boundary = engine.boundary(&region).unwrap();

        assert_eq!(boundary.min, Coordinate::new(40.0, -74.0));
        assert_eq!(boundary.max, Coordinate::new(41.0, -73.0));
    }
}
