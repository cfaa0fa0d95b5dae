// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! # Region Sync
//!
//! Region-partitioned distribution of exposure records with cursor-based
//! incremental sync.
//!
//! ## Architecture
//!
//! Clients never download the whole record set. They pick a coarse grid
//! cell (a *region*), poll it with the newest timestamp they have seen, and
//! fetch full bodies only for the ids they don't have yet:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Client poll                          │
//! │  • region_for(lat, lon, precision) → (lat_prefix, lon_prefix, p)
//! │  • list(region, cursor) / size(region, cursor)             │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     SyncCursorQuery                         │
//! │  • Normalizes the region triple                            │
//! │  • Returns (id, timestamp) metadata + next cursor          │
//! │  • Size sums per-record bytes stored at write time        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                     (client diffs ids)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    MessageAggregator                        │
//! │  • fetch(ids) → MatchRecords, deduplicated, order kept     │
//! │  • Missing ids omitted, store failures abort               │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       RecordStore                           │
//! │  • InMemoryStore: ordered BTreeMap by (region, ts, id)     │
//! │  • SqlStore: SQLite/MySQL, hash-verified payloads          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use region_sync::{RegionSyncConfig, RegionSyncEngine, StoredRecord, ProximitySeed};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = RegionSyncConfig {
//!         sql_url: Some("sqlite://records.db?mode=rwc".into()),
//!         ..Default::default()
//!     };
//!     let engine = RegionSyncEngine::connect(config).await.expect("Failed to connect");
//!
//!     let region = engine.region_for(51.50, -0.12, 1).unwrap();
//!     let record = StoredRecord::new("rec-1", 1_700_000_000_000, region)
//!         .with_seed(ProximitySeed::new(vec![0xAB; 16], 1_700_000_000_000, 1_700_000_900_000));
//!     engine.publish(&record).await.unwrap();
//!
//!     let cancel = CancellationToken::new();
//!     let info = engine.list(&region, 0, &cancel).await.unwrap();
//!     let ids: Vec<String> = info.records.iter().map(|r| r.id.clone()).collect();
//!     let matches = engine.fetch(&ids, &cancel).await.unwrap();
//!     println!("{} new matches, next cursor {}", matches.len(), info.max_timestamp);
//! }
//! ```
//!
//! ## Modules
//!
//! - [`engine`]: The [`RegionSyncEngine`] front door
//! - [`region`]: Grid cells, boundaries, and the [`RegionIndexer`]
//! - [`query`]: Cursor polling and response sizing
//! - [`aggregator`]: Batch assembly of [`MatchRecord`]s
//! - [`storage`]: Record store trait plus in-memory and SQL backends
//! - [`protocol`]: Versioned client DTOs (v1, v3)
//! - [`resilience`]: Retry with backoff for SQL access

pub mod config;
pub mod error;
pub mod region;
pub mod record;
pub mod match_record;
pub mod size;
pub mod storage;
pub mod resilience;
pub mod query;
pub mod aggregator;
pub mod protocol;
pub mod engine;
pub mod metrics;

pub use config::RegionSyncConfig;
pub use engine::RegionSyncEngine;
pub use error::QueryError;
pub use region::{Coordinate, Region, RegionBoundary, RegionIndexer, MAX_PRECISION, MIN_PRECISION};
pub use record::{NarrowcastArea, ProximitySeed, RecordMetadata, StoredRecord};
pub use match_record::{Match, MatchRecord, NarrowcastAreaMatch, ProximitySeedMatch};
pub use size::{RecordSizes, SizeEstimator, WireFormat};
pub use query::{LatestInfo, SyncCursorQuery};
pub use aggregator::MessageAggregator;
pub use storage::traits::{RecordStore, SizedMetadata, StorageError};
pub use storage::memory::InMemoryStore;
pub use storage::sql::SqlStore;
pub use resilience::retry::RetryConfig;
pub use metrics::LatencyTimer;
