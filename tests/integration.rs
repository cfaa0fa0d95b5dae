// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Integration tests for the region sync engine.
//!
//! Every scenario runs twice: once against the in-memory store and once
//! against a throwaway SQLite file, so both backends are held to the same
//! query contract.
//!
//! # Running Tests
//! ```bash
//! cargo test --test integration
//! ```
//!
//! # Test Organization
//! - `cursor_*` - list/size polling semantics
//! - `fetch_*` - batch assembly of match records
//! - `region_*` - precision and boundary edges through the engine

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use region_sync::protocol::{v1, v3};
use region_sync::{
    Coordinate, InMemoryStore, MatchRecord, NarrowcastArea, ProximitySeed, QueryError, RecordStore,
    Region, RegionSyncConfig, RegionSyncEngine, SizeEstimator, SqlStore, StoredRecord, MAX_PRECISION,
    MIN_PRECISION,
};

// =============================================================================
// Helpers
// =============================================================================

struct SqliteFile(PathBuf);

impl SqliteFile {
    fn new(name: &str) -> Self {
        let path = std::env::temp_dir().join(format!("region_sync_it_{}_{}.db", name, uuid::Uuid::new_v4()));
        Self(path)
    }

    fn url(&self) -> String {
        format!("sqlite://{}?mode=rwc", self.0.display())
    }
}

impl Drop for SqliteFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
        let _ = std::fs::remove_file(format!("{}-wal", self.0.display()));
        let _ = std::fs::remove_file(format!("{}-shm", self.0.display()));
    }
}

/// One engine per backend. The `SqliteFile` guard must outlive the engine.
async fn engines(name: &str) -> (Vec<(&'static str, RegionSyncEngine)>, SqliteFile) {
    let file = SqliteFile::new(name);
    let memory = RegionSyncEngine::new(Arc::new(InMemoryStore::new()), RegionSyncConfig::default());
    let sql = RegionSyncEngine::connect(RegionSyncConfig {
        sql_url: Some(file.url()),
        ..Default::default()
    })
    .await
    .expect("sqlite store should open");
    (vec![("memory", memory), ("sqlite", sql)], file)
}

fn nyc(engine: &RegionSyncEngine) -> Region {
    engine.region_for(40.73, -73.93, 1).unwrap()
}

fn exposure(id: &str, timestamp: i64, region: Region) -> StoredRecord {
    StoredRecord::new(id, timestamp, region)
        .with_seed(ProximitySeed::new(id.as_bytes().to_vec(), timestamp, timestamp + 600_000))
        .with_area(NarrowcastArea::new(
            Coordinate::new(40.735, -73.935),
            75.0,
            timestamp,
            timestamp + 3_600_000,
            format!("Notice for {id}"),
        ))
}

fn ids(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

// =============================================================================
// Cursor polling
// =============================================================================

#[tokio::test]
async fn cursor_poll_is_idempotent() {
    let (engines, _file) = engines("idempotent").await;
    let cancel = CancellationToken::new();

    for (backend, engine) in &engines {
        let region = nyc(engine);
        for (id, ts) in [("a", 1_000), ("b", 2_000), ("c", 2_000)] {
            engine.publish(&exposure(id, ts, region)).await.unwrap();
        }

        let first = engine.list(&region, 0, &cancel).await.unwrap();
        assert_eq!(first.records.len(), 3, "{backend}");
        assert_eq!(first.max_timestamp, 2_000, "{backend}");

        let second = engine.list(&region, first.max_timestamp, &cancel).await.unwrap();
        assert!(second.records.is_empty(), "{backend}");
        assert_eq!(second.max_timestamp, first.max_timestamp, "{backend}");
    }
}

#[tokio::test]
async fn cursor_later_results_are_a_subset() {
    let (engines, _file) = engines("monotonic").await;
    let cancel = CancellationToken::new();

    for (backend, engine) in &engines {
        let region = nyc(engine);
        for i in 0..20 {
            engine.publish(&exposure(&format!("r{i:02}"), 100 * i, region)).await.unwrap();
        }

        let early = engine.list(&region, 450, &cancel).await.unwrap();
        let late = engine.list(&region, 1_250, &cancel).await.unwrap();

        assert!(late.records.len() < early.records.len(), "{backend}");
        for record in &late.records {
            assert!(early.records.contains(record), "{backend}: {} missing from earlier poll", record.id);
        }
    }
}

#[tokio::test]
async fn cursor_sees_new_writes_after_convergence() {
    let (engines, _file) = engines("new_writes").await;
    let cancel = CancellationToken::new();

    for (backend, engine) in &engines {
        let region = nyc(engine);
        engine.publish(&exposure("old", 100, region)).await.unwrap();
        let cursor = engine.list(&region, 0, &cancel).await.unwrap().max_timestamp;

        engine.publish(&exposure("new", 350, region)).await.unwrap();
        let info = engine.list(&region, cursor, &cancel).await.unwrap();

        assert_eq!(info.records.len(), 1, "{backend}");
        assert_eq!(info.records[0].id, "new", "{backend}");
        assert_eq!(info.max_timestamp, 350, "{backend}");
    }
}

#[tokio::test]
async fn cursor_regions_are_isolated() {
    let (engines, _file) = engines("isolated").await;
    let cancel = CancellationToken::new();

    for (backend, engine) in &engines {
        let here = nyc(engine);
        let neighbour = engine.region_for(40.83, -73.93, 1).unwrap();
        let coarse = engine.region_for(40.73, -73.93, 0).unwrap();

        engine.publish(&exposure("here", 10, here)).await.unwrap();
        engine.publish(&exposure("there", 20, neighbour)).await.unwrap();

        let info = engine.list(&here, 0, &cancel).await.unwrap();
        assert_eq!(info.records.len(), 1, "{backend}");
        assert_eq!(info.records[0].id, "here", "{backend}");

        // Precision is part of the region identity
        let coarse_info = engine.list(&coarse, 0, &cancel).await.unwrap();
        assert!(coarse_info.records.is_empty(), "{backend}");
    }
}

#[tokio::test]
async fn cursor_size_grows_with_records() {
    let (engines, _file) = engines("size").await;
    let cancel = CancellationToken::new();

    for (backend, engine) in &engines {
        let region = nyc(engine);
        let empty = engine.size(&region, 0, &cancel).await.unwrap();

        engine.publish(&exposure("a", 1, region)).await.unwrap();
        let one = engine.size(&region, 0, &cancel).await.unwrap();
        engine.publish(&exposure("b", 2, region)).await.unwrap();
        let two = engine.size(&region, 0, &cancel).await.unwrap();

        assert!(empty < one && one < two, "{backend}: {empty} {one} {two}");

        assert_eq!(empty, 0, "{backend}");
        assert_eq!(two, engine.size(&region, 0, &cancel).await.unwrap(), "{backend}");
    }
}

#[tokio::test]
async fn cursor_size_equals_fetched_bytes() {
    let (engines, _file) = engines("size_fetch").await;
    let cancel = CancellationToken::new();
    let estimator = SizeEstimator::default();

    for (backend, engine) in &engines {
        let region = nyc(engine);
        for (id, ts) in [("a", 10), ("b", 20), ("c", 30)] {
            engine.publish(&exposure(id, ts, region)).await.unwrap();
        }

        for cursor in [0, 10, 30] {
            let info = engine.list(&region, cursor, &cancel).await.unwrap();
            let listed: Vec<String> = info.records.iter().map(|r| r.id.clone()).collect();
            let fetched = engine.fetch(&listed, &cancel).await.unwrap();
            let expected: u64 = fetched.iter().map(|m| estimator.size(m).unwrap()).sum();

            let size = engine.size(&region, cursor, &cancel).await.unwrap();
            assert_eq!(size, expected, "{backend} cursor {cursor}");
        }
    }
}

#[tokio::test]
async fn cursor_size_grows_with_republished_body() {
    let (engines, _file) = engines("size_body").await;
    let cancel = CancellationToken::new();

    for (backend, engine) in &engines {
        let region = nyc(engine);
        engine.publish(&exposure("heavy", 5, region)).await.unwrap();
        let before = engine.size(&region, 0, &cancel).await.unwrap();
        let listed_before = engine.list(&region, 0, &cancel).await.unwrap();

        let mut grown = exposure("heavy", 5, region);
        for i in 0..100 {
            grown = grown.with_seed(ProximitySeed::new(vec![0xEE; 1024], i, i + 1));
        }
        engine.publish(&grown).await.unwrap();

        let after = engine.size(&region, 0, &cancel).await.unwrap();
        assert!(after >= before + 100 * 1024, "{backend}: {before} -> {after}");
        assert_eq!(engine.list(&region, 0, &cancel).await.unwrap(), listed_before, "{backend}");
    }
}

#[tokio::test]
async fn cursor_cancelled_poll_is_not_empty_result() {
    let (engines, _file) = engines("cancel").await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    for (backend, engine) in &engines {
        let region = nyc(engine);
        engine.publish(&exposure("a", 1, region)).await.unwrap();

        let err = engine.list(&region, 0, &cancel).await.unwrap_err();
        assert_eq!(err, QueryError::Cancelled, "{backend}");
    }
}

// =============================================================================
// Batch fetch
// =============================================================================

#[tokio::test]
async fn fetch_missing_id_returns_only_existing() {
    let (engines, _file) = engines("missing").await;
    let cancel = CancellationToken::new();

    for (backend, engine) in &engines {
        let region = nyc(engine);
        engine.publish(&exposure("id1", 5, region)).await.unwrap();

        let result = engine.fetch(&ids(&["id1", "id2"]), &cancel).await.unwrap();
        assert_eq!(result.len(), 1, "{backend}");
        assert_eq!(result[0].id, "id1", "{backend}");
    }
}

#[tokio::test]
async fn fetch_returns_stored_content_in_request_order() {
    let (engines, _file) = engines("content").await;
    let cancel = CancellationToken::new();

    for (backend, engine) in &engines {
        let region = nyc(engine);
        let records: Vec<StoredRecord> = (0..5).map(|i| exposure(&format!("m{i}"), i, region)).collect();
        engine.publish_batch(&records).await.unwrap();

        let result = engine.fetch(&ids(&["m3", "m0", "m3", "m4"]), &cancel).await.unwrap();
        let expected: Vec<MatchRecord> = [3, 0, 4].iter().map(|&i| MatchRecord::from(records[i].clone())).collect();
        assert_eq!(result, expected, "{backend}");
    }
}

#[tokio::test]
async fn fetch_then_project_to_protocols() {
    let (engines, _file) = engines("protocols").await;
    let cancel = CancellationToken::new();

    for (backend, engine) in &engines {
        let region = nyc(engine);
        engine
            .publish(&exposure("p", 9, region).with_boolean_expression("0 && 1"))
            .await
            .unwrap();

        let record = engine.fetch(&ids(&["p"]), &cancel).await.unwrap().remove(0);

        let message = v1::from_match(&record);
        assert_eq!(v1::into_match(&message).unwrap(), record, "{backend}");

        let narrowcast = v3::from_match(&record);
        assert_eq!(narrowcast.len(), 1, "{backend}");
        assert_eq!(narrowcast[0].user_message, "Notice for p", "{backend}");
    }
}

#[tokio::test]
async fn fetch_many_ids_across_windows() {
    let file = SqliteFile::new("windows");
    let engine = RegionSyncEngine::connect(RegionSyncConfig {
        sql_url: Some(file.url()),
        fetch_concurrency: 3,
        ..Default::default()
    })
    .await
    .unwrap();
    let region = nyc(&engine);

    let records: Vec<StoredRecord> = (0..25).map(|i| exposure(&format!("w{i:02}"), i, region)).collect();
    engine.publish_batch(&records).await.unwrap();

    let mut request: Vec<String> = records.iter().rev().map(|r| r.id.clone()).collect();
    request.push("absent".into());

    let result = engine.fetch(&request, &CancellationToken::new()).await.unwrap();
    let order: Vec<&str> = result.iter().map(|r| r.id.as_str()).collect();
    let expected: Vec<&str> = request[..25].iter().map(String::as_str).collect();
    assert_eq!(order, expected);
}

// =============================================================================
// Region edges
// =============================================================================

#[tokio::test]
async fn region_precision_out_of_range_rejected() {
    let (engines, _file) = engines("precision").await;
    let cancel = CancellationToken::new();

    for (backend, engine) in &engines {
        for precision in [MIN_PRECISION - 1, MAX_PRECISION + 1] {
            let err = engine.region_for(40.73, -73.93, precision).unwrap_err();
            assert!(matches!(err, QueryError::InvalidArgument(_)), "{backend}");

            let raw = Region { latitude_prefix: 40.0, longitude_prefix: -74.0, precision };
            let err = engine.list(&raw, 0, &cancel).await.unwrap_err();
            assert!(matches!(err, QueryError::InvalidArgument(_)), "{backend}");
        }
    }
}

#[tokio::test]
async fn region_extreme_precisions_roundtrip() {
    let (engines, _file) = engines("extremes").await;
    let cancel = CancellationToken::new();

    for (backend, engine) in &engines {
        for precision in [MIN_PRECISION, MAX_PRECISION] {
            let region = engine.region_for(-89.999_999_99, 179.999_999_99, precision).unwrap();
            let id = format!("edge-{precision}");
            engine.publish(&exposure(&id, 1, region)).await.unwrap();

            let info = engine.list(&region, 0, &cancel).await.unwrap();
            assert_eq!(info.records.len(), 1, "{backend} p{precision}");
            assert_eq!(info.records[0].id, id, "{backend} p{precision}");
        }
    }
}

#[tokio::test]
async fn region_unaligned_query_finds_canonical_records() {
    let (engines, _file) = engines("unaligned").await;
    let cancel = CancellationToken::new();

    for (backend, engine) in &engines {
        let region = nyc(engine);
        engine.publish(&exposure("a", 1, region)).await.unwrap();

        let raw = Region { latitude_prefix: 40.76, longitude_prefix: -73.91, precision: 1 };
        let info = engine.list(&raw, 0, &cancel).await.unwrap();
        assert_eq!(info.records.len(), 1, "{backend}");
    }
}

#[tokio::test]
async fn sql_store_survives_reopen() {
    let file = SqliteFile::new("reopen");
    let region = nyc(&RegionSyncEngine::new(Arc::new(InMemoryStore::new()), RegionSyncConfig::default()));
    {
        let store = SqlStore::new(&file.url()).await.unwrap();
        store.put(&exposure("durable", 77, region)).await.unwrap();
    }

    let engine = RegionSyncEngine::connect(RegionSyncConfig {
        sql_url: Some(file.url()),
        ..Default::default()
    })
    .await
    .unwrap();

    assert_eq!(engine.record_count().await.unwrap(), 1);
    let info = engine.list(&region, 0, &CancellationToken::new()).await.unwrap();
    assert_eq!(info.max_timestamp, 77);
}
