// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! SQL record store (SQLite or MySQL).
//!
//! Region columns are stored twice: the float prefixes as given, and the
//! integer grid cells used for the cursor index. Record content is a
//! postcard-encoded body with a SHA-256 hash checked on every read. The
//! encoded size of each record's match view is computed at write time so
//! region sizing never reads payloads.
//!
//! ```sql
//! CREATE TABLE region_records (
//!   id VARCHAR(255) PRIMARY KEY,
//!   timestamp BIGINT NOT NULL,
//!   latitude_prefix DOUBLE NOT NULL,
//!   longitude_prefix DOUBLE NOT NULL,
//!   region_precision INT NOT NULL,
//!   lat_cell BIGINT NOT NULL,
//!   lon_cell BIGINT NOT NULL,
//!   payload_hash VARCHAR(64) NOT NULL,
//!   payload MEDIUMBLOB NOT NULL,
//!   binary_size BIGINT NOT NULL,
//!   json_size BIGINT NOT NULL,
//!   INDEX idx_region_cursor (region_precision, lat_cell, lon_cell, timestamp)
//! )
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::{AnyPool, Row};
use std::sync::Once;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::traits::{measure, RecordStore, SizedMetadata, StorageError};
use crate::record::{NarrowcastArea, ProximitySeed, RecordMetadata, StoredRecord};
use crate::region::Region;
use crate::resilience::retry::{retry, retry_cancellable, RetryConfig};
use crate::size::RecordSizes;

// SQLx `Any` driver requires runtime installation
static INSTALL_DRIVERS: Once = Once::new();

fn install_drivers() {
    INSTALL_DRIVERS.call_once(|| {
        sqlx::any::install_default_drivers();
    });
}

fn backend(err: sqlx::Error) -> StorageError {
    StorageError::Backend(err.to_string())
}

/// Stored content columns, borrowed for encoding.
#[derive(Serialize)]
struct RecordBodyRef<'a> {
    proximity_seeds: &'a [ProximitySeed],
    narrowcast_areas: &'a [NarrowcastArea],
    boolean_expression: Option<&'a str>,
}

#[derive(Deserialize)]
struct RecordBody {
    proximity_seeds: Vec<ProximitySeed>,
    narrowcast_areas: Vec<NarrowcastArea>,
    boolean_expression: Option<String>,
}

fn payload_hash(payload: &[u8]) -> String {
    hex::encode(Sha256::digest(payload))
}

const SELECT_RECORD_SQL: &str = "SELECT id, timestamp, latitude_prefix, longitude_prefix, region_precision, payload_hash, payload \
     FROM region_records WHERE id = ?";

const SCAN_REGION_SQL: &str = "SELECT id, timestamp FROM region_records \
     WHERE region_precision = ? AND lat_cell = ? AND lon_cell = ? AND timestamp > ? \
     ORDER BY timestamp, id";

const SCAN_REGION_SIZES_SQL: &str = "SELECT id, timestamp, binary_size, json_size FROM region_records \
     WHERE region_precision = ? AND lat_cell = ? AND lon_cell = ? AND timestamp > ? \
     ORDER BY timestamp, id";

fn size_column(row: &AnyRow, column: &str) -> Result<u64, StorageError> {
    let size: i64 = row.try_get(column).map_err(backend)?;
    u64::try_from(size).map_err(|_| StorageError::Backend(format!("Negative {column}: {size}")))
}

pub struct SqlStore {
    pool: AnyPool,
    is_sqlite: bool,
}

impl SqlStore {
    /// Create a new SQL store with startup-mode retry (fails fast if config is wrong).
    pub async fn new(connection_string: &str) -> Result<Self, StorageError> {
        install_drivers();

        let is_sqlite = connection_string.starts_with("sqlite:");

        let pool = retry("sql_connect", &RetryConfig::startup(), || async {
            AnyPoolOptions::new()
                .max_connections(20)
                .acquire_timeout(Duration::from_secs(10))
                .idle_timeout(Duration::from_secs(300))
                .connect(connection_string)
                .await
                .map_err(backend)
        })
        .await?;

        let store = Self { pool, is_sqlite };

        if is_sqlite {
            store.enable_wal_mode().await?;
        }

        store.init_schema().await?;
        Ok(store)
    }

    /// Enable WAL mode for SQLite so region scans don't block on ingestion writes.
    async fn enable_wal_mode(&self) -> Result<(), StorageError> {
        sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to enable WAL mode: {}", e)))?;

        sqlx::query("PRAGMA synchronous = NORMAL")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to set synchronous mode: {}", e)))?;

        Ok(())
    }

    async fn init_schema(&self) -> Result<(), StorageError> {
        let statements: &[&str] = if self.is_sqlite {
            &[
                r#"
                CREATE TABLE IF NOT EXISTS region_records (
                    id TEXT PRIMARY KEY,
                    timestamp INTEGER NOT NULL,
                    latitude_prefix REAL NOT NULL,
                    longitude_prefix REAL NOT NULL,
                    region_precision INTEGER NOT NULL,
                    lat_cell INTEGER NOT NULL,
                    lon_cell INTEGER NOT NULL,
                    payload_hash TEXT NOT NULL,
                    payload BLOB NOT NULL,
                    binary_size INTEGER NOT NULL,
                    json_size INTEGER NOT NULL
                )
                "#,
                "CREATE INDEX IF NOT EXISTS idx_region_cursor \
                 ON region_records (region_precision, lat_cell, lon_cell, timestamp)",
            ]
        } else {
            &[r#"
                CREATE TABLE IF NOT EXISTS region_records (
                    id VARCHAR(255) PRIMARY KEY,
                    timestamp BIGINT NOT NULL,
                    latitude_prefix DOUBLE NOT NULL,
                    longitude_prefix DOUBLE NOT NULL,
                    region_precision INT NOT NULL,
                    lat_cell BIGINT NOT NULL,
                    lon_cell BIGINT NOT NULL,
                    payload_hash VARCHAR(64) NOT NULL,
                    payload MEDIUMBLOB NOT NULL,
                    binary_size BIGINT NOT NULL,
                    json_size BIGINT NOT NULL,
                    INDEX idx_region_cursor (region_precision, lat_cell, lon_cell, timestamp)
                )
                "#]
        };

        for sql in statements {
            retry("sql_init_schema", &RetryConfig::startup(), || async {
                sqlx::query(sql).execute(&self.pool).await.map_err(backend)
            })
            .await?;
        }

        Ok(())
    }

    fn encode_body(record: &StoredRecord) -> Result<Vec<u8>, StorageError> {
        let body = RecordBodyRef {
            proximity_seeds: &record.proximity_seeds,
            narrowcast_areas: &record.narrowcast_areas,
            boolean_expression: record.boolean_expression.as_deref(),
        };
        postcard::to_allocvec(&body)
            .map_err(|e| StorageError::Backend(format!("Failed to encode record '{}': {}", record.id, e)))
    }

    fn decode_row(row: &AnyRow) -> Result<StoredRecord, StorageError> {
        let id: String = row.try_get("id").map_err(backend)?;
        let timestamp: i64 = row.try_get("timestamp").map_err(backend)?;
        let latitude_prefix: f64 = row.try_get("latitude_prefix").map_err(backend)?;
        let longitude_prefix: f64 = row.try_get("longitude_prefix").map_err(backend)?;
        let precision: i64 = row.try_get("region_precision").map_err(backend)?;

        // Try reading as String first (SQLite TEXT), then as bytes (MySQL VARCHAR via Any)
        let expected_hash: String = row
            .try_get::<String, _>("payload_hash")
            .or_else(|_| {
                row.try_get::<Vec<u8>, _>("payload_hash")
                    .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            })
            .map_err(backend)?;
        let payload: Vec<u8> = row.try_get("payload").map_err(backend)?;

        let actual_hash = payload_hash(&payload);
        if actual_hash != expected_hash {
            warn!(id = %id, "Payload hash mismatch");
            crate::metrics::record_corruption();
            return Err(StorageError::Corruption {
                id,
                expected: expected_hash,
                actual: actual_hash,
            });
        }

        let precision = i32::try_from(precision)
            .map_err(|_| StorageError::Backend(format!("Record '{}' has invalid precision {}", id, precision)))?;

        let body: RecordBody = postcard::from_bytes(&payload)
            .map_err(|e| StorageError::Backend(format!("Failed to decode record '{}': {}", id, e)))?;

        Ok(StoredRecord {
            id,
            timestamp,
            region: Region {
                latitude_prefix,
                longitude_prefix,
                precision,
            },
            proximity_seeds: body.proximity_seeds,
            narrowcast_areas: body.narrowcast_areas,
            boolean_expression: body.boolean_expression,
        })
    }

    /// Run a region scan query, retrying transient failures until cancelled.
    async fn scan_rows(
        &self,
        operation: &'static str,
        sql: &'static str,
        region: &Region,
        since: i64,
        cancel: &CancellationToken,
    ) -> Result<Vec<AnyRow>, StorageError> {
        let key = region.key();

        let rows = retry_cancellable(operation, &RetryConfig::query(), cancel, || async {
            sqlx::query(sql)
                .bind(i64::from(key.precision))
                .bind(key.lat_cell)
                .bind(key.lon_cell)
                .bind(since)
                .fetch_all(&self.pool)
                .await
                .map_err(backend)
        })
        .await?;

        if cancel.is_cancelled() {
            return Err(StorageError::Cancelled);
        }
        Ok(rows)
    }
}

#[async_trait]
impl RecordStore for SqlStore {
    async fn get(&self, id: &str) -> Result<Option<StoredRecord>, StorageError> {
        let row = retry("sql_get", &RetryConfig::query(), || async {
            sqlx::query(SELECT_RECORD_SQL)
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(backend)
        })
        .await?;

        row.as_ref().map(Self::decode_row).transpose()
    }

    async fn scan_by_region(
        &self,
        region: &Region,
        since: i64,
        cancel: &CancellationToken,
    ) -> Result<Vec<RecordMetadata>, StorageError> {
        let rows = self.scan_rows("sql_scan_region", SCAN_REGION_SQL, region, since, cancel).await?;

        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.try_get("id").map_err(backend)?;
            let timestamp: i64 = row.try_get("timestamp").map_err(backend)?;
            results.push(RecordMetadata { id, timestamp });
        }
        Ok(results)
    }

    async fn scan_sizes_by_region(
        &self,
        region: &Region,
        since: i64,
        cancel: &CancellationToken,
    ) -> Result<Vec<SizedMetadata>, StorageError> {
        let rows = self
            .scan_rows("sql_scan_region_sizes", SCAN_REGION_SIZES_SQL, region, since, cancel)
            .await?;

        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.try_get("id").map_err(backend)?;
            let timestamp: i64 = row.try_get("timestamp").map_err(backend)?;
            let sizes = RecordSizes {
                binary: size_column(&row, "binary_size")?,
                json: size_column(&row, "json_size")?,
            };
            results.push(SizedMetadata { metadata: RecordMetadata { id, timestamp }, sizes });
        }
        Ok(results)
    }

    async fn put(&self, record: &StoredRecord) -> Result<(), StorageError> {
        let payload = Self::encode_body(record)?;
        let hash = payload_hash(&payload);
        let key = record.region.key();
        let sizes = measure(record)?;
        let binary_size = i64::try_from(sizes.binary)
            .map_err(|_| StorageError::Backend(format!("Record '{}' too large", record.id)))?;
        let json_size = i64::try_from(sizes.json)
            .map_err(|_| StorageError::Backend(format!("Record '{}' too large", record.id)))?;

        let sql = if self.is_sqlite {
            "INSERT INTO region_records (id, timestamp, latitude_prefix, longitude_prefix, region_precision, lat_cell, lon_cell, payload_hash, payload, binary_size, json_size) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET \
                timestamp = excluded.timestamp, \
                latitude_prefix = excluded.latitude_prefix, \
                longitude_prefix = excluded.longitude_prefix, \
                region_precision = excluded.region_precision, \
                lat_cell = excluded.lat_cell, \
                lon_cell = excluded.lon_cell, \
                payload_hash = excluded.payload_hash, \
                payload = excluded.payload, \
                binary_size = excluded.binary_size, \
                json_size = excluded.json_size"
        } else {
            "INSERT INTO region_records (id, timestamp, latitude_prefix, longitude_prefix, region_precision, lat_cell, lon_cell, payload_hash, payload, binary_size, json_size) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON DUPLICATE KEY UPDATE \
                timestamp = VALUES(timestamp), \
                latitude_prefix = VALUES(latitude_prefix), \
                longitude_prefix = VALUES(longitude_prefix), \
                region_precision = VALUES(region_precision), \
                lat_cell = VALUES(lat_cell), \
                lon_cell = VALUES(lon_cell), \
                payload_hash = VALUES(payload_hash), \
                payload = VALUES(payload), \
                binary_size = VALUES(binary_size), \
                json_size = VALUES(json_size)"
        };

        retry("sql_put", &RetryConfig::query(), || async {
            sqlx::query(sql)
                .bind(&record.id)
                .bind(record.timestamp)
                .bind(record.region.latitude_prefix)
                .bind(record.region.longitude_prefix)
                .bind(i64::from(key.precision))
                .bind(key.lat_cell)
                .bind(key.lon_cell)
                .bind(&hash)
                .bind(&payload)
                .bind(binary_size)
                .bind(json_size)
                .execute(&self.pool)
                .await
                .map_err(backend)?;
            Ok(())
        })
        .await
    }

    async fn count_all(&self) -> Result<u64, StorageError> {
        let result = sqlx::query("SELECT COUNT(*) as cnt FROM region_records")
            .fetch_one(&self.pool)
            .await
            .map_err(backend)?;

        let count: i64 = result.try_get("cnt").map_err(backend)?;

        Ok(count as u64)
    }
}
