// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::record::{RecordMetadata, StoredRecord};
use crate::region::Region;
use crate::size::RecordSizes;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Item not found")]
    NotFound,
    #[error("Storage backend error: {0}")]
    Backend(String),
    #[error("Data corruption detected for '{id}': expected hash {expected}, got {actual}")]
    Corruption {
        id: String,
        expected: String,
        actual: String,
    },
    #[error("Storage operation cancelled")]
    Cancelled,
}

impl StorageError {
    /// Whether retrying the same call could succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Backend(_))
    }
}

/// Scan entry carrying the encoded sizes recorded at write time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizedMetadata {
    pub metadata: RecordMetadata,
    pub sizes: RecordSizes,
}

/// Durable record storage, partitioned by region.
///
/// Implementations must be safe to call concurrently. Reads never block on
/// writes to other regions.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Point lookup by record id.
    async fn get(&self, id: &str) -> Result<Option<StoredRecord>, StorageError>;

    /// Metadata of every record in `region` with `timestamp > since`.
    ///
    /// Ordering is unspecified. A cancelled scan returns
    /// [`StorageError::Cancelled`], never a partial result.
    async fn scan_by_region(
        &self,
        region: &Region,
        since: i64,
        cancel: &CancellationToken,
    ) -> Result<Vec<RecordMetadata>, StorageError>;

    /// Like [`scan_by_region`](Self::scan_by_region), with each record's
    /// encoded sizes.
    ///
    /// Default implementation loads and measures every body; backends that
    /// persist sizes on `put` override it.
    async fn scan_sizes_by_region(
        &self,
        region: &Region,
        since: i64,
        cancel: &CancellationToken,
    ) -> Result<Vec<SizedMetadata>, StorageError> {
        let metadata = self.scan_by_region(region, since, cancel).await?;
        let mut sized = Vec::with_capacity(metadata.len());
        for meta in metadata {
            if cancel.is_cancelled() {
                return Err(StorageError::Cancelled);
            }
            let Some(record) = self.get(&meta.id).await? else { continue };
            sized.push(SizedMetadata { metadata: meta, sizes: measure(&record)? });
        }
        Ok(sized)
    }

    /// Insert or replace a record (keyed by id).
    async fn put(&self, record: &StoredRecord) -> Result<(), StorageError>;

    /// Write several records.
    /// Default implementation falls back to sequential puts.
    async fn put_batch(&self, records: &[StoredRecord]) -> Result<usize, StorageError> {
        for record in records {
            self.put(record).await?;
        }
        Ok(records.len())
    }

    /// Count total records in store.
    async fn count_all(&self) -> Result<u64, StorageError>;
}

/// Sizes for `record`, as a storage-layer error on failure.
pub(crate) fn measure(record: &StoredRecord) -> Result<RecordSizes, StorageError> {
    RecordSizes::measure(record)
        .map_err(|e| StorageError::Backend(format!("Failed to measure record '{}': {}", record.id, e)))
}
