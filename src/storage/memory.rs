// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Ordered in-memory record store.
//!
//! Records live in a `BTreeMap` keyed by `(RegionKey, timestamp, id)`, so a
//! cursor scan is one contiguous range walk:
//!
//! ```text
//!   (p2, 4761, -12233, 1000, "a")  ┐
//!   (p2, 4761, -12233, 1500, "b")  ├─ region (p2, 4761, -12233), since = 999
//!   (p2, 4761, -12233, 1500, "c")  ┘
//!   (p2, 4761, -12232, 1200, "d")  ← next region, scan stops here
//! ```
//!
//! A secondary `id → key` index serves point lookups and lets `put` move a
//! replaced record to its new position.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use super::traits::{measure, RecordStore, SizedMetadata, StorageError};
use crate::config::default_scan_check_interval;
use crate::record::{RecordMetadata, StoredRecord};
use crate::region::{Region, RegionKey};
use crate::size::RecordSizes;

type EntryKey = (RegionKey, i64, String);

struct StoredEntry {
    record: StoredRecord,
    sizes: RecordSizes,
}

#[derive(Default)]
struct Entries {
    ordered: BTreeMap<EntryKey, StoredEntry>,
    by_id: HashMap<String, EntryKey>,
}

pub struct InMemoryStore {
    entries: RwLock<Entries>,
    scan_check_interval: usize,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_scan_check_interval(default_scan_check_interval())
    }

    /// Check for cancellation every `interval` scanned entries.
    #[must_use]
    pub fn with_scan_check_interval(interval: usize) -> Self {
        Self {
            entries: RwLock::new(Entries::default()),
            scan_check_interval: interval.max(1),
        }
    }

    /// Get current record count
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().by_id.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().by_id.is_empty()
    }

    /// Walk one region's entries newer than `since`, mapping each hit.
    fn scan_with<T>(
        &self,
        region: &Region,
        since: i64,
        cancel: &CancellationToken,
        mut map: impl FnMut(RecordMetadata, &StoredEntry) -> T,
    ) -> Result<Vec<T>, StorageError> {
        if cancel.is_cancelled() {
            return Err(StorageError::Cancelled);
        }
        let Some(start) = since.checked_add(1) else {
            return Ok(Vec::new());
        };

        let key = region.key();
        let lower = (key, start, String::new());
        let entries = self.entries.read();
        let mut results = Vec::new();

        for (scanned, ((entry_region, timestamp, id), entry)) in entries
            .ordered
            .range((Bound::Included(lower), Bound::Unbounded))
            .enumerate()
        {
            if *entry_region != key {
                break;
            }
            if scanned % self.scan_check_interval == 0 && cancel.is_cancelled() {
                return Err(StorageError::Cancelled);
            }
            results.push(map(RecordMetadata::new(id.clone(), *timestamp), entry));
        }

        Ok(results)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn get(&self, id: &str) -> Result<Option<StoredRecord>, StorageError> {
        let entries = self.entries.read();
        Ok(entries
            .by_id
            .get(id)
            .and_then(|key| entries.ordered.get(key))
            .map(|entry| entry.record.clone()))
    }

    async fn scan_by_region(
        &self,
        region: &Region,
        since: i64,
        cancel: &CancellationToken,
    ) -> Result<Vec<RecordMetadata>, StorageError> {
        self.scan_with(region, since, cancel, |metadata, _| metadata)
    }

    async fn scan_sizes_by_region(
        &self,
        region: &Region,
        since: i64,
        cancel: &CancellationToken,
    ) -> Result<Vec<SizedMetadata>, StorageError> {
        self.scan_with(region, since, cancel, |metadata, entry| SizedMetadata {
            metadata,
            sizes: entry.sizes,
        })
    }

    async fn put(&self, record: &StoredRecord) -> Result<(), StorageError> {
        let key: EntryKey = (record.region.key(), record.timestamp, record.id.clone());
        let entry = StoredEntry { record: record.clone(), sizes: measure(record)? };
        let mut entries = self.entries.write();

        if let Some(previous) = entries.by_id.insert(record.id.clone(), key.clone()) {
            entries.ordered.remove(&previous);
        }
        entries.ordered.insert(key, entry);
        Ok(())
    }

    async fn count_all(&self) -> Result<u64, StorageError> {
        Ok(self.len() as u64)
    }
}
