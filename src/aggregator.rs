// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Batch assembly of client-facing match records.
//!
//! ```text
//! ids: [b, a, b, zz]
//!        │   │       └─ missing → omitted (not an error)
//!        │   └─ lookup ─┐
//!        └─ lookup ─────┼─→ [MatchRecord(b), MatchRecord(a)]
//!   duplicate b dropped ┘
//! ```
//!
//! Lookups run concurrently in windows of `concurrency`; output order always
//! follows first occurrence in the request.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::{default_fetch_concurrency, default_max_ids_per_fetch};
use crate::error::QueryError;
use crate::match_record::MatchRecord;
use crate::metrics::{self, LatencyTimer};
use crate::storage::traits::{RecordStore, StorageError};

pub struct MessageAggregator {
    store: Arc<dyn RecordStore>,
    concurrency: usize,
    max_ids: usize,
}

impl MessageAggregator {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            concurrency: default_fetch_concurrency(),
            max_ids: default_max_ids_per_fetch(),
        }
    }

    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Reject requests carrying more than `max_ids` distinct ids.
    #[must_use]
    pub fn with_max_ids(mut self, max_ids: usize) -> Self {
        self.max_ids = max_ids;
        self
    }

    /// Assemble a [`MatchRecord`] for each distinct id that exists.
    ///
    /// # Errors
    /// - [`QueryError::InvalidArgument`] for blank ids or an oversized request
    /// - [`QueryError::Unavailable`] if any lookup hits a store failure
    /// - [`QueryError::Cancelled`] if `cancel` fires before all lookups finish
    pub async fn get_by_ids(
        &self,
        ids: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<MatchRecord>, QueryError> {
        let _timer = LatencyTimer::new("get_by_ids");
        let result = self.get_by_ids_inner(ids, cancel).await;
        match &result {
            Ok(records) => {
                metrics::record_operation("get_by_ids", "success");
                metrics::record_result_count("get_by_ids", records.len());
            }
            Err(err) => metrics::record_operation("get_by_ids", err.kind()),
        }
        result
    }

    async fn get_by_ids_inner(
        &self,
        ids: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<MatchRecord>, QueryError> {
        let unique = dedup_ids(ids)?;
        if unique.len() > self.max_ids {
            return Err(QueryError::invalid(format!(
                "{} ids requested, limit is {}",
                unique.len(),
                self.max_ids
            )));
        }
        if cancel.is_cancelled() {
            return Err(QueryError::Cancelled);
        }

        let mut slots: Vec<Option<MatchRecord>> = std::iter::repeat_with(|| None).take(unique.len()).collect();
        let mut missing = 0usize;

        for (window_index, window) in unique.chunks(self.concurrency).enumerate() {
            let base = window_index * self.concurrency;
            let mut join_set: JoinSet<(usize, Result<_, StorageError>)> = JoinSet::new();

            for (offset, id) in window.iter().enumerate() {
                let store = self.store.clone();
                let id = id.clone();
                join_set.spawn(async move { (base + offset, store.get(&id).await) });
            }

            loop {
                let joined = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        join_set.abort_all();
                        return Err(QueryError::Cancelled);
                    }
                    joined = join_set.join_next() => joined,
                };

                let Some(joined) = joined else { break };
                let (index, lookup) = joined
                    .map_err(|e| QueryError::Unavailable(format!("lookup task failed: {e}")))?;

                match lookup {
                    Ok(Some(record)) => slots[index] = Some(MatchRecord::from(record)),
                    Ok(None) | Err(StorageError::NotFound) => {
                        debug!(id = %unique[index], "Record not found, omitting from batch");
                        missing += 1;
                    }
                    Err(err) => {
                        warn!(id = %unique[index], error = %err, "Record lookup failed, aborting batch");
                        join_set.abort_all();
                        return Err(QueryError::from(err));
                    }
                }
            }
        }

        if missing > 0 {
            metrics::record_missing_ids(missing);
        }
        debug!(requested = ids.len(), unique = unique.len(), missing, "Batch fetch complete");

        Ok(slots.into_iter().flatten().collect())
    }
}

/// Distinct ids in first-occurrence order.
fn dedup_ids(ids: &[String]) -> Result<Vec<String>, QueryError> {
    let mut seen = HashSet::with_capacity(ids.len());
    let mut unique = Vec::with_capacity(ids.len());
    for id in ids {
        if id.trim().is_empty() {
            return Err(QueryError::invalid("record ids must not be empty"));
        }
        if seen.insert(id.as_str()) {
            unique.push(id.clone());
        }
    }
    Ok(unique)
}
