// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Exact response sizing.
//!
//! Lets metered clients decide whether a fetch is worth the bandwidth without
//! receiving the body. The size is measured by running the real serializer,
//! so it is bit-exact with what a subsequent fetch transfers in the same
//! [`WireFormat`].
//!
//! # Example
//!
//! ```
//! use region_sync::size::{SizeEstimator, WireFormat};
//! use region_sync::record::RecordMetadata;
//!
//! let estimator = SizeEstimator::new(WireFormat::Binary);
//! let meta = RecordMetadata::new("abc", 1);
//!
//! let size = estimator.size(&meta).unwrap();
//! assert_eq!(size, WireFormat::Binary.encode(&meta).unwrap().len() as u64);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::QueryError;
use crate::match_record::MatchRecord;
use crate::record::StoredRecord;

/// Canonical response encodings. Both carry the same logical fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    /// Compact binary (postcard)
    #[default]
    Binary,
    /// JSON (serde_json, compact form)
    Json,
}

impl WireFormat {
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, QueryError> {
        match self {
            Self::Binary => postcard::to_allocvec(value)
                .map_err(|e| QueryError::invalid(format!("binary encoding failed: {e}"))),
            Self::Json => serde_json::to_vec(value)
                .map_err(|e| QueryError::invalid(format!("JSON encoding failed: {e}"))),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Binary => "binary",
            Self::Json => "json",
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SizeEstimator {
    format: WireFormat,
}

impl SizeEstimator {
    #[must_use]
    pub const fn new(format: WireFormat) -> Self {
        Self { format }
    }

    #[must_use]
    pub fn format(&self) -> WireFormat {
        self.format
    }

    /// Serialized length of `record` in this estimator's format.
    pub fn size<T: Serialize + ?Sized>(&self, record: &T) -> Result<u64, QueryError> {
        Ok(self.format.encode(record)?.len() as u64)
    }

    /// Like [`size`](Self::size), but an absent record is an invalid argument.
    pub fn checked_size<T: Serialize>(&self, record: Option<&T>) -> Result<u64, QueryError> {
        match record {
            Some(record) => self.size(record),
            None => Err(QueryError::invalid("cannot size an absent record")),
        }
    }
}

/// Encoded size of a record's client-facing [`MatchRecord`] in every
/// [`WireFormat`], measured once at write time so size queries never load
/// a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RecordSizes {
    pub binary: u64,
    pub json: u64,
}

impl RecordSizes {
    pub fn measure(record: &StoredRecord) -> Result<Self, QueryError> {
        let matched = MatchRecord::from(record.clone());
        Ok(Self {
            binary: SizeEstimator::new(WireFormat::Binary).size(&matched)?,
            json: SizeEstimator::new(WireFormat::Json).size(&matched)?,
        })
    }

    #[must_use]
    pub fn get(&self, format: WireFormat) -> u64 {
        match format {
            WireFormat::Binary => self.binary,
            WireFormat::Json => self.json,
        }
    }
}
