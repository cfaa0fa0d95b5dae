// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Stored record data structures.
//!
//! A [`StoredRecord`] (message container) is the unit persisted by a
//! [`RecordStore`](crate::storage::traits::RecordStore). Its region is fixed at
//! creation. [`RecordMetadata`] is the lightweight `(id, timestamp)` projection
//! used for cursor comparisons.
//!
//! # Example
//!
//! ```
//! use region_sync::record::{StoredRecord, ProximitySeed};
//! use region_sync::region::RegionIndexer;
//!
//! let region = RegionIndexer::new().compute_key(47.61, -122.33, 2).unwrap();
//! let record = StoredRecord::new("msg-1", 1_700_000_000_000, region)
//!     .with_seed(ProximitySeed::new(vec![0xAB; 16], 1_699_990_000_000, 1_699_999_000_000))
//!     .with_boolean_expression("0");
//!
//! assert!(record.validate().is_ok());
//! assert_eq!(record.metadata().timestamp, 1_700_000_000_000);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::QueryError;
use crate::region::{Coordinate, Region};

/// Upper sanity bound for epoch-millisecond values (9999-12-31T23:59:59.999Z).
pub const MAX_TIMESTAMP_MS: i64 = 253_402_300_799_999;

fn validate_timestamp(field: &str, value: i64) -> Result<(), QueryError> {
    if !(0..=MAX_TIMESTAMP_MS).contains(&value) {
        return Err(QueryError::invalid(format!(
            "{field} {value} outside [0, {MAX_TIMESTAMP_MS}]"
        )));
    }
    Ok(())
}

/// `(id, timestamp)` projection of a stored record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub id: String,
    /// Creation time (epoch millis)
    pub timestamp: i64,
}

impl RecordMetadata {
    pub fn new(id: impl Into<String>, timestamp: i64) -> Self {
        Self { id: id.into(), timestamp }
    }
}

/// Anonymized short-range identifier broadcast during a time window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProximitySeed {
    pub seed_value: Vec<u8>,
    pub window_start: i64,
    pub window_end: i64,
}

impl ProximitySeed {
    pub fn new(seed_value: Vec<u8>, window_start: i64, window_end: i64) -> Self {
        Self { seed_value, window_start, window_end }
    }

    pub fn validate(&self) -> Result<(), QueryError> {
        validate_timestamp("seed window start", self.window_start)?;
        validate_timestamp("seed window end", self.window_end)?;
        if self.window_start > self.window_end {
            return Err(QueryError::invalid(format!(
                "seed window start {} after end {}",
                self.window_start, self.window_end
            )));
        }
        Ok(())
    }
}

/// Geofenced, time-bounded zone carrying a user-facing message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrowcastArea {
    pub location: Coordinate,
    pub radius_meters: f64,
    pub begin_timestamp: i64,
    pub end_timestamp: i64,
    pub user_message: String,
}

impl NarrowcastArea {
    pub fn new(
        location: Coordinate,
        radius_meters: f64,
        begin_timestamp: i64,
        end_timestamp: i64,
        user_message: impl Into<String>,
    ) -> Self {
        Self {
            location,
            radius_meters,
            begin_timestamp,
            end_timestamp,
            user_message: user_message.into(),
        }
    }

    pub fn validate(&self) -> Result<(), QueryError> {
        self.location.validate()?;
        if !self.radius_meters.is_finite() || self.radius_meters < 0.0 {
            return Err(QueryError::invalid(format!(
                "area radius {} must be finite and non-negative",
                self.radius_meters
            )));
        }
        validate_timestamp("area begin", self.begin_timestamp)?;
        validate_timestamp("area end", self.end_timestamp)?;
        if self.begin_timestamp > self.end_timestamp {
            return Err(QueryError::invalid(format!(
                "area begin {} after end {}",
                self.begin_timestamp, self.end_timestamp
            )));
        }
        Ok(())
    }
}

/// Persisted message container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: String,
    /// Creation time (epoch millis), the sync cursor value
    pub timestamp: i64,
    pub region: Region,
    pub proximity_seeds: Vec<ProximitySeed>,
    pub narrowcast_areas: Vec<NarrowcastArea>,
    pub boolean_expression: Option<String>,
}

impl StoredRecord {
    /// Create an empty container; attach content with the `with_*` builders.
    pub fn new(id: impl Into<String>, timestamp: i64, region: Region) -> Self {
        Self {
            id: id.into(),
            timestamp,
            region,
            proximity_seeds: Vec::new(),
            narrowcast_areas: Vec::new(),
            boolean_expression: None,
        }
    }

    #[must_use]
    pub fn with_seed(mut self, seed: ProximitySeed) -> Self {
        self.proximity_seeds.push(seed);
        self
    }

    #[must_use]
    pub fn with_area(mut self, area: NarrowcastArea) -> Self {
        self.narrowcast_areas.push(area);
        self
    }

    #[must_use]
    pub fn with_boolean_expression(mut self, expression: impl Into<String>) -> Self {
        self.boolean_expression = Some(expression.into());
        self
    }

    #[must_use]
    pub fn metadata(&self) -> RecordMetadata {
        RecordMetadata::new(self.id.clone(), self.timestamp)
    }

    /// Check every content invariant. Region alignment is checked separately
    /// by the caller that owns a [`RegionIndexer`](crate::region::RegionIndexer).
    pub fn validate(&self) -> Result<(), QueryError> {
        if self.id.trim().is_empty() {
            return Err(QueryError::invalid("record id must not be empty"));
        }
        validate_timestamp("record timestamp", self.timestamp)?;
        for seed in &self.proximity_seeds {
            seed.validate()?;
        }
        for area in &self.narrowcast_areas {
            area.validate()?;
        }
        Ok(())
    }
}
