// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Geospatial region indexing.
//!
//! Records are partitioned into square grid cells of `10^-precision` degrees.
//! A [`Region`] names one cell by the floored coordinates of its south-west
//! corner plus the precision:
//!
//! ```text
//!   precision 0: cells of 1°      (40.73, -73.93) → (40.0, -74.0)
//!   precision 1: cells of 0.1°    (40.73, -73.93) → (40.7, -74.0)
//!   precision 2: cells of 0.01°   (40.73, -73.93) → (40.73, -73.93)
//! ```
//!
//! Flooring is always toward negative infinity, so `-73.93` lands in the
//! `[-74, -73)` cell at precision 0 rather than `[-73, -72)`.
//!
//! # Example
//!
//! ```
//! use region_sync::region::{RegionIndexer, Coordinate};
//!
//! let indexer = RegionIndexer::new();
//! let region = indexer.compute_key(40.73, -73.93, 0).unwrap();
//! let boundary = indexer.compute_boundary(&region).unwrap();
//!
//! assert_eq!(boundary.min, Coordinate::new(40.0, -74.0));
//! assert_eq!(boundary.max, Coordinate::new(41.0, -73.0));
//! ```

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::error::QueryError;

/// Coarsest supported grid (1° cells).
pub const MIN_PRECISION: i32 = 0;

/// Finest supported grid (1e-8° cells, roughly a millimetre).
pub const MAX_PRECISION: i32 = 8;

pub const MIN_LATITUDE: f64 = -90.0;
pub const MAX_LATITUDE: f64 = 90.0;
pub const MIN_LONGITUDE: f64 = -180.0;
pub const MAX_LONGITUDE: f64 = 180.0;

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Reject non-finite or out-of-range coordinates.
    pub fn validate(&self) -> Result<(), QueryError> {
        validate_latitude(self.latitude)?;
        validate_longitude(self.longitude)
    }
}

/// Spatial partition key: the floored south-west corner of a grid cell.
///
/// Equality and hashing use the bit patterns of both prefixes plus the
/// precision. Prefixes produced by [`RegionIndexer`] never carry negative
/// zero, so bitwise comparison matches numeric comparison for every
/// canonical region.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Region {
    pub latitude_prefix: f64,
    pub longitude_prefix: f64,
    pub precision: i32,
}

impl Region {
    /// Ordered integer form of this region, used as the storage partition key.
    ///
    /// Only meaningful for canonical regions (see [`RegionIndexer::normalize`]).
    #[must_use]
    pub fn key(&self) -> RegionKey {
        let scale = grid_scale(self.precision);
        RegionKey {
            precision: self.precision,
            lat_cell: (self.latitude_prefix * scale).round() as i64,
            lon_cell: (self.longitude_prefix * scale).round() as i64,
        }
    }
}

/// Bit pattern with `-0.0` folded into `0.0`.
fn prefix_bits(value: f64) -> u64 {
    (value + 0.0).to_bits()
}

impl PartialEq for Region {
    fn eq(&self, other: &Self) -> bool {
        prefix_bits(self.latitude_prefix) == prefix_bits(other.latitude_prefix)
            && prefix_bits(self.longitude_prefix) == prefix_bits(other.longitude_prefix)
            && self.precision == other.precision
    }
}

impl Eq for Region {}

impl Hash for Region {
    fn hash<H: Hasher>(&self, state: &mut H) {
        prefix_bits(self.latitude_prefix).hash(state);
        prefix_bits(self.longitude_prefix).hash(state);
        self.precision.hash(state);
    }
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}@{}", self.latitude_prefix, self.longitude_prefix, self.precision)
    }
}

/// Integer grid address of a region: `(precision, lat_cell, lon_cell)`.
///
/// Ordering is lexicographic in that field order, which keeps every cell of
/// one precision contiguous in an ordered store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RegionKey {
    pub precision: i32,
    pub lat_cell: i64,
    pub lon_cell: i64,
}

/// Axis-aligned bounding box of a region. Derived, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegionBoundary {
    pub min: Coordinate,
    pub max: Coordinate,
}

impl RegionBoundary {
    /// Half-open containment: the south and west edges belong to the cell,
    /// the north and east edges belong to the neighbouring cells.
    #[must_use]
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        self.min.latitude <= latitude
            && latitude < self.max.latitude
            && self.min.longitude <= longitude
            && longitude < self.max.longitude
    }
}

/// Edge length of a grid cell in degrees.
#[must_use]
pub fn cell_size(precision: i32) -> f64 {
    10f64.powi(-precision)
}

fn grid_scale(precision: i32) -> f64 {
    10f64.powi(precision)
}

/// Index of the grid line at or below `value`.
///
/// `value * scale` can round across an integer, so the floored index is
/// nudged one step until `index / scale <= value < (index + 1) / scale`
/// holds for the divided values actually stored.
fn grid_index(value: f64, scale: f64) -> f64 {
    let mut index = (value * scale).floor();
    if index / scale > value {
        index -= 1.0;
    } else if (index + 1.0) / scale <= value {
        index += 1.0;
    }
    index
}

fn validate_precision(precision: i32) -> Result<(), QueryError> {
    if !(MIN_PRECISION..=MAX_PRECISION).contains(&precision) {
        return Err(QueryError::invalid(format!(
            "precision {precision} outside [{MIN_PRECISION}, {MAX_PRECISION}]"
        )));
    }
    Ok(())
}

fn validate_latitude(latitude: f64) -> Result<(), QueryError> {
    if !latitude.is_finite() || !(MIN_LATITUDE..=MAX_LATITUDE).contains(&latitude) {
        return Err(QueryError::invalid(format!(
            "latitude {latitude} outside [{MIN_LATITUDE}, {MAX_LATITUDE}]"
        )));
    }
    Ok(())
}

fn validate_longitude(longitude: f64) -> Result<(), QueryError> {
    if !longitude.is_finite() || !(MIN_LONGITUDE..=MAX_LONGITUDE).contains(&longitude) {
        return Err(QueryError::invalid(format!(
            "longitude {longitude} outside [{MIN_LONGITUDE}, {MAX_LONGITUDE}]"
        )));
    }
    Ok(())
}

/// Computes region keys and boundaries. Stateless and deterministic.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegionIndexer;

impl RegionIndexer {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Region containing `(latitude, longitude)` at the given precision.
    pub fn compute_key(&self, latitude: f64, longitude: f64, precision: i32) -> Result<Region, QueryError> {
        validate_precision(precision)?;
        validate_latitude(latitude)?;
        validate_longitude(longitude)?;

        let scale = grid_scale(precision);
        // `+ 0.0` turns a floored -0.0 into 0.0
        Ok(Region {
            latitude_prefix: grid_index(latitude, scale) / scale + 0.0,
            longitude_prefix: grid_index(longitude, scale) / scale + 0.0,
            precision,
        })
    }

    /// Bounding box of a region: `min = prefix`, `max = prefix + cell_size`.
    ///
    /// An unaligned triple is floored to its containing cell first.
    pub fn compute_boundary(&self, region: &Region) -> Result<RegionBoundary, QueryError> {
        let region = self.normalize(region)?;

        let scale = grid_scale(region.precision);
        let key = region.key();
        Ok(RegionBoundary {
            min: Coordinate::new(region.latitude_prefix, region.longitude_prefix),
            max: Coordinate::new(
                (key.lat_cell as f64 + 1.0) / scale,
                (key.lon_cell as f64 + 1.0) / scale,
            ),
        })
    }

    /// Range checks on a client-supplied triple. Alignment is not checked.
    pub fn validate_region(&self, region: &Region) -> Result<(), QueryError> {
        validate_precision(region.precision)?;
        validate_latitude(region.latitude_prefix)?;
        validate_longitude(region.longitude_prefix)
    }

    /// Canonical form of a client-supplied region triple.
    ///
    /// Aligned prefixes come back unchanged; unaligned ones are floored to
    /// the cell that contains them.
    pub fn normalize(&self, region: &Region) -> Result<Region, QueryError> {
        self.compute_key(region.latitude_prefix, region.longitude_prefix, region.precision)
    }

    /// Whether `region` is already in canonical form.
    pub fn is_canonical(&self, region: &Region) -> Result<bool, QueryError> {
        Ok(self.normalize(region)? == *region)
    }
}
