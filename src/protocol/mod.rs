// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Explicit mappings between protocol-revision DTOs and internal records.
//!
//! Each revision exposes a different subset of a [`MatchRecord`](crate::MatchRecord):
//!
//! | Revision | Proximity seeds | Narrowcast areas              | Boolean expression |
//! |----------|-----------------|-------------------------------|--------------------|
//! | v1       | yes             | grouped under a user message  | yes                |
//! | v3       | no              | one message per area          | no                 |
//!
//! Every mapping is a pure function in both directions. Field suppression for
//! a revision happens here, never in the query core.

pub mod v1;
pub mod v3;

use serde::{Deserialize, Serialize};

use crate::error::QueryError;
use crate::region::{Region, RegionIndexer};

/// Flat region triple as carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionDto {
    pub latitude_prefix: f64,
    pub longitude_prefix: f64,
    pub precision: i32,
}

impl TryFrom<RegionDto> for Region {
    type Error = QueryError;

    /// Validates the triple and floors it onto the grid.
    fn try_from(dto: RegionDto) -> Result<Self, Self::Error> {
        RegionIndexer::new().normalize(&Region {
            latitude_prefix: dto.latitude_prefix,
            longitude_prefix: dto.longitude_prefix,
            precision: dto.precision,
        })
    }
}

impl From<Region> for RegionDto {
    fn from(region: Region) -> Self {
        Self {
            latitude_prefix: region.latitude_prefix,
            longitude_prefix: region.longitude_prefix,
            precision: region.precision,
        }
    }
}
