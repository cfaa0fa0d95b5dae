// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Client-facing match records.
//!
//! A [`MatchRecord`] is built on demand from a [`StoredRecord`] and lives for
//! one response. Its matches are a closed set of kinds:
//!
//! - [`Match::ProximitySeeds`]: every seed of the record, as one group
//! - [`Match::NarrowcastArea`]: one geofenced area
//!
//! This is the superset shape. Protocol revisions that expose fewer fields
//! project it in [`crate::protocol`].

use serde::{Deserialize, Serialize};

use crate::record::{NarrowcastArea, ProximitySeed, StoredRecord};

/// Seeds a client compares against its locally observed identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProximitySeedMatch {
    pub seeds: Vec<ProximitySeed>,
}

/// A geofenced area a client compares against its location history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrowcastAreaMatch {
    pub area: NarrowcastArea,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Match {
    ProximitySeeds(ProximitySeedMatch),
    NarrowcastArea(NarrowcastAreaMatch),
}

impl Match {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ProximitySeeds(_) => "proximity_seeds",
            Self::NarrowcastArea(_) => "narrowcast_area",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub id: String,
    pub matches: Vec<Match>,
    pub boolean_expression: Option<String>,
}

impl MatchRecord {
    /// All proximity seeds, in stored order.
    pub fn proximity_matches(&self) -> impl Iterator<Item = &ProximitySeed> {
        self.matches.iter().flat_map(|m| match m {
            Match::ProximitySeeds(group) => group.seeds.as_slice(),
            Match::NarrowcastArea(_) => &[][..],
        })
    }

    /// All narrowcast areas, in stored order.
    pub fn area_matches(&self) -> impl Iterator<Item = &NarrowcastArea> {
        self.matches.iter().filter_map(|m| match m {
            Match::NarrowcastArea(area_match) => Some(&area_match.area),
            Match::ProximitySeeds(_) => None,
        })
    }
}

impl From<StoredRecord> for MatchRecord {
    fn from(record: StoredRecord) -> Self {
        let mut matches = Vec::with_capacity(record.narrowcast_areas.len() + 1);
        if !record.proximity_seeds.is_empty() {
            matches.push(Match::ProximitySeeds(ProximitySeedMatch {
                seeds: record.proximity_seeds,
            }));
        }
        matches.extend(
            record
                .narrowcast_areas
                .into_iter()
                .map(|area| Match::NarrowcastArea(NarrowcastAreaMatch { area })),
        );

        Self {
            id: record.id,
            matches,
            boolean_expression: record.boolean_expression,
        }
    }
}
