// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! v3 narrowcast messages: areas only, one message per area.

use serde::{Deserialize, Serialize};

use crate::error::QueryError;
use crate::match_record::{Match, MatchRecord, NarrowcastAreaMatch};
use crate::record::NarrowcastArea;
use crate::region::Coordinate;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NarrowcastMessageV3 {
    pub user_message: String,
    pub area: AreaV3,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AreaV3 {
    pub latitude: f64,
    pub longitude: f64,
    pub radius_meters: f64,
    pub begin_time: i64,
    pub end_time: i64,
}

/// One message per narrowcast area. Seeds and the boolean expression are
/// not part of this revision.
#[must_use]
pub fn from_match(record: &MatchRecord) -> Vec<NarrowcastMessageV3> {
    record
        .area_matches()
        .map(|area| NarrowcastMessageV3 {
            user_message: area.user_message.clone(),
            area: AreaV3 {
                latitude: area.location.latitude,
                longitude: area.location.longitude,
                radius_meters: area.radius_meters,
                begin_time: area.begin_timestamp,
                end_time: area.end_timestamp,
            },
        })
        .collect()
}

/// Rebuild an area-only match record from v3 messages.
pub fn into_match(id: impl Into<String>, messages: &[NarrowcastMessageV3]) -> Result<MatchRecord, QueryError> {
    let matches = messages
        .iter()
        .map(|message| {
            let area = NarrowcastArea::new(
                Coordinate::new(message.area.latitude, message.area.longitude),
                message.area.radius_meters,
                message.area.begin_time,
                message.area.end_time,
                message.user_message.clone(),
            );
            area.validate()?;
            Ok(Match::NarrowcastArea(NarrowcastAreaMatch { area }))
        })
        .collect::<Result<Vec<_>, QueryError>>()?;

    Ok(MatchRecord {
        id: id.into(),
        matches,
        boolean_expression: None,
    })
}
