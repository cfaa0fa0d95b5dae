// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! v1 match message: the full superset.
//!
//! ```json
//! {
//!   "id": "msg-1",
//!   "boolExpression": "0 || 1",
//!   "bluetoothMatches": [{"seeds": [{"seed": "abcd", "sequenceStartTime": 1, "sequenceEndTime": 2}]}],
//!   "areaMatches": [{"userMessage": "Get tested", "areas": [{"location": {...}, "radiusMeters": 50.0, ...}]}]
//! }
//! ```
//!
//! Seeds travel hex-encoded.

use serde::{Deserialize, Serialize};

use crate::error::QueryError;
use crate::match_record::{Match, MatchRecord, NarrowcastAreaMatch, ProximitySeedMatch};
use crate::record::{NarrowcastArea, ProximitySeed};
use crate::region::Coordinate;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchMessageV1 {
    pub id: String,
    pub bool_expression: Option<String>,
    pub bluetooth_matches: Vec<BluetoothMatchV1>,
    pub area_matches: Vec<AreaMatchV1>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BluetoothMatchV1 {
    pub seeds: Vec<BluetoothSeedV1>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BluetoothSeedV1 {
    pub seed: String,
    pub sequence_start_time: i64,
    pub sequence_end_time: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AreaMatchV1 {
    pub user_message: String,
    pub areas: Vec<AreaV1>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AreaV1 {
    pub location: LocationV1,
    pub radius_meters: f64,
    pub begin_time: i64,
    pub end_time: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationV1 {
    pub latitude: f64,
    pub longitude: f64,
}

fn seed_to_dto(seed: &ProximitySeed) -> BluetoothSeedV1 {
    BluetoothSeedV1 {
        seed: hex::encode(&seed.seed_value),
        sequence_start_time: seed.window_start,
        sequence_end_time: seed.window_end,
    }
}

fn seed_from_dto(dto: &BluetoothSeedV1) -> Result<ProximitySeed, QueryError> {
    let seed_value = hex::decode(&dto.seed)
        .map_err(|e| QueryError::invalid(format!("seed '{}' is not valid hex: {e}", dto.seed)))?;
    let seed = ProximitySeed::new(seed_value, dto.sequence_start_time, dto.sequence_end_time);
    seed.validate()?;
    Ok(seed)
}

fn area_to_dto(area: &NarrowcastArea) -> AreaV1 {
    AreaV1 {
        location: LocationV1 {
            latitude: area.location.latitude,
            longitude: area.location.longitude,
        },
        radius_meters: area.radius_meters,
        begin_time: area.begin_timestamp,
        end_time: area.end_timestamp,
    }
}

fn area_from_dto(dto: &AreaV1, user_message: &str) -> Result<NarrowcastArea, QueryError> {
    let area = NarrowcastArea::new(
        Coordinate::new(dto.location.latitude, dto.location.longitude),
        dto.radius_meters,
        dto.begin_time,
        dto.end_time,
        user_message,
    );
    area.validate()?;
    Ok(area)
}

/// Project a match record into v1. Lossless.
#[must_use]
pub fn from_match(record: &MatchRecord) -> MatchMessageV1 {
    let mut bluetooth_matches = Vec::new();
    let mut area_matches = Vec::new();

    for m in &record.matches {
        match m {
            Match::ProximitySeeds(group) => bluetooth_matches.push(BluetoothMatchV1 {
                seeds: group.seeds.iter().map(seed_to_dto).collect(),
            }),
            Match::NarrowcastArea(area_match) => area_matches.push(AreaMatchV1 {
                user_message: area_match.area.user_message.clone(),
                areas: vec![area_to_dto(&area_match.area)],
            }),
        }
    }

    MatchMessageV1 {
        id: record.id.clone(),
        bool_expression: record.boolean_expression.clone(),
        bluetooth_matches,
        area_matches,
    }
}

/// Rebuild a match record from a v1 message, validating every seed and area.
///
/// All bluetooth groups collapse into one seed match, omitted when there are
/// no seeds. Areas grouped under one user message become separate area
/// matches that each carry that message.
pub fn into_match(message: &MatchMessageV1) -> Result<MatchRecord, QueryError> {
    let mut matches = Vec::new();

    let seeds = message
        .bluetooth_matches
        .iter()
        .flat_map(|group| &group.seeds)
        .map(seed_from_dto)
        .collect::<Result<Vec<_>, _>>()?;
    if !seeds.is_empty() {
        matches.push(Match::ProximitySeeds(ProximitySeedMatch { seeds }));
    }
    for area_match in &message.area_matches {
        for area in &area_match.areas {
            matches.push(Match::NarrowcastArea(NarrowcastAreaMatch {
                area: area_from_dto(area, &area_match.user_message)?,
            }));
        }
    }

    Ok(MatchRecord {
        id: message.id.clone(),
        matches,
        boolean_expression: message.bool_expression.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::StoredRecord;
    use crate::region::RegionIndexer;

    fn sample() -> MatchRecord {
        let region = RegionIndexer::new().compute_key(35.68, 139.69, 2).unwrap();
        MatchRecord::from(
            StoredRecord::new("v1-msg", 1_000, region)
                .with_seed(ProximitySeed::new(vec![0xDE, 0xAD], 10, 20))
                .with_seed(ProximitySeed::new(vec![0xBE, 0xEF], 30, 40))
                .with_area(NarrowcastArea::new(Coordinate::new(35.681, 139.691), 30.0, 5, 6, "Station"))
                .with_area(NarrowcastArea::new(Coordinate::new(35.685, 139.695), 80.0, 7, 9, "Market"))
                .with_boolean_expression("0 && (1 || 2)"),
        )
    }

    #[test]
    fn test_from_match_shape() {
        let dto = from_match(&sample());

        assert_eq!(dto.bluetooth_matches.len(), 1);
        assert_eq!(dto.bluetooth_matches[0].seeds[0].seed, "dead");
        assert_eq!(dto.area_matches.len(), 2);
        assert_eq!(dto.area_matches[1].user_message, "Market");
        assert_eq!(dto.bool_expression.as_deref(), Some("0 && (1 || 2)"));
    }

    #[test]
    fn test_mapping_is_inverse() {
        let original = sample();
        assert_eq!(into_match(&from_match(&original)).unwrap(), original);
    }

    #[test]
    fn test_grouped_areas_share_message() {
        let dto = MatchMessageV1 {
            id: "g".into(),
            bool_expression: None,
            bluetooth_matches: vec![],
            area_matches: vec![AreaMatchV1 {
                user_message: "Clinic".into(),
                areas: vec![
                    AreaV1 { location: LocationV1 { latitude: 1.0, longitude: 1.0 }, radius_meters: 10.0, begin_time: 1, end_time: 2 },
                    AreaV1 { location: LocationV1 { latitude: 2.0, longitude: 2.0 }, radius_meters: 20.0, begin_time: 3, end_time: 4 },
                ],
            }],
        };

        let record = into_match(&dto).unwrap();
        let messages: Vec<&str> = record.area_matches().map(|a| a.user_message.as_str()).collect();
        assert_eq!(messages, vec!["Clinic", "Clinic"]);
    }

    #[test]
    fn test_bluetooth_groups_flatten_into_one_seed_match() {
        let seed = BluetoothSeedV1 { seed: "aa".into(), sequence_start_time: 1, sequence_end_time: 2 };
        let dto = MatchMessageV1 {
            id: "bt".into(),
            bool_expression: None,
            bluetooth_matches: vec![
                BluetoothMatchV1 { seeds: vec![seed.clone()] },
                BluetoothMatchV1 { seeds: vec![] },
                BluetoothMatchV1 { seeds: vec![BluetoothSeedV1 { seed: "bb".into(), ..seed }] },
            ],
            area_matches: vec![],
        };

        let record = into_match(&dto).unwrap();
        assert_eq!(record.matches.len(), 1);
        let values: Vec<&[u8]> = record.proximity_matches().map(|s| s.seed_value.as_slice()).collect();
        assert_eq!(values, vec![&[0xAA][..], &[0xBB][..]]);

        // Storage never produces an empty seed group, so neither does the mapping
        let only_empty = MatchMessageV1 { bluetooth_matches: vec![BluetoothMatchV1 { seeds: vec![] }], ..dto };
        assert!(into_match(&only_empty).unwrap().matches.is_empty());
    }

    #[test]
    fn test_invalid_dto_rejected() {
        let mut bad_hex = from_match(&sample());
        bad_hex.bluetooth_matches[0].seeds[0].seed = "not-hex".into();
        assert!(matches!(into_match(&bad_hex), Err(QueryError::InvalidArgument(_))));

        let mut inverted = from_match(&sample());
        inverted.area_matches[0].areas[0].begin_time = 100;
        assert!(into_match(&inverted).is_err());
    }

    #[test]
    fn test_json_field_names() {
        let json = serde_json::to_value(from_match(&sample())).unwrap();
        assert!(json.get("boolExpression").is_some());
        assert!(json["bluetoothMatches"][0]["seeds"][0].get("sequenceStartTime").is_some());
        assert!(json["areaMatches"][0]["areas"][0].get("radiusMeters").is_some());
    }
}
