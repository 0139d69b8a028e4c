//! `CityProtect` (Motorola `CommandCentral`) export decoding.
//!
//! Exports wrap records in `result.list.incidents`; each record carries a
//! `GeoJSON` point whose coordinates are in `[lng, lat]` order. Records are
//! flattened into top-level objects so the generic field mapping can read
//! the coordinates as `_city_protect_lat` / `_city_protect_lng`.

use serde_json::{Map, Value};

use crate::SourceError;
use crate::csv_rows::RawRows;

/// Flattened latitude field name.
pub const LAT_FIELD: &str = "_city_protect_lat";
/// Flattened longitude field name.
pub const LNG_FIELD: &str = "_city_protect_lng";

/// Decodes a `CityProtect` export into flattened rows.
///
/// # Errors
///
/// Returns an error if the payload is not JSON or lacks the
/// `result.list.incidents` array.
pub fn parse_incidents(bytes: &[u8]) -> Result<RawRows, SourceError> {
    let payload: Value = serde_json::from_slice(bytes)?;
    let incidents = payload
        .pointer("/result/list/incidents")
        .and_then(Value::as_array)
        .ok_or_else(|| SourceError::Normalization {
            message: "CityProtect payload has no result.list.incidents array".to_string(),
        })?;

    let mut rows = RawRows::default();
    for incident in incidents {
        match flatten_incident(incident) {
            Some(row) => rows.rows.push(row),
            None => rows.unreadable += 1,
        }
    }
    Ok(rows)
}

/// Copies every field except `location`, which is replaced by the two
/// flattened coordinate fields when its point is well-formed.
fn flatten_incident(incident: &Value) -> Option<Map<String, Value>> {
    let obj = incident.as_object()?;
    let mut flat = Map::new();

    for (key, value) in obj {
        if key == "location" {
            if let Some(coords) = value.get("coordinates").and_then(Value::as_array)
                && let (Some(lng), Some(lat)) = (
                    coords.first().and_then(Value::as_f64),
                    coords.get(1).and_then(Value::as_f64),
                )
            {
                flat.insert(LAT_FIELD.to_string(), Value::from(lat));
                flat.insert(LNG_FIELD.to_string(), Value::from(lng));
            }
        } else {
            flat.insert(key.clone(), value.clone());
        }
    }

    Some(flat)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flattens_geojson_point_in_lng_lat_order() {
        let payload = br#"{"result":{"list":{"incidents":[
            {"id":"x","incidentType":"Burglary",
             "location":{"type":"Point","coordinates":[-86.91,40.42]}}
        ]}}}"#;

        let rows = parse_incidents(payload).unwrap();
        assert_eq!(rows.rows.len(), 1);
        let row = &rows.rows[0];
        assert_eq!(row[LAT_FIELD].as_f64(), Some(40.42));
        assert_eq!(row[LNG_FIELD].as_f64(), Some(-86.91));
        assert!(!row.contains_key("location"));
    }

    #[test]
    fn counts_non_object_entries_as_unreadable() {
        let payload = br#"{"result":{"list":{"incidents":[42, {"id":"y"}]}}}"#;
        let rows = parse_incidents(payload).unwrap();
        assert_eq!(rows.rows.len(), 1);
        assert_eq!(rows.unreadable, 1);
    }

    #[test]
    fn rejects_payload_without_incidents() {
        assert!(parse_incidents(br#"{"result":{}}"#).is_err());
        assert!(parse_incidents(b"not json").is_err());
    }
}
