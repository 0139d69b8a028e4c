//! `GeoJSON` road network reader.
//!
//! Accepts a `FeatureCollection` whose features are `LineString` or
//! `MultiLineString` geometries. Feature properties become way tags
//! (non-string values are stringified); the feature `id`, or an `@id` /
//! `osm_id` property, becomes the way id, falling back to the feature index.

use std::collections::BTreeMap;

use geojson::{Feature, GeoJson, Value, feature::Id};
use saferoute_network_models::RawWay;

use crate::NetworkError;

/// Parses a `GeoJSON` payload into raw ways.
///
/// # Errors
///
/// Returns an error if the payload is not UTF-8, not valid `GeoJSON`, or not
/// a `FeatureCollection`.
pub fn parse_geojson(bytes: &[u8]) -> Result<Vec<RawWay>, NetworkError> {
    let text = std::str::from_utf8(bytes).map_err(|e| NetworkError::Format {
        message: format!("GeoJSON is not UTF-8: {e}"),
    })?;
    let GeoJson::FeatureCollection(collection) = text.parse::<GeoJson>()? else {
        return Err(NetworkError::Format {
            message: "expected a GeoJSON FeatureCollection".to_string(),
        });
    };

    let mut ways = Vec::new();
    let mut skipped = 0_usize;
    for (index, feature) in collection.features.iter().enumerate() {
        let lines = feature
            .geometry
            .as_ref()
            .map(|g| match &g.value {
                Value::LineString(line) => vec![line.as_slice()],
                Value::MultiLineString(lines) => lines.iter().map(Vec::as_slice).collect(),
                _ => Vec::new(),
            })
            .unwrap_or_default();
        if lines.is_empty() {
            skipped += 1;
            continue;
        }

        let id = feature_id(feature).unwrap_or_else(|| i64::try_from(index).unwrap_or(i64::MAX));
        let tags = feature_tags(feature);
        for line in lines {
            ways.push(RawWay {
                id,
                tags: tags.clone(),
                coords: line
                    .iter()
                    .filter_map(|position| Some((*position.get(1)?, *position.first()?)))
                    .collect(),
            });
        }
    }

    if skipped > 0 {
        log::debug!("Skipped {skipped} GeoJSON feature(s) without line geometry");
    }
    log::info!("Read {} way(s) from GeoJSON", ways.len());
    Ok(ways)
}

fn feature_id(feature: &Feature) -> Option<i64> {
    let from_value = |value: &serde_json::Value| match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim_start_matches("way/").parse().ok(),
        _ => None,
    };
    let id = match &feature.id {
        Some(Id::Number(n)) => n.as_i64(),
        Some(Id::String(s)) => s.trim_start_matches("way/").parse().ok(),
        None => None,
    };
    id.or_else(|| {
        let properties = feature.properties.as_ref()?;
        ["@id", "osm_id", "id"]
            .iter()
            .find_map(|key| properties.get(*key).and_then(from_value))
    })
}

fn feature_tags(feature: &Feature) -> BTreeMap<String, String> {
    feature
        .properties
        .iter()
        .flatten()
        .filter_map(|(key, value)| {
            let value = match value {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Number(n) => n.to_string(),
                serde_json::Value::Bool(b) => (if *b { "yes" } else { "no" }).to_string(),
                _ => return None,
            };
            Some((key.clone(), value))
        })
        .collect()
}
