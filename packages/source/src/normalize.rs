//! Field-mapped normalization of raw rows into [`IncidentRecord`]s.
//!
//! A row is rejected (and counted by [`DropReason`]) when it has no id, no
//! valid coordinates, coordinates outside the city's bounding box, or a
//! crime type that does not map to the taxonomy. The first occurrence of an
//! incident id wins; later duplicates are dropped.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use saferoute_source_models::{DropReason, IncidentRecord, IngestReport};
use serde_json::{Map, Value};

use crate::city_def::{CityDefinition, DateExtractor};
use crate::csv_rows::RawRows;
use crate::parsing::{
    field_f64, field_text, parse_date, parse_datetime, parse_epoch_ms, parse_time,
    validate_lat_lng,
};
use crate::type_mapping::map_crime_type;

/// Normalizes all rows for one city.
#[must_use]
pub fn normalize_rows(
    definition: &CityDefinition,
    raw: RawRows,
) -> (Vec<IncidentRecord>, IngestReport) {
    let mut report = IngestReport::new(definition.id.clone());
    let mut seen = HashSet::new();
    let mut records = Vec::with_capacity(raw.rows.len());

    for _ in 0..raw.unreadable {
        report.drop_record(DropReason::Unreadable);
    }

    for (index, row) in raw.rows.iter().enumerate() {
        match normalize_row(definition, row) {
            Ok(record) => {
                if seen.insert(record.source_incident_id.clone()) {
                    report.accept(record.subcategory);
                    records.push(record);
                } else {
                    report.drop_record(DropReason::Duplicate);
                }
            }
            Err(reason) => {
                log::debug!("{}: row {index} dropped ({reason})", definition.id);
                report.drop_record(reason);
            }
        }
    }

    (records, report)
}

/// Normalizes a single row.
///
/// # Errors
///
/// Returns the [`DropReason`] describing why the row is malformed.
pub fn normalize_row(
    definition: &CityDefinition,
    row: &Map<String, Value>,
) -> Result<IncidentRecord, DropReason> {
    let fields = &definition.fields;

    let source_incident_id = fields
        .incident_id
        .iter()
        .find_map(|f| field_text(row, f))
        .ok_or(DropReason::MissingId)?;

    let (latitude, longitude) = field_f64(row, &fields.lat)
        .zip(field_f64(row, &fields.lng))
        .and_then(|(lat, lng)| validate_lat_lng(lat, lng))
        .ok_or(DropReason::InvalidCoordinates)?;

    if !definition.bbox.contains(latitude, longitude) {
        return Err(DropReason::OutOfBounds);
    }

    let subcategory = fields
        .crime_type
        .iter()
        .filter_map(|f| field_text(row, f))
        .find_map(|raw| map_crime_type(&raw))
        .ok_or(DropReason::UnknownCategory)?;

    let occurred_at = fields
        .occurred_at
        .as_ref()
        .and_then(|extractor| extract_date(extractor, row));

    Ok(IncidentRecord {
        source_incident_id,
        city: definition.id.clone(),
        subcategory,
        latitude,
        longitude,
        occurred_at,
    })
}

fn extract_date(extractor: &DateExtractor, row: &Map<String, Value>) -> Option<DateTime<Utc>> {
    match extractor {
        DateExtractor::Simple { field } => parse_datetime(&field_text(row, field)?),
        DateExtractor::DatePlusTime {
            date_field,
            time_field,
        } => {
            let date_text = field_text(row, date_field)?;
            let date = parse_date(&date_text)
                .or_else(|| parse_datetime(&date_text).map(|dt| dt.date_naive()))?;
            let time = field_text(row, time_field)
                .and_then(|t| parse_time(&t))
                .unwrap_or_default();
            Some(date.and_time(time).and_utc())
        }
        DateExtractor::EpochMs { field } => parse_epoch_ms(field_f64(row, field)?),
    }
}
