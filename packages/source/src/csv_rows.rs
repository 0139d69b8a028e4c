//! Flat CSV decoding into field-addressable rows.

use serde_json::{Map, Value};

use crate::SourceError;

/// Decoded rows ready for field mapping.
#[derive(Debug, Clone, Default)]
pub struct RawRows {
    /// One JSON object per record, keyed by field name.
    pub rows: Vec<Map<String, Value>>,
    /// Records that could not be decoded at all.
    pub unreadable: u64,
}

/// Decodes a CSV payload with a header row. Values are kept as strings.
///
/// Rows that fail to decode (bad UTF-8, broken quoting) are counted in
/// [`RawRows::unreadable`] and skipped.
///
/// # Errors
///
/// Returns an error if the header row itself cannot be read.
pub fn parse_rows(bytes: &[u8], delimiter: Option<&str>) -> Result<RawRows, SourceError> {
    let delimiter = delimiter.and_then(|d| d.bytes().next()).unwrap_or(b',');
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();

    let mut rows = RawRows::default();
    for (index, record) in reader.records().enumerate() {
        match record {
            Ok(record) => {
                let row = headers
                    .iter()
                    .zip(record.iter())
                    .filter(|(_, value)| !value.is_empty())
                    .map(|(header, value)| (header.clone(), Value::from(value)))
                    .collect();
                rows.rows.push(row);
            }
            Err(e) => {
                log::debug!("CSV row {}: {e}", index + 1);
                rows.unreadable += 1;
            }
        }
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_rows_keyed_by_header() {
        let rows = parse_rows(b"CASE,CRIME\nA1,ROBBERY\nA2,\n", None).unwrap();
        assert_eq!(rows.rows.len(), 2);
        assert_eq!(rows.rows[0]["CRIME"], Value::from("ROBBERY"));
        assert!(!rows.rows[1].contains_key("CRIME"));
    }

    #[test]
    fn honours_custom_delimiter_and_bom() {
        let rows = parse_rows("\u{feff}ID;LAT\n7;39.7\n".as_bytes(), Some(";")).unwrap();
        assert_eq!(rows.rows[0]["ID"], Value::from("7"));
        assert_eq!(rows.rows[0]["LAT"], Value::from("39.7"));
    }

    #[test]
    fn counts_invalid_utf8_rows() {
        let mut payload = b"ID,CRIME\n1,THEFT\n".to_vec();
        payload.extend_from_slice(b"2,\xff\xfe\n");
        let rows = parse_rows(&payload, None).unwrap();
        assert_eq!(rows.rows.len(), 1);
        assert_eq!(rows.unreadable, 1);
    }
}
