//! City registry: every city definition is a TOML file under
//! `packages/source/cities/`, baked into the binary with [`include_str!`].
//! Adding a city means adding a TOML file and listing it below.

use crate::SourceError;
use crate::city_def::{CityDefinition, parse_city_toml};

/// TOML configs embedded at compile time.
const CITY_TOMLS: &[(&str, &str)] = &[
    // ── CSV exports ──────────────────────────────────────────────────
    ("indianapolis", include_str!("../cities/indianapolis.toml")),
    // ── CityProtect exports ──────────────────────────────────────────
    (
        "west_lafayette",
        include_str!("../cities/west_lafayette.toml"),
    ),
];

/// Total number of configured cities (used in tests).
#[cfg(test)]
const EXPECTED_CITY_COUNT: usize = 2;

/// Returns all configured city definitions.
///
/// # Panics
///
/// Panics if an embedded TOML config is malformed, which a unit test rules
/// out before release.
#[must_use]
pub fn all_cities() -> Vec<CityDefinition> {
    CITY_TOMLS
        .iter()
        .map(|(name, toml)| {
            parse_city_toml(toml).unwrap_or_else(|e| panic!("Failed to parse {name}.toml: {e}"))
        })
        .collect()
}

/// Looks up one city definition by id.
///
/// # Errors
///
/// Returns [`SourceError::UnknownCity`] if no city has that id.
pub fn city_by_id(id: &str) -> Result<CityDefinition, SourceError> {
    CITY_TOMLS
        .iter()
        .find(|(name, _)| *name == id)
        .ok_or_else(|| SourceError::UnknownCity { id: id.to_string() })
        .and_then(|(_, toml)| parse_city_toml(toml))
}
