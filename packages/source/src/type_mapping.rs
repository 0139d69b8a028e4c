//! Crime type mapping.
//!
//! Maps feed-specific crime type strings onto [`CrimeSubcategory`] using
//! case-insensitive keyword detection. Order matters: more specific phrases
//! are checked before the generic words they contain ("vehicle theft" before
//! "theft", "aggravated assault" before "assault").

use std::sync::LazyLock;

use regex::Regex;
use saferoute_crime_models::CrimeSubcategory;

/// Leading offense codes such as `13A - `, `(23H) ` or `2204: `.
static CODE_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*\(?[0-9]{2,4}[A-Za-z]?\)?\s*[-:]?\s*").unwrap_or_else(|e| {
        unreachable!("offense code pattern is a valid regex: {e}")
    })
});

/// Maps a raw crime type string to the canonical subcategory.
///
/// Returns `None` when the string is empty or matches no known keyword; the
/// caller treats that record as malformed.
#[must_use]
pub fn map_crime_type(raw: &str) -> Option<CrimeSubcategory> {
    let stripped = CODE_PREFIX.replace(raw, "");
    let lower = stripped.trim().to_lowercase();
    if lower.is_empty() {
        return None;
    }

    // ── Violent ─────────────────────────────────────────────────────
    if contains_any(&lower, &["homicide", "murder", "manslaughter"]) {
        return Some(CrimeSubcategory::Homicide);
    }
    if contains_any(
        &lower,
        &["sexual assault", "rape", "sex offense", "criminal sexual", "fondling"],
    ) {
        return Some(CrimeSubcategory::SexualAssault);
    }
    if contains_any(&lower, &["robbery", "carjacking", "holdup"]) {
        return Some(CrimeSubcategory::Robbery);
    }
    if contains_any(
        &lower,
        &["aggravated assault", "agg assault", "aggravated battery", "shooting"],
    ) {
        return Some(CrimeSubcategory::AggravatedAssault);
    }
    if contains_any(&lower, &["assault", "battery", "intimidation"]) {
        return Some(CrimeSubcategory::SimpleAssault);
    }

    // ── Property ────────────────────────────────────────────────────
    if contains_any(&lower, &["burglary", "breaking and entering", "break-in"]) {
        return Some(CrimeSubcategory::Burglary);
    }
    if contains_any(&lower, &["bicycle", "bike theft"]) {
        return Some(CrimeSubcategory::BicycleTheft);
    }
    if lower.contains("identity theft") {
        return Some(CrimeSubcategory::Fraud);
    }
    if contains_any(
        &lower,
        &["motor vehicle theft", "vehicle theft", "auto theft", "stolen vehicle"],
    ) {
        return Some(CrimeSubcategory::MotorVehicleTheft);
    }
    if contains_any(
        &lower,
        &["larceny", "theft", "shoplifting", "pickpocket", "stolen property"],
    ) {
        return Some(CrimeSubcategory::LarcenyTheft);
    }
    if lower.contains("arson") {
        return Some(CrimeSubcategory::Arson);
    }
    if contains_any(
        &lower,
        &[
            "vandalism",
            "criminal damage",
            "criminal mischief",
            "destruction of property",
            "graffiti",
        ],
    ) {
        return Some(CrimeSubcategory::Vandalism);
    }

    // ── Drugs ───────────────────────────────────────────────────────
    if contains_any(
        &lower,
        &["drug sale", "dealing", "trafficking", "distribution", "manufactur"],
    ) {
        return Some(CrimeSubcategory::DrugSales);
    }
    if contains_any(
        &lower,
        &["drug", "narcotic", "controlled substance", "marijuana", "paraphernalia"],
    ) {
        return Some(CrimeSubcategory::DrugPossession);
    }

    // ── Public order ────────────────────────────────────────────────
    if contains_any(&lower, &["weapon", "firearm", "handgun"]) {
        return Some(CrimeSubcategory::WeaponsViolation);
    }
    if contains_any(
        &lower,
        &["dui", "dwi", "owi", "driving under", "operating while intoxicated"],
    ) {
        return Some(CrimeSubcategory::Dui);
    }
    if contains_any(
        &lower,
        &["disorderly", "public intoxication", "disturbance", "liquor", "noise"],
    ) {
        return Some(CrimeSubcategory::DisorderlyConduct);
    }
    if lower.contains("trespass") {
        return Some(CrimeSubcategory::Trespassing);
    }

    // ── Fraud ───────────────────────────────────────────────────────
    if contains_any(
        &lower,
        &["fraud", "forgery", "counterfeit", "embezzlement", "bad check"],
    ) {
        return Some(CrimeSubcategory::Fraud);
    }

    // ── Non-criminal ────────────────────────────────────────────────
    if contains_any(
        &lower,
        &[
            "non-criminal",
            "non criminal",
            "found property",
            "lost property",
            "welfare check",
            "missing",
        ],
    ) {
        return Some(CrimeSubcategory::NonCriminal);
    }

    None
}

/// Checks if `haystack` contains any of the given `needles`.
fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}
