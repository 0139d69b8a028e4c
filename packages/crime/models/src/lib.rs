#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Crime taxonomy and severity weighting.
//!
//! Every incident feed is normalized into [`CrimeSubcategory`], whose
//! [`CrimeSeverity`] decides how much a single incident contributes to the
//! risk surface through a [`SeverityWeights`] table.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Severity level for a crime, from 1 (minimal) to 5 (critical).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum CrimeSeverity {
    /// Non-criminal or nuisance incidents
    Minimal = 1,
    /// Petty theft, trespassing, disorderly conduct
    Low = 2,
    /// Burglary, vehicle theft, simple assault
    Moderate = 3,
    /// Robbery, aggravated assault, arson
    High = 4,
    /// Homicide, sexual assault
    Critical = 5,
}

impl CrimeSeverity {
    /// Numeric level (1-5).
    #[must_use]
    pub const fn value(self) -> u8 {
        self as u8
    }

    /// Creates a severity level from its numeric value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not in the range 1-5.
    pub const fn from_value(value: u8) -> Result<Self, InvalidSeverityError> {
        match value {
            1 => Ok(Self::Minimal),
            2 => Ok(Self::Low),
            3 => Ok(Self::Moderate),
            4 => Ok(Self::High),
            5 => Ok(Self::Critical),
            _ => Err(InvalidSeverityError { value }),
        }
    }

    /// All severity levels in ascending order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Minimal,
            Self::Low,
            Self::Moderate,
            Self::High,
            Self::Critical,
        ]
    }
}

/// Error returned for a severity value outside 1-5.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidSeverityError {
    /// The rejected value.
    pub value: u8,
}

impl std::fmt::Display for InvalidSeverityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid severity value {}: expected 1-5", self.value)
    }
}

impl std::error::Error for InvalidSeverityError {}

/// How much one incident of each severity contributes to local risk density.
///
/// The defaults roughly double per level above `Moderate` and halve below
/// it, so a single robbery outweighs four shopliftings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityWeights {
    /// Weight for [`CrimeSeverity::Minimal`].
    pub minimal: f64,
    /// Weight for [`CrimeSeverity::Low`].
    pub low: f64,
    /// Weight for [`CrimeSeverity::Moderate`].
    pub moderate: f64,
    /// Weight for [`CrimeSeverity::High`].
    pub high: f64,
    /// Weight for [`CrimeSeverity::Critical`].
    pub critical: f64,
}

impl Default for SeverityWeights {
    fn default() -> Self {
        Self {
            minimal: 0.25,
            low: 0.5,
            moderate: 1.0,
            high: 2.0,
            critical: 3.0,
        }
    }
}

impl SeverityWeights {
    /// Returns the weight for the given severity.
    #[must_use]
    pub const fn weight(&self, severity: CrimeSeverity) -> f64 {
        match severity {
            CrimeSeverity::Minimal => self.minimal,
            CrimeSeverity::Low => self.low,
            CrimeSeverity::Moderate => self.moderate,
            CrimeSeverity::High => self.high,
            CrimeSeverity::Critical => self.critical,
        }
    }

    /// Whether every weight is finite, non-negative and non-decreasing in
    /// severity.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        let weights: Vec<f64> = CrimeSeverity::all()
            .iter()
            .map(|s| self.weight(*s))
            .collect();
        weights.iter().all(|w| w.is_finite() && *w >= 0.0)
            && weights.windows(2).all(|pair| pair[0] <= pair[1])
    }
}

/// Top-level crime groupings.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum CrimeCategory {
    /// Crimes against persons
    Violent,
    /// Crimes against property
    Property,
    /// Drug and narcotics offenses
    DrugNarcotics,
    /// Public order and quality-of-life offenses
    PublicOrder,
    /// Fraud and financial offenses
    FraudFinancial,
    /// Non-criminal or miscellaneous reports
    Other,
}

/// Specific crime types every source is mapped onto.
///
/// There is deliberately no catch-all variant: a raw type that cannot be
/// mapped makes the record malformed.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum CrimeSubcategory {
    // ── Violent ──────────────────────────────────────────
    /// Murder and non-negligent manslaughter
    Homicide,
    /// Forcible sexual offenses
    SexualAssault,
    /// Taking property by force or threat
    Robbery,
    /// Attack with intent to cause serious bodily harm
    AggravatedAssault,
    /// Minor physical altercation
    SimpleAssault,

    // ── Property ────────────────────────────────────────
    /// Unlawful entry to commit a felony or theft
    Burglary,
    /// Theft without force (shoplifting, pickpocketing)
    LarcenyTheft,
    /// Theft of a motor vehicle
    MotorVehicleTheft,
    /// Theft of a bicycle
    BicycleTheft,
    /// Intentional destruction of property by fire
    Arson,
    /// Willful damage of property
    Vandalism,

    // ── Drug/Narcotics ──────────────────────────────────
    /// Possession of controlled substances or paraphernalia
    DrugPossession,
    /// Manufacturing, distribution, or sale of controlled substances
    DrugSales,

    // ── Public Order ────────────────────────────────────
    /// Unlawful possession or use of weapons
    WeaponsViolation,
    /// Driving or operating under the influence
    Dui,
    /// Disturbing the peace, public intoxication
    DisorderlyConduct,
    /// Unlawful entry onto property
    Trespassing,

    // ── Fraud/Financial ─────────────────────────────────
    /// Fraud, forgery and identity theft
    Fraud,

    // ── Other ───────────────────────────────────────────
    /// Welfare checks, found property, informational reports
    NonCriminal,
}

impl CrimeSubcategory {
    /// Parent [`CrimeCategory`].
    #[must_use]
    pub const fn category(self) -> CrimeCategory {
        match self {
            Self::Homicide
            | Self::SexualAssault
            | Self::Robbery
            | Self::AggravatedAssault
            | Self::SimpleAssault => CrimeCategory::Violent,

            Self::Burglary
            | Self::LarcenyTheft
            | Self::MotorVehicleTheft
            | Self::BicycleTheft
            | Self::Arson
            | Self::Vandalism => CrimeCategory::Property,

            Self::DrugPossession | Self::DrugSales => CrimeCategory::DrugNarcotics,

            Self::WeaponsViolation | Self::Dui | Self::DisorderlyConduct | Self::Trespassing => {
                CrimeCategory::PublicOrder
            }

            Self::Fraud => CrimeCategory::FraudFinancial,

            Self::NonCriminal => CrimeCategory::Other,
        }
    }

    /// Severity used for risk weighting.
    ///
    /// Offenses that put someone on the street in physical danger rank above
    /// offenses against property or paperwork.
    #[must_use]
    pub const fn severity(self) -> CrimeSeverity {
        match self {
            Self::Homicide | Self::SexualAssault => CrimeSeverity::Critical,
            Self::Robbery | Self::AggravatedAssault | Self::WeaponsViolation | Self::Arson => {
                CrimeSeverity::High
            }
            Self::SimpleAssault
            | Self::Burglary
            | Self::MotorVehicleTheft
            | Self::DrugSales => CrimeSeverity::Moderate,
            Self::LarcenyTheft
            | Self::BicycleTheft
            | Self::Vandalism
            | Self::DrugPossession
            | Self::Dui
            | Self::DisorderlyConduct => CrimeSeverity::Low,
            Self::Trespassing | Self::Fraud | Self::NonCriminal => CrimeSeverity::Minimal,
        }
    }

    /// All subcategories belonging to `category`.
    #[must_use]
    pub fn for_category(category: CrimeCategory) -> Vec<Self> {
        Self::all()
            .iter()
            .copied()
            .filter(|sub| sub.category() == category)
            .collect()
    }

    /// Every variant, in declaration order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Homicide,
            Self::SexualAssault,
            Self::Robbery,
            Self::AggravatedAssault,
            Self::SimpleAssault,
            Self::Burglary,
            Self::LarcenyTheft,
            Self::MotorVehicleTheft,
            Self::BicycleTheft,
            Self::Arson,
            Self::Vandalism,
            Self::DrugPossession,
            Self::DrugSales,
            Self::WeaponsViolation,
            Self::Dui,
            Self::DisorderlyConduct,
            Self::Trespassing,
            Self::Fraud,
            Self::NonCriminal,
        ]
    }
}
