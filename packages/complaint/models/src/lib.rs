#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Complaint report types, category taxonomy, and severity definitions.
//!
//! Reports are owned by the intake and workflow services. The heatmap
//! engine only reads them, so everything here is a plain data type that
//! can be deserialized from the report store or from an intake
//! notification.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Severity level for a complaint, from 1 (minimal) to 5 (critical).
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
pub enum ComplaintSeverity {
    /// Level 1: cosmetic issues, suggestions
    Minimal = 1,
    /// Level 2: inconvenience (litter, faded markings)
    Low = 2,
    /// Level 3: service disruption (blocked drain, broken light)
    Moderate = 3,
    /// Level 4: hazard to property or health (open manhole, sewage overflow)
    High = 4,
    /// Level 5: immediate danger to life
    Critical = 5,
}

impl ComplaintSeverity {
    /// Returns the numeric value of this severity level.
    #[must_use]
    pub const fn value(self) -> u8 {
        self as u8
    }

    /// Creates a severity level from a numeric value.
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
}

/// Error returned when attempting to create a [`ComplaintSeverity`] from an
/// invalid numeric value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidSeverityError {
    /// The invalid severity value that was provided.
    pub value: u8,
}

impl std::fmt::Display for InvalidSeverityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid severity value {}: expected 1-5", self.value)
    }
}

impl std::error::Error for InvalidSeverityError {}

/// Civic complaint categories.
///
/// Parsing is case-insensitive so that `"roads"`, `"ROADS"` and `"Roads"`
/// all resolve to [`ComplaintCategory::Roads`].
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
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ComplaintCategory {
    /// Garbage collection, littering, dumping
    Sanitation,
    /// Potholes, damaged pavement, road markings
    Roads,
    /// Water outages, leaks, contamination
    WaterSupply,
    /// Blocked drains and sewage overflow
    Sewerage,
    /// Power outages and exposed wiring
    Electricity,
    /// Broken or missing street lights
    StreetLights,
    /// Illegal occupation of public space
    Encroachment,
    /// Park and green-belt maintenance
    Parks,
    /// Noise nuisance
    Noise,
    /// Anything not fitting another category
    Other,
}

impl ComplaintCategory {
    /// Returns the severity assigned when a report arrives without one.
    #[must_use]
    pub const fn default_severity(self) -> ComplaintSeverity {
        match self {
            Self::Electricity | Self::Sewerage => ComplaintSeverity::High,
            Self::WaterSupply | Self::Roads => ComplaintSeverity::Moderate,
            Self::Sanitation | Self::StreetLights | Self::Encroachment => ComplaintSeverity::Low,
            Self::Parks | Self::Noise | Self::Other => ComplaintSeverity::Minimal,
        }
    }

    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Sanitation,
            Self::Roads,
            Self::WaterSupply,
            Self::Sewerage,
            Self::Electricity,
            Self::StreetLights,
            Self::Encroachment,
            Self::Parks,
            Self::Noise,
            Self::Other,
        ]
    }
}

/// Workflow status of a complaint. Carried for completeness; the heatmap
/// counts reports regardless of status.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ComplaintStatus {
    /// Submitted and awaiting action.
    Open,
    /// Assigned and being worked on.
    InProgress,
    /// Closed as fixed.
    Resolved,
    /// Closed without action.
    Rejected,
}

/// Administrative entities a report was filed under.
///
/// Any of the references may be absent, e.g. a report geocoded only to
/// the city level.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JurisdictionRefs {
    /// City identifier.
    pub city_id: Option<String>,
    /// Town identifier.
    pub town_id: Option<String>,
    /// Union council identifier.
    pub union_council_id: Option<String>,
}

/// A geotagged citizen complaint as read from the report store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplaintReport {
    /// Primary key.
    pub id: i64,
    /// Latitude (WGS84).
    pub latitude: f64,
    /// Longitude (WGS84).
    pub longitude: f64,
    /// Complaint category.
    pub category: ComplaintCategory,
    /// Severity level.
    pub severity: ComplaintSeverity,
    /// Workflow status.
    pub status: ComplaintStatus,
    /// When the complaint was filed.
    pub created_at: DateTime<Utc>,
    /// Jurisdiction references.
    #[serde(default)]
    pub jurisdiction: JurisdictionRefs,
}
