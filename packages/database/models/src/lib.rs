#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Filter and pagination types for reading complaints from the report
//! store.
//!
//! A [`ComplaintFilter`] is the AND of a time cutoff, a category filter
//! and a geographic predicate. Store implementations may push any part of
//! it down into their native query language, but [`ComplaintFilter::matches`]
//! is the authoritative definition.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use complaint_map_complaint_models::{ComplaintCategory, ComplaintReport};
use complaint_map_geography_models::JurisdictionPredicate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longest category string accepted from a caller.
pub const MAX_CATEGORY_LEN: usize = 64;

/// Error returned for a category string that cannot be a category name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidCategoryError {
    /// Longer than [`MAX_CATEGORY_LEN`].
    #[error("category is longer than {MAX_CATEGORY_LEN} characters")]
    TooLong,
    /// Contains control characters.
    #[error("category contains control characters")]
    ControlCharacters,
}

/// Category dimension of a complaint filter.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase", tag = "type", content = "value")]
pub enum CategoryFilter {
    /// Every category.
    #[default]
    All,
    /// Exactly one category.
    Only(ComplaintCategory),
    /// A well-formed name that is not a known category. Matches nothing.
    Unrecognized(String),
}

impl CategoryFilter {
    /// Parses a caller-supplied category.
    ///
    /// Absent, blank, or `"all"` (any case) mean [`CategoryFilter::All`].
    /// Known names parse case-insensitively. Anything else that is
    /// well-formed becomes [`CategoryFilter::Unrecognized`] (lowercased),
    /// which yields an empty result rather than an error.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidCategoryError`] if the value is too long or contains
    /// control characters.
    pub fn parse(raw: Option<&str>) -> Result<Self, InvalidCategoryError> {
        let Some(value) = raw.map(str::trim).filter(|v| !v.is_empty()) else {
            return Ok(Self::All);
        };

        if value.chars().count() > MAX_CATEGORY_LEN {
            return Err(InvalidCategoryError::TooLong);
        }
        if value.chars().any(char::is_control) {
            return Err(InvalidCategoryError::ControlCharacters);
        }
        if value.eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }

        Ok(value.parse::<ComplaintCategory>().map_or_else(
            |_| Self::Unrecognized(value.to_lowercase()),
            Self::Only,
        ))
    }

    /// Whether a category passes this filter.
    #[must_use]
    pub fn matches(&self, category: ComplaintCategory) -> bool {
        match self {
            Self::All => true,
            Self::Only(c) => *c == category,
            Self::Unrecognized(_) => false,
        }
    }

    /// Whether this filter can never match anything.
    #[must_use]
    pub const fn is_unsatisfiable(&self) -> bool {
        matches!(self, Self::Unrecognized(_))
    }
}

impl fmt::Display for CategoryFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Only(c) => write!(f, "{c}"),
            Self::Unrecognized(name) => f.write_str(name),
        }
    }
}

/// Geographic dimension of a complaint filter.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum GeoPredicate {
    /// No restriction (global scope).
    #[default]
    Unrestricted,
    /// Reports must fall inside the jurisdiction.
    Jurisdiction(Arc<JurisdictionPredicate>),
}

impl GeoPredicate {
    /// Whether a report passes this predicate.
    #[must_use]
    pub fn matches(&self, report: &ComplaintReport) -> bool {
        match self {
            Self::Unrestricted => true,
            Self::Jurisdiction(predicate) => predicate.matches(report),
        }
    }
}

/// The full set of predicates for one complaint scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplaintFilter {
    /// Only reports created at or after this instant.
    pub since: DateTime<Utc>,
    /// Category restriction.
    pub category: CategoryFilter,
    /// Geographic restriction.
    pub geo: GeoPredicate,
}

impl ComplaintFilter {
    /// Whether a report passes every predicate.
    #[must_use]
    pub fn matches(&self, report: &ComplaintReport) -> bool {
        report.created_at >= self.since
            && self.category.matches(report.category)
            && self.geo.matches(report)
    }
}

/// Keyset pagination cursor. Pages are ordered by `(created_at, id)`; the
/// next page starts strictly after the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PageCursor {
    /// Creation time of the last row of the previous page.
    pub created_at: DateTime<Utc>,
    /// Id of the last row of the previous page.
    pub id: i64,
}

impl From<&ComplaintReport> for PageCursor {
    fn from(report: &ComplaintReport) -> Self {
        Self {
            created_at: report.created_at,
            id: report.id,
        }
    }
}
