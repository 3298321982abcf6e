#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Administrative hierarchy and jurisdiction types.
//!
//! The hierarchy (city > town > union council) is maintained by an
//! external service. These types describe what the heatmap engine reads
//! from it and the normalized [`JurisdictionPredicate`] that profile
//! queries filter by.

use std::collections::BTreeSet;

use complaint_map_complaint_models::{ComplaintReport, JurisdictionRefs};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Level of an administrative entity in the hierarchy.
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
pub enum EntityKind {
    /// Top-level metropolitan entity.
    City,
    /// Town (or ward/department) inside a city.
    Town,
    /// Union council, the leaf level.
    UnionCouncil,
}

/// An entity of the administrative hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdministrativeEntity {
    /// Unique identifier, e.g. `"UC-12"`.
    pub id: String,
    /// Hierarchy level.
    pub kind: EntityKind,
    /// Parent entity, `None` for roots.
    pub parent_id: Option<String>,
    /// Human-readable name.
    pub name: String,
}

/// A typed reference to one administrative entity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JurisdictionRef {
    /// Level the identifier belongs to.
    pub kind: EntityKind,
    /// Entity identifier.
    pub id: String,
}

impl JurisdictionRef {
    /// Creates a reference.
    #[must_use]
    pub fn new(kind: EntityKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

impl From<&AdministrativeEntity> for JurisdictionRef {
    fn from(entity: &AdministrativeEntity) -> Self {
        Self::new(entity.kind, entity.id.clone())
    }
}

/// Membership test over a set of jurisdictions.
///
/// A report matches when any of its jurisdiction references is a member.
/// Resolving an entity collects the entity and all of its descendants, so
/// a city-level predicate matches reports filed under any of its towns or
/// union councils.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JurisdictionPredicate {
    members: BTreeSet<JurisdictionRef>,
}

impl JurisdictionPredicate {
    /// Creates a predicate from a set of members.
    #[must_use]
    pub fn new(members: impl IntoIterator<Item = JurisdictionRef>) -> Self {
        Self {
            members: members.into_iter().collect(),
        }
    }

    /// Adds a member. Returns `false` if it was already present.
    pub fn insert(&mut self, member: JurisdictionRef) -> bool {
        self.members.insert(member)
    }

    /// Iterates members in order.
    pub fn members(&self) -> impl Iterator<Item = &JurisdictionRef> {
        self.members.iter()
    }

    /// Member identifiers of the given kind.
    pub fn ids_of(&self, kind: EntityKind) -> impl Iterator<Item = &str> {
        self.members
            .iter()
            .filter(move |m| m.kind == kind)
            .map(|m| m.id.as_str())
    }

    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the predicate has no members (and so matches nothing).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Whether a set of report jurisdiction references falls inside.
    #[must_use]
    pub fn matches_refs(&self, refs: &JurisdictionRefs) -> bool {
        let candidates = [
            (EntityKind::City, refs.city_id.as_deref()),
            (EntityKind::Town, refs.town_id.as_deref()),
            (EntityKind::UnionCouncil, refs.union_council_id.as_deref()),
        ];

        candidates.into_iter().any(|(kind, id)| {
            id.is_some_and(|id| {
                self.members
                    .iter()
                    .any(|m| m.kind == kind && m.id == id)
            })
        })
    }

    /// Whether a report falls inside.
    #[must_use]
    pub fn matches(&self, report: &ComplaintReport) -> bool {
        self.matches_refs(&report.jurisdiction)
    }
}

/// The outcome of resolving a profile entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedScope {
    /// The entity that was resolved.
    pub entity: AdministrativeEntity,
    /// The entity plus all of its descendants.
    pub predicate: JurisdictionPredicate,
    /// Distance of the entity from its root (a city is 0).
    pub depth: u32,
}
