#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Deterministic point-to-cell binning for complaint heatmaps.
//!
//! The grid is a set of equal-angle square cells anchored at
//! (-180, -90). At precision `p` there are `2^(p+7)` columns and `2^(p+6)`
//! rows, so each precision step halves the edge length and every cell
//! splits into exactly four children. Indices are derived by scaling one
//! normalized fraction by a power of two, which is exact in floating point,
//! so `row(p) == row(p + 1) / 2` holds for every input rather than only
//! approximately.

pub mod render;

use std::fmt;
use std::str::FromStr;

use geo::{Point, Rect, coord};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while binning points.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BinError {
    /// Precision outside `1..=9`.
    #[error("invalid precision {0}: expected 1-9")]
    InvalidPrecision(i64),

    /// Latitude or longitude is NaN or infinite.
    #[error("invalid coordinate ({lat}, {lon})")]
    InvalidCoordinate {
        /// Offending latitude.
        lat: f64,
        /// Offending longitude.
        lon: f64,
    },

    /// A cell id string could not be parsed.
    #[error("malformed cell id {0:?}")]
    MalformedCellId(String),

    /// Asked for the parent of a cell at a finer precision than the cell.
    #[error("precision {target} is finer than cell precision {cell}")]
    NotCoarser {
        /// Precision of the cell.
        cell: u8,
        /// Requested precision.
        target: u8,
    },
}

/// Grid resolution level. Higher values mean smaller cells.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "i64", into = "u8")]
pub struct Precision(u8);

impl Precision {
    /// Coarsest precision.
    pub const MIN: Self = Self(1);
    /// Finest precision.
    pub const MAX: Self = Self(9);
    /// Mid-range default.
    pub const DEFAULT: Self = Self(5);

    /// Creates a precision from a numeric value.
    ///
    /// # Errors
    ///
    /// Returns [`BinError::InvalidPrecision`] if the value is not in `1..=9`.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn new(value: i64) -> Result<Self, BinError> {
        if (i64::from(Self::MIN.0)..=i64::from(Self::MAX.0)).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(BinError::InvalidPrecision(value))
        }
    }

    /// Returns the numeric value.
    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }

    /// Number of grid columns at this precision.
    #[must_use]
    pub const fn columns(self) -> u32 {
        1 << (self.0 as u32 + 7)
    }

    /// Number of grid rows at this precision.
    #[must_use]
    pub const fn rows(self) -> u32 {
        1 << (self.0 as u32 + 6)
    }

    /// Cell edge length in degrees.
    #[must_use]
    pub fn edge_degrees(self) -> f64 {
        360.0 / f64::from(self.columns())
    }
}

impl Default for Precision {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<i64> for Precision {
    type Error = BinError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Precision> for u8 {
    fn from(value: Precision) -> Self {
        value.0
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique key of a grid cell.
///
/// The textual form is `P-RRRRR-CCCCC` with zero-padded row and column, so
/// lexical order of the strings agrees with the derived [`Ord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CellId {
    precision: Precision,
    row: u32,
    col: u32,
}

impl CellId {
    /// Precision the cell belongs to.
    #[must_use]
    pub const fn precision(self) -> Precision {
        self.precision
    }

    /// Row index, counted northwards from -90.
    #[must_use]
    pub const fn row(self) -> u32 {
        self.row
    }

    /// Column index, counted eastwards from -180.
    #[must_use]
    pub const fn col(self) -> u32 {
        self.col
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:05}-{:05}", self.precision, self.row, self.col)
    }
}

impl FromStr for CellId {
    type Err = BinError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || BinError::MalformedCellId(s.to_string());

        let mut parts = s.split('-');
        let (Some(p), Some(row), Some(col), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(malformed());
        };

        let precision = Precision::new(p.parse().map_err(|_| malformed())?)?;
        let row: u32 = row.parse().map_err(|_| malformed())?;
        let col: u32 = col.parse().map_err(|_| malformed())?;

        if row >= precision.rows() || col >= precision.columns() {
            return Err(malformed());
        }

        Ok(Self {
            precision,
            row,
            col,
        })
    }
}

impl TryFrom<String> for CellId {
    type Error = BinError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CellId> for String {
    fn from(value: CellId) -> Self {
        value.to_string()
    }
}

/// A grid cell with its geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoCell {
    /// Cell key.
    pub cell_id: CellId,
    /// Cell center (x = longitude, y = latitude).
    pub center: Point<f64>,
    /// Cell bounds.
    pub bounds: Rect<f64>,
}

impl GeoCell {
    /// Precision the cell belongs to.
    #[must_use]
    pub const fn precision(&self) -> Precision {
        self.cell_id.precision
    }
}

/// Maps coordinates to grid cells.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeoBinner;

impl GeoBinner {
    /// Returns the cell containing `(lat, lon)` at a raw precision value.
    ///
    /// # Errors
    ///
    /// * [`BinError::InvalidPrecision`] if `precision` is outside `1..=9`
    /// * [`BinError::InvalidCoordinate`] if either coordinate is not finite
    pub fn cell_of(self, lat: f64, lon: f64, precision: i64) -> Result<GeoCell, BinError> {
        self.cell_at(lat, lon, Precision::new(precision)?)
    }

    /// Returns the cell containing `(lat, lon)` at a validated precision.
    ///
    /// Longitude wraps into `[-180, 180)`; latitude is clipped into
    /// `[-90, 90]`.
    ///
    /// # Errors
    ///
    /// Returns [`BinError::InvalidCoordinate`] if either coordinate is not
    /// finite.
    pub fn cell_at(self, lat: f64, lon: f64, precision: Precision) -> Result<GeoCell, BinError> {
        if !lat.is_finite() || !lon.is_finite() {
            return Err(BinError::InvalidCoordinate { lat, lon });
        }

        let x = (wrap_longitude(lon) + 180.0) / 360.0;
        let y = (lat.clamp(-90.0, 90.0) + 90.0) / 180.0;

        let cell_id = CellId {
            precision,
            row: scale_to_index(y, precision.rows()),
            col: scale_to_index(x, precision.columns()),
        };

        Ok(self.cell(cell_id))
    }

    /// Builds the geometry for a cell id.
    #[must_use]
    pub fn cell(self, cell_id: CellId) -> GeoCell {
        let edge = cell_id.precision.edge_degrees();
        let west = f64::from(cell_id.col).mul_add(edge, -180.0);
        let south = f64::from(cell_id.row).mul_add(edge, -90.0);

        GeoCell {
            cell_id,
            center: Point::new(edge.mul_add(0.5, west), edge.mul_add(0.5, south)),
            bounds: Rect::new(
                coord! { x: west, y: south },
                coord! { x: west + edge, y: south + edge },
            ),
        }
    }

    /// Returns the ancestor of `cell_id` at a coarser (or equal) precision.
    ///
    /// # Errors
    ///
    /// Returns [`BinError::NotCoarser`] if `precision` is finer than the
    /// cell's own precision.
    pub fn parent_of(self, cell_id: CellId, precision: Precision) -> Result<CellId, BinError> {
        let Some(shift) = cell_id.precision.0.checked_sub(precision.0) else {
            return Err(BinError::NotCoarser {
                cell: cell_id.precision.0,
                target: precision.0,
            });
        };

        Ok(CellId {
            precision,
            row: cell_id.row >> shift,
            col: cell_id.col >> shift,
        })
    }
}

/// Wraps a longitude into `[-180, 180)`.
fn wrap_longitude(lon: f64) -> f64 {
    (lon + 180.0).rem_euclid(360.0) - 180.0
}

/// Scales a fraction in `[0, 1]` to a grid index in `[0, n)`. The closed
/// upper edge (and any rounding past it) lands in the last index.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn scale_to_index(fraction: f64, n: u32) -> u32 {
    let scaled = (fraction * f64::from(n)).floor();
    if scaled <= 0.0 {
        0
    } else if scaled >= f64::from(n) {
        n - 1
    } else {
        scaled as u32
    }
}
