//! `GeoJSON` rendering of grid cells for map clients.

use geojson::{Feature, FeatureCollection, Geometry, JsonObject, feature::Id};

use crate::{CellId, GeoBinner};

/// Renders a cell as a polygon feature with the given properties.
///
/// The feature id is the textual cell id.
#[must_use]
pub fn cell_feature(cell_id: CellId, properties: JsonObject) -> Feature {
    let cell = GeoBinner.cell(cell_id);
    let polygon = cell.bounds.to_polygon();

    Feature {
        bbox: None,
        geometry: Some(Geometry::new(geojson::Value::from(&polygon))),
        id: Some(Id::String(cell_id.to_string())),
        properties: Some(properties),
        foreign_members: None,
    }
}

/// Renders cells as a `FeatureCollection`, preserving input order.
pub fn cell_feature_collection(
    cells: impl IntoIterator<Item = (CellId, JsonObject)>,
) -> FeatureCollection {
    FeatureCollection {
        bbox: None,
        features: cells
            .into_iter()
            .map(|(cell_id, properties)| cell_feature(cell_id, properties))
            .collect(),
        foreign_members: None,
    }
}
