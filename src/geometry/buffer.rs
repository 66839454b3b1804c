use crate::error::{ProjectionError, QueryError};
use crate::geometry::projection::Projector;
use crate::models::geometry::Region;
use geo::{
    BooleanOps, Buffer, Coord, LineString, MapCoords, MultiLineString, MultiPolygon, Polygon,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinearUnit {
    #[default]
    Feet,
    Meters,
}

impl LinearUnit {
    pub fn to_meters(&self, distance: f64) -> f64 {
        match self {
            LinearUnit::Feet => distance * 0.3048,
            LinearUnit::Meters => distance,
        }
    }
}

/// Polygons of a GeoJSON geometry; other geometry kinds contribute nothing.
pub fn polygons_of(geometry: &geojson::Geometry) -> Result<Vec<Polygon<f64>>, QueryError> {
    let geom = geo::Geometry::<f64>::try_from(geometry.clone())
        .map_err(|e| QueryError::Geometry(e.to_string()))?;
    Ok(match geom {
        geo::Geometry::Polygon(p) => vec![p],
        geo::Geometry::MultiPolygon(mp) => mp.0,
        _ => Vec::new(),
    })
}

/// Union in the given order.
///
/// No canonical ordering is applied: the result follows server response
/// order, so floating point noise in the output may differ between two
/// responses holding the same parcels in a different order.
pub fn union_all(polygons: Vec<Polygon<f64>>) -> MultiPolygon<f64> {
    let mut iter = polygons.into_iter();
    let Some(first) = iter.next() else {
        return MultiPolygon::new(Vec::new());
    };
    iter.fold(MultiPolygon::new(vec![first]), |acc, next| acc.union(&next))
}

/// Grow `shape` by `distance` planar units. Zero skips the operation.
pub fn grow(shape: MultiPolygon<f64>, distance: f64) -> MultiPolygon<f64> {
    if distance == 0.0 {
        return shape;
    }
    shape.buffer(distance)
}

/// Exterior and interior rings as lines.
pub fn outline(shape: &MultiPolygon<f64>) -> MultiLineString<f64> {
    let lines: Vec<LineString<f64>> = shape
        .iter()
        .flat_map(|polygon| {
            std::iter::once(polygon.exterior().clone()).chain(polygon.interiors().iter().cloned())
        })
        .collect();
    MultiLineString::new(lines)
}

/// Buffered union of the selected parcels, back in geographic coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferedShape {
    /// Exterior and interior rings of the buffered union.
    pub outline: MultiLineString<f64>,
    /// Exterior rings of every part, used as the abutters query region.
    /// Holes are left out so enclosed parcels still count as abutters.
    pub query_region: Option<Region>,
}

impl BufferedShape {
    pub fn outline_geojson(&self) -> geojson::Geometry {
        geojson::Geometry::new(geojson::Value::from(&self.outline))
    }
}

/// Parcel geometries (geographic) -> outline of their buffered union (geographic).
pub fn buffered_outline(
    geometries: &[geojson::Geometry],
    projector: &Projector,
    distance: f64,
    unit: LinearUnit,
) -> Result<BufferedShape, QueryError> {
    let mut planar = Vec::new();
    for geometry in geometries {
        for polygon in polygons_of(geometry)? {
            planar.push(polygon.try_map_coords(|c| {
                projector
                    .to_planar(c.x, c.y)
                    .map(|(x, y)| Coord { x, y })
            })?);
        }
    }

    let shape = grow(union_all(planar), unit.to_meters(distance));
    let to_geographic = |c: Coord<f64>| -> Result<Coord<f64>, ProjectionError> {
        projector
            .to_geographic(c.x, c.y)
            .map(|(x, y)| Coord { x, y })
    };
    let line = outline(&shape).try_map_coords(to_geographic)?;

    let rings = shape
        .iter()
        .map(|part| {
            part.exterior()
                .coords()
                .map(|c| to_geographic(*c).map(|g| (g.x, g.y)))
                .collect::<Result<Vec<_>, _>>()
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(BufferedShape {
        outline: line,
        query_region: Region::from_rings(rings),
    })
}
