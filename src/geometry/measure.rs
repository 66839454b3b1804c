use crate::error::{ProjectionError, QueryError};
use crate::geometry::projection::Projector;
use geo::{Area, Coord, Geometry, LineString, MapCoords};
use serde::Serialize;

/// Planar length and area of a drawn shape, in meters and square meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Measurement {
    pub length: f64,
    pub area: f64,
}

fn ring_length(line: &LineString<f64>) -> f64 {
    line.lines().map(|l| l.dx().hypot(l.dy())).sum()
}

/// Measure a geographic shape in the planar CRS. Polygons report their
/// perimeter as length.
pub fn measure(geometry: &geojson::Geometry, projector: &Projector) -> Result<Measurement, QueryError> {
    let geographic = Geometry::<f64>::try_from(geometry.clone())
        .map_err(|e| QueryError::Geometry(e.to_string()))?;
    let planar = geographic.try_map_coords(|c| -> Result<Coord<f64>, ProjectionError> {
        projector.to_planar(c.x, c.y).map(|(x, y)| Coord { x, y })
    })?;

    let length = match &planar {
        Geometry::Line(line) => line.dx().hypot(line.dy()),
        Geometry::LineString(line) => ring_length(line),
        Geometry::MultiLineString(lines) => lines.iter().map(ring_length).sum(),
        Geometry::Polygon(polygon) => ring_length(polygon.exterior()),
        Geometry::MultiPolygon(polygons) => polygons.iter().map(|p| ring_length(p.exterior())).sum(),
        _ => 0.0,
    };
    Ok(Measurement {
        length,
        area: planar.unsigned_area(),
    })
}
