use crate::error::ProjectionError;
use crate::geometry::projection::Projector;
use crate::models::geometry::{GeometryExtent, Region};

fn coords(ring: &[(f64, f64)]) -> String {
    ring.iter()
        .map(|(x, y)| format!("{} {}", x, y))
        .collect::<Vec<_>>()
        .join(", ")
}

fn ring_to_wkt(ring: &[(f64, f64)]) -> String {
    format!("POLYGON(({}))", coords(ring))
}

fn rings_to_multipolygon_wkt(rings: &[Vec<(f64, f64)>]) -> String {
    let parts = rings
        .iter()
        .map(|ring| format!("(({}))", coords(ring)))
        .collect::<Vec<_>>()
        .join(", ");
    format!("MULTIPOLYGON({})", parts)
}

/// WKT polygon of a planar bbox: x1y1, x1y2, x2y2, x2y1, x1y1.
pub fn bbox_to_wkt(extent: &GeometryExtent) -> String {
    ring_to_wkt(&extent.ring())
}

/// Project a geographic region into the planar CRS and express it as WKT.
///
/// A bbox is projected corner-wise and re-boxed so the ring stays at 5
/// points; polygons are projected vertex by vertex and closed, each part of
/// a multipolygon likewise.
pub fn region_to_planar_wkt(region: &Region, projector: &Projector) -> Result<String, ProjectionError> {
    match region {
        Region::BBox(extent) => {
            let a = projector.to_planar(extent.minx, extent.miny)?;
            let b = projector.to_planar(extent.maxx, extent.maxy)?;
            Ok(bbox_to_wkt(&GeometryExtent::from_corners(a, b)))
        }
        Region::Polygon { .. } | Region::MultiPolygon { .. } => {
            let rings = region
                .closed_rings()
                .iter()
                .map(|ring| projector.ring_to_planar(ring))
                .collect::<Result<Vec<_>, _>>()?;
            match rings.as_slice() {
                [single] if matches!(region, Region::Polygon { .. }) => Ok(ring_to_wkt(single)),
                _ => Ok(rings_to_multipolygon_wkt(&rings)),
            }
        }
    }
}
