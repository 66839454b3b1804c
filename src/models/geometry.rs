use serde::{Deserialize, Serialize};

/// Axis-aligned bounds. Geographic bounds are lon/lat degrees, planar bounds
/// are state plane meters; the type does not track which.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeometryExtent {
    pub minx: f64,
    pub miny: f64,
    pub maxx: f64,
    pub maxy: f64,
}

impl From<(f64, f64, f64, f64)> for GeometryExtent {
    fn from(extent: (f64, f64, f64, f64)) -> Self {
        GeometryExtent {
            minx: extent.0, // minx
            miny: extent.1, // miny
            maxx: extent.2, // maxx
            maxy: extent.3, // maxy
        }
    }
}

impl GeometryExtent {
    /// Build from two arbitrary corners, normalising the min/max order.
    pub fn from_corners(a: (f64, f64), b: (f64, f64)) -> Self {
        GeometryExtent {
            minx: a.0.min(b.0),
            miny: a.1.min(b.1),
            maxx: a.0.max(b.0),
            maxy: a.1.max(b.1),
        }
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.minx + self.maxx) / 2.0,
            (self.miny + self.maxy) / 2.0,
        )
    }

    pub fn width(&self) -> f64 {
        self.maxx - self.minx
    }

    pub fn height(&self) -> f64 {
        self.maxy - self.miny
    }

    /// Smallest extent covering every point, `None` when empty.
    pub fn enclosing<I: IntoIterator<Item = (f64, f64)>>(points: I) -> Option<Self> {
        points.into_iter().fold(None, |acc, (x, y)| {
            Some(match acc {
                None => GeometryExtent::from((x, y, x, y)),
                Some(e) => GeometryExtent {
                    minx: e.minx.min(x),
                    miny: e.miny.min(y),
                    maxx: e.maxx.max(x),
                    maxy: e.maxy.max(y),
                },
            })
        })
    }

    /// Closed ring walking x1y1 -> x1y2 -> x2y2 -> x2y1 -> x1y1.
    pub fn ring(&self) -> [(f64, f64); 5] {
        [
            (self.minx, self.miny),
            (self.minx, self.maxy),
            (self.maxx, self.maxy),
            (self.maxx, self.miny),
            (self.minx, self.miny),
        ]
    }

    pub fn contains(&self, other: &GeometryExtent) -> bool {
        self.minx <= other.minx
            && self.miny <= other.miny
            && self.maxx >= other.maxx
            && self.maxy >= other.maxy
    }
}

/// A request region expressed in geographic coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Region {
    BBox(GeometryExtent),
    /// Arbitrary ring, closed or not; closed on use.
    Polygon { ring: Vec<(f64, f64)> },
    /// Disjoint parts, one exterior ring each.
    MultiPolygon { rings: Vec<Vec<(f64, f64)>> },
}

fn close(ring: &[(f64, f64)]) -> Vec<(f64, f64)> {
    let mut ring = ring.to_vec();
    if let (Some(first), Some(last)) = (ring.first().copied(), ring.last().copied()) {
        if first != last {
            ring.push(first);
        }
    }
    ring
}

impl Region {
    /// Single part regions as a polygon, several as a multipolygon.
    pub fn from_rings(mut rings: Vec<Vec<(f64, f64)>>) -> Option<Self> {
        match rings.len() {
            0 => None,
            1 => rings.pop().map(|ring| Region::Polygon { ring }),
            _ => Some(Region::MultiPolygon { rings }),
        }
    }

    pub fn bounds(&self) -> Option<GeometryExtent> {
        match self {
            Region::BBox(extent) => Some(*extent),
            Region::Polygon { ring } => GeometryExtent::enclosing(ring.iter().copied()),
            Region::MultiPolygon { rings } => {
                GeometryExtent::enclosing(rings.iter().flatten().copied())
            }
        }
    }

    /// Every part as a closed ring; bboxes yield their 5 point ring.
    pub fn closed_rings(&self) -> Vec<Vec<(f64, f64)>> {
        match self {
            Region::BBox(extent) => vec![extent.ring().to_vec()],
            Region::Polygon { ring } => vec![close(ring)],
            Region::MultiPolygon { rings } => rings.iter().map(|ring| close(ring)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_is_closed_five_points() {
        let e = GeometryExtent::from_corners((-70.0, 42.5), (-71.0, 42.0));
        let ring = e.ring();
        assert_eq!(ring.len(), 5);
        assert_eq!(ring[0], ring[4]);
        assert_eq!(ring[0], (-71.0, 42.0));
        assert_eq!(ring[2], (-70.0, 42.5));
    }

    #[test]
    fn test_polygon_region_is_closed_on_use() {
        let region = Region::Polygon {
            ring: vec![(0.0, 0.0), (0.0, 1.0), (1.0, 1.0)],
        };
        let rings = region.closed_rings();
        assert_eq!(rings.len(), 1);
        let ring = &rings[0];
        assert_eq!(ring.len(), 4);
        assert_eq!(ring.first(), ring.last());
        assert_eq!(
            region.bounds(),
            Some(GeometryExtent::from((0.0, 0.0, 1.0, 1.0)))
        );
    }

    #[test]
    fn test_multipolygon_region_keeps_every_part() {
        let region = Region::from_rings(vec![
            vec![(0.0, 0.0), (0.0, 1.0), (1.0, 1.0)],
            vec![(5.0, 5.0), (5.0, 6.0), (6.0, 6.0), (5.0, 5.0)],
        ])
        .unwrap();
        let rings = region.closed_rings();
        assert_eq!(rings.len(), 2);
        assert!(rings.iter().all(|r| r.first() == r.last()));
        assert_eq!(
            region.bounds(),
            Some(GeometryExtent::from((0.0, 0.0, 6.0, 6.0)))
        );
    }

    #[test]
    fn test_from_rings_picks_variant() {
        assert!(Region::from_rings(Vec::new()).is_none());
        assert!(matches!(
            Region::from_rings(vec![vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0)]]),
            Some(Region::Polygon { .. })
        ));
    }

    #[test]
    fn test_enclosing_empty_is_none() {
        assert!(GeometryExtent::enclosing(Vec::new()).is_none());
    }
}
