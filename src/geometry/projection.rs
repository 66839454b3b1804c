use crate::error::ProjectionError;
use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};

/// WebMercator constants
const R_MAJOR: f64 = 6378137.0;
const MAX_LAT: f64 = 85.05112877980659; // Max bounds for Web Mercator

/// EPSG code of geographic lon/lat.
pub const GEOGRAPHIC_CRS: i32 = 4326;
/// NAD83 / Massachusetts Mainland, meters.
pub const STATE_PLANE_CRS: i32 = 26986;

// GRS80 ellipsoid
const GRS80_A: f64 = 6378137.0;
const GRS80_INV_F: f64 = 298.257222101;

// Lambert conformal conic (2SP) parameters of EPSG:26986
const LCC_LAT_1: f64 = 42.68333333333333;
const LCC_LAT_2: f64 = 41.71666666666667;
const LCC_LAT_0: f64 = 41.0;
const LCC_LON_0: f64 = -71.5;
const LCC_X_0: f64 = 200000.0;
const LCC_Y_0: f64 = 750000.0;

/// from longitude, latitude (degrees) → Web Mercator (x, y in meters)
pub fn lon_lat_to_mercator(lon: f64, lat: f64) -> (f64, f64) {
    // clamp latitude into Mercator’s valid range
    let clamped_lat = lat.clamp(-MAX_LAT, MAX_LAT);

    let x = lon * R_MAJOR * PI / 180.0;
    let lat_rad = clamped_lat * PI / 180.0;
    let y = R_MAJOR * ((PI / 4.0 + lat_rad / 2.0).tan().ln());
    (x, y)
}

/// from Web Mercator (x, y in meters) → longitude, latitude (degrees)
pub fn mercator_to_lon_lat(x: f64, y: f64) -> (f64, f64) {
    let lon = x / (R_MAJOR * PI / 180.0);
    let lat_rad = 2.0 * ((y / R_MAJOR).exp().atan()) - PI / 2.0;
    let lat = lat_rad * 180.0 / PI;
    (lon, lat)
}

struct Lcc {
    e: f64,
    n: f64,
    af: f64,
    rho0: f64,
}

fn lcc_m(e: f64, phi: f64) -> f64 {
    phi.cos() / (1.0 - e * e * phi.sin().powi(2)).sqrt()
}

fn lcc_t(e: f64, phi: f64) -> f64 {
    let es = e * phi.sin();
    (FRAC_PI_4 - phi / 2.0).tan() / ((1.0 - es) / (1.0 + es)).powf(e / 2.0)
}

fn lcc() -> Lcc {
    let f = 1.0 / GRS80_INV_F;
    let e = (2.0 * f - f * f).sqrt();
    let phi1 = LCC_LAT_1.to_radians();
    let phi2 = LCC_LAT_2.to_radians();
    let phi0 = LCC_LAT_0.to_radians();

    let (m1, m2) = (lcc_m(e, phi1), lcc_m(e, phi2));
    let (t1, t2, t0) = (lcc_t(e, phi1), lcc_t(e, phi2), lcc_t(e, phi0));

    let n = (m1.ln() - m2.ln()) / (t1.ln() - t2.ln());
    let af = GRS80_A * m1 / (n * t1.powf(n));
    Lcc {
        e,
        n,
        af,
        rho0: af * t0.powf(n),
    }
}

/// from longitude, latitude (degrees) → Massachusetts state plane (x, y in meters)
pub fn lon_lat_to_state_plane(lon: f64, lat: f64) -> (f64, f64) {
    let p = lcc();
    let rho = p.af * lcc_t(p.e, lat.to_radians()).powf(p.n);
    let theta = p.n * (lon - LCC_LON_0).to_radians();
    let x = LCC_X_0 + rho * theta.sin();
    let y = LCC_Y_0 + p.rho0 - rho * theta.cos();
    (x, y)
}

/// from Massachusetts state plane (x, y in meters) → longitude, latitude (degrees)
pub fn state_plane_to_lon_lat(x: f64, y: f64) -> (f64, f64) {
    let p = lcc();
    let dx = x - LCC_X_0;
    let dy = p.rho0 - (y - LCC_Y_0);
    let sign = p.n.signum();
    let rho = sign * (dx * dx + dy * dy).sqrt();
    let theta = (sign * dx).atan2(sign * dy);
    let t = (rho / p.af).powf(1.0 / p.n);

    let mut phi = FRAC_PI_2 - 2.0 * t.atan();
    for _ in 0..15 {
        let es = p.e * phi.sin();
        let next = FRAC_PI_2 - 2.0 * (t * ((1.0 - es) / (1.0 + es)).powf(p.e / 2.0)).atan();
        if (next - phi).abs() < 1e-14 {
            phi = next;
            break;
        }
        phi = next;
    }

    let lon = theta.to_degrees() / p.n + LCC_LON_0;
    (lon, phi.to_degrees())
}

/// Transforms between geographic coordinates and the planar CRS used for
/// WKT construction, union and buffering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Projector {
    planar_crs: i32,
}

impl Default for Projector {
    fn default() -> Self {
        Projector {
            planar_crs: STATE_PLANE_CRS,
        }
    }
}

impl Projector {
    pub fn new(planar_crs: i32) -> Self {
        Projector { planar_crs }
    }

    pub fn planar_crs(&self) -> i32 {
        self.planar_crs
    }

    /// lon/lat → planar; closed form for the built-in CRS, PROJ otherwise.
    pub fn to_planar(&self, lon: f64, lat: f64) -> Result<(f64, f64), ProjectionError> {
        match self.planar_crs {
            STATE_PLANE_CRS => Ok(lon_lat_to_state_plane(lon, lat)),
            3857 => Ok(lon_lat_to_mercator(lon, lat)),
            other => convert_with_proj(GEOGRAPHIC_CRS, other, (lon, lat)),
        }
    }

    /// planar → lon/lat
    pub fn to_geographic(&self, x: f64, y: f64) -> Result<(f64, f64), ProjectionError> {
        match self.planar_crs {
            STATE_PLANE_CRS => Ok(state_plane_to_lon_lat(x, y)),
            3857 => Ok(mercator_to_lon_lat(x, y)),
            other => convert_with_proj(other, GEOGRAPHIC_CRS, (x, y)),
        }
    }

    pub fn ring_to_planar(&self, ring: &[(f64, f64)]) -> Result<Vec<(f64, f64)>, ProjectionError> {
        ring.iter().map(|&(x, y)| self.to_planar(x, y)).collect()
    }
}

fn convert_with_proj(from: i32, to: i32, point: (f64, f64)) -> Result<(f64, f64), ProjectionError> {
    let from = format!("EPSG:{}", from);
    let to = format!("EPSG:{}", to);
    let proj = proj::Proj::new_known_crs(&from, &to, None).map_err(|e| ProjectionError::Setup {
        from: from.clone(),
        to: to.clone(),
        message: e.to_string(),
    })?;
    proj.convert(point).map_err(|e| ProjectionError::Convert {
        x: point.0,
        y: point.1,
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proj::Proj;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const EPS: f64 = 1e-6;
    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < EPS
    }

    #[test]
    fn test_random_lon_lat_to_mercator_vs_proj() {
        let proj_merc = Proj::new_known_crs("EPSG:4326", "EPSG:3857", None).unwrap();
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..1_000 {
            let lon = rng.random_range(-180.0..180.0);
            let lat = rng.random_range(-85.0..85.0);

            let (x1, y1) = lon_lat_to_mercator(lon, lat);
            let (x2, y2) = proj_merc.convert((lon, lat)).unwrap();

            assert!(approx_eq(x1, x2));
            assert!(approx_eq(y1, y2));
        }
    }

    #[test]
    fn test_lon_lat_to_mercator_clamps_lat_above_max() {
        let (x1, y1) = lon_lat_to_mercator(10.0, 90.0);
        let (x2, y2) = lon_lat_to_mercator(10.0, MAX_LAT);
        assert!(approx_eq(x1, x2));
        assert!(approx_eq(y1, y2));
    }

    // NAD83 geographic is the datum of EPSG:26986, so no datum shift is
    // involved in the comparison.
    #[test]
    fn test_random_lon_lat_to_state_plane_vs_proj() {
        let proj_sp = Proj::new_known_crs("EPSG:4269", "EPSG:26986", None)
            .expect("failed to init proj 4269→26986");
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..1_000 {
            let lon = rng.random_range(-73.5..-69.9);
            let lat = rng.random_range(41.2..42.9);

            let (x1, y1) = lon_lat_to_state_plane(lon, lat);
            let (x2, y2) = proj_sp.convert((lon, lat)).expect("proj convert failed");

            assert!((x1 - x2).abs() < 1e-3, "x mismatch: {} vs {}", x1, x2);
            assert!((y1 - y2).abs() < 1e-3, "y mismatch: {} vs {}", y1, y2);
        }
    }

    #[test]
    fn test_state_plane_origin() {
        let (x, y) = lon_lat_to_state_plane(LCC_LON_0, LCC_LAT_0);
        assert!((x - LCC_X_0).abs() < 1e-6);
        assert!((y - LCC_Y_0).abs() < 1e-6);
    }

    #[test]
    fn test_random_state_plane_round_trip() {
        let mut rng = StdRng::seed_from_u64(24);
        for _ in 0..1_000 {
            let lon = rng.random_range(-73.5..-69.9);
            let lat = rng.random_range(41.2..42.9);
            let (x, y) = lon_lat_to_state_plane(lon, lat);
            let (lon2, lat2) = state_plane_to_lon_lat(x, y);
            assert!((lon - lon2).abs() < 1e-9, "lon {} vs {}", lon, lon2);
            assert!((lat - lat2).abs() < 1e-9, "lat {} vs {}", lat, lat2);
        }
    }

    #[test]
    fn test_projector_uses_fast_path_for_builtin_crs() {
        let projector = Projector::default();
        assert_eq!(projector.planar_crs(), STATE_PLANE_CRS);
        let planar = projector.to_planar(-71.06, 42.36).unwrap();
        assert_eq!(planar, lon_lat_to_state_plane(-71.06, 42.36));
        let back = projector.to_geographic(planar.0, planar.1).unwrap();
        assert!((back.0 + 71.06).abs() < 1e-9);
        assert!((back.1 - 42.36).abs() < 1e-9);
    }
}
