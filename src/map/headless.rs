use crate::error::MapError;
use crate::geometry::projection::{lon_lat_to_mercator, mercator_to_lon_lat};
use crate::models::geometry::GeometryExtent;
use crate::traits::{ListenerId, MapBinding, MapEventKind, OverlayId, RenderLayer};
use std::collections::{BTreeMap, HashMap};
use std::f64::consts::PI;

const TILE_SIZE: f64 = 256.0;
const EARTH_CIRCUMFERENCE: f64 = 2.0 * PI * 6378137.0;
const METERS_PER_INCH: f64 = 0.0254;
const SCREEN_DPI: f64 = 96.0;

/// Scale denominator for a web mercator zoom at the given latitude.
pub fn scale_for_zoom(zoom: f64, lat: f64) -> f64 {
    let resolution = EARTH_CIRCUMFERENCE * lat.to_radians().cos() / (TILE_SIZE * 2f64.powf(zoom));
    resolution * SCREEN_DPI / METERS_PER_INCH
}

/// In-memory map surface. Keeps the same state a browser map would and
/// counts pane churn so reconcile passes can be checked.
#[derive(Debug)]
pub struct HeadlessMap {
    width: u32,
    height: u32,
    center: (f64, f64),
    zoom: f64,
    panes: HashMap<String, Option<i32>>,
    layers: Vec<RenderLayer>,
    overlays: BTreeMap<OverlayId, geojson::Geometry>,
    listeners: HashMap<ListenerId, MapEventKind>,
    cursor: Option<String>,
    next_id: u64,
    pane_creates: usize,
    pane_destroys: usize,
    refreshes: usize,
}

impl Default for HeadlessMap {
    fn default() -> Self {
        HeadlessMap::new(1024, 768, (-71.8, 42.1), 8.0)
    }
}

impl HeadlessMap {
    pub fn new(width: u32, height: u32, center: (f64, f64), zoom: f64) -> Self {
        HeadlessMap {
            width,
            height,
            center,
            zoom,
            panes: HashMap::new(),
            layers: Vec::new(),
            overlays: BTreeMap::new(),
            listeners: HashMap::new(),
            cursor: None,
            next_id: 0,
            pane_creates: 0,
            pane_destroys: 0,
            refreshes: 0,
        }
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    pub fn pane_z_index(&self, name: &str) -> Option<i32> {
        self.panes.get(name).copied().flatten()
    }

    pub fn pane_count(&self) -> usize {
        self.panes.len()
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn layers(&self) -> &[RenderLayer] {
        &self.layers
    }

    pub fn overlays(&self) -> impl Iterator<Item = (&OverlayId, &geojson::Geometry)> {
        self.overlays.iter()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn listens_to(&self, kind: MapEventKind) -> bool {
        self.listeners.values().any(|k| *k == kind)
    }

    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    pub fn pane_creates(&self) -> usize {
        self.pane_creates
    }

    pub fn pane_destroys(&self) -> usize {
        self.pane_destroys
    }

    pub fn refreshes(&self) -> usize {
        self.refreshes
    }

    fn resolution(&self) -> f64 {
        EARTH_CIRCUMFERENCE / (TILE_SIZE * 2f64.powf(self.zoom))
    }
}

impl MapBinding for HeadlessMap {
    fn create_pane(&mut self, name: &str) {
        self.panes.insert(name.to_string(), None);
        self.pane_creates += 1;
    }

    fn remove_pane(&mut self, name: &str) -> Result<(), MapError> {
        self.panes
            .remove(name)
            .map(|_| self.pane_destroys += 1)
            .ok_or_else(|| MapError::PaneMissing(name.to_string()))
    }

    fn set_pane_z_index(&mut self, name: &str, z_index: i32) -> Result<(), MapError> {
        let pane = self
            .panes
            .get_mut(name)
            .ok_or_else(|| MapError::PaneMissing(name.to_string()))?;
        *pane = Some(z_index);
        Ok(())
    }

    fn add_layer(&mut self, layer: RenderLayer) {
        self.layers.retain(|l| l.id != layer.id);
        self.layers.push(layer);
    }

    fn remove_layer(&mut self, id: &str) -> Result<(), MapError> {
        let before = self.layers.len();
        self.layers.retain(|l| l.id != id);
        if self.layers.len() == before {
            return Err(MapError::UnknownLayer(id.to_string()));
        }
        Ok(())
    }

    fn add_overlay(&mut self, geometry: geojson::Geometry) -> OverlayId {
        let id = self.next_id();
        self.overlays.insert(id, geometry);
        id
    }

    fn remove_overlay(&mut self, id: OverlayId) {
        self.overlays.remove(&id);
    }

    fn subscribe(&mut self, kind: MapEventKind) -> ListenerId {
        let id = self.next_id();
        self.listeners.insert(id, kind);
        id
    }

    fn unsubscribe(&mut self, id: ListenerId) {
        self.listeners.remove(&id);
    }

    fn set_cursor(&mut self, cursor: Option<&str>) {
        self.cursor = cursor.map(str::to_string);
    }

    fn bounds(&self) -> GeometryExtent {
        let (cx, cy) = lon_lat_to_mercator(self.center.0, self.center.1);
        let half_w = self.width as f64 / 2.0 * self.resolution();
        let half_h = self.height as f64 / 2.0 * self.resolution();
        let min = mercator_to_lon_lat(cx - half_w, cy - half_h);
        let max = mercator_to_lon_lat(cx + half_w, cy + half_h);
        GeometryExtent::from_corners(min, max)
    }

    fn zoom(&self) -> f64 {
        self.zoom
    }

    fn scale(&self) -> f64 {
        scale_for_zoom(self.zoom, self.center.1)
    }

    fn center(&self) -> (f64, f64) {
        self.center
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn set_view(&mut self, center: (f64, f64), zoom: f64) {
        self.center = center;
        self.zoom = zoom;
    }

    fn fit_bounds(&mut self, bounds: &GeometryExtent) {
        let (minx, miny) = lon_lat_to_mercator(bounds.minx, bounds.miny);
        let (maxx, maxy) = lon_lat_to_mercator(bounds.maxx, bounds.maxy);
        let span_x = (maxx - minx).max(f64::EPSILON);
        let span_y = (maxy - miny).max(f64::EPSILON);
        let zoom_x = (EARTH_CIRCUMFERENCE * self.width as f64 / (TILE_SIZE * span_x)).log2();
        let zoom_y = (EARTH_CIRCUMFERENCE * self.height as f64 / (TILE_SIZE * span_y)).log2();
        self.zoom = zoom_x.min(zoom_y);
        self.center = mercator_to_lon_lat((minx + maxx) / 2.0, (miny + maxy) / 2.0);
    }

    fn refresh(&mut self) {
        self.refreshes += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_for_zoom_at_equator() {
        // 156543.03 m/px at 96 dpi
        let scale = scale_for_zoom(0.0, 0.0);
        assert!((scale - 591_658_710.91).abs() < 1.0, "scale {}", scale);
        assert!((scale_for_zoom(1.0, 0.0) * 2.0 - scale).abs() < 1e-3);
    }

    #[test]
    fn test_fit_bounds_contains_requested_extent() {
        let mut map = HeadlessMap::default();
        let wanted = GeometryExtent::from((-71.2, 42.2, -70.9, 42.5));
        map.fit_bounds(&wanted);
        let shown = map.bounds();
        let pad = 1e-9;
        assert!(shown.minx <= wanted.minx + pad && shown.maxx >= wanted.maxx - pad);
        assert!(shown.miny <= wanted.miny + pad && shown.maxy >= wanted.maxy - pad);
    }

    #[test]
    fn test_pane_lifecycle() {
        let mut map = HeadlessMap::default();
        map.create_pane("a");
        assert_eq!(map.pane_z_index("a"), None);
        map.set_pane_z_index("a", 399).unwrap();
        assert_eq!(map.pane_z_index("a"), Some(399));
        map.remove_pane("a").unwrap();
        assert_eq!(
            map.remove_pane("a"),
            Err(MapError::PaneMissing("a".to_string()))
        );
        assert!(map.set_pane_z_index("a", 1).is_err());
    }
}
