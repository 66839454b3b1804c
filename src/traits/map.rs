use crate::error::MapError;
use crate::models::geometry::GeometryExtent;
use serde::{Deserialize, Serialize};

pub type ListenerId = u64;
pub type OverlayId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MapEventKind {
    Click,
    BoxDrawn,
    ShapeDrawn,
    MouseMove,
    MoveEnd,
}

/// Interaction delivered by the map surface, coordinates in lon/lat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MapEvent {
    Click { lon: f64, lat: f64 },
    BoxDrawn { bounds: GeometryExtent },
    ShapeDrawn { geometry: geojson::Geometry },
    MouseMove { lon: f64, lat: f64 },
    MoveEnd,
}

impl MapEvent {
    pub fn kind(&self) -> MapEventKind {
        match self {
            MapEvent::Click { .. } => MapEventKind::Click,
            MapEvent::BoxDrawn { .. } => MapEventKind::BoxDrawn,
            MapEvent::ShapeDrawn { .. } => MapEventKind::ShapeDrawn,
            MapEvent::MouseMove { .. } => MapEventKind::MouseMove,
            MapEvent::MoveEnd => MapEventKind::MoveEnd,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RenderSource {
    Tiled { url_template: String },
    Wms { url: String, layers: String, styles: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderLayer {
    pub id: String,
    pub pane: String,
    pub source: RenderSource,
}

/// Imperative map surface the core drives.
pub trait MapBinding: Send {
    fn create_pane(&mut self, name: &str);
    fn remove_pane(&mut self, name: &str) -> Result<(), MapError>;
    fn set_pane_z_index(&mut self, name: &str, z_index: i32) -> Result<(), MapError>;

    fn add_layer(&mut self, layer: RenderLayer);
    fn remove_layer(&mut self, id: &str) -> Result<(), MapError>;

    fn add_overlay(&mut self, geometry: geojson::Geometry) -> OverlayId;
    fn remove_overlay(&mut self, id: OverlayId);

    fn subscribe(&mut self, kind: MapEventKind) -> ListenerId;
    fn unsubscribe(&mut self, id: ListenerId);
    fn set_cursor(&mut self, cursor: Option<&str>);

    /// Current view in geographic coordinates.
    fn bounds(&self) -> GeometryExtent;
    fn zoom(&self) -> f64;
    /// Map scale denominator at the view center.
    fn scale(&self) -> f64;
    fn center(&self) -> (f64, f64);
    /// Viewport size in pixels.
    fn size(&self) -> (u32, u32);
    fn set_view(&mut self, center: (f64, f64), zoom: f64);
    fn fit_bounds(&mut self, bounds: &GeometryExtent);

    /// Recompute size and scale after layer changes.
    fn refresh(&mut self);
}
