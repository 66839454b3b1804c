pub mod feature_service;
pub mod map;

pub use feature_service::FeatureService;
pub use map::{ListenerId, MapBinding, MapEvent, MapEventKind, OverlayId, RenderLayer, RenderSource};
