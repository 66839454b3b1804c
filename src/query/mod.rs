pub mod engine;
pub mod export;
pub mod registry;

pub use engine::{FetchOptions, SpatialQueryEngine};
pub use export::{ExportSelection, Readiness};
pub use registry::SelectionRegistry;
