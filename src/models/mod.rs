pub mod catalog;
pub mod geometry;
pub mod layer;
pub mod query;

pub use catalog::Catalog;
pub use geometry::{GeometryExtent, Region};
pub use layer::{Layer, LayerType};
pub use query::{Feature, QueryResult};
