pub mod buffer;
pub mod measure;
pub mod projection;
pub mod wkt;

pub use buffer::{BufferedShape, LinearUnit};
pub use measure::Measurement;
pub use projection::Projector;
