pub mod config;
pub mod context;
pub mod endpoints;
pub mod error;
pub mod geometry;
pub mod logging;
pub mod map;
pub mod models;
pub mod notify;
pub mod query;
pub mod server;
pub mod tools;
pub mod traits;
pub mod utils;
pub mod wfs;

pub use config::Config;
pub use context::AppContext;
pub use server::MapServer;
