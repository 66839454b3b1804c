use crate::geometry::buffer::LinearUnit;
use crate::geometry::projection::STATE_PLANE_CRS;
use crate::models::geometry::GeometryExtent;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default ceiling on features per layer for bulk export.
pub const EXPORT_FEATURE_CEILING: u64 = 25_000;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AbuttersConfig {
    /// Name of the parcels layer the abutters tool queries.
    pub parcels_layer: String,
    pub default_distance: f64,
    pub unit: LinearUnit,
}

impl Default for AbuttersConfig {
    fn default() -> Self {
        AbuttersConfig {
            parcels_layer: "massgis:GISDATA.L3_TAXPAR_POLY_ASSESS".to_string(),
            default_distance: 0.0,
            unit: LinearUnit::Feet,
        }
    }
}

/// Fetched features whose `property` matches `pattern` are dropped.
#[derive(Debug, Clone, Deserialize)]
pub struct PostFilter {
    pub property: String,
    pub pattern: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// GeoServer base URL; `/wfs` and `/wms` are appended.
    pub service_url: String,
    /// Bulk export endpoint, `{service_url}/wfs` when unset.
    pub export_url: Option<String>,
    /// Host export paths are resolved against.
    pub download_host: String,
    pub catalog: Option<PathBuf>,
    /// Viewer page permalinks are built on.
    pub public_url: String,
    /// Opened by the help and logo buttons.
    pub help_url: String,
    pub home_url: String,
    pub port: u16,
    pub initial_extent: GeometryExtent,
    pub initial_zoom: f64,
    pub export_feature_ceiling: u64,
    /// Identify lists features only up to this count.
    pub identify_feature_limit: u64,
    pub planar_crs: i32,
    pub output_srs: String,
    pub request_timeout_secs: u64,
    /// Lifetime of cached hit counts, 0 disables the cache.
    pub count_cache_ttl_secs: u64,
    pub extent_history_limit: usize,
    pub abutters: AbuttersConfig,
    pub post_filter: Option<PostFilter>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            service_url: "https://giswebservices.massgis.state.ma.us/geoserver".to_string(),
            export_url: None,
            download_host: "https://giswebservices.massgis.state.ma.us".to_string(),
            catalog: None,
            public_url: "http://localhost:8000/".to_string(),
            help_url: "https://www.mass.gov/info-details/massgis-oliver-help".to_string(),
            home_url: "https://www.mass.gov/orgs/massgis-bureau-of-geographic-information".to_string(),
            port: 8000,
            initial_extent: GeometryExtent::from((-73.508, 41.237, -69.928, 42.886)),
            initial_zoom: 8.0,
            export_feature_ceiling: EXPORT_FEATURE_CEILING,
            identify_feature_limit: 1_000,
            planar_crs: STATE_PLANE_CRS,
            output_srs: "EPSG:4326".to_string(),
            request_timeout_secs: 30,
            count_cache_ttl_secs: 30,
            extent_history_limit: 100,
            abutters: AbuttersConfig::default(),
            post_filter: None,
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn wfs_url(&self) -> String {
        format!("{}/wfs", self.service_url.trim_end_matches('/'))
    }

    pub fn export_url(&self) -> String {
        self.export_url.clone().unwrap_or_else(|| self.wfs_url())
    }

    /// Resolve a relative export path against the download host.
    pub fn download_url(&self, relative: &str) -> String {
        format!(
            "{}/{}",
            self.download_host.trim_end_matches('/'),
            relative.trim_start_matches('/')
        )
    }
}
