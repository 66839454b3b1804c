use crate::config::{Config, PostFilter};
use crate::error::QueryError;
use crate::geometry::projection::Projector;
use crate::geometry::wkt::region_to_planar_wkt;
use crate::models::geometry::Region;
use crate::models::layer::Layer;
use crate::models::query::{Feature, QueryResult};
use crate::notify::Notifier;
use crate::query::registry::SelectionRegistry;
use crate::traits::FeatureService;
use crate::wfs::request::{ExportFormat, ExportRequest, FeatureRequest, intersects_filter};
use regex::Regex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

/// Options for fetch mode.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Feature ids to leave out server side.
    pub excluded_ids: Vec<String>,
    /// Geometries of features without a server id, left out after fetching.
    pub excluded_geometries: Vec<geojson::Geometry>,
    /// Drop features matching the configured post filter.
    pub apply_post_filter: bool,
}

struct CompiledPostFilter {
    property: String,
    pattern: Regex,
}

/// Builds intersection filters and runs count, fetch and export requests.
pub struct SpatialQueryEngine {
    service: Arc<dyn FeatureService>,
    projector: Projector,
    output_srs: String,
    identify_limit: u64,
    post_filter: Option<CompiledPostFilter>,
    registry: SelectionRegistry,
    notifier: Notifier,
    synthetic_ids: AtomicU64,
}

impl SpatialQueryEngine {
    pub fn new(
        config: &Config,
        service: Arc<dyn FeatureService>,
        registry: SelectionRegistry,
        notifier: Notifier,
    ) -> anyhow::Result<Self> {
        let post_filter = config
            .post_filter
            .as_ref()
            .map(|PostFilter { property, pattern }| -> anyhow::Result<_> {
                Ok(CompiledPostFilter {
                    property: property.clone(),
                    pattern: Regex::new(pattern)?,
                })
            })
            .transpose()?;

        Ok(Self {
            service,
            projector: Projector::new(config.planar_crs),
            output_srs: config.output_srs.clone(),
            identify_limit: config.identify_feature_limit,
            post_filter,
            registry,
            notifier,
            synthetic_ids: AtomicU64::new(0),
        })
    }

    pub fn registry(&self) -> &SelectionRegistry {
        &self.registry
    }

    pub fn projector(&self) -> &Projector {
        &self.projector
    }

    /// GetFeature request for `layer` intersecting `region`.
    pub fn request_for(
        &self,
        layer: &Layer,
        region: &Region,
        excluded_ids: &[String],
    ) -> Result<FeatureRequest, QueryError> {
        let wkt = region_to_planar_wkt(region, &self.projector)?;
        Ok(FeatureRequest {
            type_name: layer.query_name().to_string(),
            srs_name: self.output_srs.clone(),
            cql_filter: intersects_filter(&wkt, excluded_ids),
        })
    }

    /// Count mode.
    pub async fn count(&self, layer: &Layer, region: &Region) -> Result<u64, QueryError> {
        self.count_excluding(layer, region, &[]).await
    }

    pub async fn count_excluding(
        &self,
        layer: &Layer,
        region: &Region,
        excluded_ids: &[String],
    ) -> Result<u64, QueryError> {
        let request = self.request_for(layer, region, excluded_ids)?;
        let hits = self.service.count(&request).await?;
        debug!(layer = %layer.id(), hits, "count query finished");
        Ok(hits)
    }

    /// Count mode bypassing cached hit counts, for export gating.
    pub async fn count_fresh(&self, layer: &Layer, region: &Region) -> Result<u64, QueryError> {
        let request = self.request_for(layer, region, &[])?;
        let hits = self.service.count_fresh(&request).await?;
        debug!(layer = %layer.id(), hits, "uncached count query finished");
        Ok(hits)
    }

    /// Fetch mode.
    pub async fn fetch(
        &self,
        layer: &Layer,
        region: &Region,
        options: &FetchOptions,
    ) -> Result<Vec<Feature>, QueryError> {
        let request = self.request_for(layer, region, &options.excluded_ids)?;
        let collection = self.service.fetch(&request).await?;

        let mut features: Vec<Feature> = collection
            .features
            .into_iter()
            .map(|f| {
                let (id, synthetic_id) = match f.id {
                    Some(geojson::feature::Id::String(s)) => (s, false),
                    Some(geojson::feature::Id::Number(n)) => (n.to_string(), false),
                    None => (self.synthetic_id(), true),
                };
                Feature {
                    id,
                    synthetic_id,
                    geometry: f.geometry,
                    properties: f.properties.unwrap_or_default(),
                }
            })
            .collect();

        if !options.excluded_geometries.is_empty() {
            features.retain(|f| {
                f.geometry
                    .as_ref()
                    .is_none_or(|g| !options.excluded_geometries.contains(g))
            });
        }

        if options.apply_post_filter {
            if let Some(filter) = &self.post_filter {
                let before = features.len();
                features.retain(|f| {
                    f.property_str(&filter.property)
                        .map(|value| !filter.pattern.is_match(&value))
                        .unwrap_or(true)
                });
                let dropped = before - features.len();
                if dropped > 0 {
                    info!(layer = %layer.id(), dropped, "post filter dropped features");
                    self.notifier.toast(format!(
                        "{} feature{} excluded by {}",
                        dropped,
                        if dropped == 1 { "" } else { "s" },
                        filter.property
                    ));
                }
            }
        }
        Ok(features)
    }

    fn synthetic_id(&self) -> String {
        format!("_{}", self.synthetic_ids.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Count then, under the identify limit, fetch features; the outcome is
    /// written to the registry under the layer's id.
    pub async fn identify(&self, layer: &Layer, region: &Region) -> QueryResult {
        self.identify_with(layer, region, &FetchOptions::default())
            .await
    }

    /// Identify honouring exclusions and the post filter.
    pub async fn identify_with(
        &self,
        layer: &Layer,
        region: &Region,
        options: &FetchOptions,
    ) -> QueryResult {
        let ticket = self.registry.begin(layer, region);
        let mut result = QueryResult::pending(layer.clone(), region.clone(), ticket);

        match self.identify_inner(layer, region, options).await {
            Ok((count, features)) => {
                result.num_features = count as i64;
                result.features = features;
            }
            Err(e) => {
                warn!(layer = %layer.id(), error = %e, "identify query failed");
                result.error = Some(e.to_string());
            }
        }
        result.is_loading = false;
        self.registry.complete(result.clone());
        result
    }

    async fn identify_inner(
        &self,
        layer: &Layer,
        region: &Region,
        options: &FetchOptions,
    ) -> Result<(u64, Vec<Feature>), QueryError> {
        let count = self
            .count_excluding(layer, region, &options.excluded_ids)
            .await?;
        if count == 0 || count > self.identify_limit {
            return Ok((count, Vec::new()));
        }
        let features = self.fetch(layer, region, options).await?;
        // the post filter may have dropped some
        Ok((features.len() as u64, features))
    }

    /// Fetch the ids of every matching feature and hand them to the bulk
    /// export endpoint, returning the server's relative download path.
    pub async fn export(
        &self,
        layer: &Layer,
        region: &Region,
        format: ExportFormat,
    ) -> Result<String, QueryError> {
        let features = self.fetch(layer, region, &FetchOptions::default()).await?;
        let total = features.len();
        let feature_ids: Vec<String> = features
            .iter()
            .filter_map(|f| f.server_id().map(str::to_string))
            .collect();
        let skipped = total - feature_ids.len();
        if skipped > 0 {
            warn!(layer = %layer.id(), skipped, "features without a server id left out of export");
            self.notifier.toast(format!(
                "{} of {} features in {} have no id and were left out of the export",
                skipped,
                total,
                layer.title
            ));
        }
        let request = ExportRequest {
            type_name: layer.query_name().to_string(),
            feature_ids,
            format,
        };
        self.service.export(&request).await
    }
}
