use crate::error::QueryError;
use crate::models::geometry::{GeometryExtent, Region};
use crate::models::layer::Layer;
use crate::query::engine::SpatialQueryEngine;
use crate::wfs::request::ExportFormat;
use futures::future::join_all;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Readiness {
    Ready,
    /// Nothing selected.
    Empty,
    /// Some layers have no count for the current selection yet.
    Pending { missing: Vec<String> },
    /// Some layers exceed the feature ceiling.
    OverCeiling { layers: Vec<(String, u64)> },
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready)
    }
}

/// Layers, bounds and epoch captured for one count aggregation.
#[derive(Debug, Clone)]
pub struct AggregationJob {
    pub epoch: u64,
    pub region: Region,
    pub layers: Vec<Layer>,
}

#[derive(Debug)]
pub struct AggregationOutcome {
    pub epoch: u64,
    pub counts: Vec<(String, Result<u64, QueryError>)>,
}

impl AggregationJob {
    /// One count query per layer, all in flight at once, joined before
    /// returning. Cached hit counts are not used.
    pub async fn run(self, engine: &SpatialQueryEngine) -> AggregationOutcome {
        let region = &self.region;
        let counts = join_all(self.layers.iter().map(|layer| async move {
            (layer.id(), engine.count_fresh(layer, region).await)
        }))
        .await;
        AggregationOutcome {
            epoch: self.epoch,
            counts,
        }
    }
}

/// Layer set selected for bulk export and their cached feature counts.
#[derive(Debug, Clone)]
pub struct ExportSelection {
    layers: BTreeMap<String, Layer>,
    counts: HashMap<String, u64>,
    errors: HashMap<String, String>,
    bounds: Option<GeometryExtent>,
    ceiling: u64,
    epoch: u64,
}

impl ExportSelection {
    pub fn new(ceiling: u64) -> Self {
        ExportSelection {
            layers: BTreeMap::new(),
            counts: HashMap::new(),
            errors: HashMap::new(),
            bounds: None,
            ceiling,
            epoch: 0,
        }
    }

    pub fn ceiling(&self) -> u64 {
        self.ceiling
    }

    pub fn bounds(&self) -> Option<GeometryExtent> {
        self.bounds
    }

    pub fn layers(&self) -> impl Iterator<Item = &Layer> {
        self.layers.values()
    }

    pub fn count(&self, key: &str) -> Option<u64> {
        self.counts.get(key).copied()
    }

    pub fn error(&self, key: &str) -> Option<&str> {
        self.errors.get(key).map(String::as_str)
    }

    /// The new layer has no count until the next aggregation.
    pub fn add_layer(&mut self, layer: Layer) {
        let key = layer.id();
        self.counts.remove(&key);
        self.errors.remove(&key);
        self.layers.insert(key, layer);
        self.epoch += 1;
    }

    pub fn remove_layer(&mut self, key: &str) -> Option<Layer> {
        self.counts.remove(key);
        self.errors.remove(key);
        let removed = self.layers.remove(key);
        self.epoch += 1;
        removed
    }

    /// New bounds invalidate every cached count.
    pub fn set_bounds(&mut self, bounds: GeometryExtent) {
        if self.bounds == Some(bounds) {
            return;
        }
        self.bounds = Some(bounds);
        self.counts.clear();
        self.errors.clear();
        self.epoch += 1;
    }

    /// Snapshot for an aggregation run; `None` without bounds or layers.
    pub fn job(&self) -> Option<AggregationJob> {
        let bounds = self.bounds?;
        if self.layers.is_empty() {
            return None;
        }
        Some(AggregationJob {
            epoch: self.epoch,
            region: Region::BBox(bounds),
            layers: self.layers.values().cloned().collect(),
        })
    }

    /// Store aggregated counts. Outcomes from an older selection are ignored.
    pub fn apply(&mut self, outcome: AggregationOutcome) -> bool {
        if outcome.epoch != self.epoch {
            debug!(
                outcome_epoch = outcome.epoch,
                current_epoch = self.epoch,
                "discarding stale count aggregation"
            );
            return false;
        }
        for (key, count) in outcome.counts {
            match count {
                Ok(count) => {
                    self.errors.remove(&key);
                    self.counts.insert(key, count);
                }
                Err(e) => {
                    warn!(layer = %key, error = %e, "count query failed, layer stays unknown");
                    self.counts.remove(&key);
                    self.errors.insert(key, e.to_string());
                }
            }
        }
        true
    }

    pub fn readiness(&self) -> Readiness {
        if self.layers.is_empty() {
            return Readiness::Empty;
        }
        let missing: Vec<String> = self
            .layers
            .keys()
            .filter(|key| !self.counts.contains_key(*key))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Readiness::Pending { missing };
        }
        let over: Vec<(String, u64)> = self
            .layers
            .keys()
            .filter_map(|key| {
                let count = self.counts[key];
                (count > self.ceiling).then(|| (key.clone(), count))
            })
            .collect();
        if over.is_empty() {
            Readiness::Ready
        } else {
            Readiness::OverCeiling { layers: over }
        }
    }

    pub fn is_ready(&self) -> bool {
        self.readiness().is_ready()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportLink {
    pub layer: String,
    pub url: Option<String>,
    pub error: Option<String>,
}

/// Export every selected layer; only valid once the selection is ready.
pub async fn export_selection(
    engine: &SpatialQueryEngine,
    job: AggregationJob,
    format: ExportFormat,
    resolve: impl Fn(&str) -> String,
) -> Vec<ExportLink> {
    let region = &job.region;
    let results = join_all(job.layers.iter().map(|layer| async move {
        (layer.id(), engine.export(layer, region, format).await)
    }))
    .await;

    results
        .into_iter()
        .map(|(layer, result)| match result {
            Ok(path) => ExportLink {
                layer,
                url: Some(resolve(&path)),
                error: None,
            },
            Err(e) => ExportLink {
                layer,
                url: None,
                error: Some(e.to_string()),
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::fixtures::sample;
    use crate::models::layer::LayerType;
    use crate::notify::Notifier;
    use crate::query::fake::FakeService;
    use crate::query::registry::SelectionRegistry;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn bounds() -> GeometryExtent {
        GeometryExtent::from((-71.2, 42.2, -70.9, 42.5))
    }

    fn engine(service: FakeService) -> SpatialQueryEngine {
        SpatialQueryEngine::new(
            &Config::default(),
            Arc::new(service),
            SelectionRegistry::default(),
            Notifier::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_over_ceiling_layer_flips_readiness() {
        let engine = engine(
            FakeService::default()
                .with_count("towns", 351)
                .with_count("parcels", 25_001),
        );
        let mut selection = ExportSelection::new(25_000);
        selection.set_bounds(bounds());
        selection.add_layer(sample("towns", "default", LayerType::Poly));
        assert_eq!(
            selection.readiness(),
            Readiness::Pending {
                missing: vec!["towns__default".to_string()]
            }
        );

        let outcome = selection.job().unwrap().run(&engine).await;
        assert!(selection.apply(outcome));
        assert!(selection.is_ready());

        selection.add_layer(sample("parcels", "default", LayerType::Poly));
        assert!(!selection.is_ready());
        let outcome = selection.job().unwrap().run(&engine).await;
        assert!(selection.apply(outcome));
        assert_eq!(
            selection.readiness(),
            Readiness::OverCeiling {
                layers: vec![("parcels__default".to_string(), 25_001)]
            }
        );

        selection.remove_layer("parcels__default");
        assert!(selection.is_ready());
    }

    #[tokio::test]
    async fn test_exactly_at_ceiling_is_ready() {
        let engine = engine(FakeService::default().with_count("towns", 25_000));
        let mut selection = ExportSelection::new(25_000);
        selection.set_bounds(bounds());
        selection.add_layer(sample("towns", "default", LayerType::Poly));
        let outcome = selection.job().unwrap().run(&engine).await;
        selection.apply(outcome);
        assert!(selection.is_ready());
    }

    #[tokio::test]
    async fn test_failed_count_means_not_ready() {
        let engine = engine(FakeService::default().with_count("towns", 10));
        let mut selection = ExportSelection::new(25_000);
        selection.set_bounds(bounds());
        selection.add_layer(sample("towns", "default", LayerType::Poly));
        selection.add_layer(sample("broken", "default", LayerType::Poly));
        let outcome = selection.job().unwrap().run(&engine).await;
        selection.apply(outcome);
        assert_eq!(
            selection.readiness(),
            Readiness::Pending {
                missing: vec!["broken__default".to_string()]
            }
        );
        assert!(selection.error("broken__default").is_some());
    }

    #[tokio::test]
    async fn test_bounds_change_invalidates_and_rejects_stale_outcome() {
        let engine = engine(FakeService::default().with_count("towns", 10));
        let mut selection = ExportSelection::new(25_000);
        selection.set_bounds(bounds());
        selection.add_layer(sample("towns", "default", LayerType::Poly));
        let job = selection.job().unwrap();

        selection.set_bounds(GeometryExtent::from((-71.0, 42.0, -70.0, 43.0)));
        let stale = job.run(&engine).await;
        assert!(!selection.apply(stale));
        assert_eq!(selection.count("towns__default"), None);
        assert!(!selection.is_ready());
    }

    #[tokio::test(start_paused = true)]
    async fn test_counts_run_concurrently() {
        let engine = engine(
            FakeService::default()
                .with_count("a", 1)
                .with_count("b", 2)
                .with_delay("a", 200)
                .with_delay("b", 200),
        );
        let mut selection = ExportSelection::new(25_000);
        selection.set_bounds(bounds());
        selection.add_layer(sample("a", "default", LayerType::Poly));
        selection.add_layer(sample("b", "default", LayerType::Poly));

        // paused clock: joined sleeps advance it by one delay, not two
        let started = tokio::time::Instant::now();
        let outcome = selection.job().unwrap().run(&engine).await;
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(200), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(400), "elapsed {:?}", elapsed);
        selection.apply(outcome);
        assert_eq!(selection.count("a__default"), Some(1));
        assert_eq!(selection.count("b__default"), Some(2));
    }

    #[test]
    fn test_empty_selection_is_not_ready() {
        let selection = ExportSelection::new(25_000);
        assert_eq!(selection.readiness(), Readiness::Empty);
        assert!(selection.job().is_none());
    }

    #[tokio::test]
    async fn test_export_selection_resolves_links() {
        let engine = engine(
            FakeService::default().with_features("towns", vec![(Some("towns.1"), json!({}))]),
        );
        let mut selection = ExportSelection::new(25_000);
        selection.set_bounds(bounds());
        selection.add_layer(sample("towns", "default", LayerType::Poly));
        let links = export_selection(
            &engine,
            selection.job().unwrap(),
            ExportFormat::Xlsx,
            |path| format!("https://dl.example.org{}", path),
        )
        .await;
        assert_eq!(links.len(), 1);
        assert_eq!(
            links[0].url.as_deref(),
            Some("https://dl.example.org/exports/towns.xlsx")
        );
    }
}
