use crate::config::Config;
use crate::error::{QueryError, SessionError};
use crate::geometry::buffer::{LinearUnit, buffered_outline};
use crate::map::headless::HeadlessMap;
use crate::map::history::ExtentHistory;
use crate::map::legend::Legend;
use crate::map::permalink::Permalink;
use crate::map::reconciler::{MapLayerReconciler, ReconcilePlan};
use crate::models::catalog::Catalog;
use crate::models::geometry::{GeometryExtent, Region};
use crate::models::layer::Layer;
use crate::models::query::QueryResult;
use crate::notify::{Notification, Notifier};
use crate::query::engine::{FetchOptions, SpatialQueryEngine};
use crate::query::export::{ExportLink, ExportSelection, Readiness, export_selection};
use crate::query::registry::SelectionRegistry;
use crate::tools::{
    Activation, ToolCommand, ToolContext, ToolController, ToolEffect, ToolId, ToolOutcome,
};
use crate::traits::{FeatureService, MapBinding, MapEvent};
use crate::wfs::WfsClient;
use crate::wfs::request::ExportFormat;
use futures::future::join_all;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Mutable interactive state. Only touched under the session lock, never
/// across an await.
pub struct Session {
    map: Box<dyn MapBinding>,
    legend: Legend,
    reconciler: MapLayerReconciler,
    tools: ToolController,
    history: ExtentHistory,
    export: ExportSelection,
    base_layer: Option<String>,
}

impl Session {
    fn with_tools<R>(
        &mut self,
        engine: &SpatialQueryEngine,
        notifier: &Notifier,
        f: impl FnOnce(&mut ToolController, &mut ToolContext<'_>) -> R,
    ) -> R {
        let Session {
            map,
            legend,
            tools,
            history,
            base_layer,
            ..
        } = self;
        let mut ctx = ToolContext {
            map: &mut **map,
            legend,
            history,
            projector: engine.projector(),
            notifier,
            base_layer: base_layer.as_deref(),
        };
        f(tools, &mut ctx)
    }

    fn reconcile(&mut self) -> Option<ReconcilePlan> {
        let enabled = self.legend.enabled();
        self.reconciler
            .reconcile_if_changed(self.legend.revision(), &enabled, &mut *self.map)
    }

    fn record_view(&mut self) {
        let bounds = self.map.bounds();
        if self.history.record(bounds) {
            debug!(?bounds, "view recorded");
        }
    }

    /// Enabled, queryable layers visible at the current scale, top first.
    fn identifiable_layers(&self) -> Vec<Layer> {
        let scale = self.map.scale();
        self.legend
            .enabled()
            .into_iter()
            .filter(|l| l.layer_type.is_queryable() && l.scale_ok(scale))
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum LegendChange {
    Add { key: String },
    Remove { key: String },
    Enable { key: String, enabled: bool },
    Move { key: String, index: usize },
}

#[derive(Debug, Clone, Serialize)]
pub struct LegendEntry {
    pub key: String,
    pub layer: Layer,
    pub scale_ok: bool,
    pub legend_graphic: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LegendState {
    pub entries: Vec<LegendEntry>,
    /// The reconcile pass the change triggered, if any.
    pub plan: Option<ReconcilePlan>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventReport {
    pub outcomes: Vec<(ToolId, ToolOutcome)>,
    pub results: Vec<QueryResult>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExportCountsRequest {
    #[serde(default)]
    pub bounds: Option<GeometryExtent>,
    /// Replaces the selected layer set when given.
    #[serde(default)]
    pub layers: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LayerCount {
    pub layer: String,
    pub count: Option<u64>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportStatus {
    pub readiness: Readiness,
    pub ceiling: u64,
    pub bounds: Option<GeometryExtent>,
    pub counts: Vec<LayerCount>,
}

/// Everything the application runs on, built once at startup and passed
/// by reference.
pub struct AppContext {
    config: Config,
    catalog: Catalog,
    page: Url,
    engine: Arc<SpatialQueryEngine>,
    notifier: Notifier,
    session: Mutex<Session>,
}

impl AppContext {
    pub fn new(
        config: Config,
        catalog: Catalog,
        service: Arc<dyn FeatureService>,
        mut map: Box<dyn MapBinding>,
    ) -> anyhow::Result<Self> {
        let notifier = Notifier::default();
        let registry = SelectionRegistry::default();
        let engine = Arc::new(SpatialQueryEngine::new(
            &config,
            service,
            registry,
            notifier.clone(),
        )?);
        let page = Url::parse(&config.public_url)?;
        let tools = ToolController::new(&config)?;

        map.set_view(config.initial_extent.center(), config.initial_zoom);
        let mut session = Session {
            map,
            legend: Legend::default(),
            reconciler: MapLayerReconciler::default(),
            tools,
            history: ExtentHistory::new(config.extent_history_limit),
            export: ExportSelection::new(config.export_feature_ceiling),
            base_layer: None,
        };
        session.record_view();
        if let Some(default) = session.tools.default_tool() {
            session.with_tools(&engine, &notifier, |tools, ctx| tools.activate(default, ctx))?;
        }

        info!(
            layers = catalog.layers.len(),
            service = %config.service_url,
            "application context ready"
        );
        Ok(AppContext {
            config,
            catalog,
            page,
            engine,
            notifier,
            session: Mutex::new(session),
        })
    }

    /// Production wiring: catalog file, WFS client and a headless map.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let catalog = match &config.catalog {
            Some(path) => Catalog::from_file(path)?,
            None => {
                warn!("no catalog configured, starting with an empty one");
                Catalog::default()
            }
        };
        let service = Arc::new(WfsClient::new(&config)?);
        Self::new(config, catalog, service, Box::new(HeadlessMap::default()))
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn engine(&self) -> &SpatialQueryEngine {
        &self.engine
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.notifier.drain()
    }

    pub fn selection(&self) -> Vec<QueryResult> {
        self.engine.registry().all()
    }

    fn catalog_layer(&self, key: &str) -> Result<Layer, SessionError> {
        self.catalog
            .get_by_key(key)
            .cloned()
            .ok_or_else(|| SessionError::UnknownLayer(key.to_string()))
    }

    fn legend_state(&self, session: &Session, plan: Option<ReconcilePlan>) -> LegendState {
        let scale = session.map.scale();
        let entries = session
            .legend
            .layers()
            .iter()
            .map(|layer| LegendEntry {
                key: layer.id(),
                scale_ok: layer.scale_ok(scale),
                legend_graphic: layer
                    .legend_graphic_url(&self.config.service_url)
                    .ok()
                    .map(|url| url.to_string()),
                layer: layer.clone(),
            })
            .collect();
        LegendState { entries, plan }
    }

    pub fn legend(&self) -> LegendState {
        let session = self.session();
        self.legend_state(&session, None)
    }

    /// Apply legend changes, then run one reconcile pass if anything moved.
    pub fn update_legend(&self, changes: &[LegendChange]) -> Result<LegendState, SessionError> {
        let mut session = self.session();
        for change in changes {
            match change {
                LegendChange::Add { key } => {
                    let layer = self.catalog_layer(key)?;
                    if !session.legend.add(layer) {
                        debug!(layer = %key, "already in the legend");
                    }
                }
                LegendChange::Remove { key } => {
                    if session.legend.remove(key).is_some() {
                        self.engine.registry().remove(key);
                    }
                }
                LegendChange::Enable { key, enabled } => {
                    session.legend.set_enabled(key, *enabled);
                }
                LegendChange::Move { key, index } => {
                    session.legend.move_to(key, *index);
                }
            }
        }
        let plan = session.reconcile();
        Ok(self.legend_state(&session, plan))
    }

    pub fn set_base_layer(&self, base: Option<String>) {
        self.session().base_layer = base;
    }

    pub fn tools(&self) -> Vec<crate::tools::ToolDescriptor> {
        self.session().tools.descriptors()
    }

    pub fn activate_tool(&self, id: ToolId) -> Result<Activation, SessionError> {
        let mut session = self.session();
        let activation =
            session.with_tools(&self.engine, &self.notifier, |tools, ctx| tools.activate(id, ctx))?;
        Ok(activation)
    }

    pub fn deactivate_tool(&self, id: ToolId, restore_default: bool) -> Result<(), SessionError> {
        let mut session = self.session();
        session.with_tools(&self.engine, &self.notifier, |tools, ctx| {
            tools.deactivate(id, restore_default, ctx)
        })?;
        Ok(())
    }

    pub fn set_abutters_distance(&self, distance: f64, unit: LinearUnit) {
        self.session().tools.set_abutters_distance(distance, unit);
    }

    /// Run an action tool and carry out what it asks of the host.
    pub fn trigger_tool(&self, id: ToolId, command: &ToolCommand) -> Result<ToolEffect, SessionError> {
        let mut session = self.session();
        let effect = session.with_tools(&self.engine, &self.notifier, |tools, ctx| {
            tools.trigger(id, command, ctx)
        })?;
        match &effect {
            ToolEffect::Moved { .. } => session.record_view(),
            ToolEffect::OpenExportWizard { bounds } => session.export.set_bounds(*bounds),
            ToolEffect::None
            | ToolEffect::CopyToClipboard { .. }
            | ToolEffect::Print { .. }
            | ToolEffect::OpenUrl { .. } => {}
        }
        Ok(effect)
    }

    /// Move the view as the user would and record it.
    pub fn set_view(&self, center: (f64, f64), zoom: f64) -> GeometryExtent {
        let mut session = self.session();
        session.map.set_view(center, zoom);
        session.record_view();
        session.map.bounds()
    }

    pub fn fit_view(&self, bounds: &GeometryExtent) -> GeometryExtent {
        let mut session = self.session();
        session.map.fit_bounds(bounds);
        session.record_view();
        session.map.bounds()
    }

    pub fn view(&self) -> GeometryExtent {
        self.session().map.bounds()
    }

    /// Route a map event through the active tools and run the queries
    /// their outcomes call for.
    pub async fn handle_event(&self, event: MapEvent) -> EventReport {
        let (outcomes, layers) = {
            let mut session = self.session();
            if event == MapEvent::MoveEnd {
                session.record_view();
                return EventReport {
                    outcomes: Vec::new(),
                    results: Vec::new(),
                };
            }
            let outcomes = session.with_tools(&self.engine, &self.notifier, |tools, ctx| {
                tools.handle_event(&event, ctx)
            });
            (outcomes, session.identifiable_layers())
        };

        let mut results = Vec::new();
        for (_, outcome) in &outcomes {
            match outcome {
                ToolOutcome::Identify { region } => {
                    results.extend(self.identify(&layers, region).await);
                }
                ToolOutcome::Abutters {
                    region,
                    parcels_layer,
                    distance,
                    unit,
                } => {
                    match self.abutters(region, parcels_layer, *distance, *unit).await {
                        Ok(result) => results.extend(result),
                        Err(e) => {
                            warn!(error = %e, "abutters query failed");
                            self.notifier.toast(format!("Abutters search failed: {}", e));
                        }
                    }
                }
                ToolOutcome::Measured { measurement, .. } => {
                    debug!(length = measurement.length, area = measurement.area, "measured");
                }
                ToolOutcome::Drawn { .. } | ToolOutcome::Coordinates { .. } => {}
            }
        }
        EventReport { outcomes, results }
    }

    fn mark_loading(&self, layers: &[Layer], loading: bool) {
        let mut session = self.session();
        for layer in layers {
            session.legend.set_loading(&layer.id(), loading);
        }
    }

    /// One identify per layer, all in flight together.
    async fn identify(&self, layers: &[Layer], region: &Region) -> Vec<QueryResult> {
        if layers.is_empty() {
            self.notifier.toast("No identifiable layers at this scale");
            return Vec::new();
        }
        self.mark_loading(layers, true);
        let results = join_all(layers.iter().map(|layer| self.engine.identify(layer, region))).await;
        self.mark_loading(layers, false);
        results
    }

    /// Parcels under the click, buffered and outlined on the map, then the
    /// parcels touching that buffer minus the ones picked.
    async fn abutters(
        &self,
        region: &Region,
        parcels: &Layer,
        distance: f64,
        unit: LinearUnit,
    ) -> Result<Option<QueryResult>, QueryError> {
        let filtered = FetchOptions {
            apply_post_filter: true,
            ..FetchOptions::default()
        };
        let picked = self.engine.fetch(parcels, region, &filtered).await?;
        if picked.is_empty() {
            self.notifier.toast("No parcels found at this location");
            return Ok(None);
        }

        let geometries: Vec<geojson::Geometry> =
            picked.iter().filter_map(|f| f.geometry.clone()).collect();
        let shape = buffered_outline(&geometries, self.engine.projector(), distance, unit)?;

        {
            let mut session = self.session();
            let overlay = session.map.add_overlay(shape.outline_geojson());
            if !session.tools.attach_overlay(ToolId::Abutters, overlay) {
                // tool went away while the parcels were loading
                session.map.remove_overlay(overlay);
            }
        }

        let Some(buffered) = shape.query_region else {
            return Ok(None);
        };
        // parcels without a server id can only be told apart by shape
        let (excluded_ids, excluded_geometries) = picked.into_iter().fold(
            (Vec::new(), Vec::new()),
            |(mut ids, mut geometries), parcel| {
                match (parcel.server_id().map(str::to_owned), parcel.geometry) {
                    (Some(id), _) => ids.push(id),
                    (None, Some(geometry)) => geometries.push(geometry),
                    (None, None) => {}
                }
                (ids, geometries)
            },
        );
        let options = FetchOptions {
            excluded_ids,
            excluded_geometries,
            apply_post_filter: true,
        };
        let result = self
            .engine
            .identify_with(parcels, &buffered, &options)
            .await;
        if result.count_known() {
            info!(abutters = result.num_features, distance, "abutters found");
        }
        Ok(Some(result))
    }

    /// Recount the export selection for its current bounds and layers.
    pub async fn export_counts(
        &self,
        request: ExportCountsRequest,
    ) -> Result<ExportStatus, SessionError> {
        let job = {
            let mut session = self.session();
            if let Some(bounds) = request.bounds {
                session.export.set_bounds(bounds);
            }
            if let Some(keys) = &request.layers {
                let selected: Vec<String> = session.export.layers().map(Layer::id).collect();
                for key in selected.iter().filter(|k| !keys.contains(*k)) {
                    session.export.remove_layer(key);
                }
                for key in keys.iter().filter(|k| !selected.contains(*k)) {
                    let layer = match session.legend.get(key) {
                        Some(layer) => layer.clone(),
                        None => self.catalog_layer(key)?,
                    };
                    session.export.add_layer(layer);
                }
            }
            session.export.job()
        };

        if let Some(job) = job {
            let outcome = job.run(&self.engine).await;
            self.session().export.apply(outcome);
        }
        Ok(self.export_status())
    }

    pub fn export_status(&self) -> ExportStatus {
        let session = self.session();
        let export = &session.export;
        ExportStatus {
            readiness: export.readiness(),
            ceiling: export.ceiling(),
            bounds: export.bounds(),
            counts: export
                .layers()
                .map(|layer| {
                    let key = layer.id();
                    LayerCount {
                        count: export.count(&key),
                        error: export.error(&key).map(str::to_string),
                        layer: key,
                    }
                })
                .collect(),
        }
    }

    /// Bulk export of every selected layer; refused until counts are in and
    /// under the ceiling.
    pub async fn export(&self, format: ExportFormat) -> Result<Vec<ExportLink>, SessionError> {
        let job = {
            let session = self.session();
            let readiness = session.export.readiness();
            if !readiness.is_ready() {
                return Err(SessionError::ExportNotReady(readiness));
            }
            session
                .export
                .job()
                .ok_or(SessionError::ExportNotReady(Readiness::Empty))?
        };
        let links = export_selection(&self.engine, job, format, |path| {
            self.config.download_url(path)
        })
        .await;
        let ready = links.iter().filter(|l| l.url.is_some()).count();
        self.notifier
            .toast(format!("{} of {} exports ready", ready, links.len()));
        Ok(links)
    }

    pub fn permalink(&self) -> String {
        let session = self.session();
        Permalink::from_view(
            session.base_layer.as_deref(),
            &session.legend,
            &*session.map,
        )
        .to_url(&self.page)
        .to_string()
    }

    /// Rebuild legend and view from a permalink query string. Layer keys
    /// missing from the catalog are skipped.
    pub fn restore_permalink(&self, query: &str) -> Result<LegendState, SessionError> {
        let mut url = self.page.clone();
        url.set_query(Some(query.trim_start_matches('?')));
        let permalink = Permalink::from_url(&url)?;

        let mut session = self.session();
        if permalink.base.is_some() {
            session.base_layer = permalink.base.clone();
        }
        // legend adds on top, so walk bottom up
        for key in permalink.layers.iter().rev() {
            match self.catalog.get_by_key(key) {
                Some(layer) => {
                    session.legend.add(layer.clone());
                }
                None => warn!(layer = %key, "permalink layer not in catalog"),
            }
        }
        if let Some(center) = permalink.center {
            let zoom = permalink.zoom.unwrap_or(self.config.initial_zoom);
            session.map.set_view(center, zoom);
            session.record_view();
        }
        let plan = session.reconcile();
        Ok(self.legend_state(&session, plan))
    }
}
