use crate::models::layer::Layer;
use crate::traits::{MapBinding, RenderLayer, RenderSource};
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, error, warn};

/// Pane z-index of the top enabled layer; lower layers count down from it.
pub const TOP_PANE_Z_INDEX: i32 = 399;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconcilePlan {
    pub to_delete: Vec<String>,
    pub to_add: Vec<RenderLayer>,
    /// Pane z-index for every enabled layer, in enabled order.
    pub z_indices: Vec<(String, i32)>,
}

impl ReconcilePlan {
    pub fn is_noop(&self) -> bool {
        self.to_delete.is_empty() && self.to_add.is_empty()
    }
}

pub fn render_layer_for(layer: &Layer) -> RenderLayer {
    let id = layer.id();
    let source = if layer.layer_type.is_tiled() {
        RenderSource::Tiled {
            url_template: layer.src.clone(),
        }
    } else {
        RenderSource::Wms {
            url: layer.src.clone(),
            layers: layer.name.clone(),
            styles: layer.style.clone(),
        }
    };
    RenderLayer {
        pane: id.clone(),
        id,
        source,
    }
}

/// Diff the enabled layers against the live render layers.
pub fn plan(enabled: &[Layer], live: &[String]) -> ReconcilePlan {
    let enabled_keys: Vec<String> = enabled.iter().map(Layer::id).collect();
    let wanted: HashSet<&String> = enabled_keys.iter().collect();
    let present: HashSet<&String> = live.iter().collect();

    let to_delete = live
        .iter()
        .filter(|key| !wanted.contains(key))
        .cloned()
        .collect();
    let to_add = enabled
        .iter()
        .zip(&enabled_keys)
        .filter(|(_, key)| !present.contains(key))
        .map(|(layer, _)| render_layer_for(layer))
        .collect();
    let z_indices = enabled_keys
        .into_iter()
        .enumerate()
        .map(|(index, key)| (key, TOP_PANE_Z_INDEX - index as i32))
        .collect();

    ReconcilePlan {
        to_delete,
        to_add,
        z_indices,
    }
}

/// Owns the set of live render layers; only its own passes change it.
#[derive(Debug, Default)]
pub struct MapLayerReconciler {
    live: Vec<String>,
    applied_revision: Option<u64>,
}

impl MapLayerReconciler {
    pub fn live(&self) -> &[String] {
        &self.live
    }

    /// Run a pass only when the legend revision moved since the last one.
    pub fn reconcile_if_changed(
        &mut self,
        revision: u64,
        enabled: &[Layer],
        map: &mut dyn MapBinding,
    ) -> Option<ReconcilePlan> {
        if self.applied_revision == Some(revision) {
            return None;
        }
        let applied = self.reconcile(enabled, map);
        self.applied_revision = Some(revision);
        Some(applied)
    }

    /// One diff pass: deletions, additions, z-order, then a view refresh.
    pub fn reconcile(&mut self, enabled: &[Layer], map: &mut dyn MapBinding) -> ReconcilePlan {
        let plan = plan(enabled, &self.live);

        for key in &plan.to_delete {
            if let Err(e) = map.remove_layer(key) {
                warn!(layer = %key, error = %e, "render layer already gone");
            }
            if let Err(e) = map.remove_pane(key) {
                error!(pane = %key, error = %e, "pane to destroy is missing");
            }
            self.live.retain(|live| live != key);
        }

        for layer in &plan.to_add {
            map.create_pane(&layer.pane);
            map.add_layer(layer.clone());
            self.live.push(layer.id.clone());
        }

        for (pane, z_index) in &plan.z_indices {
            if let Err(e) = map.set_pane_z_index(pane, *z_index) {
                error!(pane = %pane, error = %e, "cannot order pane");
            }
        }

        map.refresh();
        debug!(
            added = plan.to_add.len(),
            deleted = plan.to_delete.len(),
            live = self.live.len(),
            "reconciled map layers"
        );
        plan
    }
}
