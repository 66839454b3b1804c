use crate::config::Config;
use crate::error::ToolError;
use crate::geometry::buffer::LinearUnit;
use crate::traits::{MapEvent, OverlayId};
use reqwest::Url;
use serde::Serialize;
use tracing::{debug, error, info, trace, warn};

use super::tool::{Attachments, Tool, ToolDescriptor, ToolId, ToolState};
use super::variant::{ToolCommand, ToolContext, ToolEffect, ToolOutcome, ToolVariant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    Activated,
    /// The tool was already active; nothing happened.
    AlreadyActive,
}

/// Owns every tool and their activation state. At most one modal tool is
/// active at a time, and the default tool comes back when asked to.
#[derive(Debug, Clone)]
pub struct ToolController {
    tools: Vec<Tool>,
}

impl ToolController {
    /// The full toolbar, identify-by-point as default.
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let page = Url::parse(&config.public_url)?;
        let variants = vec![
            ToolVariant::IdentifyPoint,
            ToolVariant::IdentifyBox,
            ToolVariant::Measure,
            ToolVariant::Draw,
            ToolVariant::Abutters {
                parcels_layer: config.abutters.parcels_layer.clone(),
                distance: config.abutters.default_distance,
                unit: config.abutters.unit,
            },
            ToolVariant::ShowCoordinates,
            ToolVariant::ExportWizard,
            ToolVariant::Permalink { page },
            ToolVariant::ZoomToExtent {
                extent: config.initial_extent,
            },
            ToolVariant::Print,
            ToolVariant::Help {
                url: config.help_url.clone(),
            },
            ToolVariant::Logo {
                url: config.home_url.clone(),
            },
            ToolVariant::GeocodeAddress,
            ToolVariant::GeocodePlace,
            ToolVariant::ExtentHistory,
        ];
        Ok(Self::with_tools(variants, ToolId::IdentifyPoint))
    }

    pub fn with_tools(variants: Vec<ToolVariant>, default: ToolId) -> Self {
        let tools = variants
            .into_iter()
            .enumerate()
            .map(|(position, variant)| {
                let mut tool = Tool::new(position, variant);
                tool.is_default = tool.id() == default;
                tool
            })
            .collect();
        ToolController { tools }
    }

    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    pub fn get(&self, id: ToolId) -> Option<&Tool> {
        self.tools.iter().find(|t| t.id() == id)
    }

    fn index(&self, id: ToolId) -> Result<usize, ToolError> {
        self.tools
            .iter()
            .position(|t| t.id() == id)
            .ok_or_else(|| ToolError::Unknown(id.to_string()))
    }

    pub fn active_modal(&self) -> Vec<ToolId> {
        self.tools
            .iter()
            .filter(|t| t.is_active() && t.id().is_modal())
            .map(Tool::id)
            .collect()
    }

    pub fn default_tool(&self) -> Option<ToolId> {
        self.tools.iter().find(|t| t.is_default).map(Tool::id)
    }

    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools.iter().map(Tool::descriptor).collect()
    }

    /// Put tool `index` into `Inactive`, running its deactivate hook.
    fn release(&mut self, index: usize, ctx: &mut ToolContext<'_>) {
        let tool = &mut self.tools[index];
        let attachments = match std::mem::replace(&mut tool.state, ToolState::Inactive) {
            ToolState::Active(attachments) => attachments,
            ToolState::Inactive => Attachments::default(),
        };
        tool.variant.deactivate(ctx, attachments);
    }

    pub fn activate(
        &mut self,
        id: ToolId,
        ctx: &mut ToolContext<'_>,
    ) -> Result<Activation, ToolError> {
        let index = self.index(id)?;
        if !id.is_modal() {
            return Err(ToolError::NotModal(id.to_string()));
        }
        if self.tools[index].is_active() {
            trace!(tool = %id, "already active");
            return Ok(Activation::AlreadyActive);
        }

        let others: Vec<usize> = (0..self.tools.len())
            .filter(|&i| i != index && self.tools[i].id().is_modal() && self.tools[i].is_active())
            .collect();
        for other in others {
            debug!(tool = %self.tools[other].id(), "deactivating for {}", id);
            self.release(other, ctx);
        }

        let mut attachments = Attachments::default();
        let tool = &mut self.tools[index];
        match tool.variant.activate(ctx, &mut attachments) {
            Ok(()) => {
                tool.state = ToolState::Active(attachments);
                info!(tool = %id, "tool activated");
                Ok(Activation::Activated)
            }
            Err(e) => {
                warn!(tool = %id, error = %e, "activation failed, rolling back");
                tool.variant.deactivate(ctx, attachments);
                ctx.notifier.alert(e.to_string());
                self.restore_default(ctx, Some(id));
                Err(e)
            }
        }
    }

    /// Always runs the deactivate hook, active or not.
    pub fn deactivate(
        &mut self,
        id: ToolId,
        restore_default: bool,
        ctx: &mut ToolContext<'_>,
    ) -> Result<(), ToolError> {
        let index = self.index(id)?;
        if !id.is_modal() {
            return Err(ToolError::NotModal(id.to_string()));
        }
        self.release(index, ctx);
        info!(tool = %id, "tool deactivated");
        if restore_default {
            self.restore_default(ctx, None);
        }
        Ok(())
    }

    /// Bring the default tool back unless some modal tool is active.
    fn restore_default(&mut self, ctx: &mut ToolContext<'_>, failed: Option<ToolId>) {
        if !self.active_modal().is_empty() {
            return;
        }
        let Some(default) = self.default_tool() else {
            return;
        };
        if Some(default) == failed {
            return;
        }
        if let Err(e) = self.activate(default, ctx) {
            error!(tool = %default, error = %e, "cannot restore default tool");
        }
    }

    /// Deliver a map event to every active tool listening for its kind.
    pub fn handle_event(
        &mut self,
        event: &MapEvent,
        ctx: &mut ToolContext<'_>,
    ) -> Vec<(ToolId, ToolOutcome)> {
        let kind = event.kind();
        let mut outcomes = Vec::new();
        for tool in &mut self.tools {
            let id = tool.id();
            let ToolState::Active(attachments) = &mut tool.state else {
                continue;
            };
            if !attachments.listens_to(kind) {
                continue;
            }
            if let Some(outcome) = tool.variant.on_event(event, ctx, attachments) {
                outcomes.push((id, outcome));
            }
        }
        outcomes
    }

    pub fn trigger(
        &mut self,
        id: ToolId,
        command: &ToolCommand,
        ctx: &mut ToolContext<'_>,
    ) -> Result<ToolEffect, ToolError> {
        let index = self.index(id)?;
        self.tools[index].variant.trigger(command, ctx)
    }

    /// Hand an overlay to an active tool so its deactivation removes it.
    /// Returns false when the tool is no longer active.
    pub fn attach_overlay(&mut self, id: ToolId, overlay: OverlayId) -> bool {
        match self.tools.iter_mut().find(|t| t.id() == id) {
            Some(Tool {
                state: ToolState::Active(attachments),
                ..
            }) => {
                attachments.overlays.push(overlay);
                true
            }
            _ => false,
        }
    }

    pub fn set_abutters_distance(&mut self, new_distance: f64, new_unit: LinearUnit) -> bool {
        for tool in &mut self.tools {
            if let ToolVariant::Abutters { distance, unit, .. } = &mut tool.variant {
                *distance = new_distance.max(0.0);
                *unit = new_unit;
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::projection::Projector;
    use crate::map::headless::HeadlessMap;
    use crate::map::history::ExtentHistory;
    use crate::map::legend::Legend;
    use crate::models::fixtures::sample;
    use crate::models::geometry::{GeometryExtent, Region};
    use crate::models::layer::LayerType;
    use crate::notify::{Notification, Notifier};
    use crate::traits::{MapBinding, MapEventKind};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const PARCELS: &str = "massgis:GISDATA.L3_TAXPAR_POLY_ASSESS";

    struct Harness {
        map: HeadlessMap,
        legend: Legend,
        history: ExtentHistory,
        projector: Projector,
        notifier: Notifier,
    }

    impl Harness {
        fn new() -> Self {
            Harness {
                map: HeadlessMap::default(),
                legend: Legend::default(),
                history: ExtentHistory::default(),
                projector: Projector::default(),
                notifier: Notifier::default(),
            }
        }

        fn ctx(&mut self) -> ToolContext<'_> {
            ToolContext {
                map: &mut self.map,
                legend: &self.legend,
                history: &mut self.history,
                projector: &self.projector,
                notifier: &self.notifier,
                base_layer: Some("basemap"),
            }
        }
    }

    fn controller() -> ToolController {
        ToolController::new(&Config::default()).unwrap()
    }

    #[test]
    fn test_activate_is_exclusive_and_idempotent() {
        let mut h = Harness::new();
        let mut tools = controller();
        assert_eq!(
            tools.activate(ToolId::IdentifyPoint, &mut h.ctx()).unwrap(),
            Activation::Activated
        );
        assert_eq!(
            tools.activate(ToolId::IdentifyPoint, &mut h.ctx()).unwrap(),
            Activation::AlreadyActive
        );
        assert_eq!(h.map.listener_count(), 1);

        tools.activate(ToolId::Measure, &mut h.ctx()).unwrap();
        assert_eq!(tools.active_modal(), vec![ToolId::Measure]);
        assert_eq!(h.map.listener_count(), 1);
        assert!(h.map.listens_to(MapEventKind::ShapeDrawn));
        assert!(!h.map.listens_to(MapEventKind::Click));
    }

    #[test]
    fn test_random_sequences_keep_one_modal_tool_at_most() {
        let modal: Vec<ToolId> = ToolId::ALL.into_iter().filter(ToolId::is_modal).collect();
        let mut rng = StdRng::seed_from_u64(7);
        let mut h = Harness::new();
        h.legend.add(sample(PARCELS, "default", LayerType::Poly));
        let mut tools = controller();

        for _ in 0..500 {
            let id = modal[rng.random_range(0..modal.len())];
            if rng.random_bool(0.6) {
                tools.activate(id, &mut h.ctx()).unwrap();
            } else {
                let restore = rng.random_bool(0.5);
                tools.deactivate(id, restore, &mut h.ctx()).unwrap();
            }
            let active = tools.active_modal();
            assert!(active.len() <= 1, "{:?}", active);
            // every modal tool listens for exactly one event kind
            assert_eq!(h.map.listener_count(), active.len());
        }
    }

    #[test]
    fn test_deactivate_with_restore_brings_back_default() {
        let mut h = Harness::new();
        let mut tools = controller();
        tools.activate(ToolId::IdentifyBox, &mut h.ctx()).unwrap();
        assert_eq!(h.map.cursor(), Some("crosshair"));

        tools.deactivate(ToolId::IdentifyBox, true, &mut h.ctx()).unwrap();
        assert_eq!(tools.active_modal(), vec![ToolId::IdentifyPoint]);
        assert_eq!(h.map.cursor(), Some("help"));

        tools.deactivate(ToolId::IdentifyPoint, false, &mut h.ctx()).unwrap();
        assert!(tools.active_modal().is_empty());
        assert_eq!(h.map.cursor(), None);
        assert_eq!(h.map.listener_count(), 0);
    }

    #[test]
    fn test_missing_parcels_layer_rolls_back_and_alerts() {
        let mut h = Harness::new();
        let mut tools = controller();
        tools.activate(ToolId::Measure, &mut h.ctx()).unwrap();

        let err = tools.activate(ToolId::Abutters, &mut h.ctx()).unwrap_err();
        assert!(matches!(err, ToolError::MissingLayerReference { .. }));
        assert!(!tools.get(ToolId::Abutters).unwrap().is_active());
        // abutters hooks undone, default restored in place of measure
        assert_eq!(tools.active_modal(), vec![ToolId::IdentifyPoint]);
        assert_eq!(h.map.listener_count(), 1);
        assert_eq!(h.map.cursor(), Some("help"));
        assert!(matches!(
            h.notifier.drain().as_slice(),
            [Notification::Alert(message)] if message.contains(PARCELS)
        ));
    }

    #[test]
    fn test_abutters_click_carries_parcels_layer() {
        let mut h = Harness::new();
        h.legend.add(sample(PARCELS, "default", LayerType::Poly));
        let mut tools = controller();
        tools.set_abutters_distance(300.0, LinearUnit::Feet);
        tools.activate(ToolId::Abutters, &mut h.ctx()).unwrap();

        let outcomes = tools.handle_event(&MapEvent::Click { lon: -71.06, lat: 42.36 }, &mut h.ctx());
        match outcomes.as_slice() {
            [(ToolId::Abutters, ToolOutcome::Abutters { region, parcels_layer, distance, .. })] => {
                assert_eq!(parcels_layer.name, PARCELS);
                assert_eq!(*distance, 300.0);
                let bounds = region.bounds().unwrap();
                assert!(bounds.minx < -71.06 && bounds.maxx > -71.06);
            }
            other => panic!("unexpected outcomes {:?}", other),
        }
    }

    #[test]
    fn test_events_reach_only_listening_tools() {
        let mut h = Harness::new();
        let mut tools = controller();
        tools.activate(ToolId::IdentifyBox, &mut h.ctx()).unwrap();

        let click = MapEvent::Click { lon: -71.0, lat: 42.0 };
        assert!(tools.handle_event(&click, &mut h.ctx()).is_empty());

        let bounds = GeometryExtent::from((-71.1, 42.3, -71.0, 42.4));
        let outcomes = tools.handle_event(&MapEvent::BoxDrawn { bounds }, &mut h.ctx());
        assert_eq!(
            outcomes,
            vec![(
                ToolId::IdentifyBox,
                ToolOutcome::Identify {
                    region: Region::BBox(bounds)
                }
            )]
        );
    }

    #[test]
    fn test_draw_overlays_cleared_on_deactivate() {
        let mut h = Harness::new();
        let mut tools = controller();
        tools.activate(ToolId::Draw, &mut h.ctx()).unwrap();
        let shape = geojson::Geometry::new(geojson::Value::LineString(vec![
            vec![-71.0, 42.0],
            vec![-71.1, 42.1],
        ]));
        for _ in 0..3 {
            tools.handle_event(
                &MapEvent::ShapeDrawn {
                    geometry: shape.clone(),
                },
                &mut h.ctx(),
            );
        }
        assert_eq!(h.map.overlays().count(), 3);
        tools.activate(ToolId::IdentifyPoint, &mut h.ctx()).unwrap();
        assert_eq!(h.map.overlays().count(), 0);
    }

    #[test]
    fn test_action_tools_bypass_exclusivity() {
        let mut h = Harness::new();
        let mut tools = controller();
        tools.activate(ToolId::Measure, &mut h.ctx()).unwrap();

        let effect = tools
            .trigger(ToolId::ExportWizard, &ToolCommand::Run, &mut h.ctx())
            .unwrap();
        assert!(matches!(effect, ToolEffect::OpenExportWizard { .. }));

        let effect = tools
            .trigger(ToolId::Permalink, &ToolCommand::Run, &mut h.ctx())
            .unwrap();
        match effect {
            ToolEffect::CopyToClipboard { text } => {
                assert!(text.starts_with("http://localhost:8000/?bl=basemap"))
            }
            other => panic!("unexpected effect {:?}", other),
        }
        assert_eq!(
            h.notifier.drain(),
            vec![Notification::Toast("Permalink copied to clipboard".to_string())]
        );

        tools
            .trigger(ToolId::ZoomToExtent, &ToolCommand::Run, &mut h.ctx())
            .unwrap();
        assert_eq!(tools.active_modal(), vec![ToolId::Measure]);
        assert!(matches!(
            tools.activate(ToolId::Permalink, &mut h.ctx()),
            Err(ToolError::NotModal(_))
        ));
        assert!(matches!(
            tools.trigger(ToolId::Measure, &ToolCommand::Run, &mut h.ctx()),
            Err(ToolError::NotAction(_))
        ));
    }

    #[test]
    fn test_history_tool_navigates() {
        let mut h = Harness::new();
        let mut tools = controller();
        let first = GeometryExtent::from((-72.0, 42.0, -71.0, 42.5));
        h.history.record(first);
        h.history.record(GeometryExtent::from((-71.5, 42.1, -71.2, 42.3)));

        let effect = tools
            .trigger(ToolId::ExtentHistory, &ToolCommand::Back, &mut h.ctx())
            .unwrap();
        assert_eq!(effect, ToolEffect::Moved { extent: first });
        let effect = tools
            .trigger(ToolId::ExtentHistory, &ToolCommand::Back, &mut h.ctx())
            .unwrap();
        assert_eq!(effect, ToolEffect::None);
        assert!(matches!(
            tools.trigger(ToolId::ExtentHistory, &ToolCommand::Run, &mut h.ctx()),
            Err(ToolError::Command { .. })
        ));
    }

    #[test]
    fn test_geocode_moves_view_and_marks_location() {
        let mut h = Harness::new();
        let mut tools = controller();
        let command = ToolCommand::GoTo {
            lon: -70.66,
            lat: 41.55,
            zoom: None,
            label: Some("Woods Hole".to_string()),
        };
        tools
            .trigger(ToolId::GeocodePlace, &command, &mut h.ctx())
            .unwrap();
        assert_eq!(h.map.center(), (-70.66, 41.55));
        assert_eq!(h.map.zoom(), 13.0);
        assert_eq!(h.map.overlays().count(), 1);
    }

    #[test]
    fn test_descriptors_follow_position() {
        let tools = controller();
        let descriptors = tools.descriptors();
        assert_eq!(descriptors.len(), 15);
        assert!(descriptors.windows(2).all(|w| w[0].position < w[1].position));
        assert_eq!(descriptors.iter().filter(|d| d.is_default).count(), 1);
    }
}
