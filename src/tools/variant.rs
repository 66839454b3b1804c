use crate::error::ToolError;
use crate::geometry::buffer::LinearUnit;
use crate::geometry::measure::{Measurement, measure};
use crate::geometry::projection::Projector;
use crate::map::history::ExtentHistory;
use crate::map::legend::Legend;
use crate::map::permalink::Permalink;
use crate::models::geometry::{GeometryExtent, Region};
use crate::models::layer::Layer;
use crate::notify::Notifier;
use crate::traits::{MapBinding, MapEvent, MapEventKind, OverlayId};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use super::tool::{Attachments, ToolId};

/// Click tolerance of the point tools, in screen pixels.
const CLICK_TOLERANCE_PX: f64 = 5.0;
const ADDRESS_ZOOM: f64 = 17.0;
const PLACE_ZOOM: f64 = 13.0;

/// What tool hooks may touch while they run.
pub struct ToolContext<'a> {
    pub map: &'a mut dyn MapBinding,
    pub legend: &'a Legend,
    pub history: &'a mut ExtentHistory,
    pub projector: &'a Projector,
    pub notifier: &'a Notifier,
    pub base_layer: Option<&'a str>,
}

/// Input for action tools.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ToolCommand {
    #[default]
    Run,
    Back,
    Forward,
    /// A geocoder candidate picked by the user.
    GoTo {
        lon: f64,
        lat: f64,
        #[serde(default)]
        zoom: Option<f64>,
        #[serde(default)]
        label: Option<String>,
    },
}

impl ToolCommand {
    fn name(&self) -> &'static str {
        match self {
            ToolCommand::Run => "run",
            ToolCommand::Back => "back",
            ToolCommand::Forward => "forward",
            ToolCommand::GoTo { .. } => "go_to",
        }
    }
}

/// What a modal tool made of a map event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ToolOutcome {
    Identify {
        region: Region,
    },
    Abutters {
        region: Region,
        parcels_layer: Layer,
        distance: f64,
        unit: LinearUnit,
    },
    Measured {
        overlay: OverlayId,
        measurement: Measurement,
    },
    Drawn {
        overlay: OverlayId,
    },
    Coordinates {
        lon: f64,
        lat: f64,
        x: f64,
        y: f64,
    },
}

/// Side effect of an action tool the host has to carry out.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum ToolEffect {
    None,
    /// The view was moved programmatically.
    Moved {
        extent: GeometryExtent,
    },
    OpenExportWizard {
        bounds: GeometryExtent,
    },
    CopyToClipboard {
        text: String,
    },
    Print {
        bounds: GeometryExtent,
        scale: f64,
        size: (u32, u32),
    },
    OpenUrl {
        url: String,
    },
}

/// Closed set of tools with the data each one carries.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolVariant {
    IdentifyPoint,
    IdentifyBox,
    Measure,
    Draw,
    Abutters {
        parcels_layer: String,
        distance: f64,
        unit: LinearUnit,
    },
    ShowCoordinates,
    ExportWizard,
    Permalink {
        page: Url,
    },
    ZoomToExtent {
        extent: GeometryExtent,
    },
    Print,
    Help {
        url: String,
    },
    Logo {
        url: String,
    },
    GeocodeAddress,
    GeocodePlace,
    ExtentHistory,
}

fn listen(ctx: &mut ToolContext<'_>, attachments: &mut Attachments, kind: MapEventKind) {
    let id = ctx.map.subscribe(kind);
    attachments.listeners.push((id, kind));
}

fn set_cursor(ctx: &mut ToolContext<'_>, attachments: &mut Attachments, cursor: &str) {
    ctx.map.set_cursor(Some(cursor));
    attachments.cursor = true;
}

/// Undo everything recorded in `attachments`.
fn release(ctx: &mut ToolContext<'_>, attachments: Attachments) {
    for (id, _) in attachments.listeners {
        ctx.map.unsubscribe(id);
    }
    for overlay in attachments.overlays {
        ctx.map.remove_overlay(overlay);
    }
    if attachments.cursor {
        ctx.map.set_cursor(None);
    }
}

/// Small box around a click, sized in screen pixels.
fn click_region(map: &dyn MapBinding, lon: f64, lat: f64) -> Region {
    let bounds = map.bounds();
    let (width, height) = map.size();
    let dx = bounds.width() / f64::from(width.max(1)) * CLICK_TOLERANCE_PX;
    let dy = bounds.height() / f64::from(height.max(1)) * CLICK_TOLERANCE_PX;
    Region::BBox(GeometryExtent::from((lon - dx, lat - dy, lon + dx, lat + dy)))
}

impl ToolVariant {
    pub fn id(&self) -> ToolId {
        match self {
            ToolVariant::IdentifyPoint => ToolId::IdentifyPoint,
            ToolVariant::IdentifyBox => ToolId::IdentifyBox,
            ToolVariant::Measure => ToolId::Measure,
            ToolVariant::Draw => ToolId::Draw,
            ToolVariant::Abutters { .. } => ToolId::Abutters,
            ToolVariant::ShowCoordinates => ToolId::ShowCoordinates,
            ToolVariant::ExportWizard => ToolId::ExportWizard,
            ToolVariant::Permalink { .. } => ToolId::Permalink,
            ToolVariant::ZoomToExtent { .. } => ToolId::ZoomToExtent,
            ToolVariant::Print => ToolId::Print,
            ToolVariant::Help { .. } => ToolId::Help,
            ToolVariant::Logo { .. } => ToolId::Logo,
            ToolVariant::GeocodeAddress => ToolId::GeocodeAddress,
            ToolVariant::GeocodePlace => ToolId::GeocodePlace,
            ToolVariant::ExtentHistory => ToolId::ExtentHistory,
        }
    }

    /// (label, icon, tooltip)
    pub fn render(&self) -> (&'static str, &'static str, &'static str) {
        match self {
            ToolVariant::IdentifyPoint => ("Identify", "info", "Identify features at a point"),
            ToolVariant::IdentifyBox => ("Identify box", "select", "Identify features in a box"),
            ToolVariant::Measure => ("Measure", "ruler", "Measure distance or area"),
            ToolVariant::Draw => ("Draw", "pencil", "Draw shapes on the map"),
            ToolVariant::Abutters { .. } => ("Abutters", "parcels", "Find abutting parcels"),
            ToolVariant::ShowCoordinates => ("Coordinates", "crosshair", "Show pointer coordinates"),
            ToolVariant::ExportWizard => ("Export", "download", "Export data in the current view"),
            ToolVariant::Permalink { .. } => ("Permalink", "link", "Copy a link to this view"),
            ToolVariant::ZoomToExtent { .. } => ("Full extent", "globe", "Zoom to the full extent"),
            ToolVariant::Print => ("Print", "printer", "Print the current view"),
            ToolVariant::Help { .. } => ("Help", "question", "Open the help pages"),
            ToolVariant::Logo { .. } => ("Home", "logo", "Visit the data provider"),
            ToolVariant::GeocodeAddress => ("Address", "search", "Find an address"),
            ToolVariant::GeocodePlace => ("Place", "search", "Find a place name"),
            ToolVariant::ExtentHistory => ("History", "arrows", "Previous or next view"),
        }
    }

    /// Arm the tool. Everything hooked onto the map is recorded in
    /// `attachments` as it happens so a failure can be rolled back.
    pub fn activate(
        &self,
        ctx: &mut ToolContext<'_>,
        attachments: &mut Attachments,
    ) -> Result<(), ToolError> {
        match self {
            ToolVariant::IdentifyPoint => {
                set_cursor(ctx, attachments, "help");
                listen(ctx, attachments, MapEventKind::Click);
            }
            ToolVariant::IdentifyBox => {
                set_cursor(ctx, attachments, "crosshair");
                listen(ctx, attachments, MapEventKind::BoxDrawn);
            }
            ToolVariant::Measure | ToolVariant::Draw => {
                set_cursor(ctx, attachments, "crosshair");
                listen(ctx, attachments, MapEventKind::ShapeDrawn);
            }
            ToolVariant::Abutters { parcels_layer, .. } => {
                set_cursor(ctx, attachments, "pointer");
                listen(ctx, attachments, MapEventKind::Click);
                if ctx.legend.find_by_name(parcels_layer).is_none() {
                    return Err(ToolError::MissingLayerReference {
                        tool: self.id().to_string(),
                        layer: parcels_layer.clone(),
                    });
                }
            }
            ToolVariant::ShowCoordinates => {
                listen(ctx, attachments, MapEventKind::MouseMove);
            }
            ToolVariant::ExportWizard
            | ToolVariant::Permalink { .. }
            | ToolVariant::ZoomToExtent { .. }
            | ToolVariant::Print
            | ToolVariant::Help { .. }
            | ToolVariant::Logo { .. }
            | ToolVariant::GeocodeAddress
            | ToolVariant::GeocodePlace
            | ToolVariant::ExtentHistory => {
                return Err(ToolError::NotModal(self.id().to_string()));
            }
        }
        Ok(())
    }

    /// Disarm the tool, dropping its listeners, cursor and shapes.
    pub fn deactivate(&self, ctx: &mut ToolContext<'_>, attachments: Attachments) {
        match self {
            ToolVariant::Measure | ToolVariant::Draw | ToolVariant::Abutters { .. } => {
                trace!(tool = %self.id(), shapes = attachments.overlays.len(), "clearing drawn shapes");
                release(ctx, attachments);
            }
            ToolVariant::IdentifyPoint | ToolVariant::IdentifyBox | ToolVariant::ShowCoordinates => {
                release(ctx, attachments);
            }
            ToolVariant::ExportWizard
            | ToolVariant::Permalink { .. }
            | ToolVariant::ZoomToExtent { .. }
            | ToolVariant::Print
            | ToolVariant::Help { .. }
            | ToolVariant::Logo { .. }
            | ToolVariant::GeocodeAddress
            | ToolVariant::GeocodePlace
            | ToolVariant::ExtentHistory => {}
        }
    }

    /// Turn a map event this tool listens to into an outcome.
    pub fn on_event(
        &self,
        event: &MapEvent,
        ctx: &mut ToolContext<'_>,
        attachments: &mut Attachments,
    ) -> Option<ToolOutcome> {
        match (self, event) {
            (ToolVariant::IdentifyPoint, MapEvent::Click { lon, lat }) => Some(ToolOutcome::Identify {
                region: click_region(&*ctx.map, *lon, *lat),
            }),
            (ToolVariant::IdentifyBox, MapEvent::BoxDrawn { bounds }) => Some(ToolOutcome::Identify {
                region: Region::BBox(*bounds),
            }),
            (ToolVariant::Measure, MapEvent::ShapeDrawn { geometry }) => {
                let measurement = match measure(geometry, ctx.projector) {
                    Ok(m) => m,
                    Err(e) => {
                        warn!(error = %e, "cannot measure drawn shape");
                        return None;
                    }
                };
                // one measurement on screen at a time
                for overlay in attachments.overlays.drain(..) {
                    ctx.map.remove_overlay(overlay);
                }
                let overlay = ctx.map.add_overlay(geometry.clone());
                attachments.overlays.push(overlay);
                Some(ToolOutcome::Measured {
                    overlay,
                    measurement,
                })
            }
            (ToolVariant::Draw, MapEvent::ShapeDrawn { geometry }) => {
                let overlay = ctx.map.add_overlay(geometry.clone());
                attachments.overlays.push(overlay);
                Some(ToolOutcome::Drawn { overlay })
            }
            (
                ToolVariant::Abutters {
                    parcels_layer,
                    distance,
                    unit,
                },
                MapEvent::Click { lon, lat },
            ) => {
                let Some(layer) = ctx.legend.find_by_name(parcels_layer) else {
                    ctx.notifier.alert(
                        ToolError::MissingLayerReference {
                            tool: self.id().to_string(),
                            layer: parcels_layer.clone(),
                        }
                        .to_string(),
                    );
                    return None;
                };
                Some(ToolOutcome::Abutters {
                    region: click_region(&*ctx.map, *lon, *lat),
                    parcels_layer: layer.clone(),
                    distance: *distance,
                    unit: *unit,
                })
            }
            (ToolVariant::ShowCoordinates, MapEvent::MouseMove { lon, lat }) => {
                match ctx.projector.to_planar(*lon, *lat) {
                    Ok((x, y)) => Some(ToolOutcome::Coordinates {
                        lon: *lon,
                        lat: *lat,
                        x,
                        y,
                    }),
                    Err(e) => {
                        warn!(error = %e, "cannot project pointer position");
                        None
                    }
                }
            }
            _ => {
                trace!(tool = %self.id(), kind = ?event.kind(), "event ignored");
                None
            }
        }
    }

    /// Run an action tool.
    pub fn trigger(
        &self,
        command: &ToolCommand,
        ctx: &mut ToolContext<'_>,
    ) -> Result<ToolEffect, ToolError> {
        let unsupported = || ToolError::Command {
            tool: self.id().to_string(),
            command: command.name().to_string(),
        };
        let effect = match (self, command) {
            (ToolVariant::ExportWizard, ToolCommand::Run) => ToolEffect::OpenExportWizard {
                bounds: ctx.map.bounds(),
            },
            (ToolVariant::Permalink { page }, ToolCommand::Run) => {
                let link = Permalink::from_view(ctx.base_layer, ctx.legend, &*ctx.map).to_url(page);
                ctx.notifier.toast("Permalink copied to clipboard");
                ToolEffect::CopyToClipboard {
                    text: link.to_string(),
                }
            }
            (ToolVariant::ZoomToExtent { extent }, ToolCommand::Run) => {
                ctx.map.fit_bounds(extent);
                ToolEffect::Moved {
                    extent: ctx.map.bounds(),
                }
            }
            (ToolVariant::Print, ToolCommand::Run) => ToolEffect::Print {
                bounds: ctx.map.bounds(),
                scale: ctx.map.scale(),
                size: ctx.map.size(),
            },
            (ToolVariant::Help { url } | ToolVariant::Logo { url }, ToolCommand::Run) => {
                ToolEffect::OpenUrl { url: url.clone() }
            }
            (
                ToolVariant::GeocodeAddress | ToolVariant::GeocodePlace,
                ToolCommand::GoTo {
                    lon,
                    lat,
                    zoom,
                    label,
                },
            ) => {
                let fallback = if matches!(self, ToolVariant::GeocodeAddress) {
                    ADDRESS_ZOOM
                } else {
                    PLACE_ZOOM
                };
                ctx.map.set_view((*lon, *lat), zoom.unwrap_or(fallback));
                ctx.map.add_overlay(geojson::Geometry::new(geojson::Value::Point(vec![
                    *lon, *lat,
                ])));
                if let Some(label) = label {
                    ctx.notifier.toast(format!("Zoomed to {}", label));
                }
                ToolEffect::Moved {
                    extent: ctx.map.bounds(),
                }
            }
            (ToolVariant::ExtentHistory, ToolCommand::Back | ToolCommand::Forward) => {
                let moved = if *command == ToolCommand::Back {
                    ctx.history.back(&mut *ctx.map)
                } else {
                    ctx.history.forward(&mut *ctx.map)
                };
                match moved {
                    Some(extent) => ToolEffect::Moved { extent },
                    None => ToolEffect::None,
                }
            }
            (
                ToolVariant::IdentifyPoint
                | ToolVariant::IdentifyBox
                | ToolVariant::Measure
                | ToolVariant::Draw
                | ToolVariant::Abutters { .. }
                | ToolVariant::ShowCoordinates,
                _,
            ) => return Err(ToolError::NotAction(self.id().to_string())),
            _ => return Err(unsupported()),
        };
        debug!(tool = %self.id(), command = command.name(), "action tool ran");
        Ok(effect)
    }
}
