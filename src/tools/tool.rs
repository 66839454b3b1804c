use crate::traits::{ListenerId, MapEventKind, OverlayId};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use super::variant::ToolVariant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolId {
    IdentifyPoint,
    IdentifyBox,
    Measure,
    Draw,
    Abutters,
    ShowCoordinates,
    ExportWizard,
    Permalink,
    ZoomToExtent,
    Print,
    Help,
    Logo,
    GeocodeAddress,
    GeocodePlace,
    ExtentHistory,
}

/// Modal tools own the map interaction and exclude each other. Action
/// tools are one-shot buttons and never take part in exclusivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    Modal,
    Action,
}

impl ToolId {
    pub const ALL: [ToolId; 15] = [
        ToolId::IdentifyPoint,
        ToolId::IdentifyBox,
        ToolId::Measure,
        ToolId::Draw,
        ToolId::Abutters,
        ToolId::ShowCoordinates,
        ToolId::ExportWizard,
        ToolId::Permalink,
        ToolId::ZoomToExtent,
        ToolId::Print,
        ToolId::Help,
        ToolId::Logo,
        ToolId::GeocodeAddress,
        ToolId::GeocodePlace,
        ToolId::ExtentHistory,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolId::IdentifyPoint => "identify-point",
            ToolId::IdentifyBox => "identify-box",
            ToolId::Measure => "measure",
            ToolId::Draw => "draw",
            ToolId::Abutters => "abutters",
            ToolId::ShowCoordinates => "show-coordinates",
            ToolId::ExportWizard => "export-wizard",
            ToolId::Permalink => "permalink",
            ToolId::ZoomToExtent => "zoom-to-extent",
            ToolId::Print => "print",
            ToolId::Help => "help",
            ToolId::Logo => "logo",
            ToolId::GeocodeAddress => "geocode-address",
            ToolId::GeocodePlace => "geocode-place",
            ToolId::ExtentHistory => "extent-history",
        }
    }

    pub fn kind(&self) -> ToolKind {
        match self {
            ToolId::IdentifyPoint
            | ToolId::IdentifyBox
            | ToolId::Measure
            | ToolId::Draw
            | ToolId::Abutters
            | ToolId::ShowCoordinates => ToolKind::Modal,
            ToolId::ExportWizard
            | ToolId::Permalink
            | ToolId::ZoomToExtent
            | ToolId::Print
            | ToolId::Help
            | ToolId::Logo
            | ToolId::GeocodeAddress
            | ToolId::GeocodePlace
            | ToolId::ExtentHistory => ToolKind::Action,
        }
    }

    pub fn is_modal(&self) -> bool {
        self.kind() == ToolKind::Modal
    }
}

impl fmt::Display for ToolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ToolId::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

/// Everything a modal tool hooked onto the map while active.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attachments {
    pub listeners: Vec<(ListenerId, MapEventKind)>,
    pub overlays: Vec<OverlayId>,
    pub cursor: bool,
}

impl Attachments {
    pub fn listens_to(&self, kind: MapEventKind) -> bool {
        self.listeners.iter().any(|(_, k)| *k == kind)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ToolState {
    Inactive,
    Active(Attachments),
}

/// Opaque to the core; handed to whatever draws the toolbar.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDescriptor {
    pub id: ToolId,
    pub kind: ToolKind,
    pub position: usize,
    pub label: &'static str,
    pub icon: &'static str,
    pub tooltip: &'static str,
    pub active: bool,
    pub is_default: bool,
}

#[derive(Debug, Clone)]
pub struct Tool {
    pub position: usize,
    pub is_default: bool,
    pub(super) state: ToolState,
    pub(super) variant: ToolVariant,
}

impl Tool {
    pub fn new(position: usize, variant: ToolVariant) -> Self {
        Tool {
            position,
            is_default: false,
            state: ToolState::Inactive,
            variant,
        }
    }

    pub fn id(&self) -> ToolId {
        self.variant.id()
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, ToolState::Active(_))
    }

    pub fn state(&self) -> &ToolState {
        &self.state
    }

    pub fn variant(&self) -> &ToolVariant {
        &self.variant
    }

    pub fn descriptor(&self) -> ToolDescriptor {
        let (label, icon, tooltip) = self.variant.render();
        ToolDescriptor {
            id: self.id(),
            kind: self.id().kind(),
            position: self.position,
            label,
            icon,
            tooltip,
            active: self.is_active(),
            is_default: self.is_default,
        }
    }
}
