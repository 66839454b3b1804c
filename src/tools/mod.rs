pub mod controller;
pub mod tool;
pub mod variant;

pub use controller::{Activation, ToolController};
pub use tool::{Tool, ToolDescriptor, ToolId, ToolKind, ToolState};
pub use variant::{ToolCommand, ToolContext, ToolEffect, ToolOutcome, ToolVariant};
