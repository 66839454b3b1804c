use thiserror::Error;

/// Failures of a feature-server round trip.
///
/// None of these are retried; callers treat the result as unknown and may
/// re-issue the query.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("request to {url} failed: {message}")]
    Network { url: String, message: String },

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("malformed response: {0}")]
    Parse(String),

    #[error("layer '{0}' is not in the legend")]
    MissingLayer(String),

    #[error(transparent)]
    Projection(#[from] ProjectionError),

    #[error("geometry error: {0}")]
    Geometry(String),
}

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("failed to build transform {from} -> {to}: {message}")]
    Setup {
        from: String,
        to: String,
        message: String,
    },

    #[error("failed to project ({x}, {y}): {message}")]
    Convert { x: f64, y: f64, message: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MapError {
    #[error("pane '{0}' does not exist")]
    PaneMissing(String),

    #[error("render layer '{0}' is not on the map")]
    UnknownLayer(String),
}

#[derive(Debug, Error)]
pub enum ToolError {
    /// The tool depends on a layer that is not in the legend.
    #[error("{tool} needs the layer '{layer}' in the legend")]
    MissingLayerReference { tool: String, layer: String },

    #[error("activating {tool} failed: {message}")]
    Activation { tool: String, message: String },

    #[error("unknown tool '{0}'")]
    Unknown(String),

    #[error("{0} is not a modal tool")]
    NotModal(String),

    #[error("{0} is not an action tool")]
    NotAction(String),

    #[error("{tool} does not accept '{command}'")]
    Command { tool: String, command: String },

    #[error(transparent)]
    Map(#[from] MapError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PermalinkError {
    #[error("invalid center '{0}'")]
    Center(String),

    #[error("invalid zoom '{0}'")]
    Zoom(String),

    #[error("invalid layer key '{0}'")]
    LayerKey(String),
}

/// Failures surfaced by the session service.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Permalink(#[from] PermalinkError),

    #[error("layer '{0}' is not in the catalog")]
    UnknownLayer(String),

    #[error("export is not ready: {0:?}")]
    ExportNotReady(crate::query::export::Readiness),
}
