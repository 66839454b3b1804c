use crate::context::{AppContext, ExportCountsRequest, LegendChange};
use crate::error::{QueryError, SessionError, ToolError};
use crate::geometry::buffer::LinearUnit;
use crate::models::geometry::GeometryExtent;
use crate::tools::{ToolCommand, ToolId};
use crate::traits::MapEvent;
use crate::wfs::request::ExportFormat;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

impl IntoResponse for SessionError {
    fn into_response(self) -> Response {
        let status = match &self {
            SessionError::Tool(ToolError::Unknown(_)) | SessionError::UnknownLayer(_) => {
                StatusCode::NOT_FOUND
            }
            SessionError::Tool(ToolError::MissingLayerReference { .. })
            | SessionError::ExportNotReady(_) => StatusCode::CONFLICT,
            SessionError::Tool(_) | SessionError::Permalink(_) => StatusCode::BAD_REQUEST,
            SessionError::Query(QueryError::Projection(_) | QueryError::Geometry(_)) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            SessionError::Query(_) => StatusCode::BAD_GATEWAY,
        };
        let body = match &self {
            SessionError::ExportNotReady(readiness) => {
                json!({ "error": self.to_string(), "readiness": readiness })
            }
            _ => json!({ "error": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

fn tool_id(id: &str) -> Result<ToolId, SessionError> {
    id.parse::<ToolId>()
        .map_err(|id| SessionError::Tool(ToolError::Unknown(id)))
}

pub async fn get_layers(State(ctx): State<Arc<AppContext>>) -> impl IntoResponse {
    (StatusCode::OK, Json(ctx.catalog().clone()))
}

pub async fn get_legend(State(ctx): State<Arc<AppContext>>) -> impl IntoResponse {
    Json(ctx.legend())
}

pub async fn update_legend(
    State(ctx): State<Arc<AppContext>>,
    Json(changes): Json<Vec<LegendChange>>,
) -> Result<impl IntoResponse, SessionError> {
    Ok(Json(ctx.update_legend(&changes)?))
}

pub async fn get_tools(State(ctx): State<Arc<AppContext>>) -> impl IntoResponse {
    Json(ctx.tools())
}

pub async fn activate_tool(
    Path(id): Path<String>,
    State(ctx): State<Arc<AppContext>>,
) -> Result<impl IntoResponse, SessionError> {
    let activation = ctx.activate_tool(tool_id(&id)?)?;
    Ok(Json(json!({ "tool": id, "activation": activation })))
}

#[derive(Debug, Default, Deserialize)]
pub struct DeactivateParams {
    #[serde(default)]
    pub restore_default: bool,
}

pub async fn deactivate_tool(
    Path(id): Path<String>,
    Query(params): Query<DeactivateParams>,
    State(ctx): State<Arc<AppContext>>,
) -> Result<impl IntoResponse, SessionError> {
    ctx.deactivate_tool(tool_id(&id)?, params.restore_default)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn trigger_tool(
    Path(id): Path<String>,
    State(ctx): State<Arc<AppContext>>,
    command: Option<Json<ToolCommand>>,
) -> Result<impl IntoResponse, SessionError> {
    let command = command.map(|Json(c)| c).unwrap_or_default();
    Ok(Json(ctx.trigger_tool(tool_id(&id)?, &command)?))
}

#[derive(Debug, Deserialize)]
pub struct AbuttersDistance {
    pub distance: f64,
    #[serde(default)]
    pub unit: LinearUnit,
}

pub async fn set_abutters_distance(
    State(ctx): State<Arc<AppContext>>,
    Json(body): Json<AbuttersDistance>,
) -> impl IntoResponse {
    ctx.set_abutters_distance(body.distance, body.unit);
    StatusCode::NO_CONTENT
}

pub async fn history_back(State(ctx): State<Arc<AppContext>>) -> Result<impl IntoResponse, SessionError> {
    Ok(Json(ctx.trigger_tool(ToolId::ExtentHistory, &ToolCommand::Back)?))
}

pub async fn history_forward(
    State(ctx): State<Arc<AppContext>>,
) -> Result<impl IntoResponse, SessionError> {
    Ok(Json(ctx.trigger_tool(ToolId::ExtentHistory, &ToolCommand::Forward)?))
}

pub async fn map_event(
    State(ctx): State<Arc<AppContext>>,
    Json(event): Json<MapEvent>,
) -> impl IntoResponse {
    Json(ctx.handle_event(event).await)
}

#[derive(Debug, Deserialize)]
pub struct ClickBody {
    pub lon: f64,
    pub lat: f64,
}

pub async fn click_event(
    State(ctx): State<Arc<AppContext>>,
    Json(ClickBody { lon, lat }): Json<ClickBody>,
) -> impl IntoResponse {
    Json(ctx.handle_event(MapEvent::Click { lon, lat }).await)
}

#[derive(Debug, Deserialize)]
pub struct BoxBody {
    pub bounds: GeometryExtent,
}

pub async fn box_event(
    State(ctx): State<Arc<AppContext>>,
    Json(BoxBody { bounds }): Json<BoxBody>,
) -> impl IntoResponse {
    Json(ctx.handle_event(MapEvent::BoxDrawn { bounds }).await)
}

pub async fn get_selection(State(ctx): State<Arc<AppContext>>) -> impl IntoResponse {
    Json(ctx.selection())
}

pub async fn get_export_status(State(ctx): State<Arc<AppContext>>) -> impl IntoResponse {
    Json(ctx.export_status())
}

pub async fn export_counts(
    State(ctx): State<Arc<AppContext>>,
    body: Option<Json<ExportCountsRequest>>,
) -> Result<impl IntoResponse, SessionError> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    Ok(Json(ctx.export_counts(request).await?))
}

#[derive(Debug, Deserialize)]
pub struct ExportBody {
    pub format: ExportFormat,
}

pub async fn export(
    State(ctx): State<Arc<AppContext>>,
    Json(body): Json<ExportBody>,
) -> Result<impl IntoResponse, SessionError> {
    Ok(Json(ctx.export(body.format).await?))
}

pub async fn get_permalink(State(ctx): State<Arc<AppContext>>) -> impl IntoResponse {
    Json(json!({ "url": ctx.permalink() }))
}

#[derive(Debug, Deserialize)]
pub struct PermalinkBody {
    pub query: String,
}

pub async fn restore_permalink(
    State(ctx): State<Arc<AppContext>>,
    Json(body): Json<PermalinkBody>,
) -> Result<impl IntoResponse, SessionError> {
    Ok(Json(ctx.restore_permalink(&body.query)?))
}

/// Either a center and zoom, or bounds to fit.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ViewBody {
    Center { center: (f64, f64), zoom: f64 },
    Bounds { bounds: GeometryExtent },
}

pub async fn set_view(
    State(ctx): State<Arc<AppContext>>,
    Json(body): Json<ViewBody>,
) -> impl IntoResponse {
    let extent = match body {
        ViewBody::Center { center, zoom } => ctx.set_view(center, zoom),
        ViewBody::Bounds { bounds } => ctx.fit_view(&bounds),
    };
    Json(json!({ "extent": extent }))
}

pub async fn get_notifications(State(ctx): State<Arc<AppContext>>) -> impl IntoResponse {
    Json(ctx.notifications())
}
