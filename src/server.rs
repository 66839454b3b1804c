use crate::config::Config;
use crate::context::AppContext;
use crate::endpoints::handlers::{
    activate_tool, box_event, click_event, deactivate_tool, export, export_counts,
    get_export_status, get_layers, get_legend, get_notifications, get_permalink, get_selection,
    get_tools, history_back, history_forward, map_event, restore_permalink, set_abutters_distance,
    set_view, trigger_tool, update_legend,
};
use axum::{
    Router,
    routing::{get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

pub struct MapServer {
    port: u16,
    context: Arc<AppContext>,
}

impl MapServer {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let port = config.port;
        let context = AppContext::from_config(config)?;
        Ok(Self {
            port,
            context: Arc::new(context),
        })
    }

    pub fn with_context(port: u16, context: Arc<AppContext>) -> Self {
        Self { port, context }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/layers", get(get_layers))
            .route("/legend", get(get_legend).post(update_legend))
            .route("/tools", get(get_tools))
            .route("/tools/{id}/activate", post(activate_tool))
            .route("/tools/{id}/deactivate", post(deactivate_tool))
            .route("/tools/{id}/trigger", post(trigger_tool))
            .route("/abutters/distance", post(set_abutters_distance))
            .route("/events", post(map_event))
            .route("/events/click", post(click_event))
            .route("/events/box", post(box_event))
            .route("/selection", get(get_selection))
            .route("/export", get(get_export_status).post(export))
            .route("/export/counts", post(export_counts))
            .route("/permalink", get(get_permalink).post(restore_permalink))
            .route("/view", post(set_view))
            .route("/history/back", post(history_back))
            .route("/history/forward", post(history_forward))
            .route("/notifications", get(get_notifications))
            .layer(TraceLayer::new_for_http())
            .with_state(self.context.clone())
    }

    pub async fn start(self) -> anyhow::Result<()> {
        let app = self.router();
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = tokio::net::TcpListener::bind(addr).await?;

        let config = self.context.config();
        info!(%addr, service = %config.service_url, "session service listening");
        println!(
            r#"
    🚀 mapscout serving on {}

    🗂️ Catalog layers ({})
       → http://{}/layers

    🔗 Current view as a permalink
       → http://{}/permalink
"#,
            addr,
            self.context.catalog().layers.len(),
            addr,
            addr
        );

        axum::serve(listener, app).await?;
        Ok(())
    }
}
