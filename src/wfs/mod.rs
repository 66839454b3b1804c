use crate::config::Config;
use crate::error::QueryError;
use crate::traits::FeatureService;
use async_trait::async_trait;
use moka::future::Cache;
use request::{ExportRequest, FeatureRequest};
use std::time::Duration;
use tracing::{debug, trace, warn};

pub mod request;
pub mod response;

const DEFAULT_USER_AGENT: &str = concat!("mapscout/", env!("CARGO_PKG_VERSION"));

/// `FeatureService` backed by a GeoServer WFS endpoint.
#[derive(Clone)]
pub struct WfsClient {
    client: reqwest::Client,
    wfs_url: String,
    export_url: String,
    hits_cache: Option<Cache<FeatureRequest, u64>>,
}

impl WfsClient {
    pub fn new(config: &Config) -> Result<Self, QueryError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(DEFAULT_USER_AGENT)
            .build()
            .map_err(|e| QueryError::Network {
                url: config.wfs_url(),
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        let hits_cache = (config.count_cache_ttl_secs > 0).then(|| {
            Cache::builder()
                .max_capacity(1_000)
                .time_to_live(Duration::from_secs(config.count_cache_ttl_secs))
                .build()
        });

        Ok(Self {
            client,
            wfs_url: config.wfs_url(),
            export_url: config.export_url(),
            hits_cache,
        })
    }

    async fn read_body(&self, url: &str, response: reqwest::Response) -> Result<String, QueryError> {
        if !response.status().is_success() {
            warn!(url = url, status = response.status().as_u16(), "HTTP error status");
            return Err(QueryError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }
        response.text().await.map_err(|e| QueryError::Network {
            url: url.to_string(),
            message: format!("Failed to read response: {}", e),
        })
    }

    async fn post_form(&self, params: &[(&str, String)]) -> Result<String, QueryError> {
        trace!(url = %self.wfs_url, "WFS POST starting");
        let response = self
            .client
            .post(&self.wfs_url)
            .form(params)
            .send()
            .await
            .map_err(|e| {
                warn!(url = %self.wfs_url, error = %e, is_timeout = e.is_timeout(), "WFS request failed");
                QueryError::Network {
                    url: self.wfs_url.clone(),
                    message: e.to_string(),
                }
            })?;
        debug!(url = %self.wfs_url, status = response.status().as_u16(), "WFS response received");
        self.read_body(&self.wfs_url, response).await
    }
}

#[async_trait]
impl FeatureService for WfsClient {
    async fn count(&self, request: &FeatureRequest) -> Result<u64, QueryError> {
        if let Some(cache) = &self.hits_cache {
            if let Some(hits) = cache.get(request).await {
                trace!(type_name = %request.type_name, hits, "hit count served from cache");
                return Ok(hits);
            }
        }

        self.count_fresh(request).await
    }

    async fn count_fresh(&self, request: &FeatureRequest) -> Result<u64, QueryError> {
        let body = self.post_form(&request.form_params(true)).await?;
        let hits = response::parse_hits(&body)?;

        if let Some(cache) = &self.hits_cache {
            cache.insert(request.clone(), hits).await;
        }
        Ok(hits)
    }

    async fn fetch(
        &self,
        request: &FeatureRequest,
    ) -> Result<geojson::FeatureCollection, QueryError> {
        let body = self.post_form(&request.form_params(false)).await?;
        response::parse_feature_collection(&body)
    }

    async fn export(&self, request: &ExportRequest) -> Result<String, QueryError> {
        debug!(
            type_name = %request.type_name,
            features = request.feature_ids.len(),
            format = %request.format,
            "bulk export starting"
        );
        let response = self
            .client
            .post(&self.export_url)
            .header("Content-Type", "text/xml")
            .body(request.to_xml())
            .send()
            .await
            .map_err(|e| QueryError::Network {
                url: self.export_url.clone(),
                message: e.to_string(),
            })?;
        let body = self.read_body(&self.export_url, response).await?;
        response::parse_export_path(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::request::intersects_filter;
    use super::*;
    use axum::Router;
    use axum::extract::{Form, State};
    use axum::http::StatusCode;
    use axum::routing::post;
    use std::collections::HashMap;
    use std::net::SocketAddr;
    use std::sync::{Arc, Mutex};

    type Seen = Arc<Mutex<Vec<HashMap<String, String>>>>;

    /// Minimal GeoServer stand-in: `broken` fails, everything else answers.
    async fn geoserver(
        State(seen): State<Seen>,
        Form(params): Form<HashMap<String, String>>,
    ) -> (StatusCode, String) {
        let type_name = params.get("typeName").cloned().unwrap_or_default();
        let hits = params.get("resultType").map(String::as_str) == Some("hits");
        seen.lock().unwrap().push(params);
        match (type_name.as_str(), hits) {
            ("broken", _) => (StatusCode::INTERNAL_SERVER_ERROR, "boom".to_string()),
            (_, true) => (
                StatusCode::OK,
                r#"<wfs:FeatureCollection numberOfFeatures="42"/>"#.to_string(),
            ),
            (_, false) => (
                StatusCode::OK,
                r#"{"type":"FeatureCollection","features":[]}"#.to_string(),
            ),
        }
    }

    async fn serve() -> (SocketAddr, Seen) {
        let seen = Seen::default();
        let app = Router::new()
            .route("/geoserver/wfs", post(geoserver))
            .with_state(seen.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        (addr, seen)
    }

    fn client(addr: SocketAddr, ttl: u64) -> WfsClient {
        WfsClient::new(&Config {
            service_url: format!("http://{}/geoserver", addr),
            count_cache_ttl_secs: ttl,
            request_timeout_secs: 5,
            ..Config::default()
        })
        .unwrap()
    }

    fn request(type_name: &str) -> FeatureRequest {
        FeatureRequest {
            type_name: type_name.to_string(),
            srs_name: "EPSG:4326".to_string(),
            cql_filter: intersects_filter("POLYGON((0 0, 0 1, 1 1, 1 0, 0 0))", &[]),
        }
    }

    #[tokio::test]
    async fn test_count_posts_hits_form_and_caches() {
        let (addr, seen) = serve().await;
        let client = client(addr, 30);

        assert_eq!(client.count(&request("towns")).await.unwrap(), 42);
        {
            let seen = seen.lock().unwrap();
            assert_eq!(seen.len(), 1);
            assert_eq!(seen[0]["service"], "WFS");
            assert_eq!(seen[0]["version"], "1.1.0");
            assert_eq!(seen[0]["request"], "GetFeature");
            assert_eq!(seen[0]["typeName"], "towns");
            assert_eq!(seen[0]["resultType"], "hits");
            assert!(seen[0]["cql_filter"].starts_with("INTERSECTS(shape,geomFromWKT(POLYGON"));
        }

        assert_eq!(client.count(&request("towns")).await.unwrap(), 42);
        assert_eq!(seen.lock().unwrap().len(), 1);

        assert_eq!(client.count_fresh(&request("towns")).await.unwrap(), 42);
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_error_status_maps_to_status_error_and_is_not_cached() {
        let (addr, seen) = serve().await;
        let client = client(addr, 30);

        for _ in 0..2 {
            match client.count(&request("broken")).await {
                Err(QueryError::Status { status, .. }) => assert_eq!(status, 500),
                other => panic!("expected status error, got {:?}", other),
            }
        }
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_fetch_asks_for_geojson() {
        let (addr, seen) = serve().await;
        let client = client(addr, 0);
        let collection = client.fetch(&request("towns")).await.unwrap();
        assert!(collection.features.is_empty());
        let seen = seen.lock().unwrap();
        assert_eq!(seen[0]["outputFormat"], "application/json");
        assert!(!seen[0].contains_key("resultType"));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_network_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = client(addr, 0).count(&request("towns")).await;
        assert!(
            matches!(result, Err(QueryError::Network { .. })),
            "got {:?}",
            result
        );
    }
}
