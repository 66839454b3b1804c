use crate::error::QueryError;
use crate::wfs::request::{ExportRequest, FeatureRequest};
use async_trait::async_trait;

/// Remote feature server the query engine talks to.
#[async_trait]
pub trait FeatureService: Send + Sync {
    /// Number of features matching the request (`resultType=hits`).
    async fn count(&self, request: &FeatureRequest) -> Result<u64, QueryError>;

    /// Like `count`, but always asks the server.
    async fn count_fresh(&self, request: &FeatureRequest) -> Result<u64, QueryError> {
        self.count(request).await
    }

    /// Matching features as GeoJSON.
    async fn fetch(&self, request: &FeatureRequest)
    -> Result<geojson::FeatureCollection, QueryError>;

    /// Start a bulk export, returning the server's relative download path.
    async fn export(&self, request: &ExportRequest) -> Result<String, QueryError>;
}
