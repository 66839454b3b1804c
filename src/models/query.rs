use super::geometry::Region;
use super::layer::Layer;
use serde::Serialize;
use serde_json::{Map, Value};

/// Count reported before the server has answered.
pub const UNKNOWN_COUNT: i64 = -1;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Feature {
    /// Server id, or a synthetic one when the server sent none.
    pub id: String,
    /// `id` was made up locally and means nothing to the server.
    pub synthetic_id: bool,
    pub geometry: Option<geojson::Geometry>,
    pub properties: Map<String, Value>,
}

impl Feature {
    /// The id the server knows this feature by.
    pub fn server_id(&self) -> Option<&str> {
        (!self.synthetic_id).then_some(self.id.as_str())
    }

    pub fn property_str(&self, key: &str) -> Option<String> {
        match self.properties.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}

/// Result of one identify or export query against a single layer.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub layer: Layer,
    pub region: Region,
    pub is_loading: bool,
    pub num_features: i64,
    pub features: Vec<Feature>,
    /// Set when the query failed; the result is then unknown.
    pub error: Option<String>,
    /// Issue order of the request that produced this entry.
    pub ticket: u64,
}

impl QueryResult {
    pub fn pending(layer: Layer, region: Region, ticket: u64) -> Self {
        QueryResult {
            layer,
            region,
            is_loading: true,
            num_features: UNKNOWN_COUNT,
            features: Vec::new(),
            error: None,
            ticket,
        }
    }

    pub fn count_known(&self) -> bool {
        self.num_features >= 0
    }

    pub fn feature_ids(&self) -> Vec<String> {
        self.features.iter().map(|f| f.id.clone()).collect()
    }
}
