use crate::error::QueryError;
use geojson::{FeatureCollection, GeoJson};

const COUNT_ATTRIBUTES: [&str; 2] = ["numberOfFeatures=\"", "numberMatched=\""];

/// Read the feature count out of a `resultType=hits` envelope.
pub fn parse_hits(body: &str) -> Result<u64, QueryError> {
    for attribute in COUNT_ATTRIBUTES {
        if let Some(start) = body.find(attribute) {
            let rest = &body[start + attribute.len()..];
            let end = rest
                .find('"')
                .ok_or_else(|| QueryError::Parse(format!("unterminated {}", attribute)))?;
            return rest[..end]
                .trim()
                .parse()
                .map_err(|e| QueryError::Parse(format!("invalid feature count: {}", e)));
        }
    }
    Err(QueryError::Parse(
        "no feature count in response envelope".to_string(),
    ))
}

pub fn parse_feature_collection(body: &str) -> Result<FeatureCollection, QueryError> {
    let geojson: GeoJson = body
        .parse()
        .map_err(|e: geojson::Error| QueryError::Parse(e.to_string()))?;
    FeatureCollection::try_from(geojson).map_err(|e| QueryError::Parse(e.to_string()))
}

/// Export responses are a bare relative path.
pub fn parse_export_path(body: &str) -> Result<String, QueryError> {
    let path = body.trim();
    if path.is_empty() || path.starts_with('<') {
        return Err(QueryError::Parse(format!(
            "unexpected export response: {}",
            path.chars().take(80).collect::<String>()
        )));
    }
    Ok(path.to_string())
}
