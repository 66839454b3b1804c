use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const SERVICE: &str = "WFS";
pub const VERSION: &str = "1.1.0";
/// Geometry attribute name on the feature server.
pub const GEOMETRY_FIELD: &str = "shape";
/// Filter clause matching everything.
pub const MATCH_ALL: &str = "1=1";

/// One GetFeature request, in count or fetch form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeatureRequest {
    pub type_name: String,
    /// Output CRS of returned geometries.
    pub srs_name: String,
    pub cql_filter: String,
}

impl FeatureRequest {
    /// URL-encoded form body parameters. `hits` selects count mode.
    pub fn form_params(&self, hits: bool) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("service", SERVICE.to_string()),
            ("version", VERSION.to_string()),
            ("request", "GetFeature".to_string()),
            ("typeName", self.type_name.clone()),
            ("srsname", self.srs_name.clone()),
        ];
        if hits {
            params.push(("resultType", "hits".to_string()));
        } else {
            params.push(("outputFormat", "application/json".to_string()));
        }
        params.push(("cql_filter", self.cql_filter.clone()));
        params
    }
}

fn quote_cql(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// `NOT IN (...)` over feature ids, or a match-all clause when empty.
pub fn exclusion_clause(excluded_ids: &[String]) -> String {
    if excluded_ids.is_empty() {
        return MATCH_ALL.to_string();
    }
    let ids = excluded_ids
        .iter()
        .map(|id| quote_cql(id))
        .collect::<Vec<_>>()
        .join(", ");
    format!("NOT IN ({})", ids)
}

pub fn intersects_filter(wkt: &str, excluded_ids: &[String]) -> String {
    format!(
        "INTERSECTS({},geomFromWKT({})) and {}",
        GEOMETRY_FIELD,
        wkt,
        exclusion_clause(excluded_ids)
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Xlsx,
    Xls,
    Csv,
    Shp,
}

impl ExportFormat {
    /// Value of the server's `outputFormat`.
    pub fn output_format(&self) -> &'static str {
        match self {
            ExportFormat::Xlsx => "excel2007",
            ExportFormat::Xls => "excel97",
            ExportFormat::Csv => "csv",
            ExportFormat::Shp => "shape-zip",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "xlsx" => Ok(ExportFormat::Xlsx),
            "xls" => Ok(ExportFormat::Xls),
            "csv" => Ok(ExportFormat::Csv),
            "shp" => Ok(ExportFormat::Shp),
            other => Err(format!("Unknown export format: {}", other)),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExportFormat::Xlsx => "xlsx",
            ExportFormat::Xls => "xls",
            ExportFormat::Csv => "csv",
            ExportFormat::Shp => "shp",
        };
        f.write_str(name)
    }
}

fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Bulk export of an explicit feature id list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRequest {
    pub type_name: String,
    pub feature_ids: Vec<String>,
    pub format: ExportFormat,
}

impl ExportRequest {
    pub fn to_xml(&self) -> String {
        let fids: String = self
            .feature_ids
            .iter()
            .map(|fid| format!("<ogc:FeatureId fid=\"{}\"/>", escape_xml(fid)))
            .collect();
        format!(
            concat!(
                "<wfs:GetFeature service=\"{service}\" version=\"{version}\" ",
                "outputFormat=\"{format}\" ",
                "xmlns:wfs=\"http://www.opengis.net/wfs\" ",
                "xmlns:ogc=\"http://www.opengis.net/ogc\">",
                "<wfs:Query typeName=\"{type_name}\">",
                "<ogc:Filter>{fids}</ogc:Filter>",
                "</wfs:Query>",
                "</wfs:GetFeature>"
            ),
            service = SERVICE,
            version = VERSION,
            format = self.format.output_format(),
            type_name = escape_xml(&self.type_name),
            fids = fids,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exclusion_clause_defaults_to_match_all() {
        assert_eq!(exclusion_clause(&[]), "1=1");
        assert_eq!(
            exclusion_clause(&["parcels.1".to_string(), "o'brien.2".to_string()]),
            "NOT IN ('parcels.1', 'o''brien.2')"
        );
    }

    #[test]
    fn test_intersects_filter() {
        let filter = intersects_filter("POLYGON((0 0, 0 1, 1 1, 1 0, 0 0))", &[]);
        assert_eq!(
            filter,
            "INTERSECTS(shape,geomFromWKT(POLYGON((0 0, 0 1, 1 1, 1 0, 0 0)))) and 1=1"
        );
    }

    #[test]
    fn test_form_params_count_and_fetch() {
        let request = FeatureRequest {
            type_name: "massgis:GISDATA.TOWNS_POLY".to_string(),
            srs_name: "EPSG:4326".to_string(),
            cql_filter: MATCH_ALL.to_string(),
        };
        let hits = request.form_params(true);
        assert!(hits.contains(&("resultType", "hits".to_string())));
        assert!(hits.contains(&("service", "WFS".to_string())));
        assert!(hits.contains(&("version", "1.1.0".to_string())));
        let fetch = request.form_params(false);
        assert!(!fetch.iter().any(|(k, _)| *k == "resultType"));
        assert!(fetch.contains(&("outputFormat", "application/json".to_string())));
    }

    #[test]
    fn test_export_formats() {
        assert_eq!("xlsx".parse::<ExportFormat>().unwrap().output_format(), "excel2007");
        assert_eq!("XLS".parse::<ExportFormat>().unwrap().output_format(), "excel97");
        assert_eq!("csv".parse::<ExportFormat>().unwrap().output_format(), "csv");
        assert_eq!("shp".parse::<ExportFormat>().unwrap().output_format(), "shape-zip");
        assert!("kml".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn test_export_xml_lists_feature_ids() {
        let request = ExportRequest {
            type_name: "massgis:GISDATA.TOWNS_POLY".to_string(),
            feature_ids: vec!["towns.1".to_string(), "towns.<2>".to_string()],
            format: ExportFormat::Shp,
        };
        let xml = request.to_xml();
        assert!(xml.contains("outputFormat=\"shape-zip\""));
        assert!(xml.contains("<ogc:FeatureId fid=\"towns.1\"/>"));
        assert!(xml.contains("<ogc:FeatureId fid=\"towns.&lt;2&gt;\"/>"));
        assert!(xml.contains("typeName=\"massgis:GISDATA.TOWNS_POLY\""));
    }
}
