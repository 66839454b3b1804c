use reqwest::Url;
use serde::{Deserialize, Serialize};

/// Separator between name and style in layer keys and permalinks.
pub const KEY_SEPARATOR: &str = "__";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerType {
    TiledOverlay,
    Wms,
    Pt,
    Line,
    Poly,
}

impl LayerType {
    pub fn is_tiled(&self) -> bool {
        matches!(self, LayerType::TiledOverlay)
    }

    /// Vector-backed layers can be queried through WFS.
    pub fn is_queryable(&self) -> bool {
        matches!(self, LayerType::Pt | LayerType::Line | LayerType::Poly)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub name: String,
    pub style: String,
    pub title: String,
    #[serde(rename = "type")]
    pub layer_type: LayerType,
    /// Tile URL template (`{z}/{x}/{y}`) or WMS base URL.
    pub src: String,
    /// WFS type name when it differs from `name`.
    #[serde(default)]
    pub query_name: Option<String>,
    #[serde(default)]
    pub min_scale: Option<f64>,
    #[serde(default)]
    pub max_scale: Option<f64>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(skip)]
    pub loading: bool,
}

fn default_enabled() -> bool {
    true
}

pub fn layer_key(name: &str, style: &str) -> String {
    format!("{}{}{}", name, KEY_SEPARATOR, style)
}

/// Split a `name__style` key back into its parts.
pub fn split_layer_key(key: &str) -> Option<(&str, &str)> {
    key.split_once(KEY_SEPARATOR)
        .filter(|(name, style)| !name.is_empty() && !style.is_empty())
}

impl Layer {
    /// Identity used by the legend, the reconciler and the selection registry.
    pub fn id(&self) -> String {
        layer_key(&self.name, &self.style)
    }

    pub fn query_name(&self) -> &str {
        self.query_name.as_deref().unwrap_or(&self.name)
    }

    /// Missing bounds are treated as open.
    pub fn scale_ok(&self, scale: f64) -> bool {
        let above_min = self.min_scale.map(|min| min <= scale).unwrap_or(true);
        let below_max = self.max_scale.map(|max| scale <= max).unwrap_or(true);
        above_min && below_max
    }

    pub fn legend_graphic_url(&self, service_url: &str) -> anyhow::Result<Url> {
        let base = format!("{}/wms", service_url.trim_end_matches('/'));
        let url = Url::parse_with_params(
            &base,
            &[
                ("REQUEST", "GetLegendGraphic"),
                ("VERSION", "1.1.0"),
                ("FORMAT", "image/png"),
                ("WIDTH", "20"),
                ("HEIGHT", "20"),
                ("TRANSPARENT", "true"),
                ("LEGEND_OPTIONS", "fontName:Arial;fontAntiAliasing:true"),
                ("LAYER", self.name.as_str()),
                ("STYLE", self.style.as_str()),
            ],
        )?;
        Ok(url)
    }
}
