use crate::error::PermalinkError;
use crate::map::legend::Legend;
use crate::models::layer::split_layer_key;
use crate::traits::MapBinding;
use reqwest::Url;
use serde::Serialize;

/// Shareable view state: base layer, legend keys, center and zoom.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Permalink {
    pub base: Option<String>,
    /// `name__style` keys, top first.
    pub layers: Vec<String>,
    /// (lon, lat)
    pub center: Option<(f64, f64)>,
    pub zoom: Option<f64>,
}

impl Permalink {
    /// Snapshot of what is on screen now.
    pub fn from_view(base: Option<&str>, legend: &Legend, map: &dyn MapBinding) -> Self {
        Permalink {
            base: base.map(str::to_string),
            layers: legend.keys(),
            center: Some(map.center()),
            zoom: Some(map.zoom()),
        }
    }

    /// `page` with its query replaced by the encoded state.
    pub fn to_url(&self, page: &Url) -> Url {
        let mut url = page.clone();
        url.set_query(None);
        {
            let mut pairs = url.query_pairs_mut();
            if let Some(base) = &self.base {
                pairs.append_pair("bl", base);
            }
            if !self.layers.is_empty() {
                pairs.append_pair("l", &self.layers.join(","));
            }
            if let Some((lon, lat)) = self.center {
                pairs.append_pair("c", &format!("{},{}", lat, lon));
            }
            if let Some(zoom) = self.zoom {
                pairs.append_pair("z", &zoom.to_string());
            }
        }
        url
    }

    pub fn from_url(url: &Url) -> Result<Self, PermalinkError> {
        let mut permalink = Permalink {
            base: None,
            layers: Vec::new(),
            center: None,
            zoom: None,
        };
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "bl" => permalink.base = Some(value.into_owned()).filter(|b| !b.is_empty()),
                "l" => {
                    for layer_key in value.split(',').filter(|k| !k.is_empty()) {
                        split_layer_key(layer_key)
                            .ok_or_else(|| PermalinkError::LayerKey(layer_key.to_string()))?;
                        permalink.layers.push(layer_key.to_string());
                    }
                }
                "c" => {
                    let parsed = value.split_once(',').and_then(|(lat, lon)| {
                        Some((lon.trim().parse::<f64>().ok()?, lat.trim().parse::<f64>().ok()?))
                    });
                    match parsed {
                        Some((lon, lat)) if lon.is_finite() && lat.is_finite() => {
                            permalink.center = Some((lon, lat))
                        }
                        _ => return Err(PermalinkError::Center(value.into_owned())),
                    }
                }
                "z" => {
                    let zoom = value
                        .parse::<f64>()
                        .ok()
                        .filter(|z| z.is_finite())
                        .ok_or_else(|| PermalinkError::Zoom(value.to_string()))?;
                    permalink.zoom = Some(zoom);
                }
                _ => {}
            }
        }
        Ok(permalink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(query: &str) -> Url {
        let mut url = Url::parse("https://maps.example.org/viewer/").unwrap();
        url.set_query(Some(query));
        url
    }

    #[test]
    fn test_encode_parse() {
        let permalink = Permalink {
            base: Some("massgis_basemap".to_string()),
            layers: vec![
                "GISDATA.TOWNS_POLYM__Outline".to_string(),
                "GISDATA.L3_TAXPAR_POLY__Parcels Red".to_string(),
            ],
            center: Some((-71.0589, 42.3601)),
            zoom: Some(14.0),
        };
        let url = permalink.to_url(&page("stale=1"));
        let query = url.query().unwrap();
        assert!(query.starts_with("bl=massgis_basemap"));
        assert!(query.contains("z=14"));
        assert!(!query.contains("stale"));
        assert_eq!(url.path(), "/viewer/");
        assert_eq!(Permalink::from_url(&url).unwrap(), permalink);
    }

    #[test]
    fn test_from_view_lists_legend_top_first() {
        use crate::map::headless::HeadlessMap;
        use crate::models::fixtures::sample;
        use crate::models::layer::LayerType;

        let mut legend = Legend::default();
        legend.add(sample("towns", "outline", LayerType::Poly));
        legend.add(sample("parcels", "red", LayerType::Poly));
        let map = HeadlessMap::default();
        let permalink = Permalink::from_view(Some("osm"), &legend, &map);
        assert_eq!(permalink.layers, vec!["parcels__red", "towns__outline"]);
        assert_eq!(permalink.center, Some(map.center()));
        assert_eq!(permalink.zoom, Some(8.0));
    }

    #[test]
    fn test_center_is_lat_first() {
        let permalink = Permalink::from_url(&page("c=42.5,-71.5&z=9")).unwrap();
        assert_eq!(permalink.center, Some((-71.5, 42.5)));
        assert_eq!(permalink.zoom, Some(9.0));
        assert!(permalink.layers.is_empty());
    }

    #[test]
    fn test_unknown_keys_ignored_and_bad_values_rejected() {
        assert!(Permalink::from_url(&page("foo=bar")).is_ok());
        assert_eq!(
            Permalink::from_url(&page("c=north")),
            Err(PermalinkError::Center("north".to_string()))
        );
        assert_eq!(
            Permalink::from_url(&page("z=deep")),
            Err(PermalinkError::Zoom("deep".to_string()))
        );
        assert_eq!(
            Permalink::from_url(&page("l=towns")),
            Err(PermalinkError::LayerKey("towns".to_string()))
        );
    }
}
