use super::layer::{Layer, layer_key};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Folder tree node as delivered by the catalog feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CatalogNode {
    Folder {
        title: String,
        #[serde(default)]
        children: Vec<CatalogNode>,
    },
    Layer {
        name: String,
        style: String,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub tree: Vec<CatalogNode>,
    /// Flat list of every distinct layer, in catalog order.
    pub layers: Vec<Layer>,
}

impl Catalog {
    pub fn new(tree: Vec<CatalogNode>, layers: Vec<Layer>) -> Self {
        let mut seen = HashSet::new();
        let layers = layers
            .into_iter()
            .filter(|layer| seen.insert(layer.id()))
            .collect();
        Catalog { tree, layers }
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let raw: Catalog = serde_json::from_str(&content)?;
        Ok(Catalog::new(raw.tree, raw.layers))
    }

    pub fn get(&self, name: &str, style: &str) -> Option<&Layer> {
        let key = layer_key(name, style);
        self.layers.iter().find(|l| l.id() == key)
    }

    pub fn get_by_key(&self, key: &str) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id() == key)
    }

    /// First catalog layer with this name, any style.
    pub fn find_by_name(&self, name: &str) -> Option<&Layer> {
        self.layers.iter().find(|l| l.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::sample;
    use crate::models::layer::LayerType;

    #[test]
    fn test_catalog_dedupes_by_name_and_style() {
        let catalog = Catalog::new(
            Vec::new(),
            vec![
                sample("towns", "default", LayerType::Poly),
                sample("towns", "default", LayerType::Poly),
                sample("towns", "labels", LayerType::Poly),
            ],
        );
        assert_eq!(catalog.layers.len(), 2);
        assert!(catalog.get("towns", "labels").is_some());
        assert!(catalog.get_by_key("towns__default").is_some());
        assert_eq!(catalog.find_by_name("towns").unwrap().style, "default");
    }

    #[test]
    fn test_catalog_parses_json_tree() {
        let json = r#"{
            "tree": [
                {"kind": "folder", "title": "Boundaries", "children": [
                    {"kind": "layer", "name": "towns", "style": "default"}
                ]}
            ],
            "layers": [
                {"name": "towns", "style": "default", "title": "Towns",
                 "type": "poly", "src": "https://example.org/wms",
                 "min_scale": 0, "max_scale": 5000000}
            ]
        }"#;
        let catalog: Catalog = serde_json::from_str(json).unwrap();
        assert_eq!(catalog.tree.len(), 1);
        assert_eq!(catalog.layers[0].layer_type, LayerType::Poly);
        assert!(catalog.layers[0].enabled);
    }
}
