use crate::models::layer::Layer;

/// Ordered enabled-layers model. Index 0 is drawn on top.
///
/// Every mutation bumps `revision`, which is what schedules a reconcile pass.
#[derive(Debug, Clone, Default)]
pub struct Legend {
    layers: Vec<Layer>,
    revision: u64,
}

impl Legend {
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Layers that should be on the map, in draw order.
    pub fn enabled(&self) -> Vec<Layer> {
        self.layers.iter().filter(|l| l.enabled).cloned().collect()
    }

    pub fn keys(&self) -> Vec<String> {
        self.layers.iter().map(Layer::id).collect()
    }

    pub fn get(&self, key: &str) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id() == key)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Layer> {
        self.layers.iter().find(|l| l.name == name)
    }

    /// Add on top. Returns false when a layer with the same name and style
    /// is already present.
    pub fn add(&mut self, layer: Layer) -> bool {
        if self.get(&layer.id()).is_some() {
            return false;
        }
        self.layers.insert(0, layer);
        self.revision += 1;
        true
    }

    pub fn remove(&mut self, key: &str) -> Option<Layer> {
        let index = self.layers.iter().position(|l| l.id() == key)?;
        self.revision += 1;
        Some(self.layers.remove(index))
    }

    pub fn set_enabled(&mut self, key: &str, enabled: bool) -> bool {
        match self.layers.iter_mut().find(|l| l.id() == key) {
            Some(layer) if layer.enabled != enabled => {
                layer.enabled = enabled;
                self.revision += 1;
                true
            }
            _ => false,
        }
    }

    /// Move a layer to `index`, clamped to the list.
    pub fn move_to(&mut self, key: &str, index: usize) -> bool {
        let Some(from) = self.layers.iter().position(|l| l.id() == key) else {
            return false;
        };
        let to = index.min(self.layers.len() - 1);
        if from == to {
            return false;
        }
        let layer = self.layers.remove(from);
        self.layers.insert(to, layer);
        self.revision += 1;
        true
    }

    pub fn set_loading(&mut self, key: &str, loading: bool) {
        if let Some(layer) = self.layers.iter_mut().find(|l| l.id() == key) {
            layer.loading = loading;
        }
    }
}
