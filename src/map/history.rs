use crate::models::geometry::GeometryExtent;
use crate::traits::MapBinding;
use tracing::trace;

/// Back/forward stack over view extents.
///
/// `pointer` counts entries up to and including the current one, so the
/// current extent is `entries[pointer - 1]`.
#[derive(Debug, Clone)]
pub struct ExtentHistory {
    entries: Vec<GeometryExtent>,
    pointer: usize,
    skip_next: bool,
    limit: usize,
}

impl Default for ExtentHistory {
    fn default() -> Self {
        ExtentHistory::new(100)
    }
}

impl ExtentHistory {
    pub fn new(limit: usize) -> Self {
        ExtentHistory {
            entries: Vec::new(),
            pointer: 0,
            skip_next: false,
            limit: limit.max(1),
        }
    }

    pub fn entries(&self) -> &[GeometryExtent] {
        &self.entries
    }

    pub fn pointer(&self) -> usize {
        self.pointer
    }

    pub fn current(&self) -> Option<GeometryExtent> {
        self.pointer
            .checked_sub(1)
            .and_then(|i| self.entries.get(i))
            .copied()
    }

    pub fn can_go_back(&self) -> bool {
        self.pointer > 1
    }

    pub fn can_go_forward(&self) -> bool {
        self.pointer < self.entries.len()
    }

    /// Record a finished view change. Returns whether an entry was pushed.
    pub fn record(&mut self, extent: GeometryExtent) -> bool {
        if self.skip_next {
            self.skip_next = false;
            trace!("view change caused by history navigation, not recorded");
            return false;
        }
        // a move back onto the current entry keeps the forward entries
        if self.current() == Some(extent) {
            return false;
        }
        if self.pointer < self.entries.len() {
            self.entries.truncate(self.pointer);
        }
        self.entries.push(extent);
        if self.entries.len() > self.limit {
            self.entries.remove(0);
        }
        self.pointer = self.entries.len();
        true
    }

    pub fn back(&mut self, map: &mut dyn MapBinding) -> Option<GeometryExtent> {
        if self.pointer <= 1 {
            return None;
        }
        self.pointer -= 1;
        self.navigate(map)
    }

    pub fn forward(&mut self, map: &mut dyn MapBinding) -> Option<GeometryExtent> {
        if self.pointer == self.entries.len() {
            return None;
        }
        self.pointer += 1;
        self.navigate(map)
    }

    fn navigate(&mut self, map: &mut dyn MapBinding) -> Option<GeometryExtent> {
        let extent = self.current()?;
        self.skip_next = true;
        map.fit_bounds(&extent);
        Some(extent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::headless::HeadlessMap;

    fn extent(n: f64) -> GeometryExtent {
        GeometryExtent::from((-71.0 - n, 42.0, -70.0 - n, 42.5))
    }

    /// The programmatic move fires a move-end like a real map would.
    fn navigated(history: &mut ExtentHistory, extent: Option<GeometryExtent>) -> GeometryExtent {
        let extent = extent.unwrap();
        assert!(!history.record(extent));
        extent
    }

    #[test]
    fn test_back_forward_and_truncate() {
        let mut map = HeadlessMap::default();
        let mut history = ExtentHistory::default();
        let (a, b, c, d) = (extent(0.0), extent(1.0), extent(2.0), extent(3.0));
        assert!(history.record(a));
        assert!(history.record(b));
        assert!(history.record(c));

        let moved = history.back(&mut map);
        assert_eq!(navigated(&mut history, moved), b);
        let moved = history.back(&mut map);
        assert_eq!(navigated(&mut history, moved), a);
        let moved = history.forward(&mut map);
        assert_eq!(navigated(&mut history, moved), b);
        let moved = history.back(&mut map);
        assert_eq!(navigated(&mut history, moved), a);

        assert!(history.record(d));
        assert_eq!(history.entries(), &[a, d]);
        assert_eq!(history.pointer(), 2);
        assert_eq!(history.current(), Some(d));
        assert!(!history.can_go_forward());
    }

    #[test]
    fn test_navigation_limits_are_noops() {
        let mut map = HeadlessMap::default();
        let mut history = ExtentHistory::default();
        assert!(history.back(&mut map).is_none());
        history.record(extent(0.0));
        assert!(history.back(&mut map).is_none());
        assert!(history.forward(&mut map).is_none());
        assert_eq!(history.pointer(), 1);
    }

    #[test]
    fn test_consecutive_duplicates_not_pushed() {
        let mut history = ExtentHistory::default();
        assert!(history.record(extent(0.0)));
        assert!(!history.record(extent(0.0)));
        assert_eq!(history.entries().len(), 1);
    }

    #[test]
    fn test_duplicate_of_current_keeps_forward_entries() {
        let mut map = HeadlessMap::default();
        let mut history = ExtentHistory::default();
        let (a, b) = (extent(0.0), extent(1.0));
        history.record(a);
        history.record(b);
        let moved = history.back(&mut map);
        navigated(&mut history, moved);

        // a resize or no-op pan ending on the same bounds
        assert!(!history.record(a));
        assert_eq!(history.entries(), &[a, b]);
        assert!(history.can_go_forward());
        let moved = history.forward(&mut map);
        assert_eq!(navigated(&mut history, moved), b);
    }

    #[test]
    fn test_limit_drops_oldest() {
        let mut history = ExtentHistory::new(2);
        history.record(extent(0.0));
        history.record(extent(1.0));
        history.record(extent(2.0));
        assert_eq!(history.entries(), &[extent(1.0), extent(2.0)]);
        assert_eq!(history.pointer(), 2);
    }

    #[test]
    fn test_back_moves_map_view() {
        let mut map = HeadlessMap::default();
        let mut history = ExtentHistory::default();
        history.record(extent(0.0));
        history.record(extent(1.0));
        history.back(&mut map);
        let (lon, _) = map.center();
        assert!((lon - -70.5).abs() < 1e-6);
    }
}
