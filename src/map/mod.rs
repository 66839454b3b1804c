pub mod headless;
pub mod history;
pub mod legend;
pub mod permalink;
pub mod reconciler;

pub use headless::HeadlessMap;
pub use history::ExtentHistory;
pub use legend::Legend;
pub use permalink::Permalink;
pub use reconciler::{MapLayerReconciler, ReconcilePlan};
