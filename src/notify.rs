use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum Notification {
    /// Transient message for a completed side effect.
    Toast(String),
    /// Blocking dialog for errors that stop a tool from working.
    Alert(String),
}

/// Shared queue of user-visible notifications.
#[derive(Debug, Clone, Default)]
pub struct Notifier {
    queue: Arc<Mutex<VecDeque<Notification>>>,
}

impl Notifier {
    pub fn toast(&self, message: impl Into<String>) {
        self.push(Notification::Toast(message.into()));
    }

    pub fn alert(&self, message: impl Into<String>) {
        self.push(Notification::Alert(message.into()));
    }

    fn push(&self, notification: Notification) {
        info!(?notification, "notification");
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(notification);
    }

    /// Remove and return everything queued so far.
    pub fn drain(&self) -> Vec<Notification> {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_empties_queue_in_order() {
        let notifier = Notifier::default();
        let shared = notifier.clone();
        notifier.toast("3 features dropped");
        shared.alert("missing layer");
        assert_eq!(
            notifier.drain(),
            vec![
                Notification::Toast("3 features dropped".to_string()),
                Notification::Alert("missing layer".to_string()),
            ]
        );
        assert!(shared.drain().is_empty());
    }
}
