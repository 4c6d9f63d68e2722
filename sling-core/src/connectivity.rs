//! Connectivity signal.
//!
//! A boolean "online" query plus a subscribe-to-transition capability. The
//! orchestrator uses it to gate offline queueing and to trigger queue
//! drains when connectivity returns; what feeds it (OS events, health
//! probes, manual toggles) is the embedder's business.

use std::sync::Arc;

use tokio::sync::watch;

/// Shared online/offline signal.
#[derive(Clone, Debug)]
pub struct ConnectivityMonitor {
    tx: Arc<watch::Sender<bool>>,
}

impl ConnectivityMonitor {
    /// New monitor with the given initial state.
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        Self { tx: Arc::new(tx) }
    }

    /// Current state.
    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Updates the state; subscribers observe the transition.
    pub fn set_online(&self, online: bool) {
        // send_if_modified: only transitions wake subscribers.
        self.tx.send_if_modified(|current| {
            let changed = *current != online;
            *current = online;
            changed
        });
    }

    /// Subscription observing every state transition.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn transitions_are_observed() {
        let monitor = ConnectivityMonitor::new(true);
        let mut rx = monitor.subscribe();
        assert!(monitor.is_online());

        monitor.set_online(false);
        rx.changed().await.unwrap();
        assert!(!*rx.borrow());

        monitor.set_online(true);
        rx.changed().await.unwrap();
        assert!(*rx.borrow());
    }

    #[tokio::test]
    async fn redundant_updates_do_not_wake_subscribers() {
        let monitor = ConnectivityMonitor::new(true);
        let mut rx = monitor.subscribe();
        monitor.set_online(true);
        assert!(!rx.has_changed().unwrap());
    }
}
