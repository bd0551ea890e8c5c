//! Network availability signal.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

/// Online/offline flag shared by the connection and the host application.
///
/// The host reports availability changes; the connection defers reconnect
/// attempts while offline.
#[derive(Debug, Clone)]
pub struct NetworkMonitor {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkMonitor {
    /// Creates a monitor that starts online.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(true);
        Self { tx: Arc::new(tx) }
    }

    /// Reports a change in availability.
    pub fn set_online(&self, online: bool) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            info!(online, "network availability changed");
        }
    }

    /// Returns true if the network is reported available.
    #[must_use]
    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Returns a receiver for availability changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Waits until the network is reported available.
    pub async fn wait_online(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|online| *online).await;
    }
}
