//! In-process death-notification bridge.
//!
//! The operation table only speaks the [`DeathNotifier`] contract; something
//! has to connect that contract to the daemon's connection layer. This
//! bridge keeps a set of watched clients and a channel into an async task:
//! connection teardown code calls [`DeathWatchHandle::report_death`], and
//! the receiver task runs the cascade in its own context, decoupled from the
//! request paths that mutate the table.
//!
//! The transport that detects deaths (socket close, process exit, ...) stays
//! out of scope; this module is the registration contract plus delivery.

use std::{
    collections::HashSet,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use tokio::sync::mpsc;
use warden_core::{ClientHandle, DeathNotifier};

/// Registration side of the bridge.
///
/// Implements [`DeathNotifier`]; hand it to the table constructor
/// (`warden_core::OperationTable::new`).
pub struct DeathWatchHandle {
    watched: Mutex<HashSet<ClientHandle>>,
    tx: mpsc::UnboundedSender<ClientHandle>,
}

impl DeathWatchHandle {
    fn watched(&self) -> MutexGuard<'_, HashSet<ClientHandle>> {
        self.watched.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Report that `client`'s connection is gone.
    ///
    /// Forwards to the cascade task only for clients with an active watch.
    /// Returns true if a notification was queued.
    pub fn report_death(&self, client: ClientHandle) -> bool {
        if !self.watched().contains(&client) {
            return false;
        }
        if self.tx.send(client).is_err() {
            tracing::warn!(%client, "death-watch receiver dropped; notification lost");
            return false;
        }
        true
    }

    /// True if `client` currently has an active watch.
    #[must_use]
    pub fn is_watched(&self, client: ClientHandle) -> bool {
        self.watched().contains(&client)
    }
}

impl DeathNotifier for DeathWatchHandle {
    fn register_for_death(&self, client: ClientHandle) {
        self.watched().insert(client);
        tracing::debug!(%client, "watching client for death");
    }

    fn deregister_for_death(&self, client: ClientHandle) {
        self.watched().remove(&client);
        tracing::debug!(%client, "stopped watching client");
    }
}

/// Delivery side of the bridge: drives the cascade for each reported death.
pub struct DeathWatchReceiver {
    rx: mpsc::UnboundedReceiver<ClientHandle>,
}

impl DeathWatchReceiver {
    /// Receive the next reported death, or `None` once every
    /// [`DeathWatchHandle`] is dropped.
    pub async fn recv(&mut self) -> Option<ClientHandle> {
        self.rx.recv().await
    }

    /// Run until every [`DeathWatchHandle`] is dropped, invoking `on_death`
    /// for each reported client.
    ///
    /// `on_death` is typically `|c| { table.on_client_death(c); }` or the
    /// broker's engine-aware `handle_client_death`.
    pub async fn run<F>(mut self, mut on_death: F)
    where
        F: FnMut(ClientHandle),
    {
        while let Some(client) = self.recv().await {
            on_death(client);
        }
    }
}

/// Create a connected handle/receiver pair.
#[must_use]
pub fn death_watch() -> (Arc<DeathWatchHandle>, DeathWatchReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = Arc::new(DeathWatchHandle { watched: Mutex::new(HashSet::new()), tx });
    (handle, DeathWatchReceiver { rx })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwatched_clients_are_not_forwarded() {
        let (handle, _rx) = death_watch();
        assert!(!handle.report_death(ClientHandle::new(1)));
    }

    #[test]
    fn watch_lifecycle_gates_forwarding() {
        let (handle, mut rx) = death_watch();
        let client = ClientHandle::new(7);

        handle.register_for_death(client);
        assert!(handle.is_watched(client));
        assert!(handle.report_death(client));

        handle.deregister_for_death(client);
        assert!(!handle.is_watched(client));
        assert!(!handle.report_death(client));

        // Exactly one notification made it through.
        assert_eq!(rx.rx.try_recv().ok(), Some(client));
        assert!(rx.rx.try_recv().is_err());
    }
}
