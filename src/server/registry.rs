//! Live socket bookkeeping for the server.
//!
//! The [`Registry`] maps each [`ConnectionId`] to the [`SocketHandle`] of an
//! upgraded socket. An id is inserted once the `101` response is written and
//! removed when the socket's task ends; a handle found in the map always
//! belongs to a socket whose task is still running.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use log::info;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::connection::SocketState;

/// Opaque per-socket identifier. Never interpreted, only compared.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// A fresh random id (UUID v4 text).
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ConnectionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for ConnectionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

pub(crate) enum Outbound {
    Write(Vec<u8>),
    Destroy,
}

/// Cloneable reference to one upgraded socket.
///
/// Writing goes through [`ServerHandle::send`](super::ServerHandle::send),
/// which checks the registry first.
#[derive(Clone)]
pub struct SocketHandle {
    id: ConnectionId,
    peer: Option<SocketAddr>,
    state: Arc<Mutex<SocketState>>,
    tx: mpsc::UnboundedSender<Outbound>,
}

impl SocketHandle {
    pub(crate) fn new(
        id: ConnectionId,
        peer: Option<SocketAddr>,
        tx: mpsc::UnboundedSender<Outbound>,
    ) -> Self {
        Self {
            id,
            peer,
            state: Arc::new(Mutex::new(SocketState::Upgrading)),
            tx,
        }
    }

    /// Where the socket is in its lifecycle. Shared by every clone.
    #[must_use]
    pub fn state(&self) -> SocketState {
        *self.state.lock()
    }

    pub(crate) fn set_state(&self, state: SocketState) {
        *self.state.lock() = state;
    }

    #[must_use]
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Remote address, when the transport has one.
    #[must_use]
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Whether the socket's task has ended.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Queue an outbound command; false if the socket is gone.
    pub(crate) fn push(&self, command: Outbound) -> bool {
        self.tx.send(command).is_ok()
    }
}

impl PartialEq for SocketHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for SocketHandle {}

impl fmt::Debug for SocketHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketHandle")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("state", &self.state())
            .finish()
    }
}

/// Hook notified after every registry change.
///
/// `active` lists the ids still registered after the change.
pub trait RegistryObserver: Send + Sync {
    fn on_insert(&self, id: &ConnectionId, active: &[ConnectionId]) {
        let _ = (id, active);
    }

    fn on_remove(&self, id: &ConnectionId, reason: &str, active: &[ConnectionId]) {
        let _ = (id, reason, active);
    }
}

/// Observer that logs the active socket count and listing.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl RegistryObserver for LogObserver {
    fn on_insert(&self, id: &ConnectionId, active: &[ConnectionId]) {
        info!("socket registered: {} (active sockets: {})", id, active.len());
    }

    fn on_remove(&self, id: &ConnectionId, reason: &str, active: &[ConnectionId]) {
        info!("socket removed: {} ({})", id, reason);
        info!("active sockets: {}", active.len());
        for other in active {
            info!("\tsocket: {}", other);
        }
    }
}

/// Map of live sockets.
#[derive(Default)]
pub struct Registry {
    sockets: Mutex<HashMap<ConnectionId, SocketHandle>>,
    observer: Option<Arc<dyn RegistryObserver>>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_observer(observer: Arc<dyn RegistryObserver>) -> Self {
        Self {
            sockets: Mutex::default(),
            observer: Some(observer),
        }
    }

    /// Register a socket. Returns false, leaving the map unchanged, if the
    /// id is already present.
    pub fn insert(&self, handle: SocketHandle) -> bool {
        let id = handle.id.clone();
        let snapshot = {
            let mut sockets = self.sockets.lock();
            if sockets.contains_key(&id) {
                return false;
            }
            sockets.insert(id.clone(), handle);
            self.snapshot(&sockets)
        };

        if let (Some(observer), Some(active)) = (&self.observer, snapshot) {
            observer.on_insert(&id, &active);
        }
        true
    }

    /// Unregister a socket, returning its handle if it was present.
    pub fn remove(&self, id: &ConnectionId, reason: &str) -> Option<SocketHandle> {
        let (removed, snapshot) = {
            let mut sockets = self.sockets.lock();
            let removed = sockets.remove(id);
            let snapshot = removed.as_ref().and_then(|_| self.snapshot(&sockets));
            (removed, snapshot)
        };

        if let (Some(observer), Some(active)) = (&self.observer, snapshot) {
            observer.on_remove(id, reason, &active);
        }
        removed
    }

    fn snapshot(&self, sockets: &HashMap<ConnectionId, SocketHandle>) -> Option<Vec<ConnectionId>> {
        self.observer.as_ref().map(|_| {
            let mut ids: Vec<ConnectionId> = sockets.keys().cloned().collect();
            ids.sort();
            ids
        })
    }

    #[must_use]
    pub fn get(&self, id: &ConnectionId) -> Option<SocketHandle> {
        self.sockets.lock().get(id).cloned()
    }

    #[must_use]
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.sockets.lock().contains_key(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sockets.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sockets.lock().is_empty()
    }

    /// Registered ids, sorted.
    #[must_use]
    pub fn ids(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<ConnectionId> = self.sockets.lock().keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("sockets", &self.len())
            .field("observed", &self.observer.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(id: &str) -> (SocketHandle, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (SocketHandle::new(id.into(), None, tx), rx)
    }

    #[derive(Default)]
    struct Recorder {
        log: Mutex<Vec<String>>,
    }

    impl RegistryObserver for Recorder {
        fn on_insert(&self, id: &ConnectionId, active: &[ConnectionId]) {
            self.log.lock().push(format!("+{} ({})", id, active.len()));
        }

        fn on_remove(&self, id: &ConnectionId, reason: &str, active: &[ConnectionId]) {
            self.log
                .lock()
                .push(format!("-{} {} ({})", id, reason, active.len()));
        }
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let a = ConnectionId::generate();
        let b = ConnectionId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 36);
    }

    #[test]
    fn test_insert_and_remove() {
        let registry = Registry::new();
        let (a, _rx_a) = handle("a");
        let (b, _rx_b) = handle("b");

        assert!(registry.insert(a.clone()));
        assert!(registry.insert(b));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.ids(), vec!["a".into(), "b".into()]);
        assert_eq!(registry.get(a.id()), Some(a.clone()));

        let removed = registry.remove(a.id(), "test");
        assert_eq!(removed, Some(a.clone()));
        assert!(!registry.contains(a.id()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let registry = Registry::new();
        let (first, _rx1) = handle("dup");
        let (second, _rx2) = handle("dup");

        assert!(registry.insert(first));
        assert!(!registry.insert(second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_missing_is_noop() {
        let registry = Registry::new();
        assert_eq!(registry.remove(&"ghost".into(), "test"), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_observer_sees_changes() {
        let recorder = Arc::new(Recorder::default());
        let registry = Registry::with_observer(recorder.clone());
        let (a, _rx) = handle("a");

        registry.insert(a);
        registry.remove(&"a".into(), "Connection closed");
        registry.remove(&"a".into(), "again");

        assert_eq!(
            *recorder.log.lock(),
            vec!["+a (1)".to_string(), "-a Connection closed (0)".to_string()]
        );
    }

    #[test]
    fn test_state_shared_between_clones() {
        let (a, _rx) = handle("a");
        let b = a.clone();
        assert_eq!(b.state(), SocketState::Upgrading);
        a.set_state(SocketState::Open);
        assert_eq!(b.state(), SocketState::Open);
    }

    #[test]
    fn test_handle_closed_when_receiver_dropped() {
        let (a, rx) = handle("a");
        assert!(!a.is_closed());
        assert!(a.push(Outbound::Write(vec![1])));
        drop(rx);
        assert!(a.is_closed());
        assert!(!a.push(Outbound::Destroy));
    }

    #[test]
    fn test_log_observer_does_not_panic() {
        let registry = Registry::with_observer(Arc::new(LogObserver));
        let (a, _rx) = handle("a");
        registry.insert(a);
        registry.remove(&"a".into(), "done");
    }
}
