//! Handle -> live connection map
//!
//! Shared between RPC tasks and the dispatch thread. Every access holds the
//! lock, including calls made on a connection through
//! [`with_connection`](ConnectionRegistry::with_connection).

use crate::manager::LeConnection;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

pub struct ConnectionRegistry {
    connections: Mutex<HashMap<u16, Arc<dyn LeConnection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Store a connection, returning whatever the handle mapped to before
    pub fn insert(
        &self,
        handle: u16,
        connection: Arc<dyn LeConnection>,
    ) -> Option<Arc<dyn LeConnection>> {
        self.connections.lock().insert(handle, connection)
    }

    /// Run `f` on the connection for `handle` while holding the lock
    pub fn with_connection<R>(
        &self,
        handle: u16,
        f: impl FnOnce(&Arc<dyn LeConnection>) -> R,
    ) -> Option<R> {
        let connections = self.connections.lock();
        connections.get(&handle).map(f)
    }

    #[cfg(test)]
    pub fn contains(&self, handle: u16) -> bool {
        self.connections.lock().contains_key(&handle)
    }

    /// Remove `handle` only if it still maps to `connection`
    pub fn remove_if_same(&self, handle: u16, connection: &Arc<dyn LeConnection>) -> bool {
        let mut connections = self.connections.lock();
        match connections.get(&handle) {
            Some(current) if same_connection(current, connection) => {
                connections.remove(&handle);
                true
            }
            _ => false,
        }
    }

    /// Open handles, ascending
    pub fn handles(&self) -> Vec<u16> {
        let mut handles: Vec<u16> = self.connections.lock().keys().copied().collect();
        handles.sort_unstable();
        handles
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.connections.lock().len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.connections.lock().is_empty()
    }

    /// Visit every entry under the lock
    pub fn for_each(&self, mut f: impl FnMut(u16, &Arc<dyn LeConnection>)) {
        let connections = self.connections.lock();
        for (handle, connection) in connections.iter() {
            f(*handle, connection);
        }
    }
}

// Data pointers only; vtable pointers for the same object may differ.
fn same_connection(a: &Arc<dyn LeConnection>, b: &Arc<dyn LeConnection>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hci::{AddressWithType, DisconnectReason};
    use crate::manager::{EnqueueFn, LinkEventHandler};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NullConnection {
        unregistered: AtomicUsize,
    }

    impl NullConnection {
        fn new() -> Arc<dyn LeConnection> {
            Arc::new(Self {
                unregistered: AtomicUsize::new(0),
            })
        }
    }

    impl LeConnection for NullConnection {
        fn peer(&self) -> AddressWithType {
            AddressWithType::parse("00:00:00:00:00:01", 0).expect("peer")
        }
        fn register_link_handler(&self, _handler: Arc<dyn LinkEventHandler>) {}
        fn unregister_dequeue(&self) {
            self.unregistered.fetch_add(1, Ordering::SeqCst);
        }
        fn try_dequeue(&self) -> Option<Vec<u8>> {
            None
        }
        fn register_enqueue(&self, _produce: EnqueueFn) {}
        fn disconnect(&self, _reason: DisconnectReason) {}
        fn finish(&self) {}
    }

    #[test]
    fn test_insert_and_lookup() {
        let registry = ConnectionRegistry::new();
        assert!(registry.is_empty());

        registry.insert(0x10, NullConnection::new());
        registry.insert(0x11, NullConnection::new());

        assert_eq!(registry.len(), 2);
        assert!(registry.contains(0x10));
        assert_eq!(registry.handles(), vec![0x10, 0x11]);
        assert_eq!(registry.with_connection(0x11, |_| 7), Some(7));
        assert_eq!(registry.with_connection(0x12, |_| 7), None);
    }

    #[test]
    fn test_remove_if_same_ignores_replaced_entry() {
        let registry = ConnectionRegistry::new();
        let first = NullConnection::new();
        let second = NullConnection::new();

        registry.insert(0x10, Arc::clone(&first));
        let previous = registry.insert(0x10, Arc::clone(&second));
        assert!(previous.is_some());

        assert!(!registry.remove_if_same(0x10, &first));
        assert!(registry.contains(0x10));
        assert!(registry.remove_if_same(0x10, &second));
        assert!(!registry.contains(0x10));
    }

    #[test]
    fn test_for_each_visits_all() {
        let registry = ConnectionRegistry::new();
        registry.insert(0x10, NullConnection::new());
        registry.insert(0x20, NullConnection::new());

        let mut seen = Vec::new();
        registry.for_each(|handle, connection| {
            connection.unregister_dequeue();
            seen.push(handle);
        });
        seen.sort_unstable();
        assert_eq!(seen, vec![0x10, 0x20]);
    }
}
