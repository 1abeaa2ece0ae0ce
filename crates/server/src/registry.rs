//! The server's `linkManagerMap`: a concurrent mapping from a locally
//! assigned manager id to the live carrier, used by the diagnostic endpoint
//! to report active Manager/SubStream counts. See spec.md §5: "The server's
//! linkManagerMap (managerId → Manager) is guarded by a concurrent mapping;
//! deletion happens exactly once in the manager's shutdown path."

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use duskmux_mux::AnyManager;

/// Grounded on the teacher's own concurrent-map usage pattern
/// (`dashmap::DashMap`) rather than a plain `Mutex<HashMap<..>>`, since
/// entries are inserted and removed by independent per-connection tasks.
#[derive(Debug, Default)]
pub struct ManagerRegistry {
    managers: DashMap<u64, Arc<dyn AnyManager>>,
    next_id: AtomicU64,
}

impl ManagerRegistry {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers a freshly accepted carrier, returning the id the caller
    /// must pass to [`ManagerRegistry::unregister`] exactly once, from the
    /// same task's accept loop once it observes the carrier is closed.
    pub fn register(&self, manager: Arc<dyn AnyManager>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.managers.insert(id, manager);
        id
    }

    pub fn unregister(&self, id: u64) {
        self.managers.remove(&id);
    }

    #[must_use]
    pub fn manager_count(&self) -> usize {
        self.managers.len()
    }

    #[must_use]
    pub fn active_stream_count(&self) -> usize {
        self.managers.iter().map(|entry| entry.active_streams()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};

    use async_trait::async_trait;
    use bytes::Bytes;
    use duskmux_mux::{AnyStream, Error, Result};

    #[derive(Debug)]
    struct FakeManager {
        streams: usize,
    }

    #[async_trait]
    impl AnyManager for FakeManager {
        async fn open(&self) -> Result<Box<dyn AnyStream>> {
            Err(Error::ManagerClosed)
        }
        async fn open_with_data(&self, _data: Bytes) -> Result<Box<dyn AnyStream>> {
            Err(Error::ManagerClosed)
        }
        async fn accept(&self) -> Result<Box<dyn AnyStream>> {
            Err(Error::ManagerClosed)
        }
        fn close(&self) {}
        fn is_closed(&self) -> bool {
            false
        }
        fn active_streams(&self) -> usize {
            self.streams
        }
        fn local_addr(&self) -> SocketAddr {
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)
        }
        fn remote_addr(&self) -> SocketAddr {
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)
        }
    }

    #[test]
    fn register_and_unregister_tracks_counts() {
        let registry = ManagerRegistry::new();
        let id_a = registry.register(Arc::new(FakeManager { streams: 3 }));
        let _id_b = registry.register(Arc::new(FakeManager { streams: 2 }));
        assert_eq!(registry.manager_count(), 2);
        assert_eq!(registry.active_stream_count(), 5);

        registry.unregister(id_a);
        assert_eq!(registry.manager_count(), 1);
        assert_eq!(registry.active_stream_count(), 2);
    }
}
