use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, warn};

use crate::client::{Client, ClientFactory};
use crate::destination::Destination;
use crate::error::Result;

/// Destination → client map that constructs at most one client per destination.
///
/// Lookups and publications are scoped to the destination's shard; there is
/// no lock spanning the whole cache. A client reachable through the cache has
/// never been shut down by it: removal always unpublishes before closing.
pub struct ConnectionCache<F: ClientFactory> {
    factory: F,
    clients: DashMap<Destination, Arc<F::Client>>,
}

impl<F: ClientFactory> ConnectionCache<F> {
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            clients: DashMap::new(),
        }
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Returns the cached client for `destination`, creating and publishing one
    /// on a miss. Concurrent misses for the same destination invoke the factory
    /// once and all observe the same client. On factory failure nothing is
    /// published.
    pub fn get_or_create(&self, destination: &Destination) -> Result<Arc<F::Client>> {
        if let Some(client) = self.clients.get(destination) {
            return Ok(Arc::clone(client.value()));
        }
        match self.clients.entry(destination.clone()) {
            Entry::Occupied(entry) => Ok(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                let client = Arc::new(self.factory.create(destination)?);
                entry.insert(Arc::clone(&client));
                debug!(%destination, "published client");
                Ok(client)
            }
        }
    }

    pub fn get(&self, destination: &Destination) -> Option<Arc<F::Client>> {
        self.clients.get(destination).map(|c| Arc::clone(c.value()))
    }

    /// Unpublishes and shuts down the client for `destination`.
    ///
    /// Only the caller that actually removed the entry closes it, so a client
    /// is shut down at most once by the cache. Shutdown errors are logged;
    /// removal happens regardless.
    pub fn remove(&self, destination: &Destination) -> Option<Arc<F::Client>> {
        let (_, client) = self.clients.remove(destination)?;
        if let Err(e) = client.shutdown() {
            warn!(%destination, error = %e, "failed to shut down client");
        } else {
            debug!(%destination, "removed client");
        }
        Some(client)
    }

    /// Removes and shuts down every cached client.
    pub fn close_all(&self) {
        for destination in self.destinations() {
            self.remove(&destination);
        }
    }

    pub fn destinations(&self) -> Vec<Destination> {
        self.clients.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn contains(&self, destination: &Destination) -> bool {
        self.clients.contains_key(destination)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;

    use async_trait::async_trait;

    use super::*;
    use crate::error::ClientError;

    struct FakeClient {
        destination: Destination,
        shutdowns: AtomicUsize,
        fail_shutdown: bool,
    }

    #[async_trait]
    impl Client for FakeClient {
        type Connection = ();

        fn destination(&self) -> &Destination {
            &self.destination
        }

        async fn connect(&self) -> Result<()> {
            Ok(())
        }

        fn shutdown(&self) -> Result<()> {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
            if self.fail_shutdown {
                return Err(ClientError::Closed {
                    destination: self.destination.clone(),
                });
            }
            Ok(())
        }

        fn is_shutdown(&self) -> bool {
            self.shutdowns.load(Ordering::SeqCst) > 0
        }
    }

    #[derive(Default)]
    struct FakeFactory {
        created: AtomicUsize,
        fail: AtomicBool,
        fail_shutdown: bool,
    }

    impl ClientFactory for FakeFactory {
        type Client = FakeClient;

        fn create(&self, destination: &Destination) -> Result<FakeClient> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(ClientError::creation(destination, "refused"));
            }
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok(FakeClient {
                destination: destination.clone(),
                shutdowns: AtomicUsize::new(0),
                fail_shutdown: self.fail_shutdown,
            })
        }
    }

    fn d(name: &str) -> Destination {
        Destination::new(name, 80)
    }

    #[test]
    fn reuses_client_for_same_destination() {
        let cache = ConnectionCache::new(FakeFactory::default());

        let first = cache.get_or_create(&d("a")).unwrap();
        let second = cache.get_or_create(&d("a")).unwrap();
        let other = cache.get_or_create(&d("b")).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(cache.factory().created.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn concurrent_misses_publish_once() {
        const THREADS: usize = 16;
        let cache = Arc::new(ConnectionCache::new(FakeFactory::default()));
        let barrier = Arc::new(Barrier::new(THREADS));

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    cache.get_or_create(&d("a")).unwrap()
                })
            })
            .collect();
        let clients: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(cache.factory().created.load(Ordering::SeqCst), 1);
        assert!(clients.iter().all(|c| Arc::ptr_eq(c, &clients[0])));
    }

    #[test]
    fn factory_failure_publishes_nothing() {
        let cache = ConnectionCache::new(FakeFactory::default());
        cache.get_or_create(&d("a")).unwrap();
        cache.factory().fail.store(true, Ordering::SeqCst);

        let err = cache.get_or_create(&d("b")).err().unwrap();

        assert!(matches!(err, ClientError::Creation { .. }));
        assert_eq!(cache.destinations(), vec![d("a")]);

        cache.factory().fail.store(false, Ordering::SeqCst);
        assert!(cache.get_or_create(&d("b")).is_ok());
    }

    #[test]
    fn remove_closes_exactly_once() {
        let cache = ConnectionCache::new(FakeFactory::default());
        let client = cache.get_or_create(&d("a")).unwrap();

        let removed = cache.remove(&d("a")).unwrap();
        assert!(Arc::ptr_eq(&client, &removed));
        assert!(cache.remove(&d("a")).is_none());

        assert_eq!(client.shutdowns.load(Ordering::SeqCst), 1);
        assert!(!cache.contains(&d("a")));
    }

    #[test]
    fn remove_is_unconditional_when_shutdown_fails() {
        let cache = ConnectionCache::new(FakeFactory {
            fail_shutdown: true,
            ..Default::default()
        });
        let client = cache.get_or_create(&d("a")).unwrap();

        assert!(cache.remove(&d("a")).is_some());
        assert!(cache.is_empty());
        assert_eq!(client.shutdowns.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn close_all_empties_cache() {
        let cache = ConnectionCache::new(FakeFactory::default());
        let a = cache.get_or_create(&d("a")).unwrap();
        let b = cache.get_or_create(&d("b")).unwrap();

        cache.close_all();

        assert!(cache.is_empty());
        assert_eq!(a.shutdowns.load(Ordering::SeqCst), 1);
        assert_eq!(b.shutdowns.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn concurrent_close_all_closes_each_client_once() {
        let cache = Arc::new(ConnectionCache::new(FakeFactory::default()));
        let clients: Vec<_> = (0..32)
            .map(|i| cache.get_or_create(&Destination::new("host", i)).unwrap())
            .collect();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || cache.close_all())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(cache.is_empty());
        assert!(clients.iter().all(|c| c.shutdowns.load(Ordering::SeqCst) == 1));
    }

    #[test]
    fn eviction_racing_creation_never_exposes_closed_client() {
        let cache = Arc::new(ConnectionCache::new(FakeFactory::default()));
        let creator = {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                for _ in 0..2000 {
                    cache.get_or_create(&d("a")).unwrap();
                }
            })
        };
        let evictor = {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                for _ in 0..2000 {
                    if let Some(client) = cache.remove(&d("a")) {
                        assert!(client.is_shutdown());
                    }
                }
            })
        };
        creator.join().unwrap();
        evictor.join().unwrap();

        if let Some(client) = cache.get(&d("a")) {
            assert!(!client.is_shutdown());
        }
    }
}
