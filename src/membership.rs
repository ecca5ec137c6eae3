use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::ConnectionCache;
use crate::client::ClientFactory;
use crate::destination::Destination;
use crate::registry::{MembershipChange, MembershipNotifier};

/// Evicts cached clients whose destination left the registry.
pub struct MembershipSync<F: ClientFactory> {
    cache: Arc<ConnectionCache<F>>,
}

impl<F: ClientFactory> Clone for MembershipSync<F> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
        }
    }
}

impl<F: ClientFactory> MembershipSync<F> {
    pub fn new(cache: Arc<ConnectionCache<F>>) -> Self {
        Self { cache }
    }

    /// Removes every cached destination missing from `change.current` and
    /// returns them. Never panics; failures are logged and swallowed.
    pub fn on_membership_changed(&self, change: &MembershipChange) -> Vec<Destination> {
        let current: HashSet<&Destination> = change.current.iter().collect();
        let mut evicted = Vec::new();
        for destination in self.cache.destinations() {
            if current.contains(&destination) {
                continue;
            }
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.cache.remove(&destination)));
            match outcome {
                Ok(Some(_)) => {
                    info!(%destination, "evicted client for departed server");
                    evicted.push(destination);
                }
                Ok(None) => {}
                Err(_) => warn!(%destination, "panic while evicting client"),
            }
        }
        evicted
    }

    /// Registers with `notifier` and applies every change on a background task
    /// until the returned subscription is dropped.
    pub fn subscribe(self, notifier: &dyn MembershipNotifier) -> MembershipSubscription {
        let mut changes = notifier.subscribe();
        let handle = tokio::spawn(async move {
            while let Some(change) = changes.recv().await {
                let evicted = self.on_membership_changed(&change);
                debug!(evicted = evicted.len(), "membership change applied");
            }
            debug!("membership notifications ended");
        });
        MembershipSubscription { handle }
    }
}

/// Live registration of a [`MembershipSync`] with a registry.
pub struct MembershipSubscription {
    handle: JoinHandle<()>,
}

impl MembershipSubscription {
    pub fn unsubscribe(self) {
        drop(self);
    }

    pub fn is_active(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for MembershipSubscription {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
