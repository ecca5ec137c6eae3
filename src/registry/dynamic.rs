use std::collections::HashSet;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info};

use super::{MembershipChange, MembershipNotifier, ServerRegistry};
use crate::destination::Destination;

/// A server list that can be replaced at runtime and notifies subscribers of
/// every effective change.
#[derive(Default)]
pub struct DynamicServerList {
    servers: RwLock<Vec<Destination>>,
    subscribers: Mutex<Vec<UnboundedSender<MembershipChange>>>,
}

impl DynamicServerList {
    pub fn new(servers: Vec<Destination>) -> Self {
        Self {
            servers: RwLock::new(dedup(servers)),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn servers(&self) -> Vec<Destination> {
        self.servers.read().clone()
    }

    /// Replaces the server list. Returns `false` and notifies nobody when the
    /// new list equals the current one.
    pub fn set_servers(&self, servers: Vec<Destination>) -> bool {
        let current = dedup(servers);
        // Holding the subscriber lock across the swap keeps notifications in
        // the same order as the updates they describe.
        let mut subscribers = self.subscribers.lock();
        let previous = {
            let mut guard = self.servers.write();
            if *guard == current {
                return false;
            }
            std::mem::replace(&mut *guard, current.clone())
        };
        info!(previous = previous.len(), current = current.len(), "server list changed");

        let change = MembershipChange { previous, current };
        subscribers.retain(|tx| tx.send(change.clone()).is_ok());
        debug!(subscribers = subscribers.len(), "membership change delivered");
        true
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

fn dedup(servers: Vec<Destination>) -> Vec<Destination> {
    let mut seen = HashSet::with_capacity(servers.len());
    servers.into_iter().filter(|d| seen.insert(d.clone())).collect()
}

impl ServerRegistry for DynamicServerList {
    fn reachable_servers(&self) -> Vec<Destination> {
        self.servers()
    }

    fn membership(&self) -> Option<&dyn MembershipNotifier> {
        Some(self)
    }
}

impl MembershipNotifier for DynamicServerList {
    fn subscribe(&self) -> UnboundedReceiver<MembershipChange> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }
}
