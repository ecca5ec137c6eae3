pub mod dynamic;
pub mod mqtt;

use tokio::sync::mpsc::UnboundedReceiver;

use crate::destination::Destination;

pub use dynamic::DynamicServerList;

/// One membership transition, old and new healthy sets in registry order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipChange {
    pub previous: Vec<Destination>,
    pub current: Vec<Destination>,
}

/// Authoritative source of the destinations a client may use.
pub trait ServerRegistry: Send + Sync {
    fn reachable_servers(&self) -> Vec<Destination>;

    /// The change-notification capability, for registries that support it.
    fn membership(&self) -> Option<&dyn MembershipNotifier> {
        None
    }
}

/// Capability of registries whose membership changes at runtime.
pub trait MembershipNotifier: Send + Sync {
    /// Registers a new subscriber. Every later change is delivered on the
    /// returned channel; dropping the receiver unregisters it.
    fn subscribe(&self) -> UnboundedReceiver<MembershipChange>;
}

/// A fixed set of servers. Never notifies.
#[derive(Debug, Clone, Default)]
pub struct StaticServerList {
    servers: Vec<Destination>,
}

impl StaticServerList {
    pub fn new(servers: Vec<Destination>) -> Self {
        Self { servers }
    }
}

impl ServerRegistry for StaticServerList {
    fn reachable_servers(&self) -> Vec<Destination> {
        self.servers.clone()
    }
}
