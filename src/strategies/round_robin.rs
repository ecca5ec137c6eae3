use std::sync::atomic::{AtomicUsize, Ordering};

use super::strategy::ServerSelectionStrategy;
use crate::destination::Destination;

pub struct RoundRobinStrategy {
    counter: AtomicUsize,
}

impl RoundRobinStrategy {
    pub fn new() -> Self {
        Self {
            counter: AtomicUsize::new(0),
        }
    }
}

impl Default for RoundRobinStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerSelectionStrategy for RoundRobinStrategy {
    fn choose(&self, servers: &[Destination]) -> Option<Destination> {
        if servers.is_empty() {
            return None;
        }

        let index = self.counter.fetch_add(1, Ordering::Relaxed) % servers.len();
        Some(servers[index].clone())
    }
}
