use crate::destination::Destination;

/// Picks the destination for the next attempt.
pub trait ServerSelectionStrategy: Send + Sync {
    fn choose(&self, servers: &[Destination]) -> Option<Destination>;
}
