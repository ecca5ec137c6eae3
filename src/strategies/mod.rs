pub mod random;
pub mod round_robin;
pub mod strategy;

pub use random::RandomStrategy;
pub use round_robin::RoundRobinStrategy;
pub use strategy::ServerSelectionStrategy;
