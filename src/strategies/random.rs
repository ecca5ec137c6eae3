use rand::Rng;

use super::strategy::ServerSelectionStrategy;
use crate::destination::Destination;

pub struct RandomStrategy;

impl RandomStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RandomStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerSelectionStrategy for RandomStrategy {
    fn choose(&self, servers: &[Destination]) -> Option<Destination> {
        if servers.is_empty() {
            return None;
        }
        let mut rng = rand::thread_rng();
        let idx = rng.gen_range(0..servers.len());
        Some(servers[idx].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_a_member() {
        let servers = vec![Destination::new("a", 1), Destination::new("b", 2)];
        for _ in 0..20 {
            let picked = RandomStrategy::new().choose(&servers).unwrap();
            assert!(servers.contains(&picked));
        }
        assert_eq!(RandomStrategy::new().choose(&[]), None);
    }
}
