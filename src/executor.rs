use std::future::Future;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::destination::Destination;
use crate::error::{ClientError, Result};
use crate::registry::ServerRegistry;
use crate::retry::RetryHandler;
use crate::strategies::ServerSelectionStrategy;

/// Runs an operation against destinations chosen from a registry, retrying
/// on the same and then on other servers as the retry handler allows.
pub struct LoadBalancerExecutor {
    registry: Arc<dyn ServerRegistry>,
    strategy: Arc<dyn ServerSelectionStrategy>,
    retry_handler: Arc<dyn RetryHandler>,
}

impl LoadBalancerExecutor {
    pub fn new(
        registry: Arc<dyn ServerRegistry>,
        strategy: Arc<dyn ServerSelectionStrategy>,
        retry_handler: Arc<dyn RetryHandler>,
    ) -> Self {
        Self {
            registry,
            strategy,
            retry_handler,
        }
    }

    pub fn registry(&self) -> &Arc<dyn ServerRegistry> {
        &self.registry
    }

    pub fn choose_server(&self) -> Result<Destination> {
        self.strategy
            .choose(&self.registry.reachable_servers())
            .ok_or(ClientError::NoAvailableServers)
    }

    pub async fn execute<T, Op, Fut>(&self, mut operation: Op) -> Result<T>
    where
        Op: FnMut(Destination) -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
    {
        let same_budget = self.retry_handler.max_retries_on_same_server();
        let next_budget = self.retry_handler.max_retries_on_next_server();

        let mut servers_tried = 0u32;
        loop {
            let destination = self.choose_server()?;
            let mut attempt = 0u32;
            let error = loop {
                match operation(destination.clone()).await {
                    Ok(value) => return Ok(value),
                    Err(e) if attempt < same_budget && self.retry_handler.is_retriable(&e, true) => {
                        attempt += 1;
                        debug!(%destination, attempt, error = %e, "retrying on same server");
                    }
                    Err(e) => break e,
                }
            };

            if servers_tried >= next_budget || !self.retry_handler.is_retriable(&error, false) {
                warn!(%destination, error = %error, "giving up");
                return Err(error);
            }
            servers_tried += 1;
            debug!(%destination, servers_tried, error = %error, "retrying on next server");
        }
    }
}
