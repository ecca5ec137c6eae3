use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::cache::ConnectionCache;
use crate::client::{Client, ClientFactory};
use crate::config::{ClientConfig, ConfigKey, RequestConfig};
use crate::destination::Destination;
use crate::error::{ClientError, Result};
use crate::executor::LoadBalancerExecutor;
use crate::membership::{MembershipSubscription, MembershipSync};
use crate::registry::ServerRegistry;
use crate::retry::{DefaultRetryHandler, RetryHandler};
use crate::strategies::ServerSelectionStrategy;

/// A client that spreads work over the registry's servers, keeping one
/// cached client per server and dropping clients for servers that leave.
pub struct LoadBalancingClient<F: ClientFactory> {
    config: Arc<ClientConfig>,
    cache: Arc<ConnectionCache<F>>,
    executor: LoadBalancerExecutor,
    retry_handler: Option<Arc<dyn RetryHandler>>,
    membership: Mutex<Option<MembershipSubscription>>,
    closed: AtomicBool,
}

impl<F: ClientFactory> LoadBalancingClient<F> {
    /// Wires the client together. When the registry supports membership
    /// notifications a [`MembershipSync`] is subscribed, which requires a
    /// tokio runtime.
    pub fn new(
        config: ClientConfig,
        registry: Arc<dyn ServerRegistry>,
        strategy: Arc<dyn ServerSelectionStrategy>,
        factory: F,
        retry_handler: Option<Arc<dyn RetryHandler>>,
    ) -> Self {
        let cache = Arc::new(ConnectionCache::new(factory));
        let membership = registry
            .membership()
            .map(|notifier| MembershipSync::new(Arc::clone(&cache)).subscribe(notifier));
        info!(
            client = config.client_name(),
            membership_sync = membership.is_some(),
            "load balancing client created"
        );

        let effective_handler: Arc<dyn RetryHandler> = match &retry_handler {
            Some(handler) => Arc::clone(handler),
            None => Arc::new(DefaultRetryHandler::from_config(&config)),
        };
        let executor = LoadBalancerExecutor::new(registry, strategy, effective_handler);

        Self {
            config: Arc::new(config),
            cache,
            executor,
            retry_handler,
            membership: Mutex::new(membership),
            closed: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        self.config.client_name()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<ConnectionCache<F>> {
        &self.cache
    }

    pub fn registry(&self) -> &Arc<dyn ServerRegistry> {
        self.executor.registry()
    }

    pub fn has_membership_sync(&self) -> bool {
        self.membership.lock().is_some()
    }

    /// No limit is imposed on concurrent requests.
    pub fn max_concurrent_requests(&self) -> Option<usize> {
        None
    }

    pub fn client_for(&self, destination: &Destination) -> Result<Arc<F::Client>> {
        self.cache.get_or_create(destination)
    }

    pub fn remove_client(&self, destination: &Destination) -> Option<Arc<F::Client>> {
        self.cache.remove(destination)
    }

    /// Worst case time for one logical request: every allowed attempt hitting
    /// both the connect and the read timeout.
    pub fn estimated_response_timeout(&self, request: Option<&RequestConfig>) -> Duration {
        let (next_server, same_server) = match &self.retry_handler {
            Some(handler) => (
                u64::from(handler.max_retries_on_next_server()),
                u64::from(handler.max_retries_on_same_server()),
            ),
            None => (
                self.config.get_or_default(ConfigKey::MaxAutoRetriesNextServer),
                self.config.get_or_default(ConfigKey::MaxAutoRetries),
            ),
        };
        let read_timeout = self.config.property(ConfigKey::ReadTimeout, request);
        let connect_timeout = self.config.property(ConfigKey::ConnectTimeout, request);

        let millis = next_server
            .saturating_add(1)
            .saturating_mul(same_server.saturating_add(1))
            .saturating_mul(read_timeout.saturating_add(connect_timeout));
        Duration::from_millis(millis)
    }

    /// Opens a connection to a server picked by the strategy.
    pub async fn connect(&self) -> Result<<F::Client as Client>::Connection> {
        self.execute(|client| async move { client.connect().await }).await
    }

    /// Runs `operation` on the cached client of a server picked by the
    /// strategy, retrying per the retry handler.
    pub async fn execute<T, Op, Fut>(&self, mut operation: Op) -> Result<T>
    where
        Op: FnMut(Arc<F::Client>) -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
    {
        if self.closed.load(Ordering::Acquire) {
            return Err(ClientError::Shutdown);
        }
        let cache = &self.cache;
        self.executor
            .execute(|destination| {
                let resolved = cache.get_or_create(&destination);
                let attempt = resolved.map(&mut operation);
                async move { attempt?.await }
            })
            .await
    }

    /// Stops membership tracking and shuts down every cached client.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(subscription) = self.membership.lock().take() {
            subscription.unsubscribe();
        }
        let count = self.cache.len();
        self.cache.close_all();
        debug!(clients = count, "closed cached clients");
        info!(client = self.name(), "load balancing client shut down");
    }
}
