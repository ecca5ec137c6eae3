pub mod cache;
pub mod client;
pub mod config;
pub mod destination;
pub mod error;
pub mod executor;
pub mod load_balancer;
pub mod load_balancing_client;
pub mod membership;
pub mod registry;
pub mod retry;
pub mod strategies;

pub use cache::ConnectionCache;
pub use client::{Client, ClientFactory};
pub use config::{ClientConfig, ConfigKey, RequestConfig};
pub use destination::Destination;
pub use error::{ClientError, ConfigError};
pub use load_balancer::LoadBalancer;
pub use load_balancing_client::LoadBalancingClient;
pub use membership::{MembershipSubscription, MembershipSync};
pub use registry::{DynamicServerList, MembershipChange, MembershipNotifier, ServerRegistry, StaticServerList};
pub use retry::{DefaultRetryHandler, RetryHandler};
pub use strategies::ServerSelectionStrategy;
