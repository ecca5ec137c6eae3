use std::sync::Arc;

use load_balancing_client::client::HttpClientFactory;
use load_balancing_client::config::{parse_server_list, ClientConfig};
use load_balancing_client::registry::mqtt::{spawn_membership_feed, MqttFeedOptions};
use load_balancing_client::strategies::{RandomStrategy, RoundRobinStrategy};
use load_balancing_client::{DynamicServerList, LoadBalancer, LoadBalancingClient, ServerSelectionStrategy};
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_SERVERS: &str = "mpeg-dash-processor-1:8080,mpeg-dash-processor-2:8080,mpeg-dash-processor-3:8080,mpeg-dash-processor-4:8080";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let bind_address = std::env::var("LB_BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let config = match std::env::var("LB_CONFIG") {
        Ok(path) => ClientConfig::from_file(path)?,
        Err(_) => ClientConfig::new("load-balancer"),
    }
    .with_env_overrides()?;

    let servers = if config.list_of_servers().is_empty() {
        parse_server_list(DEFAULT_SERVERS)?
    } else {
        config.list_of_servers().to_vec()
    };
    let registry = Arc::new(DynamicServerList::new(servers));

    // Membership updates arrive over MQTT when a broker is configured.
    let _membership_feed = std::env::var("MQTT_BROKER_HOST").ok().map(|broker_host| {
        let broker_port: u16 = std::env::var("MQTT_BROKER_PORT").ok().and_then(|s| s.parse().ok()).unwrap_or(1883);
        spawn_membership_feed(Arc::clone(&registry), MqttFeedOptions::new(broker_host, broker_port))
    });

    let strategy: Arc<dyn ServerSelectionStrategy> = match std::env::var("LB_STRATEGY").as_deref() {
        Ok("random") => Arc::new(RandomStrategy::new()),
        _ => Arc::new(RoundRobinStrategy::new()),
    };

    let factory = HttpClientFactory::new(&config);
    let client = Arc::new(LoadBalancingClient::new(config, registry, strategy, factory, None));
    info!(
        client = client.name(),
        response_timeout = ?client.estimated_response_timeout(None),
        "starting HTTP load balancer"
    );

    let load_balancer = LoadBalancer::new(client);
    let addr = bind_address.parse()?;
    load_balancer
        .serve(addr, async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    info!(requests = load_balancer.requests_handled(), "load balancer stopped");
    Ok(())
}
