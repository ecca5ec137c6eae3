use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::DynamicServerList;
use crate::destination::Destination;

pub const DEFAULT_MEMBERSHIP_TOPIC: &str = "loadbalancer/membership";

#[derive(Debug, Clone)]
pub struct MqttFeedOptions {
    pub broker_host: String,
    pub broker_port: u16,
    pub topic: String,
}

impl MqttFeedOptions {
    pub fn new(broker_host: impl Into<String>, broker_port: u16) -> Self {
        Self {
            broker_host: broker_host.into(),
            broker_port,
            topic: DEFAULT_MEMBERSHIP_TOPIC.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct MembershipPayload {
    servers: Vec<Destination>,
}

/// Decodes `{"servers": ["host:port", ...]}`.
pub fn parse_membership_payload(payload: &[u8]) -> Result<Vec<Destination>, serde_json::Error> {
    serde_json::from_slice::<MembershipPayload>(payload).map(|p| p.servers)
}

/// Subscribes to `options.topic` and replaces `servers` with every membership
/// payload published there. Malformed payloads are logged and skipped.
pub fn spawn_membership_feed(servers: Arc<DynamicServerList>, options: MqttFeedOptions) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut mqttoptions = rumqttc::MqttOptions::new(
            format!("lb-{}", rand::thread_rng().gen::<u64>()),
            options.broker_host,
            options.broker_port,
        );
        mqttoptions.set_keep_alive(Duration::from_secs(10));

        let (client, mut eventloop) = rumqttc::AsyncClient::new(mqttoptions, 10);

        if let Err(e) = client.subscribe(options.topic.as_str(), rumqttc::QoS::AtLeastOnce).await {
            warn!(topic = %options.topic, error = %e, "failed to subscribe to membership topic");
            return;
        }
        info!(topic = %options.topic, "subscribed to membership topic");

        loop {
            match eventloop.poll().await {
                Ok(rumqttc::Event::Incoming(rumqttc::Packet::Publish(p))) => {
                    match parse_membership_payload(&p.payload) {
                        Ok(list) => {
                            let count = list.len();
                            if servers.set_servers(list) {
                                info!(servers = count, "membership update received");
                            }
                        }
                        Err(e) => warn!(error = %e, "ignoring malformed membership payload"),
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "mqtt event loop error");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    })
}
