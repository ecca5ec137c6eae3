use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::debug;

use super::{Client, ClientFactory};
use crate::config::ClientConfig;
use crate::destination::Destination;
use crate::error::{ClientError, Result};

/// Opens a fresh TCP stream to its destination on every `connect`.
pub struct TcpClient {
    destination: Destination,
    connect_timeout: Duration,
    closed: AtomicBool,
    connections_opened: AtomicU64,
}

impl TcpClient {
    pub fn new(destination: Destination, connect_timeout: Duration) -> Self {
        Self {
            destination,
            connect_timeout,
            closed: AtomicBool::new(false),
            connections_opened: AtomicU64::new(0),
        }
    }

    pub fn connections_opened(&self) -> u64 {
        self.connections_opened.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Client for TcpClient {
    type Connection = TcpStream;

    fn destination(&self) -> &Destination {
        &self.destination
    }

    async fn connect(&self) -> Result<TcpStream> {
        if self.is_shutdown() {
            return Err(ClientError::Closed {
                destination: self.destination.clone(),
            });
        }
        let address = (self.destination.host(), self.destination.port());
        let stream = match tokio::time::timeout(self.connect_timeout, TcpStream::connect(address)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                return Err(ClientError::Connect {
                    destination: self.destination.clone(),
                    source,
                })
            }
            Err(_) => {
                return Err(ClientError::Timeout {
                    destination: self.destination.clone(),
                    elapsed: self.connect_timeout,
                })
            }
        };
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
        debug!(destination = %self.destination, "opened tcp connection");
        Ok(stream)
    }

    fn shutdown(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!(destination = %self.destination, "tcp client shut down");
        }
        Ok(())
    }

    fn is_shutdown(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

pub struct TcpClientFactory {
    connect_timeout: Duration,
}

impl TcpClientFactory {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout(None),
        }
    }
}

impl ClientFactory for TcpClientFactory {
    type Client = TcpClient;

    fn create(&self, destination: &Destination) -> Result<TcpClient> {
        Ok(TcpClient::new(destination.clone(), self.connect_timeout))
    }
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;

    use super::*;

    #[tokio::test]
    async fn connects_to_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let client = TcpClient::new(Destination::new("127.0.0.1", port), Duration::from_secs(1));

        let accept = tokio::spawn(async move { listener.accept().await.map(|_| ()) });
        let stream = client.connect().await.unwrap();

        assert_eq!(stream.peer_addr().unwrap().port(), port);
        assert_eq!(client.connections_opened(), 1);
        accept.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn refuses_after_shutdown() {
        let client = TcpClient::new(Destination::new("127.0.0.1", 1), Duration::from_secs(1));
        client.shutdown().unwrap();
        client.shutdown().unwrap();

        assert!(client.is_shutdown());
        assert!(matches!(client.connect().await, Err(ClientError::Closed { .. })));
    }

    #[tokio::test]
    async fn reports_refused_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let client = TcpClient::new(Destination::new("127.0.0.1", port), Duration::from_secs(1));

        let err = client.connect().await.unwrap_err();
        assert!(err.is_connect_failure());
    }
}
