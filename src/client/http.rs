use std::time::Duration;

use async_trait::async_trait;
use hyper::client::HttpConnector;
use hyper::{Body, Request, Response, Uri};
use parking_lot::RwLock;
use tracing::debug;

use super::{Client, ClientFactory};
use crate::config::ClientConfig;
use crate::destination::Destination;
use crate::error::{ClientError, Result};

type HyperClient = hyper::Client<HttpConnector, Body>;

/// HTTP/1.1 client with its own keep-alive pool for a single destination.
///
/// Building the client opens nothing; connections are established by hyper on
/// the first request. Shutting down drops the pool.
pub struct HttpClient {
    destination: Destination,
    read_timeout: Duration,
    inner: RwLock<Option<HyperClient>>,
}

impl HttpClient {
    pub fn new(destination: Destination, connect_timeout: Duration, read_timeout: Duration) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(connect_timeout));
        connector.set_nodelay(true);
        let client = hyper::Client::builder().build(connector);
        Self {
            destination,
            read_timeout,
            inner: RwLock::new(Some(client)),
        }
    }
}

#[async_trait]
impl Client for HttpClient {
    type Connection = HttpConnection;

    fn destination(&self) -> &Destination {
        &self.destination
    }

    async fn connect(&self) -> Result<HttpConnection> {
        let client = self.inner.read().clone().ok_or_else(|| ClientError::Closed {
            destination: self.destination.clone(),
        })?;
        Ok(HttpConnection {
            destination: self.destination.clone(),
            read_timeout: self.read_timeout,
            client,
        })
    }

    fn shutdown(&self) -> Result<()> {
        if self.inner.write().take().is_some() {
            debug!(destination = %self.destination, "http client pool released");
        }
        Ok(())
    }

    fn is_shutdown(&self) -> bool {
        self.inner.read().is_none()
    }
}

/// A request channel onto an [`HttpClient`]'s pool.
pub struct HttpConnection {
    destination: Destination,
    read_timeout: Duration,
    client: HyperClient,
}

impl HttpConnection {
    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    /// Rewrites `request` to target this destination and sends it.
    pub async fn send(&self, mut request: Request<Body>) -> Result<Response<Body>> {
        let path_and_query = request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());
        let uri = Uri::builder()
            .scheme("http")
            .authority(self.destination.authority().as_str())
            .path_and_query(path_and_query.as_str())
            .build()
            .map_err(|e| ClientError::InvalidRequest {
                destination: self.destination.clone(),
                message: e.to_string(),
            })?;
        *request.uri_mut() = uri;

        match tokio::time::timeout(self.read_timeout, self.client.request(request)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(source)) => Err(ClientError::Request {
                destination: self.destination.clone(),
                source,
            }),
            Err(_) => Err(ClientError::Timeout {
                destination: self.destination.clone(),
                elapsed: self.read_timeout,
            }),
        }
    }
}

pub struct HttpClientFactory {
    connect_timeout: Duration,
    read_timeout: Duration,
}

impl HttpClientFactory {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout(None),
            read_timeout: config.read_timeout(None),
        }
    }
}

impl ClientFactory for HttpClientFactory {
    type Client = HttpClient;

    fn create(&self, destination: &Destination) -> Result<HttpClient> {
        Ok(HttpClient::new(
            destination.clone(),
            self.connect_timeout,
            self.read_timeout,
        ))
    }
}
