use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use http::{HeaderMap, HeaderValue};
use hyper::body::Bytes;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response};
use tracing::{debug, info, warn};

use crate::client::{Client, HttpClientFactory};
use crate::error::ClientError;
use crate::load_balancing_client::LoadBalancingClient;

/// HTTP front end that forwards every request through a
/// [`LoadBalancingClient`] of per-backend HTTP clients.
pub struct LoadBalancer {
    client: Arc<LoadBalancingClient<HttpClientFactory>>,
    request_counter: Arc<AtomicU64>,
}

impl LoadBalancer {
    pub fn new(client: Arc<LoadBalancingClient<HttpClientFactory>>) -> Self {
        Self {
            client,
            request_counter: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn requests_handled(&self) -> u64 {
        self.request_counter.load(Ordering::Relaxed)
    }

    pub async fn start(&self, bind_address: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr: SocketAddr = bind_address.parse()?;
        self.serve(addr, std::future::pending()).await
    }

    /// Serves until `shutdown` resolves, then stops accepting and shuts the
    /// client down.
    pub async fn serve<S>(&self, addr: SocketAddr, shutdown: S) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
    where
        S: std::future::Future<Output = ()>,
    {
        let server = hyper::Server::try_bind(&addr)?;
        let client = Arc::clone(&self.client);
        let request_counter = Arc::clone(&self.request_counter);

        let make_svc = make_service_fn(move |_conn| {
            let client = Arc::clone(&client);
            let request_counter = Arc::clone(&request_counter);

            async move {
                Ok::<_, hyper::Error>(service_fn(move |req: Request<Body>| {
                    let client = Arc::clone(&client);
                    request_counter.fetch_add(1, Ordering::Relaxed);
                    async move { Ok::<_, hyper::Error>(forward(&client, req).await) }
                }))
            }
        });

        let server = server.serve(make_svc);
        info!(address = %server.local_addr(), servers = ?self.client.registry().reachable_servers(), "HTTP load balancer listening");
        server.with_graceful_shutdown(shutdown).await?;

        self.client.shutdown();
        Ok(())
    }
}

async fn forward(client: &LoadBalancingClient<HttpClientFactory>, req: Request<Body>) -> Response<Body> {
    let (mut parts, body) = req.into_parts();
    // The body is buffered so that it can be replayed on retry.
    let body = match hyper::body::to_bytes(body).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(error = %e, "failed to read request body");
            return response_with_status(http::StatusCode::BAD_REQUEST, "Unreadable request body");
        }
    };
    sanitize_hop_by_hop_headers(&mut parts.headers);

    let result = client
        .execute(|http_client| {
            let request = outbound_request(&parts, &body, http_client.destination().authority());
            async move {
                let request = request?;
                http_client.connect().await?.send(request).await
            }
        })
        .await;

    match result {
        Ok(mut resp) => {
            sanitize_hop_by_hop_headers(resp.headers_mut());
            resp
        }
        Err(ClientError::NoAvailableServers) => {
            response_with_status(http::StatusCode::BAD_GATEWAY, "No available servers")
        }
        Err(ClientError::Timeout { .. }) => {
            response_with_status(http::StatusCode::GATEWAY_TIMEOUT, "Upstream request timed out")
        }
        Err(e) => {
            debug!(error = %e, "upstream request failed");
            response_with_status(http::StatusCode::BAD_GATEWAY, "Upstream request failed")
        }
    }
}

fn outbound_request(
    parts: &http::request::Parts,
    body: &Bytes,
    authority: String,
) -> Result<Request<Body>, ClientError> {
    let mut request = Request::new(Body::from(body.clone()));
    *request.method_mut() = parts.method.clone();
    *request.uri_mut() = parts.uri.clone();
    *request.version_mut() = parts.version;
    *request.headers_mut() = parts.headers.clone();
    let host = HeaderValue::from_str(&authority).map_err(|_| ClientError::InvalidDestination(authority.clone()))?;
    request.headers_mut().insert(http::header::HOST, host);
    Ok(request)
}

fn sanitize_hop_by_hop_headers(headers: &mut HeaderMap) {
    // Remove hop-by-hop headers per RFC 7230
    static HOP_HEADERS: &[&str] = &[
        "connection",
        "proxy-connection",
        "keep-alive",
        "transfer-encoding",
        "upgrade",
        "te",
        "trailer",
    ];
    for name in HOP_HEADERS {
        headers.remove(*name);
    }
}

fn response_with_status(status: http::StatusCode, msg: &str) -> Response<Body> {
    Response::builder()
        .status(status)
        .header(http::header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Body::from(msg.to_string()))
        .unwrap_or_else(|_| Response::new(Body::from(msg.to_string())))
}
