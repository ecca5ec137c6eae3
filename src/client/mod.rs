pub mod http;
pub mod tcp;

use async_trait::async_trait;

use crate::destination::Destination;
use crate::error::Result;

pub use http::{HttpClient, HttpClientFactory, HttpConnection};
pub use tcp::{TcpClient, TcpClientFactory};

/// A network client bound to exactly one [`Destination`].
///
/// Clients own whatever resources they need to talk to their destination
/// and release them on [`Client::shutdown`]. Shutting down twice is a no-op.
#[async_trait]
pub trait Client: Send + Sync + 'static {
    type Connection: Send + 'static;

    fn destination(&self) -> &Destination;

    async fn connect(&self) -> Result<Self::Connection>;

    fn shutdown(&self) -> Result<()>;

    fn is_shutdown(&self) -> bool;
}

/// Builds clients for the connection cache.
///
/// `create` runs while the cache holds the entry for `destination`, so it
/// must be cheap and must not call back into the cache. Expensive work such as
/// opening sockets belongs in [`Client::connect`].
pub trait ClientFactory: Send + Sync + 'static {
    type Client: Client;

    fn create(&self, destination: &Destination) -> Result<Self::Client>;
}
