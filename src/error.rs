use std::time::Duration;

use thiserror::Error;

use crate::destination::Destination;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("failed to create client for {destination}: {message}")]
    Creation {
        destination: Destination,
        message: String,
    },

    #[error("connect to {destination} failed: {source}")]
    Connect {
        destination: Destination,
        #[source]
        source: std::io::Error,
    },

    #[error("operation on {destination} timed out after {elapsed:?}")]
    Timeout {
        destination: Destination,
        elapsed: Duration,
    },

    #[error("client for {destination} is shut down")]
    Closed { destination: Destination },

    #[error("request to {destination} failed: {source}")]
    Request {
        destination: Destination,
        #[source]
        source: hyper::Error,
    },

    #[error("invalid request for {destination}: {message}")]
    InvalidRequest {
        destination: Destination,
        message: String,
    },

    #[error("no available servers")]
    NoAvailableServers,

    #[error("load balancing client is shut down")]
    Shutdown,

    #[error("invalid destination {0:?}: expected host:port")]
    InvalidDestination(String),
}

impl ClientError {
    pub fn creation<S: Into<String>>(destination: &Destination, message: S) -> Self {
        Self::Creation {
            destination: destination.clone(),
            message: message.into(),
        }
    }

    /// The destination this error is attributed to, if any.
    pub fn destination(&self) -> Option<&Destination> {
        match self {
            Self::Creation { destination, .. }
            | Self::Connect { destination, .. }
            | Self::Timeout { destination, .. }
            | Self::Closed { destination }
            | Self::Request { destination, .. }
            | Self::InvalidRequest { destination, .. } => Some(destination),
            Self::NoAvailableServers | Self::Shutdown | Self::InvalidDestination(_) => None,
        }
    }

    /// Errors raised before any bytes reached the destination.
    pub fn is_connect_failure(&self) -> bool {
        match self {
            Self::Connect { .. } | Self::Closed { .. } => true,
            Self::Request { source, .. } => source.is_connect(),
            _ => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: String, value: String },
}
