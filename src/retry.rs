use crate::config::{ClientConfig, ConfigKey};
use crate::error::ClientError;

/// Retry budget and error classification used by the executor.
pub trait RetryHandler: Send + Sync {
    fn max_retries_on_same_server(&self) -> u32;

    fn max_retries_on_next_server(&self) -> u32;

    /// Whether `error` warrants another attempt, on the same server when
    /// `same_server` is set, otherwise on the next one.
    fn is_retriable(&self, error: &ClientError, same_server: bool) -> bool;
}

/// Retries connect failures on the same server and connect failures, timeouts
/// and client creation failures on the next server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultRetryHandler {
    same_server: u32,
    next_server: u32,
}

impl DefaultRetryHandler {
    pub fn new(same_server: u32, next_server: u32) -> Self {
        Self {
            same_server,
            next_server,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(
            clamp(config.get_or_default(ConfigKey::MaxAutoRetries)),
            clamp(config.get_or_default(ConfigKey::MaxAutoRetriesNextServer)),
        )
    }
}

fn clamp(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

impl RetryHandler for DefaultRetryHandler {
    fn max_retries_on_same_server(&self) -> u32 {
        self.same_server
    }

    fn max_retries_on_next_server(&self) -> u32 {
        self.next_server
    }

    fn is_retriable(&self, error: &ClientError, same_server: bool) -> bool {
        if error.is_connect_failure() {
            return true;
        }
        !same_server && matches!(error, ClientError::Timeout { .. } | ClientError::Creation { .. })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::destination::Destination;

    #[test]
    fn budget_comes_from_config() {
        let config = ClientConfig::default()
            .with(ConfigKey::MaxAutoRetries, 3)
            .with(ConfigKey::MaxAutoRetriesNextServer, 4);
        let handler = DefaultRetryHandler::from_config(&config);

        assert_eq!(handler.max_retries_on_same_server(), 3);
        assert_eq!(handler.max_retries_on_next_server(), 4);
    }

    #[test]
    fn timeouts_only_move_to_next_server() {
        let handler = DefaultRetryHandler::new(1, 1);
        let timeout = ClientError::Timeout {
            destination: Destination::new("a", 1),
            elapsed: Duration::from_millis(5),
        };
        let refused = ClientError::Connect {
            destination: Destination::new("a", 1),
            source: std::io::ErrorKind::ConnectionRefused.into(),
        };

        assert!(!handler.is_retriable(&timeout, true));
        assert!(handler.is_retriable(&timeout, false));
        assert!(handler.is_retriable(&refused, true));
        assert!(!handler.is_retriable(&ClientError::Shutdown, false));
    }
}
