use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::destination::Destination;
use crate::error::ConfigError;

pub const DEFAULT_CLIENT_NAME: &str = "default";
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 2000;
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_MAX_AUTO_RETRIES: u64 = 0;
pub const DEFAULT_MAX_AUTO_RETRIES_NEXT_SERVER: u64 = 1;

/// Numeric properties recognised by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConfigKey {
    ConnectTimeout,
    ReadTimeout,
    MaxAutoRetries,
    MaxAutoRetriesNextServer,
}

impl ConfigKey {
    pub const ALL: [ConfigKey; 4] = [
        ConfigKey::ConnectTimeout,
        ConfigKey::ReadTimeout,
        ConfigKey::MaxAutoRetries,
        ConfigKey::MaxAutoRetriesNextServer,
    ];

    pub fn default_value(self) -> u64 {
        match self {
            ConfigKey::ConnectTimeout => DEFAULT_CONNECT_TIMEOUT_MS,
            ConfigKey::ReadTimeout => DEFAULT_READ_TIMEOUT_MS,
            ConfigKey::MaxAutoRetries => DEFAULT_MAX_AUTO_RETRIES,
            ConfigKey::MaxAutoRetriesNextServer => DEFAULT_MAX_AUTO_RETRIES_NEXT_SERVER,
        }
    }

    pub fn env_var(self) -> &'static str {
        match self {
            ConfigKey::ConnectTimeout => "LB_CONNECT_TIMEOUT",
            ConfigKey::ReadTimeout => "LB_READ_TIMEOUT",
            ConfigKey::MaxAutoRetries => "LB_MAX_AUTO_RETRIES",
            ConfigKey::MaxAutoRetriesNextServer => "LB_MAX_AUTO_RETRIES_NEXT_SERVER",
        }
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Client-wide configuration.
///
/// ```json
/// {
///   "ClientName": "video",
///   "ListOfServers": ["backend-1:8080", "backend-2:8080"],
///   "ConnectTimeout": 1000,
///   "ReadTimeout": 3000
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(rename = "ClientName", default = "default_client_name")]
    client_name: String,
    #[serde(rename = "ListOfServers", default)]
    list_of_servers: Vec<Destination>,
    #[serde(flatten)]
    properties: HashMap<ConfigKey, u64>,
}

fn default_client_name() -> String {
    DEFAULT_CLIENT_NAME.to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_CLIENT_NAME)
    }
}

impl ClientConfig {
    pub fn new(client_name: impl Into<String>) -> Self {
        Self {
            client_name: client_name.into(),
            list_of_servers: Vec::new(),
            properties: HashMap::new(),
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Overrides properties from `LB_*` environment variables.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    pub(crate) fn with_overrides_from<L>(mut self, lookup: L) -> Result<Self, ConfigError>
    where
        L: Fn(&str) -> Option<String>,
    {
        for key in ConfigKey::ALL {
            if let Some(raw) = lookup(key.env_var()) {
                let value = raw.trim().parse::<u64>().map_err(|_| ConfigError::InvalidValue {
                    key: key.env_var().to_string(),
                    value: raw.clone(),
                })?;
                self.properties.insert(key, value);
            }
        }
        if let Some(raw) = lookup("LB_SERVERS") {
            self.list_of_servers = parse_server_list(&raw).map_err(|_| ConfigError::InvalidValue {
                key: "LB_SERVERS".to_string(),
                value: raw.clone(),
            })?;
        }
        Ok(self)
    }

    pub fn with(mut self, key: ConfigKey, value: u64) -> Self {
        self.properties.insert(key, value);
        self
    }

    pub fn with_servers(mut self, servers: Vec<Destination>) -> Self {
        self.list_of_servers = servers;
        self
    }

    pub fn client_name(&self) -> &str {
        &self.client_name
    }

    pub fn list_of_servers(&self) -> &[Destination] {
        &self.list_of_servers
    }

    pub fn get(&self, key: ConfigKey) -> Option<u64> {
        self.properties.get(&key).copied()
    }

    pub fn get_or_default(&self, key: ConfigKey) -> u64 {
        self.get(key).unwrap_or_else(|| key.default_value())
    }

    /// Request-scoped value if present, else the client value, else the default.
    pub fn property(&self, key: ConfigKey, request: Option<&RequestConfig>) -> u64 {
        request
            .and_then(|r| r.get(key))
            .unwrap_or_else(|| self.get_or_default(key))
    }

    pub fn connect_timeout(&self, request: Option<&RequestConfig>) -> Duration {
        Duration::from_millis(self.property(ConfigKey::ConnectTimeout, request))
    }

    pub fn read_timeout(&self, request: Option<&RequestConfig>) -> Duration {
        Duration::from_millis(self.property(ConfigKey::ReadTimeout, request))
    }
}

/// Per-request overrides layered on top of a [`ClientConfig`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestConfig {
    #[serde(flatten)]
    overrides: HashMap<ConfigKey, u64>,
}

impl RequestConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: ConfigKey, value: u64) -> Self {
        self.overrides.insert(key, value);
        self
    }

    pub fn get(&self, key: ConfigKey) -> Option<u64> {
        self.overrides.get(&key).copied()
    }
}

/// Parses a comma separated `host:port` list.
pub fn parse_server_list(raw: &str) -> Result<Vec<Destination>, crate::error::ClientError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_unset() {
        let config = ClientConfig::default();
        assert_eq!(config.client_name(), DEFAULT_CLIENT_NAME);
        assert_eq!(config.get(ConfigKey::ReadTimeout), None);
        assert_eq!(config.get_or_default(ConfigKey::ReadTimeout), DEFAULT_READ_TIMEOUT_MS);
        assert_eq!(
            config.get_or_default(ConfigKey::MaxAutoRetriesNextServer),
            DEFAULT_MAX_AUTO_RETRIES_NEXT_SERVER
        );
    }

    #[test]
    fn request_override_wins_over_client_value() {
        let config = ClientConfig::new("svc").with(ConfigKey::ConnectTimeout, 1500);
        let request = RequestConfig::new().with(ConfigKey::ConnectTimeout, 250);

        assert_eq!(config.property(ConfigKey::ConnectTimeout, Some(&request)), 250);
        assert_eq!(config.property(ConfigKey::ConnectTimeout, None), 1500);
        // falls through to the client value when the request does not set the key
        assert_eq!(
            config.property(ConfigKey::ReadTimeout, Some(&request)),
            DEFAULT_READ_TIMEOUT_MS
        );
    }

    #[test]
    fn parses_json() {
        let config = ClientConfig::from_json_str(
            r#"{
                "ClientName": "video",
                "ListOfServers": ["backend-1:8080", "backend-2:8081"],
                "ConnectTimeout": 1000,
                "MaxAutoRetries": 2
            }"#,
        )
        .unwrap();

        assert_eq!(config.client_name(), "video");
        assert_eq!(
            config.list_of_servers(),
            &[Destination::new("backend-1", 8080), Destination::new("backend-2", 8081)]
        );
        assert_eq!(config.get(ConfigKey::ConnectTimeout), Some(1000));
        assert_eq!(config.get(ConfigKey::MaxAutoRetries), Some(2));
        assert_eq!(config.get(ConfigKey::ReadTimeout), None);
    }

    #[test]
    fn rejects_bad_server_in_json() {
        let err = ClientConfig::from_json_str(r#"{"ListOfServers": ["nope"]}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));
    }

    #[test]
    fn env_overrides_replace_file_values() {
        let config = ClientConfig::new("svc")
            .with(ConfigKey::ReadTimeout, 100)
            .with_overrides_from(|name| match name {
                "LB_READ_TIMEOUT" => Some("900".to_string()),
                "LB_SERVERS" => Some("a:1, b:2".to_string()),
                _ => None,
            })
            .unwrap();

        assert_eq!(config.get(ConfigKey::ReadTimeout), Some(900));
        assert_eq!(
            config.list_of_servers(),
            &[Destination::new("a", 1), Destination::new("b", 2)]
        );
    }

    #[test]
    fn env_override_must_be_numeric() {
        let err = ClientConfig::default()
            .with_overrides_from(|name| (name == "LB_CONNECT_TIMEOUT").then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
