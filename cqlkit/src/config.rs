use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::errors::CqlError;
use crate::types::ConsistencyLevel;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SslConfig {
    pub server_cert: Option<String>,
    pub client_cert: Option<String>,
    pub private_key: Option<String>,
    pub passphrase: Option<String>,
}

/// Backoff used while establishing a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectRetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for ConnectRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 100,
            max_delay_ms: 10_000,
            backoff_multiplier: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyspaceConfig {
    pub hosts: Vec<String>,
    pub port: u16,
    pub keyspace: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub ssl: Option<SslConfig>,
    pub compression: Option<String>,
    pub cassandra_options: HashMap<String, serde_json::Value>,
    pub default_consistency: Option<ConsistencyLevel>,
    pub error_policy: Option<String>,
    pub driver: String,
    pub connection_timeout_ms: u64,
    pub request_timeout_ms: Option<u64>,
    pub connect_retry: ConnectRetryConfig,
}

impl Default for KeyspaceConfig {
    fn default() -> Self {
        Self {
            hosts: vec!["localhost".to_string()],
            port: 9042,
            keyspace: "system".to_string(),
            username: None,
            password: None,
            ssl: None,
            compression: None,
            cassandra_options: HashMap::new(),
            default_consistency: None,
            error_policy: None,
            driver: "scylla".to_string(),
            connection_timeout_ms: 5_000,
            request_timeout_ms: None,
            connect_retry: ConnectRetryConfig::default(),
        }
    }
}

impl KeyspaceConfig {
    pub fn with_keyspace(keyspace: impl Into<String>) -> Self {
        Self {
            keyspace: keyspace.into(),
            ..Self::default()
        }
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, CqlError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// `host:port` for every configured host; hosts without a port get `port`.
    /// IPv6 literals come out bracketed.
    pub fn contact_points(&self) -> Vec<String> {
        self.hosts
            .iter()
            .map(|host| self.contact_point(host.trim()))
            .collect()
    }

    fn contact_point(&self, host: &str) -> String {
        if host.parse::<SocketAddr>().is_ok() {
            return host.to_string();
        }
        if let Ok(ip) = host.parse::<IpAddr>() {
            return SocketAddr::new(ip, self.port).to_string();
        }
        match host.rsplit_once(':') {
            Some((_, port)) if port.parse::<u16>().is_ok() => host.to_string(),
            _ => format!("{}:{}", host, self.port),
        }
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }
}

/// Layer a config file under `CQLKIT_`-prefixed environment overrides.
/// Nested keys use `__`, e.g. `CQLKIT_CONNECT_RETRY__MAX_ATTEMPTS`.
pub fn load_config(path: &str) -> Result<KeyspaceConfig, CqlError> {
    let config = Config::builder()
        .add_source(File::with_name(path))
        .add_source(environment())
        .build()?;

    Ok(config.try_deserialize()?)
}

fn environment() -> Environment {
    Environment::with_prefix("CQLKIT")
        .prefix_separator("_")
        .separator("__")
}
