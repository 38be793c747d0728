// cqlkit/src/database/factory.rs
//
// Factory Pattern for runtime cluster driver selection
// Supports: ScyllaDB, Cassandra 4.x, in-memory
//

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use super::client::ClusterConnector;
use super::memory::MemoryCluster;
use super::scylla::ScyllaConnector;
use crate::config::KeyspaceConfig;

/// Supported cluster drivers
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    #[default]
    Scylla,
    Cassandra,
    Memory,
}

impl DatabaseDriver {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseDriver::Scylla => "scylla",
            DatabaseDriver::Cassandra => "cassandra",
            DatabaseDriver::Memory => "memory",
        }
    }
}

impl From<&str> for DatabaseDriver {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "cassandra" | "cassandra4" | "cass" => DatabaseDriver::Cassandra,
            "memory" | "mem" | "in-memory" => DatabaseDriver::Memory,
            "scylla" | "scylladb" => DatabaseDriver::Scylla,
            _ => DatabaseDriver::Scylla, // Default to Scylla
        }
    }
}

impl From<String> for DatabaseDriver {
    fn from(s: String) -> Self {
        DatabaseDriver::from(s.as_str())
    }
}

/// Cluster connector factory
pub struct DatabaseFactory;

impl DatabaseFactory {
    /// Create a connector for the given driver type
    pub fn create(driver: DatabaseDriver, config: Arc<KeyspaceConfig>) -> Arc<dyn ClusterConnector> {
        info!("Creating cluster connector with driver: {:?}", driver);

        match driver {
            DatabaseDriver::Scylla => Arc::new(ScyllaConnector::new(config, driver.as_str())),
            DatabaseDriver::Cassandra => {
                // Scylla driver is CQL-compatible with Cassandra 4.x
                info!("Using Scylla driver for Cassandra 4.x compatibility");
                Arc::new(ScyllaConnector::new(config, driver.as_str()))
            }
            DatabaseDriver::Memory => {
                // Fresh cluster holding only the configured keyspace
                let cluster = MemoryCluster::with_keyspaces([config.keyspace.clone()]);
                Arc::new(cluster.connector())
            }
        }
    }

    /// Create from config (reads driver field from config)
    pub fn create_from_config(config: Arc<KeyspaceConfig>) -> Arc<dyn ClusterConnector> {
        let driver = DatabaseDriver::from(config.driver.as_str());
        Self::create(driver, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_from_string() {
        assert_eq!(DatabaseDriver::from("cassandra"), DatabaseDriver::Cassandra);
        assert_eq!(DatabaseDriver::from("Cassandra4"), DatabaseDriver::Cassandra);
        assert_eq!(DatabaseDriver::from("scylla"), DatabaseDriver::Scylla);
        assert_eq!(DatabaseDriver::from("ScyllaDB"), DatabaseDriver::Scylla);
        assert_eq!(DatabaseDriver::from("memory"), DatabaseDriver::Memory);
        assert_eq!(DatabaseDriver::from("unknown"), DatabaseDriver::Scylla); // Default
    }

    #[test]
    fn test_driver_from_owned_string() {
        assert_eq!(DatabaseDriver::from("cassandra".to_string()), DatabaseDriver::Cassandra);
        assert_eq!(DatabaseDriver::from("scylla".to_string()), DatabaseDriver::Scylla);
    }

    #[tokio::test]
    async fn test_memory_connector_from_config() {
        let config = Arc::new(KeyspaceConfig {
            driver: "memory".to_string(),
            ..KeyspaceConfig::with_keyspace("blog")
        });

        let connector = DatabaseFactory::create_from_config(config);
        assert_eq!(connector.driver_name(), "memory");
        let client = connector.connect().await.unwrap();
        assert_eq!(client.driver_name(), "memory");
    }
}
