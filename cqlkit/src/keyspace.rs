// cqlkit/src/keyspace.rs
//
// Application-facing handle for one keyspace. Statements run through the
// resilient executor with the configured defaults applied; writes can be
// grouped with `begin_batch`.
//

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::{KeyspaceConfig, SslConfig};
use crate::database::batch::{Batch, BatchOptions, StatementSink};
use crate::database::client::ClusterConnector;
use crate::database::executor::ResilientExecutor;
use crate::database::factory::DatabaseFactory;
use crate::database::policy::ErrorPolicyRegistry;
use crate::database::query_builder::QueryBuilder;
use crate::database::retry::RetryPolicy;
use crate::errors::CqlError;
use crate::types::{ColumnValue, ConsistencyLevel, PreparedHandle, ResultRows, Statement};

pub struct Keyspace {
    config: Arc<KeyspaceConfig>,
    executor: Arc<ResilientExecutor>,
}

impl Keyspace {
    /// Connect through the driver named in the configuration
    pub async fn connect(config: KeyspaceConfig) -> Result<Self, CqlError> {
        let config = Arc::new(config);
        let connector = DatabaseFactory::create_from_config(config.clone());
        Self::build(config, connector, &ErrorPolicyRegistry::with_builtins()).await
    }

    /// Connect through an injected connector
    pub async fn with_connector(
        config: KeyspaceConfig,
        connector: Arc<dyn ClusterConnector>,
    ) -> Result<Self, CqlError> {
        Self::build(Arc::new(config), connector, &ErrorPolicyRegistry::with_builtins()).await
    }

    /// Connect through an injected connector, resolving the error policy
    /// from a caller-supplied registry
    pub async fn with_policies(
        config: KeyspaceConfig,
        connector: Arc<dyn ClusterConnector>,
        registry: &ErrorPolicyRegistry,
    ) -> Result<Self, CqlError> {
        Self::build(Arc::new(config), connector, registry).await
    }

    async fn build(
        config: Arc<KeyspaceConfig>,
        connector: Arc<dyn ClusterConnector>,
        registry: &ErrorPolicyRegistry,
    ) -> Result<Self, CqlError> {
        let error_policy = config
            .error_policy
            .as_deref()
            .map(|name| registry.resolve(name))
            .transpose()?;

        let executor = ResilientExecutor::connect(
            connector,
            error_policy,
            RetryPolicy::from(&config.connect_retry),
        )
        .await?;
        info!("Keyspace {} ready", config.keyspace);

        Ok(Self {
            config,
            executor: Arc::new(executor),
        })
    }

    pub async fn execute(&self, cql: &str, values: Vec<ColumnValue>) -> Result<ResultRows, CqlError> {
        self.execute_statement(Statement::new(cql).bind(values)).await
    }

    pub async fn execute_statement(&self, statement: Statement) -> Result<ResultRows, CqlError> {
        let statement = self.with_defaults(statement);
        self.executor.execute(&statement).await
    }

    pub async fn prepare_statement(&self, cql: &str) -> Result<PreparedHandle, CqlError> {
        self.executor.prepare(cql).await
    }

    pub async fn execute_prepared(
        &self,
        handle: &PreparedHandle,
        values: Vec<ColumnValue>,
    ) -> Result<ResultRows, CqlError> {
        self.execute_statement(Statement::prepared(handle.clone()).bind(values))
            .await
    }

    /// Whether the configured keyspace exists on the cluster. Query errors
    /// propagate rather than reading as absent.
    pub async fn exists(&self) -> Result<bool, CqlError> {
        let statement = Statement::new(QueryBuilder::build_keyspace_exists_query())
            .bind(vec![ColumnValue::Text(self.config.keyspace.clone())]);
        let mut rows = self.execute_statement(statement).await?;
        let found = rows.next().is_some();
        debug!("Keyspace {} exists: {}", self.config.keyspace, found);
        Ok(found)
    }

    /// Open a batch scope. Writes added to the returned `Batch` are sent as
    /// one batch execution on `apply` (or at every auto-apply threshold).
    pub fn begin_batch(&self, options: BatchOptions) -> Result<Batch, CqlError> {
        Batch::open(self.executor.clone(), options, self.default_consistency())
    }

    pub fn name(&self) -> &str {
        &self.config.keyspace
    }

    pub fn ssl_config(&self) -> Option<&SslConfig> {
        self.config.ssl.as_ref()
    }

    pub fn client_compression(&self) -> Option<&str> {
        self.config.compression.as_deref()
    }

    pub fn cassandra_options(&self) -> &HashMap<String, serde_json::Value> {
        &self.config.cassandra_options
    }

    pub fn default_consistency(&self) -> Option<ConsistencyLevel> {
        self.config.default_consistency
    }

    pub fn config(&self) -> &KeyspaceConfig {
        &self.config
    }

    pub fn executor(&self) -> &ResilientExecutor {
        &self.executor
    }

    fn with_defaults(&self, statement: Statement) -> Statement {
        let statement = statement.or_consistency(self.default_consistency());
        match (statement.request_timeout(), self.config.request_timeout()) {
            (None, Some(timeout)) => statement.with_request_timeout(timeout),
            _ => statement,
        }
    }
}

#[async_trait]
impl StatementSink for Keyspace {
    async fn submit(&mut self, statement: Statement) -> Result<(), CqlError> {
        self.execute_statement(statement).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::{Dispatch, MemoryCluster};
    use std::time::Duration;

    async fn keyspace(cluster: &Arc<MemoryCluster>, config: KeyspaceConfig) -> Keyspace {
        Keyspace::with_connector(config, Arc::new(cluster.connector()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_defaults_applied_to_statements() {
        let cluster = MemoryCluster::new();
        let config = KeyspaceConfig {
            default_consistency: Some(ConsistencyLevel::LocalQuorum),
            request_timeout_ms: Some(2_000),
            ..KeyspaceConfig::with_keyspace("blog")
        };
        let keyspace = keyspace(&cluster, config).await;

        let statement = keyspace.with_defaults(Statement::new("SELECT * FROM posts"));
        assert_eq!(statement.consistency(), Some(ConsistencyLevel::LocalQuorum));
        assert_eq!(statement.request_timeout(), Some(Duration::from_secs(2)));

        keyspace
            .execute_statement(Statement::new("SELECT * FROM posts").with_consistency(ConsistencyLevel::One))
            .await
            .unwrap();
        assert!(matches!(
            &cluster.dispatches()[0],
            Dispatch::Statement { consistency: Some(ConsistencyLevel::One), .. }
        ));
    }

    #[tokio::test]
    async fn test_accessors_pass_through_config() {
        let cluster = MemoryCluster::new();
        let mut config = KeyspaceConfig::with_keyspace("blog");
        config.compression = Some("lz4".to_string());
        config.ssl = Some(SslConfig {
            server_cert: Some("/etc/ssl/ca.pem".to_string()),
            ..SslConfig::default()
        });
        config
            .cassandra_options
            .insert("retry".to_string(), serde_json::json!(3));
        let keyspace = keyspace(&cluster, config.clone()).await;

        assert_eq!(keyspace.name(), "blog");
        assert_eq!(keyspace.client_compression(), Some("lz4"));
        assert_eq!(keyspace.ssl_config(), config.ssl.as_ref());
        assert_eq!(keyspace.cassandra_options().get("retry"), Some(&serde_json::json!(3)));
        assert_eq!(keyspace.default_consistency(), None);
        assert_eq!(keyspace.config(), &config);
    }

    #[tokio::test]
    async fn test_unknown_error_policy_fails_connect() {
        let cluster = MemoryCluster::new();
        let config = KeyspaceConfig {
            error_policy: Some("retry_forever".to_string()),
            ..KeyspaceConfig::default()
        };

        let result = Keyspace::with_connector(config, Arc::new(cluster.connector())).await;
        assert!(matches!(result, Err(CqlError::ConfigError(_))));
        assert_eq!(cluster.connect_count(), 0);
    }

    #[tokio::test]
    async fn test_keyspace_as_statement_sink_executes_immediately() {
        let cluster = MemoryCluster::new();
        let mut keyspace = keyspace(&cluster, KeyspaceConfig::with_keyspace("blog")).await;

        keyspace
            .submit(Statement::new("INSERT INTO posts (id) VALUES (1)"))
            .await
            .unwrap();
        assert_eq!(cluster.rows("posts").len(), 1);
    }
}
