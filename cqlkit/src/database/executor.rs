// cqlkit/src/database/executor.rs
//
// Runs statements through the current cluster client. A transient failure
// replaces the client and retries the identical call exactly once.
//

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::database::client::{ClusterClient, ClusterConnector};
use crate::database::policy::ErrorPolicy;
use crate::database::retry::RetryPolicy;
use crate::errors::CqlError;
use crate::metrics;
use crate::types::{BatchStatement, PreparedHandle, ResultRows, Statement};

struct ClientSlot {
    client: Arc<dyn ClusterClient>,
    generation: u64,
}

pub struct ResilientExecutor {
    connector: Arc<dyn ClusterConnector>,
    slot: RwLock<ClientSlot>,
    error_policy: Option<Arc<dyn ErrorPolicy>>,
    connect_retry: RetryPolicy,
}

impl ResilientExecutor {
    /// Open the first session and wrap it
    pub async fn connect(
        connector: Arc<dyn ClusterConnector>,
        error_policy: Option<Arc<dyn ErrorPolicy>>,
        connect_retry: RetryPolicy,
    ) -> Result<Self, CqlError> {
        let client = open_session(connector.as_ref(), &connect_retry).await?;
        info!(
            "Connected through {} driver (error policy: {})",
            client.driver_name(),
            error_policy.as_ref().map(|p| p.name()).unwrap_or("none")
        );

        Ok(Self {
            connector,
            slot: RwLock::new(ClientSlot {
                client,
                generation: 0,
            }),
            error_policy,
            connect_retry,
        })
    }

    pub async fn execute(&self, statement: &Statement) -> Result<ResultRows, CqlError> {
        debug!("Executing: {}", statement.cql());
        self.with_retry("execute", |client| async move {
            client.execute(statement).await
        })
        .await
    }

    pub async fn prepare(&self, cql: &str) -> Result<PreparedHandle, CqlError> {
        debug!("Preparing: {}", cql);
        self.with_retry("prepare", |client| async move { client.prepare(cql).await })
            .await
    }

    pub async fn batch(&self, batch: &BatchStatement) -> Result<(), CqlError> {
        debug!(statements = batch.len(), "Executing batch:\n{}", batch.to_cql());
        self.with_retry("batch", |client| async move { client.batch(batch).await })
            .await
    }

    /// Number of times the client has been replaced
    pub async fn generation(&self) -> u64 {
        self.slot.read().await.generation
    }

    pub fn driver_name(&self) -> &str {
        self.connector.driver_name()
    }

    pub fn error_policy_name(&self) -> Option<&str> {
        self.error_policy.as_ref().map(|policy| policy.name())
    }

    async fn current(&self) -> (Arc<dyn ClusterClient>, u64) {
        let slot = self.slot.read().await;
        (slot.client.clone(), slot.generation)
    }

    async fn with_retry<T, F, Fut>(&self, operation: &str, attempt: F) -> Result<T, CqlError>
    where
        F: Fn(Arc<dyn ClusterClient>) -> Fut,
        Fut: Future<Output = Result<T, CqlError>>,
    {
        let (client, generation) = self.current().await;
        let driver = client.driver_name().to_string();
        let start = Instant::now();

        let error = match attempt(client).await {
            Ok(value) => {
                metrics::record_operation(operation, &driver, true, start.elapsed().as_secs_f64());
                return Ok(value);
            }
            Err(error) if !error.is_transient() => {
                metrics::record_operation(operation, &driver, false, start.elapsed().as_secs_f64());
                return Err(error);
            }
            Err(error) => error,
        };

        warn!(
            kind = error.kind(),
            "Transient error during {}: {}; reconnecting and retrying once", operation, error
        );

        if let Some(policy) = &self.error_policy {
            if let Err(abort) = policy.handle_error(&error, 1).await {
                info!("Error policy {} aborted the retry of {}", policy.name(), operation);
                metrics::record_operation(operation, &driver, false, start.elapsed().as_secs_f64());
                return Err(abort);
            }
        }

        metrics::record_retry(operation, error.kind());
        let client = match self.reconnect(generation).await {
            Ok(client) => client,
            Err(reconnect_error) => {
                metrics::record_operation(operation, &driver, false, start.elapsed().as_secs_f64());
                return Err(reconnect_error);
            }
        };

        let result = attempt(client).await;
        metrics::record_operation(
            operation,
            &driver,
            result.is_ok(),
            start.elapsed().as_secs_f64(),
        );
        result
    }

    /// Replace the client seen at `stale_generation`. When another caller
    /// has already replaced it, the newer client is returned untouched.
    pub(crate) async fn reconnect(
        &self,
        stale_generation: u64,
    ) -> Result<Arc<dyn ClusterClient>, CqlError> {
        let mut slot = self.slot.write().await;
        if slot.generation != stale_generation {
            debug!(
                "Client already replaced (generation {} > {})",
                slot.generation, stale_generation
            );
            return Ok(slot.client.clone());
        }

        let driver = self.connector.driver_name().to_string();
        match open_session(self.connector.as_ref(), &self.connect_retry).await {
            Ok(client) => {
                slot.client = client.clone();
                slot.generation += 1;
                metrics::record_reconnect(&driver, true);
                info!("Reconnected {} client (generation {})", driver, slot.generation);
                Ok(client)
            }
            Err(error) => {
                metrics::record_reconnect(&driver, false);
                warn!("Reconnect through {} failed: {}", driver, error);
                Err(error)
            }
        }
    }
}

async fn open_session(
    connector: &dyn ClusterConnector,
    retry: &RetryPolicy,
) -> Result<Arc<dyn ClusterClient>, CqlError> {
    retry.execute(|| connector.connect()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectRetryConfig;
    use crate::database::memory::{Dispatch, MemoryCluster};
    use crate::database::policy::{DefaultErrorPolicy, FailFastPolicy};
    use crate::types::BatchKind;

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::from(&ConnectRetryConfig {
            max_attempts: 1,
            initial_delay_ms: 0,
            max_delay_ms: 0,
            backoff_multiplier: 1.0,
        })
    }

    async fn executor(
        cluster: &Arc<MemoryCluster>,
        policy: Option<Arc<dyn ErrorPolicy>>,
    ) -> ResilientExecutor {
        ResilientExecutor::connect(Arc::new(cluster.connector()), policy, fast_retry())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_transient_error_reconnects_and_retries_once() {
        let cluster = MemoryCluster::new();
        let executor = executor(&cluster, None).await;
        cluster.fail_next(CqlError::NoHostsAvailable("all down".into()));

        let rows = executor
            .execute(&Statement::new("SELECT * FROM posts"))
            .await
            .unwrap();

        assert_eq!(rows.len(), 0);
        assert_eq!(cluster.connect_count(), 2);
        assert_eq!(executor.generation().await, 1);
        assert_eq!(cluster.attempts(), 2);
    }

    #[tokio::test]
    async fn test_second_transient_failure_propagates() {
        let cluster = MemoryCluster::new();
        let executor = executor(&cluster, None).await;
        cluster.fail_next(CqlError::Timeout("write timeout".into()));
        cluster.fail_next(CqlError::Timeout("write timeout again".into()));

        let result = executor.execute(&Statement::new("SELECT * FROM posts")).await;

        assert_eq!(result.err(), Some(CqlError::Timeout("write timeout again".into())));
        assert_eq!(cluster.attempts(), 2);
        assert_eq!(cluster.connect_count(), 2);
    }

    #[tokio::test]
    async fn test_non_transient_error_is_not_retried() {
        let cluster = MemoryCluster::new();
        let executor = executor(&cluster, None).await;
        cluster.fail_next(CqlError::Syntax("line 1:0 no viable alternative".into()));

        let result = executor.execute(&Statement::new("SELEC * FROM posts")).await;

        assert!(matches!(result, Err(CqlError::Syntax(_))));
        assert_eq!(cluster.attempts(), 1);
        assert_eq!(cluster.connect_count(), 1);
    }

    #[tokio::test]
    async fn test_error_policy_can_abort_retry() {
        let cluster = MemoryCluster::new();
        let executor = executor(&cluster, Some(Arc::new(FailFastPolicy))).await;
        cluster.fail_next(CqlError::Execution("overloaded".into()));

        let result = executor.execute(&Statement::new("SELECT * FROM posts")).await;

        assert_eq!(result.err(), Some(CqlError::Execution("overloaded".into())));
        assert_eq!(cluster.connect_count(), 1);
        assert_eq!(executor.error_policy_name(), Some("fail_fast"));
    }

    #[tokio::test]
    async fn test_error_policy_allowing_retry() {
        let cluster = MemoryCluster::new();
        let executor = executor(&cluster, Some(Arc::new(DefaultErrorPolicy))).await;
        cluster.fail_next(CqlError::Execution("overloaded".into()));

        assert!(executor.execute(&Statement::new("SELECT * FROM posts")).await.is_ok());
        assert_eq!(cluster.connect_count(), 2);
    }

    #[tokio::test]
    async fn test_failed_reconnect_propagates_connect_error() {
        let cluster = MemoryCluster::new();
        let executor = executor(&cluster, None).await;
        cluster.fail_next(CqlError::NoHostsAvailable("all down".into()));
        cluster.fail_next_connect(CqlError::Connection("connection refused".into()));

        let result = executor.execute(&Statement::new("SELECT * FROM posts")).await;

        assert_eq!(result.err(), Some(CqlError::Connection("connection refused".into())));
        assert_eq!(executor.generation().await, 0);
    }

    #[tokio::test]
    async fn test_stale_reconnect_replaces_client_once() {
        let cluster = MemoryCluster::new();
        let executor = executor(&cluster, None).await;

        let (first, second) = tokio::join!(executor.reconnect(0), executor.reconnect(0));
        first.unwrap();
        second.unwrap();

        assert_eq!(executor.generation().await, 1);
        assert_eq!(cluster.connect_count(), 2);
    }

    #[tokio::test]
    async fn test_batch_is_one_dispatch() {
        let cluster = MemoryCluster::new();
        let executor = executor(&cluster, None).await;
        let batch = BatchStatement::new(
            BatchKind::Logged,
            vec![
                Statement::new("INSERT INTO posts (id) VALUES (1)"),
                Statement::new("INSERT INTO posts (id) VALUES (2)"),
            ],
        );

        executor.batch(&batch).await.unwrap();

        let dispatches = cluster.dispatches();
        assert_eq!(dispatches.len(), 1);
        assert!(matches!(&dispatches[0], Dispatch::Batch { statements, .. } if statements.len() == 2));
        assert_eq!(cluster.rows("posts").len(), 2);
    }
}
