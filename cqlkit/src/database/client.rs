use async_trait::async_trait;
use std::sync::Arc;

use crate::errors::CqlError;
use crate::types::{BatchStatement, PreparedHandle, ResultRows, Statement};

/// One live session against a CQL cluster
#[async_trait]
pub trait ClusterClient: Send + Sync {
    async fn execute(&self, statement: &Statement) -> Result<ResultRows, CqlError>;
    async fn prepare(&self, cql: &str) -> Result<PreparedHandle, CqlError>;
    async fn batch(&self, batch: &BatchStatement) -> Result<(), CqlError>;
    fn driver_name(&self) -> &str;
}

/// Opens new sessions; called once at startup and again on every reconnect
#[async_trait]
pub trait ClusterConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn ClusterClient>, CqlError>;
    fn driver_name(&self) -> &str;
}
