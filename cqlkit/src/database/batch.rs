// cqlkit/src/database/batch.rs
//
// Write aggregation. A `Batch` collects statements and ships them to the
// executor as one batch execution, either when the caller applies it or each
// time the auto-apply threshold is reached. Dropping a batch without applying
// it discards whatever is still pending.
//

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::database::executor::ResilientExecutor;
use crate::errors::CqlError;
use crate::metrics;
use crate::types::{BatchKind, BatchStatement, ColumnValue, ConsistencyLevel, Statement};

/// Destination for write statements: executed now, or collected for later
#[async_trait]
pub trait StatementSink: Send {
    async fn submit(&mut self, statement: Statement) -> Result<(), CqlError>;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchOptions {
    /// Flush every N added statements; must be at least 1
    pub auto_apply: Option<usize>,
    pub unlogged: bool,
    /// Consistency for the whole batch. Statements added to a batch with
    /// this set must not carry their own. Without it, the first statement
    /// that carries one sets it for the batch.
    pub consistency: Option<ConsistencyLevel>,
}

impl BatchOptions {
    pub fn auto_apply(mut self, every: usize) -> Self {
        self.auto_apply = Some(every);
        self
    }

    pub fn unlogged(mut self) -> Self {
        self.unlogged = true;
        self
    }

    pub fn consistency(mut self, consistency: ConsistencyLevel) -> Self {
        self.consistency = Some(consistency);
        self
    }
}

pub struct Batch {
    executor: Arc<ResilientExecutor>,
    kind: BatchKind,
    scope_consistency: Option<ConsistencyLevel>,
    consistency: Option<ConsistencyLevel>,
    /// Set once a statement picked the consistency or a segment was sent
    consistency_fixed: bool,
    auto_apply: Option<usize>,
    pending: Vec<Statement>,
    added_since_flush: usize,
}

impl Batch {
    pub(crate) fn open(
        executor: Arc<ResilientExecutor>,
        options: BatchOptions,
        keyspace_consistency: Option<ConsistencyLevel>,
    ) -> Result<Self, CqlError> {
        if options.auto_apply == Some(0) {
            return Err(CqlError::InvalidArgument(
                "auto_apply must be at least 1".to_string(),
            ));
        }

        let kind = if options.unlogged {
            BatchKind::Unlogged
        } else {
            BatchKind::Logged
        };
        debug!(%kind, auto_apply = ?options.auto_apply, "Opened batch");

        Ok(Self {
            executor,
            kind,
            scope_consistency: options.consistency,
            consistency: options.consistency.or(keyspace_consistency),
            consistency_fixed: options.consistency.is_some(),
            auto_apply: options.auto_apply,
            pending: Vec::new(),
            added_since_flush: 0,
        })
    }

    /// Queue a statement, flushing if the auto-apply threshold is reached
    pub async fn add(&mut self, statement: Statement) -> Result<(), CqlError> {
        self.check_consistency(statement.consistency())?;

        self.pending.push(statement);
        self.added_since_flush += 1;

        if let Some(threshold) = self.auto_apply {
            if self.added_since_flush >= threshold {
                self.flush().await?;
            }
        }
        Ok(())
    }

    pub async fn execute(&mut self, cql: &str, values: Vec<ColumnValue>) -> Result<(), CqlError> {
        self.add(Statement::new(cql).bind(values)).await
    }

    /// Flush what is left and close the batch
    pub async fn apply(mut self) -> Result<(), CqlError> {
        self.flush().await
    }

    pub fn kind(&self) -> BatchKind {
        self.kind
    }

    /// Consistency the batch executes with
    pub fn consistency(&self) -> Option<ConsistencyLevel> {
        self.consistency
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    fn check_consistency(&mut self, own: Option<ConsistencyLevel>) -> Result<(), CqlError> {
        let Some(own) = own else {
            return Ok(());
        };

        if let Some(scope) = self.scope_consistency {
            return Err(CqlError::InvalidArgument(format!(
                "Statement consistency {} cannot be set inside a batch with consistency {}",
                own, scope
            )));
        }

        if !self.consistency_fixed {
            debug!(consistency = %own, "Batch consistency taken from statement");
            self.consistency = Some(own);
            self.consistency_fixed = true;
            return Ok(());
        }

        match self.consistency {
            Some(current) if current == own => Ok(()),
            current => Err(CqlError::InvalidArgument(format!(
                "Statement consistency {} conflicts with batch consistency {}",
                own,
                current.map_or("unset", |level| level.as_str())
            ))),
        }
    }

    /// Send the pending statements as one batch. A segment that still fails
    /// after the executor's retry is dropped, not re-queued.
    async fn flush(&mut self) -> Result<(), CqlError> {
        self.added_since_flush = 0;
        if self.pending.is_empty() {
            return Ok(());
        }

        let statements = std::mem::take(&mut self.pending);
        let batch = BatchStatement::new(self.kind, statements).with_consistency(self.consistency);
        self.consistency_fixed = true;
        metrics::record_batch(&self.kind.to_string(), batch.len());

        if let Err(error) = self.executor.batch(&batch).await {
            warn!(
                "Dropping {} {} batch statements after failed flush: {}",
                batch.len(),
                self.kind,
                error
            );
            return Err(error);
        }
        Ok(())
    }
}

impl Drop for Batch {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            warn!(
                "Discarding {} unapplied {} batch statements",
                self.pending.len(),
                self.kind
            );
        }
    }
}

#[async_trait]
impl StatementSink for Batch {
    async fn submit(&mut self, statement: Statement) -> Result<(), CqlError> {
        self.add(statement).await
    }
}
