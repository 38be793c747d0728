use async_trait::async_trait;
use dashmap::DashMap;
use scylla::client::execution_profile::ExecutionProfile;
use scylla::client::session::Session;
use scylla::client::session_builder::SessionBuilder;
use scylla::policies::speculative_execution::SimpleSpeculativeExecutionPolicy;
use scylla::response::query_result::QueryResult;
use scylla::statement::batch::{Batch, BatchType};
use scylla::statement::prepared::PreparedStatement;
use scylla::statement::unprepared::Statement as UnpreparedStatement;
use scylla::statement::Consistency;
use scylla::value::{Counter, CqlTimestamp, CqlTimeuuid, CqlValue};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::KeyspaceConfig;
use crate::database::client::{ClusterClient, ClusterConnector};
use crate::errors::CqlError;
use crate::types::{
    BatchKind, BatchStatement, ColumnValue, ConsistencyLevel, PreparedHandle, ResultRows, Row,
    Statement, StatementKind,
};

/// `cassandra_options` key enabling speculative execution, in milliseconds
pub const SPECULATIVE_DELAY_OPTION: &str = "speculative_delay_ms";

/// ScyllaDB / Cassandra 4.x session behind the cluster-client seam
pub struct ScyllaConnection {
    session: Arc<Session>,
    prepared: DashMap<String, PreparedStatement>,
    driver_name: String,
}

impl ScyllaConnection {
    /// Create a new session against the configured contact points
    pub async fn new(config: &KeyspaceConfig, driver_name: &str) -> Result<Self, CqlError> {
        let contact_points = config.contact_points();
        info!("Connecting to {} cluster: {:?}", driver_name, contact_points);

        let mut session_builder = SessionBuilder::new()
            .known_nodes(&contact_points)
            .connection_timeout(config.connection_timeout());

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            session_builder = session_builder.user(username, password);
        }

        // Speculative execution smooths over GC pauses on individual nodes
        if let Some(delay_ms) = config
            .cassandra_options
            .get(SPECULATIVE_DELAY_OPTION)
            .and_then(|value| value.as_u64())
        {
            info!("Speculative execution enabled (delay: {}ms)", delay_ms);
            let policy = SimpleSpeculativeExecutionPolicy {
                max_retry_count: 2,
                retry_interval: Duration::from_millis(delay_ms),
            };
            let profile = ExecutionProfile::builder()
                .speculative_execution_policy(Some(Arc::new(policy)))
                .build();
            session_builder = session_builder.default_execution_profile_handle(profile.into_handle());
        }

        if config.ssl.is_some() {
            debug!("SSL options present; passed through unapplied");
        }
        if let Some(compression) = &config.compression {
            debug!("Compression {} requested; passed through unapplied", compression);
        }

        let session = session_builder.build().await?;

        // A missing keyspace must not fail the connect, so that existence
        // checks can still report it as absent
        if let Err(e) = session.use_keyspace(config.keyspace.as_str(), true).await {
            warn!("Could not select keyspace {}: {}", config.keyspace, e);
        } else {
            info!("Connected to {} keyspace: {}", driver_name, config.keyspace);
        }

        Ok(Self {
            session: Arc::new(session),
            prepared: DashMap::new(),
            driver_name: driver_name.to_string(),
        })
    }

    async fn prepared_for(&self, handle: &PreparedHandle) -> Result<PreparedStatement, CqlError> {
        if let Some(prepared) = handle.driver_handle::<PreparedStatement>() {
            return Ok(prepared.clone());
        }
        if let Some(prepared) = self.cached(handle.cql()) {
            return Ok(prepared);
        }
        self.prepare_cached(handle.cql()).await
    }

    fn cached(&self, cql: &str) -> Option<PreparedStatement> {
        self.prepared.get(cql).map(|entry| entry.value().clone())
    }

    async fn prepare_cached(&self, cql: &str) -> Result<PreparedStatement, CqlError> {
        let prepared = self.session.prepare(cql).await?;
        self.prepared.insert(cql.to_string(), prepared.clone());
        Ok(prepared)
    }
}

#[async_trait]
impl ClusterClient for ScyllaConnection {
    async fn execute(&self, statement: &Statement) -> Result<ResultRows, CqlError> {
        let values = bind_values(statement.values());
        let consistency = statement.consistency().map(to_scylla_consistency);

        let result = match statement.kind() {
            StatementKind::Simple(cql) => {
                let mut query = UnpreparedStatement::new(cql.as_str());
                if let Some(consistency) = consistency {
                    query.set_consistency(consistency);
                }
                if let Some(timeout) = statement.request_timeout() {
                    query.set_request_timeout(Some(timeout));
                }
                self.session.query_unpaged(query, values).await?
            }
            StatementKind::Prepared(handle) => {
                let mut prepared = self.prepared_for(handle).await?;
                if let Some(consistency) = consistency {
                    prepared.set_consistency(consistency);
                }
                if let Some(timeout) = statement.request_timeout() {
                    prepared.set_request_timeout(Some(timeout));
                }
                self.session.execute_unpaged(&prepared, values).await?
            }
        };

        rows_from_result(result)
    }

    async fn prepare(&self, cql: &str) -> Result<PreparedHandle, CqlError> {
        let prepared = self.prepare_cached(cql).await?;
        Ok(PreparedHandle::with_driver_handle(cql, Arc::new(prepared)))
    }

    async fn batch(&self, batch: &BatchStatement) -> Result<(), CqlError> {
        let mut scylla_batch = Batch::new(match batch.kind() {
            BatchKind::Logged => BatchType::Logged,
            BatchKind::Unlogged => BatchType::Unlogged,
        });
        let mut values = Vec::with_capacity(batch.len());

        for statement in batch.statements() {
            match statement.kind() {
                StatementKind::Simple(cql) => {
                    scylla_batch.append_statement(UnpreparedStatement::new(cql.as_str()))
                }
                StatementKind::Prepared(handle) => {
                    scylla_batch.append_statement(self.prepared_for(handle).await?)
                }
            }
            values.push(bind_values(statement.values()));
        }

        if let Some(consistency) = batch.consistency() {
            scylla_batch.set_consistency(to_scylla_consistency(consistency));
        }

        self.session.batch(&scylla_batch, values).await?;
        Ok(())
    }

    fn driver_name(&self) -> &str {
        &self.driver_name
    }
}

/// Opens `ScyllaConnection`s; used for both the scylla and cassandra drivers
/// since both speak the same CQL binary protocol
pub struct ScyllaConnector {
    config: Arc<KeyspaceConfig>,
    driver_name: String,
}

impl ScyllaConnector {
    pub fn new(config: Arc<KeyspaceConfig>, driver_name: &str) -> Self {
        Self {
            config,
            driver_name: driver_name.to_string(),
        }
    }
}

#[async_trait]
impl ClusterConnector for ScyllaConnector {
    async fn connect(&self) -> Result<Arc<dyn ClusterClient>, CqlError> {
        let connection = ScyllaConnection::new(&self.config, &self.driver_name).await?;
        Ok(Arc::new(connection))
    }

    fn driver_name(&self) -> &str {
        &self.driver_name
    }
}

pub fn to_scylla_consistency(level: ConsistencyLevel) -> Consistency {
    match level {
        ConsistencyLevel::Any => Consistency::Any,
        ConsistencyLevel::One => Consistency::One,
        ConsistencyLevel::Two => Consistency::Two,
        ConsistencyLevel::Three => Consistency::Three,
        ConsistencyLevel::Quorum => Consistency::Quorum,
        ConsistencyLevel::All => Consistency::All,
        ConsistencyLevel::LocalQuorum => Consistency::LocalQuorum,
        ConsistencyLevel::EachQuorum => Consistency::EachQuorum,
        ConsistencyLevel::LocalOne => Consistency::LocalOne,
    }
}

fn bind_values(values: &[ColumnValue]) -> Vec<Option<CqlValue>> {
    values.iter().map(to_cql_value).collect()
}

/// `None` binds a CQL null
pub fn to_cql_value(value: &ColumnValue) -> Option<CqlValue> {
    let converted = match value {
        ColumnValue::Text(s) => CqlValue::Text(s.clone()),
        ColumnValue::Int(v) => CqlValue::Int(*v),
        ColumnValue::BigInt(v) => CqlValue::BigInt(*v),
        ColumnValue::SmallInt(v) => CqlValue::SmallInt(*v),
        ColumnValue::TinyInt(v) => CqlValue::TinyInt(*v),
        ColumnValue::Float(v) => CqlValue::Float(*v),
        ColumnValue::Double(v) => CqlValue::Double(*v),
        ColumnValue::Boolean(v) => CqlValue::Boolean(*v),
        ColumnValue::Blob(bytes) => CqlValue::Blob(bytes.clone()),
        ColumnValue::Uuid(uuid) => CqlValue::Uuid(*uuid),
        ColumnValue::Timeuuid(uuid) => CqlValue::Timeuuid(CqlTimeuuid::from(*uuid)),
        ColumnValue::Counter(v) => CqlValue::Counter(Counter(*v)),
        ColumnValue::Timestamp(ms) => CqlValue::Timestamp(CqlTimestamp(*ms)),
        ColumnValue::Inet(addr) => CqlValue::Inet(*addr),
        ColumnValue::List(items) => CqlValue::List(items.iter().filter_map(to_cql_value).collect()),
        ColumnValue::Set(items) => CqlValue::Set(items.iter().filter_map(to_cql_value).collect()),
        ColumnValue::Map(entries) => CqlValue::Map(
            entries
                .iter()
                .filter_map(|(k, v)| Some((to_cql_value(k)?, to_cql_value(v)?)))
                .collect(),
        ),
        ColumnValue::Null => return None,
    };
    Some(converted)
}

pub fn from_cql_value(value: CqlValue) -> ColumnValue {
    match value {
        CqlValue::Ascii(s) | CqlValue::Text(s) => ColumnValue::Text(s),
        CqlValue::Int(v) => ColumnValue::Int(v),
        CqlValue::BigInt(v) => ColumnValue::BigInt(v),
        CqlValue::SmallInt(v) => ColumnValue::SmallInt(v),
        CqlValue::TinyInt(v) => ColumnValue::TinyInt(v),
        CqlValue::Counter(counter) => ColumnValue::Counter(counter.0),
        CqlValue::Float(v) => ColumnValue::Float(v),
        CqlValue::Double(v) => ColumnValue::Double(v),
        CqlValue::Boolean(v) => ColumnValue::Boolean(v),
        CqlValue::Blob(bytes) => ColumnValue::Blob(bytes),
        CqlValue::Uuid(uuid) => ColumnValue::Uuid(uuid),
        CqlValue::Timeuuid(timeuuid) => ColumnValue::Timeuuid(timeuuid.into()),
        CqlValue::Timestamp(ts) => ColumnValue::Timestamp(ts.0),
        CqlValue::Inet(addr) => ColumnValue::Inet(addr),
        CqlValue::List(items) => ColumnValue::List(items.into_iter().map(from_cql_value).collect()),
        CqlValue::Set(items) => ColumnValue::Set(items.into_iter().map(from_cql_value).collect()),
        CqlValue::Map(entries) => ColumnValue::Map(
            entries
                .into_iter()
                .map(|(k, v)| (from_cql_value(k), from_cql_value(v)))
                .collect(),
        ),
        CqlValue::Empty => ColumnValue::Null,
        other => ColumnValue::Text(format!("{:?}", other)),
    }
}

fn rows_from_result(result: QueryResult) -> Result<ResultRows, CqlError> {
    let rows_result = match result.into_rows_result() {
        Ok(rows_result) => rows_result,
        // Writes and DDL come back without a rows payload
        Err(_) => return Ok(ResultRows::empty()),
    };

    let columns: Vec<String> = rows_result
        .column_specs()
        .iter()
        .map(|spec| spec.name().to_string())
        .collect();

    let mut rows = Vec::new();
    let typed_rows = rows_result
        .rows::<scylla::value::Row>()
        .map_err(|e| CqlError::DatabaseError(format!("Failed to read rows: {}", e)))?;
    for row in typed_rows {
        let row = row.map_err(|e| CqlError::DatabaseError(format!("Failed to decode row: {}", e)))?;
        rows.push(
            columns
                .iter()
                .cloned()
                .zip(row.columns)
                .map(|(name, value)| (name, value.map(from_cql_value).unwrap_or(ColumnValue::Null)))
                .collect::<Row>(),
        );
    }

    Ok(ResultRows::new(columns, rows))
}
