pub mod config;
pub mod database;
pub mod errors;
pub mod keyspace;
pub mod metrics;
pub mod schema;
pub mod types;

pub use config::{load_config, KeyspaceConfig};
pub use database::{Batch, BatchOptions, StatementSink};
pub use errors::CqlError;
pub use keyspace::Keyspace;
pub use types::{ColumnValue, ConsistencyLevel, PreparedHandle, ResultRows, Row, Statement};
