pub mod batch;
pub mod client;
pub mod executor;
pub mod factory;
pub mod memory;
pub mod policy;
pub mod query_builder;
pub mod retry;
pub mod scylla;

pub use batch::{Batch, BatchOptions, StatementSink};
pub use client::{ClusterClient, ClusterConnector};
pub use executor::ResilientExecutor;
pub use factory::{DatabaseDriver, DatabaseFactory};
pub use memory::{Dispatch, MemoryCluster, MemoryConnector};
pub use policy::{ErrorPolicy, ErrorPolicyRegistry};
pub use query_builder::QueryBuilder;
pub use retry::RetryPolicy;
pub use self::scylla::{ScyllaConnection, ScyllaConnector};
