pub mod column;
pub mod table;

pub use column::{ClusteringOrder, Column, ColumnKind, CqlType};
pub use table::TableSchema;
