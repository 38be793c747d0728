use crate::types::BatchKind;

pub struct QueryBuilder;

impl QueryBuilder {
    /// Build an INSERT with one bind marker per column
    pub fn build_insert_query(table: &str, columns: &[&str]) -> String {
        let markers = vec!["?"; columns.len()].join(", ");
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            columns.join(", "),
            markers
        )
    }

    /// Build a DELETE query
    pub fn build_delete_query(table: &str, key_columns: &[&str]) -> String {
        format!(
            "DELETE FROM {} WHERE {}",
            table,
            Self::equality_clause(key_columns)
        )
    }

    /// Metadata lookup used to test whether a keyspace exists
    pub fn build_keyspace_exists_query() -> &'static str {
        "SELECT keyspace_name FROM system_schema.keyspaces WHERE keyspace_name = ?"
    }

    /// Build a batch statement
    pub fn build_batch_statements(kind: BatchKind, queries: Vec<String>) -> String {
        let mut batch = match kind {
            BatchKind::Logged => String::from("BEGIN BATCH\n"),
            BatchKind::Unlogged => String::from("BEGIN UNLOGGED BATCH\n"),
        };
        for query in queries {
            batch.push_str(&format!("  {};\n", query.trim_end_matches(';')));
        }
        batch.push_str("APPLY BATCH;");
        batch
    }

    fn equality_clause(columns: &[&str]) -> String {
        columns
            .iter()
            .map(|column| format!("{} = ?", column))
            .collect::<Vec<_>>()
            .join(" AND ")
    }
}
