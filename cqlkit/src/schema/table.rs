use serde_json::Value;

use super::column::{ClusteringOrder, Column, CqlType};
use crate::database::batch::StatementSink;
use crate::database::query_builder::QueryBuilder;
use crate::errors::CqlError;
use crate::types::{Row, Statement};

/// Column layout of one table, used to render DDL and to build typed
/// statements from raw rows.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    name: String,
    columns: Vec<Column>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    pub fn with_column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    pub fn partition_key(self, name: &str, ty: CqlType) -> Self {
        self.with_column(Column::partition_key(name, ty))
    }

    pub fn clustering_column(self, name: &str, ty: CqlType, order: ClusteringOrder) -> Self {
        self.with_column(Column::clustering_column(name, ty, order))
    }

    pub fn column(self, name: &str, ty: CqlType) -> Self {
        self.with_column(Column::data(name, ty))
    }

    /// Data column with a secondary index named `<table>_<column>_idx`
    pub fn indexed_column(self, name: &str, ty: CqlType) -> Self {
        let index_name = format!("{}_{}_idx", self.name, name);
        self.with_column(Column::indexed(name, ty, index_name))
    }

    pub fn list(self, name: &str, element: CqlType) -> Self {
        self.with_column(Column::list(name, element))
    }

    pub fn set(self, name: &str, element: CqlType) -> Self {
        self.with_column(Column::set(name, element))
    }

    pub fn map(self, name: &str, key: CqlType, value: CqlType) -> Self {
        self.with_column(Column::map(name, key, value))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_named(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.name() == name)
    }

    pub fn partition_key_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|column| column.is_partition_key())
    }

    pub fn clustering_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|column| column.is_clustering_column())
    }

    pub fn data_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|column| column.is_data_column())
    }

    fn qualified_name(&self, keyspace: Option<&str>) -> String {
        match keyspace {
            Some(keyspace) => format!("{}.{}", keyspace, self.name),
            None => self.name.clone(),
        }
    }

    pub fn create_cql(&self, keyspace: Option<&str>) -> Result<String, CqlError> {
        let partition_keys: Vec<&str> = self.partition_key_columns().map(Column::name).collect();
        if partition_keys.is_empty() {
            return Err(CqlError::InvalidArgument(format!(
                "Table {} has no partition key",
                self.name
            )));
        }

        let mut primary_key = format!("({})", partition_keys.join(", "));
        for column in self.clustering_columns() {
            primary_key.push_str(", ");
            primary_key.push_str(column.name());
        }

        let definitions: Vec<String> = self.columns.iter().map(Column::to_cql).collect();
        let mut cql = format!(
            "CREATE TABLE {} ({}, PRIMARY KEY ({}))",
            self.qualified_name(keyspace),
            definitions.join(", "),
            primary_key
        );

        let has_descending = self
            .clustering_columns()
            .any(|column| column.clustering_order() == Some(ClusteringOrder::Desc));
        if has_descending {
            let orders: Vec<String> = self.clustering_columns().filter_map(Column::order_cql).collect();
            cql.push_str(&format!(" WITH CLUSTERING ORDER BY ({})", orders.join(", ")));
        }

        Ok(cql)
    }

    pub fn index_cql(&self, keyspace: Option<&str>) -> Vec<String> {
        self.columns
            .iter()
            .filter_map(|column| {
                column.index_name().map(|index_name| {
                    format!(
                        "CREATE INDEX {} ON {} ({})",
                        index_name,
                        self.qualified_name(keyspace),
                        column.name()
                    )
                })
            })
            .collect()
    }

    /// Cast a JSON object through the columns into a bound INSERT
    pub fn insert(&self, row: &Value) -> Result<Statement, CqlError> {
        let object = row.as_object().ok_or_else(|| {
            CqlError::InvalidArgument(format!("Row for {} must be an object, got {}", self.name, row))
        })?;

        let mut names = Vec::with_capacity(object.len());
        let mut values = Vec::with_capacity(object.len());
        for (name, raw) in object {
            let column = self.column_named(name).ok_or_else(|| {
                CqlError::InvalidArgument(format!("Unknown column {} for table {}", name, self.name))
            })?;
            names.push(column.name());
            values.push(column.cast(raw)?);
        }

        for key in self.partition_key_columns() {
            if !object.contains_key(key.name()) {
                return Err(CqlError::InvalidArgument(format!(
                    "Missing partition key {} for table {}",
                    key.name(),
                    self.name
                )));
            }
        }

        Ok(Statement::new(QueryBuilder::build_insert_query(&self.name, &names)).bind(values))
    }

    /// DELETE of the row identified by the key columns present in `key`
    pub fn delete(&self, key: &Value) -> Result<Statement, CqlError> {
        let mut names = Vec::new();
        let mut values = Vec::new();
        for column in self.columns.iter().filter(|column| column.is_key()) {
            match key.get(column.name()) {
                Some(raw) => {
                    names.push(column.name());
                    values.push(column.cast(raw)?);
                }
                None if column.is_partition_key() => {
                    return Err(CqlError::InvalidArgument(format!(
                        "Missing partition key {} for table {}",
                        column.name(),
                        self.name
                    )));
                }
                None => {}
            }
        }

        Ok(Statement::new(QueryBuilder::build_delete_query(&self.name, &names)).bind(values))
    }

    /// Re-cast a result row so every known column carries its declared type
    pub fn cast_row(&self, row: Row) -> Result<Row, CqlError> {
        row.iter()
            .map(|(name, value)| {
                let cast = match self.column_named(name) {
                    Some(column) => column.cast(&value.to_json())?,
                    None => value.clone(),
                };
                Ok((name.to_string(), cast))
            })
            .collect()
    }

    /// Insert through whatever sink is current: the keyspace, or an open batch
    pub async fn insert_into<S>(&self, sink: &mut S, row: &Value) -> Result<(), CqlError>
    where
        S: StatementSink + ?Sized,
    {
        let statement = self.insert(row)?;
        sink.submit(statement).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ColumnValue;
    use serde_json::json;

    fn posts() -> TableSchema {
        TableSchema::new("posts")
            .partition_key("blog", CqlType::Text)
            .clustering_column("id", CqlType::Int, ClusteringOrder::Desc)
            .column("title", CqlType::Text)
            .indexed_column("author", CqlType::Text)
            .set("tags", CqlType::Text)
            .map("meta", CqlType::Text, CqlType::Int)
    }

    #[test]
    fn test_create_cql() {
        let cql = posts().create_cql(Some("blog")).unwrap();
        assert_eq!(
            cql,
            "CREATE TABLE blog.posts (blog text, id int, title text, author text, \
             tags SET <text>, meta MAP <text, int>, PRIMARY KEY ((blog), id)) \
             WITH CLUSTERING ORDER BY (id desc)"
        );
    }

    #[test]
    fn test_create_cql_requires_partition_key() {
        let table = TableSchema::new("orphans").column("title", CqlType::Text);
        assert!(matches!(table.create_cql(None), Err(CqlError::InvalidArgument(_))));
    }

    #[test]
    fn test_index_cql() {
        assert_eq!(
            posts().index_cql(None),
            vec!["CREATE INDEX posts_author_idx ON posts (author)".to_string()]
        );
    }

    #[test]
    fn test_insert_casts_values() {
        let statement = posts()
            .insert(&json!({"blog": "tech", "id": "7", "tags": ["a", "a", "b"]}))
            .unwrap();

        assert_eq!(statement.cql(), "INSERT INTO posts (blog, id, tags) VALUES (?, ?, ?)");
        assert_eq!(
            statement.values(),
            &[
                ColumnValue::Text("tech".into()),
                ColumnValue::Int(7),
                ColumnValue::Set(vec![ColumnValue::Text("a".into()), ColumnValue::Text("b".into())]),
            ]
        );
    }

    #[test]
    fn test_insert_rejects_unknown_and_missing_key() {
        let table = posts();
        assert!(table.insert(&json!({"blog": "tech", "nope": 1})).is_err());
        assert!(table.insert(&json!({"id": 1})).is_err());
        assert!(table.insert(&json!([1, 2])).is_err());
    }

    #[test]
    fn test_delete_by_key() {
        let statement = posts().delete(&json!({"blog": "tech", "id": 3})).unwrap();
        assert_eq!(statement.cql(), "DELETE FROM posts WHERE blog = ? AND id = ?");
        assert_eq!(statement.values().len(), 2);
    }

    #[test]
    fn test_cast_row() {
        let row: Row = [
            ("id".to_string(), ColumnValue::BigInt(5)),
            ("extra".to_string(), ColumnValue::Boolean(true)),
        ]
        .into_iter()
        .collect();

        let cast = posts().cast_row(row).unwrap();
        assert_eq!(cast.get("id"), Some(&ColumnValue::Int(5)));
        assert_eq!(cast.get("extra"), Some(&ColumnValue::Boolean(true)));
    }

    #[test]
    fn test_cast_row_passes_typed_map_keys_through() {
        let readers = TableSchema::new("readers")
            .partition_key("id", CqlType::TimeUuid)
            .map("visits", CqlType::Uuid, CqlType::Int)
            .map("hosts", CqlType::Inet, CqlType::Timestamp);

        let id = uuid::Uuid::parse_str("0571c3a0-8b3e-11ee-b9d1-0242ac120002").unwrap();
        let reader = uuid::Uuid::new_v4();
        let row: Row = [
            ("id".to_string(), ColumnValue::Timeuuid(id)),
            (
                "visits".to_string(),
                ColumnValue::Map(vec![(ColumnValue::Uuid(reader), ColumnValue::Int(3))]),
            ),
            (
                "hosts".to_string(),
                ColumnValue::Map(vec![(
                    ColumnValue::Inet("::1".parse().unwrap()),
                    ColumnValue::Timestamp(1_000),
                )]),
            ),
        ]
        .into_iter()
        .collect();

        let cast = readers.cast_row(row.clone()).unwrap();
        assert_eq!(cast, row);
    }
}
