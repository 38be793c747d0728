use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::database::query_builder::QueryBuilder;
use crate::errors::CqlError;

/// A typed CQL value, as bound to statements and read back from rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnValue {
    Text(String),
    Int(i32),
    BigInt(i64),
    SmallInt(i16),
    TinyInt(i8),
    Float(f32),
    Double(f64),
    Boolean(bool),
    Blob(Vec<u8>),
    Uuid(Uuid),
    /// Version 1 (time-based) UUID, bound to `timeuuid` columns
    Timeuuid(Uuid),
    Counter(i64),
    /// Milliseconds since the Unix epoch
    Timestamp(i64),
    Inet(IpAddr),
    List(Vec<ColumnValue>),
    Set(Vec<ColumnValue>),
    Map(Vec<(ColumnValue, ColumnValue)>),
    Null,
}

impl ColumnValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ColumnValue::Null)
    }

    /// JSON rendering used for printing rows.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;

        match self {
            ColumnValue::Text(s) => Value::String(s.clone()),
            ColumnValue::Int(i) => Value::from(*i),
            ColumnValue::BigInt(i) | ColumnValue::Counter(i) | ColumnValue::Timestamp(i) => {
                Value::from(*i)
            }
            ColumnValue::SmallInt(i) => Value::from(*i),
            ColumnValue::TinyInt(i) => Value::from(*i),
            ColumnValue::Float(f) => Value::from(*f),
            ColumnValue::Double(f) => Value::from(*f),
            ColumnValue::Boolean(b) => Value::Bool(*b),
            ColumnValue::Blob(bytes) => Value::Array(bytes.iter().map(|b| Value::from(*b)).collect()),
            ColumnValue::Uuid(u) | ColumnValue::Timeuuid(u) => Value::String(u.to_string()),
            ColumnValue::Inet(ip) => Value::String(ip.to_string()),
            ColumnValue::List(items) | ColumnValue::Set(items) => {
                Value::Array(items.iter().map(ColumnValue::to_json).collect())
            }
            ColumnValue::Map(entries) => {
                let mut object = serde_json::Map::new();
                for (key, value) in entries {
                    // JSON object keys are strings; uuid, inet and text keys
                    // must not pick up an extra layer of quotes
                    let key = match key.to_json() {
                        Value::String(s) => s,
                        other => other.to_string(),
                    };
                    object.insert(key, value.to_json());
                }
                Value::Object(object)
            }
            ColumnValue::Null => Value::Null,
        }
    }
}

impl From<&str> for ColumnValue {
    fn from(s: &str) -> Self {
        ColumnValue::Text(s.to_string())
    }
}

impl From<String> for ColumnValue {
    fn from(s: String) -> Self {
        ColumnValue::Text(s)
    }
}

impl From<i32> for ColumnValue {
    fn from(i: i32) -> Self {
        ColumnValue::Int(i)
    }
}

impl From<i64> for ColumnValue {
    fn from(i: i64) -> Self {
        ColumnValue::BigInt(i)
    }
}

impl From<bool> for ColumnValue {
    fn from(b: bool) -> Self {
        ColumnValue::Boolean(b)
    }
}

impl From<Uuid> for ColumnValue {
    fn from(u: Uuid) -> Self {
        ColumnValue::Uuid(u)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsistencyLevel {
    Any,
    One,
    Two,
    Three,
    Quorum,
    All,
    LocalQuorum,
    EachQuorum,
    LocalOne,
}

impl ConsistencyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsistencyLevel::Any => "any",
            ConsistencyLevel::One => "one",
            ConsistencyLevel::Two => "two",
            ConsistencyLevel::Three => "three",
            ConsistencyLevel::Quorum => "quorum",
            ConsistencyLevel::All => "all",
            ConsistencyLevel::LocalQuorum => "local_quorum",
            ConsistencyLevel::EachQuorum => "each_quorum",
            ConsistencyLevel::LocalOne => "local_one",
        }
    }
}

impl fmt::Display for ConsistencyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConsistencyLevel {
    type Err = CqlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "any" => Ok(ConsistencyLevel::Any),
            "one" => Ok(ConsistencyLevel::One),
            "two" => Ok(ConsistencyLevel::Two),
            "three" => Ok(ConsistencyLevel::Three),
            "quorum" => Ok(ConsistencyLevel::Quorum),
            "all" => Ok(ConsistencyLevel::All),
            "local_quorum" | "localquorum" => Ok(ConsistencyLevel::LocalQuorum),
            "each_quorum" | "eachquorum" => Ok(ConsistencyLevel::EachQuorum),
            "local_one" | "localone" => Ok(ConsistencyLevel::LocalOne),
            other => Err(CqlError::InvalidArgument(format!(
                "Unknown consistency level: {}",
                other
            ))),
        }
    }
}

/// Opaque handle returned by `prepare`, bound to its CQL text.
///
/// Drivers may attach their own prepared object; a handle without one (or
/// with one from another driver) is re-prepared from the CQL text.
#[derive(Clone)]
pub struct PreparedHandle {
    cql: Arc<str>,
    driver_handle: Option<Arc<dyn Any + Send + Sync>>,
}

impl PreparedHandle {
    pub fn new(cql: impl Into<String>) -> Self {
        Self {
            cql: Arc::from(cql.into()),
            driver_handle: None,
        }
    }

    pub fn with_driver_handle(cql: impl Into<String>, handle: Arc<dyn Any + Send + Sync>) -> Self {
        Self {
            cql: Arc::from(cql.into()),
            driver_handle: Some(handle),
        }
    }

    pub fn cql(&self) -> &str {
        &self.cql
    }

    pub fn driver_handle<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.driver_handle
            .as_ref()
            .and_then(|handle| handle.as_ref().downcast_ref::<T>())
    }
}

impl fmt::Debug for PreparedHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreparedHandle")
            .field("cql", &self.cql)
            .field("driver_handle", &self.driver_handle.is_some())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub enum StatementKind {
    Simple(String),
    Prepared(PreparedHandle),
}

/// A single CQL statement with its bind values and per-statement options.
#[derive(Debug, Clone)]
pub struct Statement {
    kind: StatementKind,
    values: Vec<ColumnValue>,
    consistency: Option<ConsistencyLevel>,
    request_timeout: Option<Duration>,
}

impl Statement {
    pub fn new(cql: impl Into<String>) -> Self {
        Self {
            kind: StatementKind::Simple(cql.into()),
            values: Vec::new(),
            consistency: None,
            request_timeout: None,
        }
    }

    pub fn prepared(handle: PreparedHandle) -> Self {
        Self {
            kind: StatementKind::Prepared(handle),
            values: Vec::new(),
            consistency: None,
            request_timeout: None,
        }
    }

    pub fn bind(mut self, values: Vec<ColumnValue>) -> Self {
        self.values = values;
        self
    }

    pub fn with_consistency(mut self, consistency: ConsistencyLevel) -> Self {
        self.consistency = Some(consistency);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub(crate) fn or_consistency(mut self, default: Option<ConsistencyLevel>) -> Self {
        if self.consistency.is_none() {
            self.consistency = default;
        }
        self
    }

    pub fn kind(&self) -> &StatementKind {
        &self.kind
    }

    pub fn cql(&self) -> &str {
        match &self.kind {
            StatementKind::Simple(cql) => cql,
            StatementKind::Prepared(handle) => handle.cql(),
        }
    }

    pub fn values(&self) -> &[ColumnValue] {
        &self.values
    }

    pub fn consistency(&self) -> Option<ConsistencyLevel> {
        self.consistency
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout
    }
}

impl From<&str> for Statement {
    fn from(cql: &str) -> Self {
        Statement::new(cql)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchKind {
    #[default]
    Logged,
    Unlogged,
}

impl fmt::Display for BatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchKind::Logged => write!(f, "logged"),
            BatchKind::Unlogged => write!(f, "unlogged"),
        }
    }
}

/// Several statements sent to the cluster as one request.
#[derive(Debug, Clone)]
pub struct BatchStatement {
    kind: BatchKind,
    statements: Vec<Statement>,
    consistency: Option<ConsistencyLevel>,
}

impl BatchStatement {
    pub fn new(kind: BatchKind, statements: Vec<Statement>) -> Self {
        Self {
            kind,
            statements,
            consistency: None,
        }
    }

    pub fn with_consistency(mut self, consistency: Option<ConsistencyLevel>) -> Self {
        self.consistency = consistency;
        self
    }

    pub fn kind(&self) -> BatchKind {
        self.kind
    }

    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    pub fn consistency(&self) -> Option<ConsistencyLevel> {
        self.consistency
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// CQL text of the whole batch, for logging and dry runs.
    pub fn to_cql(&self) -> String {
        QueryBuilder::build_batch_statements(
            self.kind,
            self.statements.iter().map(|s| s.cql().to_string()).collect(),
        )
    }
}

/// One result row: column names mapped to typed values, in column order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    columns: Vec<(String, ColumnValue)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&ColumnValue> {
        self.columns
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, value)| value)
    }

    /// Sets a column, replacing an existing value of the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: ColumnValue) {
        let name = name.into();
        match self.columns.iter_mut().find(|(column, _)| *column == name) {
            Some(entry) => entry.1 = value,
            None => self.columns.push((name, value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ColumnValue)> {
        self.columns.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Value {
        let object = self
            .columns
            .iter()
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect();
        serde_json::Value::Object(object)
    }
}

impl FromIterator<(String, ColumnValue)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, ColumnValue)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (name, value) in iter {
            row.insert(name, value);
        }
        row
    }
}

/// Rows returned by one execution. Single pass: once consumed they are gone.
#[derive(Debug)]
pub struct ResultRows {
    columns: Vec<String>,
    rows: std::vec::IntoIter<Row>,
}

impl ResultRows {
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self {
            columns,
            rows: rows.into_iter(),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new())
    }

    pub fn column_names(&self) -> &[String] {
        &self.columns
    }
}

impl Iterator for ResultRows {
    type Item = Row;

    fn next(&mut self) -> Option<Self::Item> {
        self.rows.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.rows.size_hint()
    }
}

impl ExactSizeIterator for ResultRows {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consistency_from_str() {
        assert_eq!("one".parse::<ConsistencyLevel>().unwrap(), ConsistencyLevel::One);
        assert_eq!(
            "LOCAL_QUORUM".parse::<ConsistencyLevel>().unwrap(),
            ConsistencyLevel::LocalQuorum
        );
        assert_eq!(
            "local-one".parse::<ConsistencyLevel>().unwrap(),
            ConsistencyLevel::LocalOne
        );
        assert!(matches!(
            "most".parse::<ConsistencyLevel>(),
            Err(CqlError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_statement_keeps_explicit_consistency() {
        let statement = Statement::new("SELECT * FROM posts")
            .with_consistency(ConsistencyLevel::All)
            .or_consistency(Some(ConsistencyLevel::One));
        assert_eq!(statement.consistency(), Some(ConsistencyLevel::All));

        let statement = Statement::new("SELECT * FROM posts").or_consistency(Some(ConsistencyLevel::One));
        assert_eq!(statement.consistency(), Some(ConsistencyLevel::One));
    }

    #[test]
    fn test_prepared_handle_downcast() {
        let handle = PreparedHandle::with_driver_handle("SELECT 1", Arc::new(42_u32));
        assert_eq!(handle.driver_handle::<u32>(), Some(&42));
        assert_eq!(handle.driver_handle::<String>(), None);
        assert_eq!(Statement::prepared(handle).cql(), "SELECT 1");
    }

    #[test]
    fn test_row_insert_replaces() {
        let mut row = Row::new();
        row.insert("id", ColumnValue::Int(1));
        row.insert("title", ColumnValue::from("first"));
        row.insert("id", ColumnValue::Int(2));

        assert_eq!(row.len(), 2);
        assert_eq!(row.get("id"), Some(&ColumnValue::Int(2)));
        assert_eq!(row.to_json(), serde_json::json!({"id": 2, "title": "first"}));
    }

    #[test]
    fn test_batch_statement_to_cql() {
        let batch = BatchStatement::new(
            BatchKind::Unlogged,
            vec![Statement::new("DELETE FROM posts WHERE id = ?")],
        );
        assert_eq!(
            batch.to_cql(),
            "BEGIN UNLOGGED BATCH\n  DELETE FROM posts WHERE id = ?;\nAPPLY BATCH;"
        );
    }

    #[test]
    fn test_map_keys_render_without_quotes() {
        let id = Uuid::parse_str("0571c3a0-8b3e-11ee-b9d1-0242ac120002").unwrap();
        let value = ColumnValue::Map(vec![
            (ColumnValue::Uuid(id), ColumnValue::Int(1)),
            (ColumnValue::Inet("::1".parse().unwrap()), ColumnValue::Int(2)),
            (ColumnValue::BigInt(7), ColumnValue::Counter(3)),
        ]);
        assert_eq!(
            value.to_json(),
            serde_json::json!({
                "0571c3a0-8b3e-11ee-b9d1-0242ac120002": 1,
                "::1": 2,
                "7": 3,
            })
        );
    }

    #[test]
    fn test_result_rows_single_pass() {
        let rows = vec![Row::from_iter([("id".to_string(), ColumnValue::Int(1))])];
        let mut result = ResultRows::new(vec!["id".to_string()], rows);
        assert_eq!(result.len(), 1);
        assert!(result.next().is_some());
        assert!(result.next().is_none());
    }
}
