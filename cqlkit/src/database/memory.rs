// cqlkit/src/database/memory.rs
//
// In-process cluster for tests and dry runs. Understands a small CQL subset
// (keyspace/table DDL, INSERT, UPDATE, SELECT, DELETE, TRUNCATE with
// equality WHERE clauses), records every call it receives, and can be told
// to fail upcoming calls or connects.
//

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use tracing::debug;

use crate::database::client::{ClusterClient, ClusterConnector};
use crate::errors::CqlError;
use crate::types::{
    BatchKind, BatchStatement, ColumnValue, ConsistencyLevel, PreparedHandle, ResultRows, Row,
    Statement,
};

/// One call that reached the cluster
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    Statement {
        cql: String,
        values: Vec<ColumnValue>,
        consistency: Option<ConsistencyLevel>,
    },
    Prepare {
        cql: String,
    },
    Batch {
        kind: BatchKind,
        statements: Vec<String>,
        consistency: Option<ConsistencyLevel>,
    },
}

#[derive(Default)]
struct MemoryState {
    keyspaces: BTreeSet<String>,
    tables: HashMap<String, Vec<Row>>,
    dispatches: Vec<Dispatch>,
    failures: VecDeque<CqlError>,
    connect_failures: VecDeque<CqlError>,
    attempts: u32,
    connects: u32,
}

#[derive(Default)]
pub struct MemoryCluster {
    state: Mutex<MemoryState>,
}

impl MemoryCluster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_keyspaces<I, S>(names: I) -> Arc<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let cluster = Self::default();
        {
            let mut state = cluster.state.lock();
            state.keyspaces.extend(names.into_iter().map(Into::into));
        }
        Arc::new(cluster)
    }

    pub fn connector(self: &Arc<Self>) -> MemoryConnector {
        MemoryConnector {
            cluster: self.clone(),
        }
    }

    pub fn create_keyspace(&self, name: &str) {
        self.state.lock().keyspaces.insert(name.to_string());
    }

    /// Fail the next call (execute, prepare or batch) with `error`.
    /// Queued failures are consumed in order.
    pub fn fail_next(&self, error: CqlError) {
        self.state.lock().failures.push_back(error);
    }

    pub fn fail_next_connect(&self, error: CqlError) {
        self.state.lock().connect_failures.push_back(error);
    }

    /// Successful calls, in arrival order
    pub fn dispatches(&self) -> Vec<Dispatch> {
        self.state.lock().dispatches.clone()
    }

    pub fn batches(&self) -> Vec<Dispatch> {
        self.state
            .lock()
            .dispatches
            .iter()
            .filter(|dispatch| matches!(dispatch, Dispatch::Batch { .. }))
            .cloned()
            .collect()
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.state
            .lock()
            .tables
            .get(&table.to_lowercase())
            .cloned()
            .unwrap_or_default()
    }

    /// Calls received, including the ones that were made to fail
    pub fn attempts(&self) -> u32 {
        self.state.lock().attempts
    }

    pub fn connect_count(&self) -> u32 {
        self.state.lock().connects
    }

    fn begin_call(&self) -> Result<(), CqlError> {
        let mut state = self.state.lock();
        state.attempts += 1;
        match state.failures.pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn run(&self, statement: &Statement) -> Result<ResultRows, CqlError> {
        let command = parse(statement.cql(), statement.values())?;
        let mut state = self.state.lock();
        let rows = apply(&mut state, command)?;
        state.dispatches.push(Dispatch::Statement {
            cql: statement.cql().to_string(),
            values: statement.values().to_vec(),
            consistency: statement.consistency(),
        });
        Ok(rows)
    }

    fn run_batch(&self, batch: &BatchStatement) -> Result<(), CqlError> {
        let commands = batch
            .statements()
            .iter()
            .map(|statement| {
                let command = parse(statement.cql(), statement.values())?;
                if !command.is_write() {
                    return Err(CqlError::Validation(
                        "Only INSERT, UPDATE and DELETE statements are allowed in a batch"
                            .to_string(),
                    ));
                }
                Ok(command)
            })
            .collect::<Result<Vec<_>, CqlError>>()?;

        let mut state = self.state.lock();
        let mut tables = state.tables.clone();
        for command in commands {
            apply_write(&mut tables, command)?;
        }
        state.tables = tables;
        state.dispatches.push(Dispatch::Batch {
            kind: batch.kind(),
            statements: batch
                .statements()
                .iter()
                .map(|statement| statement.cql().to_string())
                .collect(),
            consistency: batch.consistency(),
        });
        Ok(())
    }
}

pub struct MemoryConnector {
    cluster: Arc<MemoryCluster>,
}

#[async_trait]
impl ClusterConnector for MemoryConnector {
    async fn connect(&self) -> Result<Arc<dyn ClusterClient>, CqlError> {
        let session = {
            let mut state = self.cluster.state.lock();
            if let Some(error) = state.connect_failures.pop_front() {
                return Err(error);
            }
            state.connects += 1;
            state.connects
        };
        debug!("Opened in-memory session {}", session);

        Ok(Arc::new(MemoryClient {
            cluster: self.cluster.clone(),
        }))
    }

    fn driver_name(&self) -> &str {
        "memory"
    }
}

pub struct MemoryClient {
    cluster: Arc<MemoryCluster>,
}

#[async_trait]
impl ClusterClient for MemoryClient {
    async fn execute(&self, statement: &Statement) -> Result<ResultRows, CqlError> {
        self.cluster.begin_call()?;
        self.cluster.run(statement)
    }

    async fn prepare(&self, cql: &str) -> Result<PreparedHandle, CqlError> {
        self.cluster.begin_call()?;
        tokenize(cql)?;
        self.cluster.state.lock().dispatches.push(Dispatch::Prepare {
            cql: cql.to_string(),
        });
        Ok(PreparedHandle::new(cql))
    }

    async fn batch(&self, batch: &BatchStatement) -> Result<(), CqlError> {
        self.cluster.begin_call()?;
        self.cluster.run_batch(batch)
    }

    fn driver_name(&self) -> &str {
        "memory"
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Str(String),
    Number(String),
    Symbol(char),
    Marker,
}

fn tokenize(cql: &str) -> Result<Vec<Token>, CqlError> {
    let mut tokens = Vec::new();
    let mut chars = cql.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == '\'' {
            chars.next();
            let mut text = String::new();
            loop {
                match chars.next() {
                    Some('\'') if chars.peek() == Some(&'\'') => {
                        chars.next();
                        text.push('\'');
                    }
                    Some('\'') => break,
                    Some(other) => text.push(other),
                    None => {
                        return Err(CqlError::Syntax(format!(
                            "Unterminated string literal in: {}",
                            cql
                        )))
                    }
                }
            }
            tokens.push(Token::Str(text));
        } else if c.is_ascii_digit() || c == '-' {
            let mut number = String::new();
            while let Some(&d) = chars.peek() {
                if d.is_ascii_digit() || d == '.' || (d == '-' && number.is_empty()) {
                    number.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            if number == "-" {
                return Err(CqlError::Syntax(format!("Unexpected '-' in: {}", cql)));
            }
            tokens.push(Token::Number(number));
        } else if c.is_alphanumeric() || c == '_' || c == '"' {
            let mut word = String::new();
            while let Some(&w) = chars.peek() {
                if w.is_alphanumeric() || w == '_' || w == '.' {
                    word.push(w);
                    chars.next();
                } else if w == '"' {
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token::Word(word));
        } else if c == '?' {
            chars.next();
            tokens.push(Token::Marker);
        } else {
            chars.next();
            tokens.push(Token::Symbol(c));
        }
    }

    while tokens.last() == Some(&Token::Symbol(';')) {
        tokens.pop();
    }
    Ok(tokens)
}

#[derive(Debug)]
enum Command {
    CreateKeyspace { name: String, if_not_exists: bool },
    DropKeyspace { name: String, if_exists: bool },
    CreateTable { name: String, if_not_exists: bool },
    DropTable { name: String, if_exists: bool },
    Insert { table: String, row: Row },
    Update {
        table: String,
        assignments: Vec<(String, ColumnValue)>,
        filter: Vec<(String, ColumnValue)>,
    },
    Delete { table: String, filter: Vec<(String, ColumnValue)> },
    Truncate { table: String },
    Select {
        table: String,
        projection: Option<Vec<String>>,
        filter: Vec<(String, ColumnValue)>,
        limit: Option<usize>,
    },
    Use,
}

impl Command {
    fn is_write(&self) -> bool {
        matches!(
            self,
            Command::Insert { .. } | Command::Update { .. } | Command::Delete { .. }
        )
    }
}

struct Parser<'a> {
    cql: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    values: std::slice::Iter<'a, ColumnValue>,
}

impl<'a> Parser<'a> {
    fn syntax(&self, message: &str) -> CqlError {
        CqlError::Syntax(format!("{} in: {}", message, self.cql))
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn keyword(&mut self, keyword: &str) -> bool {
        let found = matches!(self.peek(), Some(Token::Word(word)) if word.eq_ignore_ascii_case(keyword));
        if found {
            self.pos += 1;
        }
        found
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), CqlError> {
        if self.keyword(keyword) {
            Ok(())
        } else {
            Err(self.syntax(&format!("Expected {}", keyword)))
        }
    }

    fn symbol(&mut self, symbol: char) -> bool {
        if self.peek() == Some(&Token::Symbol(symbol)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_symbol(&mut self, symbol: char) -> Result<(), CqlError> {
        if self.symbol(symbol) {
            Ok(())
        } else {
            Err(self.syntax(&format!("Expected '{}'", symbol)))
        }
    }

    fn ident(&mut self) -> Result<String, CqlError> {
        let name = match self.peek() {
            Some(Token::Word(word)) => word.to_lowercase(),
            _ => return Err(self.syntax("Expected identifier")),
        };
        self.pos += 1;
        Ok(name)
    }

    fn value(&mut self) -> Result<ColumnValue, CqlError> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| self.syntax("Expected value"))?;
        self.pos += 1;

        match token {
            Token::Marker => self.values.next().cloned().ok_or_else(|| {
                CqlError::InvalidArgument(format!("Not enough bind values for: {}", self.cql))
            }),
            Token::Str(text) => Ok(ColumnValue::Text(text)),
            Token::Number(number) if number.contains('.') => number
                .parse::<f64>()
                .map(ColumnValue::Double)
                .map_err(|_| self.syntax("Invalid number")),
            Token::Number(number) => match number.parse::<i32>() {
                Ok(int) => Ok(ColumnValue::Int(int)),
                Err(_) => number
                    .parse::<i64>()
                    .map(ColumnValue::BigInt)
                    .map_err(|_| self.syntax("Invalid number")),
            },
            Token::Word(word) if word.eq_ignore_ascii_case("true") => Ok(ColumnValue::Boolean(true)),
            Token::Word(word) if word.eq_ignore_ascii_case("false") => {
                Ok(ColumnValue::Boolean(false))
            }
            Token::Word(word) if word.eq_ignore_ascii_case("null") => Ok(ColumnValue::Null),
            _ => Err(self.syntax("Unsupported value")),
        }
    }

    fn ident_list(&mut self) -> Result<Vec<String>, CqlError> {
        let mut names = vec![self.ident()?];
        while self.symbol(',') {
            names.push(self.ident()?);
        }
        Ok(names)
    }

    fn assignments(&mut self, separator: &str) -> Result<Vec<(String, ColumnValue)>, CqlError> {
        let mut pairs = Vec::new();
        loop {
            let name = self.ident()?;
            self.expect_symbol('=')?;
            pairs.push((name, self.value()?));
            let more = match separator {
                "," => self.symbol(','),
                keyword => self.keyword(keyword),
            };
            if !more {
                return Ok(pairs);
            }
        }
    }

    fn where_clause(&mut self) -> Result<Vec<(String, ColumnValue)>, CqlError> {
        if self.keyword("WHERE") {
            self.assignments("AND")
        } else {
            Ok(Vec::new())
        }
    }

    fn if_clause(&mut self, words: &[&str]) -> bool {
        let start = self.pos;
        for word in words {
            if !self.keyword(word) {
                self.pos = start;
                return false;
            }
        }
        true
    }

    fn finish(self, command: Command) -> Result<Command, CqlError> {
        if self.pos < self.tokens.len() {
            return Err(self.syntax("Unexpected trailing input"));
        }
        if self.values.len() > 0 {
            return Err(CqlError::InvalidArgument(format!(
                "Too many bind values for: {}",
                self.cql
            )));
        }
        Ok(command)
    }

    fn parse(mut self) -> Result<Command, CqlError> {
        if self.keyword("INSERT") {
            self.expect_keyword("INTO")?;
            let table = self.ident()?;
            self.expect_symbol('(')?;
            let columns = self.ident_list()?;
            self.expect_symbol(')')?;
            self.expect_keyword("VALUES")?;
            self.expect_symbol('(')?;
            let mut values = vec![self.value()?];
            while self.symbol(',') {
                values.push(self.value()?);
            }
            self.expect_symbol(')')?;
            if columns.len() != values.len() {
                return Err(CqlError::Validation(format!(
                    "Unmatched column names/values in: {}",
                    self.cql
                )));
            }
            let row: Row = columns.into_iter().zip(values).collect();
            self.finish(Command::Insert { table, row })
        } else if self.keyword("UPDATE") {
            let table = self.ident()?;
            self.expect_keyword("SET")?;
            let assignments = self.assignments(",")?;
            let filter = self.where_clause()?;
            self.finish(Command::Update {
                table,
                assignments,
                filter,
            })
        } else if self.keyword("DELETE") {
            self.expect_keyword("FROM")?;
            let table = self.ident()?;
            let filter = self.where_clause()?;
            self.finish(Command::Delete { table, filter })
        } else if self.keyword("TRUNCATE") {
            self.keyword("TABLE");
            let table = self.ident()?;
            self.finish(Command::Truncate { table })
        } else if self.keyword("SELECT") {
            let projection = if self.symbol('*') {
                None
            } else {
                Some(self.ident_list()?)
            };
            self.expect_keyword("FROM")?;
            let table = self.ident()?;
            let filter = self.where_clause()?;
            let limit = if self.keyword("LIMIT") {
                match self.value()? {
                    ColumnValue::Int(n) if n >= 0 => Some(n as usize),
                    _ => return Err(self.syntax("Invalid LIMIT")),
                }
            } else {
                None
            };
            self.keyword("ALLOW");
            self.keyword("FILTERING");
            self.finish(Command::Select {
                table,
                projection,
                filter,
                limit,
            })
        } else if self.keyword("CREATE") {
            if self.keyword("KEYSPACE") {
                let if_not_exists = self.if_clause(&["IF", "NOT", "EXISTS"]);
                let name = self.ident()?;
                Ok(Command::CreateKeyspace {
                    name,
                    if_not_exists,
                })
            } else if self.keyword("TABLE") {
                let if_not_exists = self.if_clause(&["IF", "NOT", "EXISTS"]);
                let name = self.ident()?;
                Ok(Command::CreateTable {
                    name,
                    if_not_exists,
                })
            } else {
                Err(self.syntax("Unsupported CREATE"))
            }
        } else if self.keyword("DROP") {
            if self.keyword("KEYSPACE") {
                let if_exists = self.if_clause(&["IF", "EXISTS"]);
                let name = self.ident()?;
                self.finish(Command::DropKeyspace { name, if_exists })
            } else if self.keyword("TABLE") {
                let if_exists = self.if_clause(&["IF", "EXISTS"]);
                let name = self.ident()?;
                self.finish(Command::DropTable { name, if_exists })
            } else {
                Err(self.syntax("Unsupported DROP"))
            }
        } else if self.keyword("USE") {
            self.ident()?;
            self.finish(Command::Use)
        } else {
            Err(self.syntax("Unsupported statement"))
        }
    }
}

fn parse(cql: &str, values: &[ColumnValue]) -> Result<Command, CqlError> {
    Parser {
        cql,
        tokens: tokenize(cql)?,
        pos: 0,
        values: values.iter(),
    }
    .parse()
}

/// Equality across integer widths, the way bound and literal values meet
fn same_value(left: &ColumnValue, right: &ColumnValue) -> bool {
    left == right || left.to_json() == right.to_json()
}

fn matches_filter(row: &Row, filter: &[(String, ColumnValue)]) -> bool {
    filter.iter().all(|(name, expected)| {
        row.get(name)
            .map(|actual| same_value(actual, expected))
            .unwrap_or(false)
    })
}

fn apply(state: &mut MemoryState, command: Command) -> Result<ResultRows, CqlError> {
    match command {
        Command::CreateKeyspace {
            name,
            if_not_exists,
        } => {
            if !state.keyspaces.insert(name.clone()) && !if_not_exists {
                return Err(CqlError::DatabaseError(format!(
                    "Keyspace {} already exists",
                    name
                )));
            }
        }
        Command::DropKeyspace { name, if_exists } => {
            if !state.keyspaces.remove(&name) && !if_exists {
                return Err(CqlError::Validation(format!(
                    "Cannot drop non existing keyspace '{}'",
                    name
                )));
            }
        }
        Command::CreateTable {
            name,
            if_not_exists,
        } => {
            if state.tables.contains_key(&name) && !if_not_exists {
                return Err(CqlError::DatabaseError(format!("Table {} already exists", name)));
            }
            state.tables.entry(name).or_default();
        }
        Command::DropTable { name, if_exists } => {
            if state.tables.remove(&name).is_none() && !if_exists {
                return Err(CqlError::Validation(format!(
                    "Cannot drop non existing table '{}'",
                    name
                )));
            }
        }
        Command::Truncate { table } => {
            state.tables.entry(table).or_default().clear();
        }
        Command::Select {
            table,
            projection,
            filter,
            limit,
        } => return Ok(select(state, &table, projection, &filter, limit)),
        Command::Use => {}
        write => apply_write(&mut state.tables, write)?,
    }
    Ok(ResultRows::empty())
}

fn apply_write(tables: &mut HashMap<String, Vec<Row>>, command: Command) -> Result<(), CqlError> {
    match command {
        Command::Insert { table, row } => tables.entry(table).or_default().push(row),
        Command::Update {
            table,
            assignments,
            filter,
        } => {
            if filter.is_empty() {
                return Err(CqlError::InvalidArgument(
                    "UPDATE requires a WHERE clause".to_string(),
                ));
            }
            let rows = tables.entry(table).or_default();
            let mut updated = false;
            for row in rows.iter_mut().filter(|row| matches_filter(row, &filter)) {
                for (name, value) in &assignments {
                    row.insert(name.clone(), value.clone());
                }
                updated = true;
            }
            if !updated {
                rows.push(filter.into_iter().chain(assignments).collect());
            }
        }
        Command::Delete { table, filter } => {
            if filter.is_empty() {
                return Err(CqlError::InvalidArgument(
                    "DELETE requires a WHERE clause".to_string(),
                ));
            }
            if let Some(rows) = tables.get_mut(&table) {
                rows.retain(|row| !matches_filter(row, &filter));
            }
        }
        other => {
            return Err(CqlError::Validation(format!(
                "Not a write statement: {:?}",
                other
            )))
        }
    }
    Ok(())
}

fn select(
    state: &MemoryState,
    table: &str,
    projection: Option<Vec<String>>,
    filter: &[(String, ColumnValue)],
    limit: Option<usize>,
) -> ResultRows {
    let source: Vec<Row> = if table == "system_schema.keyspaces" {
        state
            .keyspaces
            .iter()
            .map(|name| {
                let mut row = Row::new();
                row.insert("keyspace_name", ColumnValue::Text(name.clone()));
                row
            })
            .collect()
    } else {
        state.tables.get(table).cloned().unwrap_or_default()
    };

    let rows: Vec<Row> = source
        .into_iter()
        .filter(|row| matches_filter(row, filter))
        .take(limit.unwrap_or(usize::MAX))
        .map(|row| match &projection {
            Some(names) => names
                .iter()
                .map(|name| {
                    let value = row.get(name).cloned().unwrap_or(ColumnValue::Null);
                    (name.clone(), value)
                })
                .collect(),
            None => row,
        })
        .collect();

    let columns = match projection {
        Some(names) => names,
        None => rows
            .first()
            .map(|row| row.iter().map(|(name, _)| name.to_string()).collect())
            .unwrap_or_default(),
    };
    ResultRows::new(columns, rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn client(cluster: &Arc<MemoryCluster>) -> Arc<dyn ClusterClient> {
        cluster.connector().connect().await.unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_select() {
        let cluster = MemoryCluster::new();
        let client = client(&cluster).await;

        client
            .execute(
                &Statement::new("INSERT INTO posts (id, title, views) VALUES (?, 'first', 10)")
                    .bind(vec![ColumnValue::Int(1)]),
            )
            .await
            .unwrap();
        client
            .execute(&Statement::new("INSERT INTO posts (id, title, views) VALUES (2, 'second', 0);"))
            .await
            .unwrap();

        let rows: Vec<Row> = client
            .execute(&Statement::new("SELECT title FROM posts WHERE id = ?").bind(vec![ColumnValue::BigInt(1)]))
            .await
            .unwrap()
            .collect();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("title"), Some(&ColumnValue::Text("first".into())));
        assert_eq!(rows[0].len(), 1);
    }

    #[tokio::test]
    async fn test_system_schema_keyspaces() {
        let cluster = MemoryCluster::with_keyspaces(["blog"]);
        let client = client(&cluster).await;
        let statement = Statement::new(
            "SELECT keyspace_name FROM system_schema.keyspaces WHERE keyspace_name = ?",
        );

        let found = client
            .execute(&statement.clone().bind(vec!["blog".into()]))
            .await
            .unwrap();
        let missing = client
            .execute(&statement.bind(vec!["shop".into()]))
            .await
            .unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(missing.len(), 0);
    }

    #[tokio::test]
    async fn test_update_delete_truncate() {
        let cluster = MemoryCluster::new();
        let client = client(&cluster).await;

        client
            .execute(&Statement::new("UPDATE posts SET title = 'draft' WHERE id = 7"))
            .await
            .unwrap();
        client
            .execute(&Statement::new("UPDATE posts SET title = 'final' WHERE id = 7"))
            .await
            .unwrap();
        assert_eq!(cluster.rows("posts").len(), 1);
        assert_eq!(
            cluster.rows("posts")[0].get("title"),
            Some(&ColumnValue::Text("final".into()))
        );

        client
            .execute(&Statement::new("DELETE FROM posts WHERE id = 7"))
            .await
            .unwrap();
        assert!(cluster.rows("posts").is_empty());

        client
            .execute(&Statement::new("INSERT INTO posts (id) VALUES (8)"))
            .await
            .unwrap();
        client.execute(&Statement::new("TRUNCATE posts")).await.unwrap();
        assert!(cluster.rows("posts").is_empty());
    }

    #[tokio::test]
    async fn test_bind_value_count_mismatch() {
        let cluster = MemoryCluster::new();
        let client = client(&cluster).await;

        let missing = client
            .execute(&Statement::new("INSERT INTO posts (id, title) VALUES (?, ?)").bind(vec![ColumnValue::Int(1)]))
            .await;
        let extra = client
            .execute(&Statement::new("INSERT INTO posts (id) VALUES (?)").bind(vec![ColumnValue::Int(1), ColumnValue::Int(2)]))
            .await;

        assert!(matches!(missing, Err(CqlError::InvalidArgument(_))));
        assert!(matches!(extra, Err(CqlError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_unsupported_statement_is_syntax_error() {
        let cluster = MemoryCluster::new();
        let client = client(&cluster).await;

        let result = client.execute(&Statement::new("GRANT ALL ON blog TO admin")).await;
        assert!(matches!(result, Err(CqlError::Syntax(_))));
        assert!(cluster.dispatches().is_empty());
    }

    #[tokio::test]
    async fn test_batch_is_all_or_nothing() {
        let cluster = MemoryCluster::new();
        let client = client(&cluster).await;
        let batch = BatchStatement::new(
            BatchKind::Unlogged,
            vec![
                Statement::new("INSERT INTO posts (id) VALUES (1)"),
                Statement::new("SELECT * FROM posts"),
            ],
        );

        let result = client.batch(&batch).await;

        assert!(matches!(result, Err(CqlError::Validation(_))));
        assert!(cluster.rows("posts").is_empty());
        assert!(cluster.batches().is_empty());
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let cluster = MemoryCluster::new();
        cluster.fail_next_connect(CqlError::Connection("refused".into()));
        assert!(cluster.connector().connect().await.is_err());

        let client = client(&cluster).await;
        cluster.fail_next(CqlError::Timeout("slow".into()));
        assert!(client.prepare("SELECT * FROM posts").await.is_err());
        assert!(client.prepare("SELECT * FROM posts").await.is_ok());
        assert_eq!(cluster.attempts(), 2);
        assert_eq!(cluster.connect_count(), 1);
    }
}
