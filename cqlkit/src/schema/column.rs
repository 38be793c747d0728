// cqlkit/src/schema/column.rs
//
// Column model: typed columns that render their CQL definition and cast raw
// input into typed values.
//

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::IpAddr;
use std::str::FromStr;
use uuid::Uuid;

use crate::errors::CqlError;
use crate::types::ColumnValue;

/// CQL scalar type descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CqlType {
    Ascii,
    BigInt,
    Blob,
    Boolean,
    Counter,
    Double,
    Float,
    Inet,
    Int,
    SmallInt,
    Text,
    Timestamp,
    TimeUuid,
    TinyInt,
    Uuid,
    Varchar,
}

impl CqlType {
    pub fn cql_name(&self) -> &'static str {
        match self {
            CqlType::Ascii => "ascii",
            CqlType::BigInt => "bigint",
            CqlType::Blob => "blob",
            CqlType::Boolean => "boolean",
            CqlType::Counter => "counter",
            CqlType::Double => "double",
            CqlType::Float => "float",
            CqlType::Inet => "inet",
            CqlType::Int => "int",
            CqlType::SmallInt => "smallint",
            CqlType::Text => "text",
            CqlType::Timestamp => "timestamp",
            CqlType::TimeUuid => "timeuuid",
            CqlType::TinyInt => "tinyint",
            CqlType::Uuid => "uuid",
            CqlType::Varchar => "varchar",
        }
    }

    /// Convert a raw value into this type's canonical form
    pub fn cast(&self, raw: &Value) -> Result<ColumnValue, CqlError> {
        if raw.is_null() {
            return Ok(ColumnValue::Null);
        }

        match self {
            CqlType::Ascii | CqlType::Text | CqlType::Varchar => match raw {
                Value::String(s) => Ok(ColumnValue::Text(s.clone())),
                Value::Number(n) => Ok(ColumnValue::Text(n.to_string())),
                Value::Bool(b) => Ok(ColumnValue::Text(b.to_string())),
                _ => Err(self.cast_error(raw)),
            },
            CqlType::Int => {
                let i = self.cast_integer(raw)?;
                i32::try_from(i).map(ColumnValue::Int).map_err(|_| self.cast_error(raw))
            }
            CqlType::SmallInt => {
                let i = self.cast_integer(raw)?;
                i16::try_from(i).map(ColumnValue::SmallInt).map_err(|_| self.cast_error(raw))
            }
            CqlType::TinyInt => {
                let i = self.cast_integer(raw)?;
                i8::try_from(i).map(ColumnValue::TinyInt).map_err(|_| self.cast_error(raw))
            }
            CqlType::BigInt => self.cast_integer(raw).map(ColumnValue::BigInt),
            CqlType::Counter => self.cast_integer(raw).map(ColumnValue::Counter),
            CqlType::Float => {
                let narrowed = self.cast_float(raw)? as f32;
                if narrowed.is_finite() {
                    Ok(ColumnValue::Float(narrowed))
                } else {
                    Err(self.cast_error(raw))
                }
            }
            CqlType::Double => self.cast_float(raw).map(ColumnValue::Double),
            CqlType::Boolean => match raw {
                Value::Bool(b) => Ok(ColumnValue::Boolean(*b)),
                Value::Number(n) => Ok(ColumnValue::Boolean(n.as_f64().map_or(false, |f| f != 0.0))),
                Value::String(s) => match s.trim().to_lowercase().as_str() {
                    "true" | "yes" | "1" => Ok(ColumnValue::Boolean(true)),
                    "false" | "no" | "0" => Ok(ColumnValue::Boolean(false)),
                    _ => Err(self.cast_error(raw)),
                },
                _ => Err(self.cast_error(raw)),
            },
            CqlType::Uuid => self.cast_uuid(raw).map(ColumnValue::Uuid),
            CqlType::TimeUuid => {
                let uuid = self.cast_uuid(raw)?;
                if uuid.get_version_num() != 1 {
                    return Err(CqlError::InvalidArgument(format!(
                        "Cannot cast {} to timeuuid: version {} UUID",
                        raw,
                        uuid.get_version_num()
                    )));
                }
                Ok(ColumnValue::Timeuuid(uuid))
            }
            CqlType::Timestamp => match raw {
                Value::String(s) => {
                    if let Ok(millis) = s.trim().parse::<i64>() {
                        return Ok(ColumnValue::Timestamp(millis));
                    }
                    DateTime::parse_from_rfc3339(s.trim())
                        .map(|dt| ColumnValue::Timestamp(dt.timestamp_millis()))
                        .map_err(|_| self.cast_error(raw))
                }
                Value::Number(_) => self.cast_integer(raw).map(ColumnValue::Timestamp),
                _ => Err(self.cast_error(raw)),
            },
            CqlType::Blob => match raw {
                Value::String(s) => Ok(ColumnValue::Blob(s.as_bytes().to_vec())),
                Value::Array(items) => items
                    .iter()
                    .map(|item| {
                        item.as_u64()
                            .and_then(|b| u8::try_from(b).ok())
                            .ok_or_else(|| self.cast_error(raw))
                    })
                    .collect::<Result<Vec<u8>, _>>()
                    .map(ColumnValue::Blob),
                _ => Err(self.cast_error(raw)),
            },
            CqlType::Inet => match raw {
                Value::String(s) => IpAddr::from_str(s.trim())
                    .map(ColumnValue::Inet)
                    .map_err(|_| self.cast_error(raw)),
                _ => Err(self.cast_error(raw)),
            },
        }
    }

    fn cast_integer(&self, raw: &Value) -> Result<i64, CqlError> {
        match raw {
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    return Ok(i);
                }
                // Integral but above i64::MAX
                if n.is_u64() {
                    return Err(self.cast_error(raw));
                }
                n.as_f64()
                    .map(f64::trunc)
                    .filter(|f| fits_i64(*f))
                    .map(|f| f as i64)
                    .ok_or_else(|| self.cast_error(raw))
            }
            Value::String(s) => s.trim().parse::<i64>().map_err(|_| self.cast_error(raw)),
            _ => Err(self.cast_error(raw)),
        }
    }

    fn cast_float(&self, raw: &Value) -> Result<f64, CqlError> {
        match raw {
            Value::Number(n) => n.as_f64().ok_or_else(|| self.cast_error(raw)),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .ok_or_else(|| self.cast_error(raw)),
            _ => Err(self.cast_error(raw)),
        }
    }

    fn cast_uuid(&self, raw: &Value) -> Result<Uuid, CqlError> {
        match raw {
            Value::String(s) => Uuid::parse_str(s.trim()).map_err(|_| self.cast_error(raw)),
            _ => Err(self.cast_error(raw)),
        }
    }

    fn cast_error(&self, raw: &Value) -> CqlError {
        CqlError::InvalidArgument(format!("Cannot cast {} to {}", raw, self.cql_name()))
    }
}

/// `i64::MAX as f64` rounds up to 2^63, so the upper bound is exclusive
fn fits_i64(f: f64) -> bool {
    f.is_finite() && f >= i64::MIN as f64 && f < i64::MAX as f64
}

impl fmt::Display for CqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.cql_name())
    }
}

impl FromStr for CqlType {
    type Err = CqlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ascii" => Ok(CqlType::Ascii),
            "bigint" => Ok(CqlType::BigInt),
            "blob" => Ok(CqlType::Blob),
            "boolean" => Ok(CqlType::Boolean),
            "counter" => Ok(CqlType::Counter),
            "double" => Ok(CqlType::Double),
            "float" => Ok(CqlType::Float),
            "inet" => Ok(CqlType::Inet),
            "int" => Ok(CqlType::Int),
            "smallint" => Ok(CqlType::SmallInt),
            "text" => Ok(CqlType::Text),
            "timestamp" => Ok(CqlType::Timestamp),
            "timeuuid" => Ok(CqlType::TimeUuid),
            "tinyint" => Ok(CqlType::TinyInt),
            "uuid" => Ok(CqlType::Uuid),
            "varchar" => Ok(CqlType::Varchar),
            other => Err(CqlError::InvalidArgument(format!("Unknown CQL type: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusteringOrder {
    #[default]
    Asc,
    Desc,
}

impl ClusteringOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClusteringOrder::Asc => "asc",
            ClusteringOrder::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone)]
pub enum ColumnKind {
    PartitionKey { ty: CqlType },
    ClusteringColumn { ty: CqlType, order: ClusteringOrder },
    Data { ty: CqlType, index_name: Option<String> },
    List { element: CqlType },
    Set { element: CqlType },
    Map { key: CqlType, value: CqlType },
}

/// A table column. Equality and hashing go through the rendered `to_cql`.
#[derive(Debug, Clone)]
pub struct Column {
    name: String,
    kind: ColumnKind,
}

impl Column {
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn partition_key(name: impl Into<String>, ty: CqlType) -> Self {
        Self::new(name, ColumnKind::PartitionKey { ty })
    }

    pub fn clustering_column(name: impl Into<String>, ty: CqlType, order: ClusteringOrder) -> Self {
        Self::new(name, ColumnKind::ClusteringColumn { ty, order })
    }

    pub fn data(name: impl Into<String>, ty: CqlType) -> Self {
        Self::new(name, ColumnKind::Data { ty, index_name: None })
    }

    pub fn indexed(name: impl Into<String>, ty: CqlType, index_name: impl Into<String>) -> Self {
        Self::new(
            name,
            ColumnKind::Data {
                ty,
                index_name: Some(index_name.into()),
            },
        )
    }

    pub fn list(name: impl Into<String>, element: CqlType) -> Self {
        Self::new(name, ColumnKind::List { element })
    }

    pub fn set(name: impl Into<String>, element: CqlType) -> Self {
        Self::new(name, ColumnKind::Set { element })
    }

    pub fn map(name: impl Into<String>, key: CqlType, value: CqlType) -> Self {
        Self::new(name, ColumnKind::Map { key, value })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &ColumnKind {
        &self.kind
    }

    /// Type descriptor: element type for lists and sets, value type for maps
    pub fn cql_type(&self) -> CqlType {
        match &self.kind {
            ColumnKind::PartitionKey { ty }
            | ColumnKind::ClusteringColumn { ty, .. }
            | ColumnKind::Data { ty, .. } => *ty,
            ColumnKind::List { element } | ColumnKind::Set { element } => *element,
            ColumnKind::Map { value, .. } => *value,
        }
    }

    pub fn key_type(&self) -> Option<CqlType> {
        match &self.kind {
            ColumnKind::Map { key, .. } => Some(*key),
            _ => None,
        }
    }

    pub fn is_type(&self, candidate: CqlType) -> bool {
        self.cql_type() == candidate
    }

    pub fn is_partition_key(&self) -> bool {
        matches!(self.kind, ColumnKind::PartitionKey { .. })
    }

    pub fn is_clustering_column(&self) -> bool {
        matches!(self.kind, ColumnKind::ClusteringColumn { .. })
    }

    pub fn is_key(&self) -> bool {
        self.is_partition_key() || self.is_clustering_column()
    }

    pub fn is_data_column(&self) -> bool {
        !self.is_key()
    }

    pub fn is_collection(&self) -> bool {
        matches!(
            self.kind,
            ColumnKind::List { .. } | ColumnKind::Set { .. } | ColumnKind::Map { .. }
        )
    }

    pub fn index_name(&self) -> Option<&str> {
        match &self.kind {
            ColumnKind::Data { index_name, .. } => index_name.as_deref(),
            _ => None,
        }
    }

    pub fn is_indexed(&self) -> bool {
        self.index_name().is_some()
    }

    pub fn clustering_order(&self) -> Option<ClusteringOrder> {
        match &self.kind {
            ColumnKind::ClusteringColumn { order, .. } => Some(*order),
            _ => None,
        }
    }

    /// `"<name> asc|desc"` for clustering columns
    pub fn order_cql(&self) -> Option<String> {
        self.clustering_order()
            .map(|order| format!("{} {}", self.name, order.as_str()))
    }

    pub fn to_cql(&self) -> String {
        match &self.kind {
            ColumnKind::PartitionKey { ty }
            | ColumnKind::ClusteringColumn { ty, .. }
            | ColumnKind::Data { ty, .. } => format!("{} {}", self.name, ty),
            ColumnKind::List { element } => format!("{} LIST <{}>", self.name, element),
            ColumnKind::Set { element } => format!("{} SET <{}>", self.name, element),
            ColumnKind::Map { key, value } => format!("{} MAP <{}, {}>", self.name, key, value),
        }
    }

    pub fn cast(&self, raw: &Value) -> Result<ColumnValue, CqlError> {
        match &self.kind {
            ColumnKind::PartitionKey { ty }
            | ColumnKind::ClusteringColumn { ty, .. }
            | ColumnKind::Data { ty, .. } => ty.cast(raw),
            ColumnKind::List { element } => {
                let items = self.collection_items(raw)?;
                items
                    .iter()
                    .map(|item| element.cast(item))
                    .collect::<Result<Vec<_>, _>>()
                    .map(ColumnValue::List)
            }
            ColumnKind::Set { element } => {
                let mut unique: Vec<ColumnValue> = Vec::new();
                for item in self.collection_items(raw)? {
                    let cast = element.cast(item)?;
                    if !unique.contains(&cast) {
                        unique.push(cast);
                    }
                }
                Ok(ColumnValue::Set(unique))
            }
            ColumnKind::Map { key, value } => {
                let mut entries: Vec<(ColumnValue, ColumnValue)> = Vec::new();
                for (raw_key, raw_value) in self.map_entries(raw)? {
                    let cast_key = key.cast(&raw_key)?;
                    let cast_value = value.cast(&raw_value)?;
                    match entries.iter_mut().find(|(existing, _)| *existing == cast_key) {
                        Some(entry) => entry.1 = cast_value,
                        None => entries.push((cast_key, cast_value)),
                    }
                }
                Ok(ColumnValue::Map(entries))
            }
        }
    }

    fn collection_items<'a>(&self, raw: &'a Value) -> Result<&'a [Value], CqlError> {
        match raw {
            Value::Null => Ok(&[]),
            Value::Array(items) => Ok(items.as_slice()),
            _ => Err(CqlError::InvalidArgument(format!(
                "Column {} expects an array, got {}",
                self.name, raw
            ))),
        }
    }

    fn map_entries(&self, raw: &Value) -> Result<Vec<(Value, Value)>, CqlError> {
        match raw {
            Value::Null => Ok(Vec::new()),
            Value::Object(object) => Ok(object
                .iter()
                .map(|(k, v)| (Value::String(k.clone()), v.clone()))
                .collect()),
            Value::Array(pairs) => pairs
                .iter()
                .map(|pair| match pair.as_array().map(Vec::as_slice) {
                    Some([k, v]) => Ok((k.clone(), v.clone())),
                    _ => Err(CqlError::InvalidArgument(format!(
                        "Column {} expects [key, value] pairs, got {}",
                        self.name, pair
                    ))),
                })
                .collect(),
            _ => Err(CqlError::InvalidArgument(format!(
                "Column {} expects an object, got {}",
                self.name, raw
            ))),
        }
    }
}

impl PartialEq for Column {
    fn eq(&self, other: &Self) -> bool {
        self.to_cql() == other.to_cql()
    }
}

impl Eq for Column {}

impl Hash for Column {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.to_cql().hash(state);
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_cql())
    }
}
