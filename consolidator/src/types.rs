use std::fmt;

use chrono::{DateTime, Utc};
use postgres::change_log::ChangeLogRow;
use serde::{Deserialize, Serialize};

use crate::bail;
use crate::error::{ConsolidatorError, ErrorKind};

pub use config::shared::ReplicationSide;

/// Kind of a row level change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Insert,
    Update,
    Delete,
}

impl ChangeType {
    /// Returns the single letter code stored in the change log.
    pub fn as_code(&self) -> &'static str {
        match self {
            ChangeType::Insert => "I",
            ChangeType::Update => "U",
            ChangeType::Delete => "D",
        }
    }

    pub fn as_static_str(&self) -> &'static str {
        match self {
            ChangeType::Insert => "insert",
            ChangeType::Update => "update",
            ChangeType::Delete => "delete",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_static_str())
    }
}

impl TryFrom<&str> for ChangeType {
    type Error = ConsolidatorError;

    /// Parses a change log code.
    fn try_from(code: &str) -> Result<Self, Self::Error> {
        match code {
            "I" => Ok(ChangeType::Insert),
            "U" => Ok(ChangeType::Update),
            "D" => Ok(ChangeType::Delete),
            other => bail!(
                ErrorKind::InvalidChangeType,
                "Unknown change type in change log",
                format!("expected one of `I`, `U`, `D` but found `{other}`")
            ),
        }
    }
}

/// Storage identity of a raw change row.
///
/// Ids grow with insertion order and break ties between rows recorded at the same time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChangeId(pub i64);

impl ChangeId {
    pub fn into_inner(self) -> i64 {
        self.0
    }
}

impl fmt::Display for ChangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A raw change as recorded by the capture triggers.
///
/// `key` and `new_key` are serialized composite keys. `new_key` is only set on updates and,
/// when missing, means the update did not touch the primary key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawChangeRow {
    pub id: ChangeId,
    pub table: String,
    pub key: String,
    pub new_key: Option<String>,
    pub change_type: ChangeType,
    pub change_time: DateTime<Utc>,
}

impl RawChangeRow {
    /// Returns the key the row is known by after this change.
    pub fn resulting_key(&self) -> &str {
        match (self.change_type, &self.new_key) {
            (ChangeType::Update, Some(new_key)) => new_key,
            _ => &self.key,
        }
    }

    /// Returns the position of this row in the change log order.
    pub fn order_key(&self) -> (DateTime<Utc>, ChangeId) {
        (self.change_time, self.id)
    }
}

impl TryFrom<ChangeLogRow> for RawChangeRow {
    type Error = ConsolidatorError;

    fn try_from(row: ChangeLogRow) -> Result<Self, Self::Error> {
        Ok(RawChangeRow {
            id: ChangeId(row.id),
            change_type: ChangeType::try_from(row.change_type.as_str())?,
            table: row.change_table,
            key: row.change_key,
            new_key: row.change_new_key,
            change_time: row.change_time,
        })
    }
}

/// Identifies the change history of one row: a table together with a serialized key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChangeLocator {
    pub table: String,
    pub key: String,
}

impl ChangeLocator {
    pub fn new(table: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            key: key.into(),
        }
    }
}

impl From<&RawChangeRow> for ChangeLocator {
    fn from(row: &RawChangeRow) -> Self {
        Self::new(row.table.clone(), row.key.clone())
    }
}

/// A raw change which has not been written to a change log yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChange {
    pub table: String,
    pub key: String,
    pub new_key: Option<String>,
    pub change_type: ChangeType,
    pub change_time: DateTime<Utc>,
}

impl NewChange {
    pub fn insert(table: impl Into<String>, key: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self::new(table, key, None, ChangeType::Insert, at)
    }

    pub fn update(
        table: impl Into<String>,
        key: impl Into<String>,
        new_key: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self::new(table, key, Some(new_key.into()), ChangeType::Update, at)
    }

    pub fn delete(table: impl Into<String>, key: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self::new(table, key, None, ChangeType::Delete, at)
    }

    fn new(
        table: impl Into<String>,
        key: impl Into<String>,
        new_key: Option<String>,
        change_type: ChangeType,
        change_time: DateTime<Utc>,
    ) -> Self {
        Self {
            table: table.into(),
            key: key.into(),
            new_key,
            change_type,
            change_time,
        }
    }

    /// Attaches the id assigned by the change log.
    pub fn with_id(self, id: ChangeId) -> RawChangeRow {
        RawChangeRow {
            id,
            table: self.table,
            key: self.key,
            new_key: self.new_key,
            change_type: self.change_type,
            change_time: self.change_time,
        }
    }
}
