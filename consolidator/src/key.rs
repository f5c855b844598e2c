//! Composite primary keys as stored in the change log.
//!
//! The capture triggers serialize a primary key as alternating column names and values joined
//! by [`KEY_DELIMITER`], in the primary key column order of the table: `id1|1|id2|2`. The
//! delimiter is reserved and cannot appear in column names or values.

use std::collections::{HashMap, HashSet};
use std::fmt;

use config::shared::TablesConfig;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::error::{ConsolidatorResult, ErrorKind};
use crate::{bail, consolidator_error};

/// Separator between the tokens of a serialized key.
pub const KEY_DELIMITER: char = '|';

/// Resolves the primary key columns of a table.
pub trait PrimaryKeyLookup {
    /// Returns the primary key columns of `table` in key order, or `None` if the table is
    /// unknown.
    fn primary_key_columns(&self, table: &str) -> Option<&[String]>;
}

impl PrimaryKeyLookup for TablesConfig {
    fn primary_key_columns(&self, table: &str) -> Option<&[String]> {
        self.primary_key_names(table)
    }
}

impl<T: PrimaryKeyLookup + ?Sized> PrimaryKeyLookup for &T {
    fn primary_key_columns(&self, table: &str) -> Option<&[String]> {
        (**self).primary_key_columns(table)
    }
}

/// An ordered column to value mapping identifying a row.
///
/// Columns are unique and kept in primary key order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompositeKey {
    columns: Vec<(String, String)>,
}

impl CompositeKey {
    /// Parses a serialized key such as `a|1|b|2`.
    pub fn parse(serialized: &str) -> ConsolidatorResult<CompositeKey> {
        if serialized.is_empty() {
            bail!(ErrorKind::InvalidKeyFormat, "Composite key is empty");
        }

        let tokens: Vec<&str> = serialized.split(KEY_DELIMITER).collect();
        if tokens.len() % 2 != 0 {
            bail!(
                ErrorKind::InvalidKeyFormat,
                "Composite key has an odd number of tokens",
                format!("key `{serialized}` splits into {} tokens", tokens.len())
            );
        }

        let columns = tokens
            .chunks_exact(2)
            .map(|pair| (pair[0].to_owned(), pair[1].to_owned()))
            .collect();

        Self::from_pairs(columns)
    }

    /// Builds a key from column values, ordering the columns by `primary_key_columns`.
    ///
    /// Values for columns outside the primary key are ignored.
    pub fn from_columns(
        primary_key_columns: &[String],
        values: &HashMap<String, String>,
    ) -> ConsolidatorResult<CompositeKey> {
        if primary_key_columns.is_empty() {
            bail!(
                ErrorKind::ConfigError,
                "Table has no primary key columns configured"
            );
        }

        let columns = primary_key_columns
            .iter()
            .map(|column| {
                let value = values.get(column).ok_or_else(|| {
                    consolidator_error!(
                        ErrorKind::InvalidKeyFormat,
                        "Primary key column is missing from key values",
                        format!("no value for column `{column}`")
                    )
                })?;

                Ok((column.clone(), value.clone()))
            })
            .collect::<ConsolidatorResult<Vec<_>>>()?;

        Self::from_pairs(columns)
    }

    fn from_pairs(columns: Vec<(String, String)>) -> ConsolidatorResult<CompositeKey> {
        let mut seen = HashSet::with_capacity(columns.len());
        for (column, value) in &columns {
            if column.contains(KEY_DELIMITER) || value.contains(KEY_DELIMITER) {
                bail!(
                    ErrorKind::InvalidKeyFormat,
                    "Composite key contains the reserved delimiter",
                    format!("column `{column}` with value `{value}`")
                );
            }

            if !seen.insert(column.as_str()) {
                bail!(
                    ErrorKind::InvalidKeyFormat,
                    "Composite key repeats a column",
                    format!("column `{column}` appears more than once")
                );
            }
        }

        Ok(CompositeKey { columns })
    }

    /// Returns the serialized form written to and read from the change log.
    pub fn serialize(&self) -> String {
        let mut serialized = String::new();
        for (index, (column, value)) in self.columns.iter().enumerate() {
            if index > 0 {
                serialized.push(KEY_DELIMITER);
            }
            serialized.push_str(column);
            serialized.push(KEY_DELIMITER);
            serialized.push_str(value);
        }

        serialized
    }

    /// Returns the value of `column`, if part of the key.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_str())
    }

    /// Iterates over `(column, value)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.columns
            .iter()
            .map(|(column, value)| (column.as_str(), value.as_str()))
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(column, _)| column.as_str())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn to_map(&self) -> HashMap<String, String> {
        self.columns.iter().cloned().collect()
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize())
    }
}

/// Serializes as a map preserving key column order.
impl Serialize for CompositeKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (column, value) in &self.columns {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

/// A key as accepted by [`crate::change::LoggedChange::load_specified`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyInput {
    /// Already in change log form, e.g. `id|1`.
    Serialized(String),
    /// Column values, ordered by the table's primary key before use.
    Columns(HashMap<String, String>),
}

impl KeyInput {
    /// Resolves the input into a key checked against the primary key of `table`.
    pub fn resolve<L>(&self, table: &str, lookup: &L) -> ConsolidatorResult<CompositeKey>
    where
        L: PrimaryKeyLookup + ?Sized,
    {
        let primary_key_columns = match lookup.primary_key_columns(table) {
            Some(columns) if !columns.is_empty() => columns,
            _ => bail!(
                ErrorKind::ConfigError,
                "Primary key columns of table are unknown",
                format!("table `{table}` has no primary key configuration")
            ),
        };

        match self {
            KeyInput::Columns(values) => CompositeKey::from_columns(primary_key_columns, values),
            KeyInput::Serialized(serialized) => {
                let key = CompositeKey::parse(serialized)?;
                if !key.column_names().eq(primary_key_columns.iter().map(String::as_str)) {
                    bail!(
                        ErrorKind::InvalidKeyFormat,
                        "Composite key does not match the table's primary key",
                        format!(
                            "key `{serialized}` for table `{table}` expects columns {primary_key_columns:?}"
                        )
                    );
                }

                Ok(key)
            }
        }
    }
}

impl From<&str> for KeyInput {
    fn from(serialized: &str) -> Self {
        KeyInput::Serialized(serialized.to_owned())
    }
}

impl From<String> for KeyInput {
    fn from(serialized: String) -> Self {
        KeyInput::Serialized(serialized)
    }
}

impl From<&CompositeKey> for KeyInput {
    fn from(key: &CompositeKey) -> Self {
        KeyInput::Serialized(key.serialize())
    }
}

impl From<HashMap<String, String>> for KeyInput {
    fn from(values: HashMap<String, String>) -> Self {
        KeyInput::Columns(values)
    }
}

impl<K, V, const N: usize> From<[(K, V); N]> for KeyInput
where
    K: Into<String>,
    V: ToString,
{
    fn from(values: [(K, V); N]) -> Self {
        KeyInput::Columns(
            values
                .into_iter()
                .map(|(column, value)| (column.into(), value.to_string()))
                .collect(),
        )
    }
}
