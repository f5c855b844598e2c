use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// A replicated table together with its primary key columns.
///
/// The order of `primary_key_names` is the order in which key columns appear in serialized
/// change log keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TableConfig {
    pub name: String,
    pub primary_key_names: Vec<String>,
}

impl TableConfig {
    pub fn new<I, S>(name: impl Into<String>, primary_key_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            primary_key_names: primary_key_names.into_iter().map(Into::into).collect(),
        }
    }
}

/// All replicated tables of a replication.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TablesConfig {
    tables: Vec<TableConfig>,
}

impl TablesConfig {
    pub fn new(tables: Vec<TableConfig>) -> Self {
        Self { tables }
    }

    /// Adds a table, replacing an existing entry with the same name.
    pub fn include_table(&mut self, table: TableConfig) {
        self.tables.retain(|existing| existing.name != table.name);
        self.tables.push(table);
    }

    /// Returns the primary key columns of `table` in key order.
    pub fn primary_key_names(&self, table: &str) -> Option<&[String]> {
        self.tables
            .iter()
            .find(|config| config.name == table)
            .map(|config| config.primary_key_names.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = &TableConfig> {
        self.tables.iter()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut names = HashSet::new();
        for table in &self.tables {
            if !names.insert(table.name.as_str()) {
                return Err(ValidationError::DuplicateTable(table.name.clone()));
            }

            if table.primary_key_names.is_empty() {
                return Err(ValidationError::MissingPrimaryKey(table.name.clone()));
            }

            let mut columns = HashSet::new();
            for column in &table.primary_key_names {
                if !columns.insert(column.as_str()) {
                    return Err(ValidationError::DuplicatePrimaryKeyColumn {
                        table: table.name.clone(),
                        column: column.clone(),
                    });
                }
            }
        }

        Ok(())
    }
}
