use std::fmt;

use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Default name of the table the capture triggers write raw changes into.
pub const DEFAULT_CHANGE_LOG_TABLE: &str = "rr_change_log";

/// Default schema of the change log table.
pub const DEFAULT_CHANGE_LOG_SCHEMA: &str = "public";

/// One of the two databases taking part in a replication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplicationSide {
    Left,
    Right,
}

impl ReplicationSide {
    pub fn as_static_str(&self) -> &'static str {
        match self {
            ReplicationSide::Left => "left",
            ReplicationSide::Right => "right",
        }
    }
}

impl fmt::Display for ReplicationSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_static_str())
    }
}

/// Location of the change log of one replication side.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ChangeLogConfig {
    #[serde(default = "default_schema")]
    pub schema: String,
    #[serde(default = "default_table")]
    pub table: String,
    pub side: ReplicationSide,
}

impl ChangeLogConfig {
    /// Creates a configuration pointing at the default change log table.
    pub fn new(side: ReplicationSide) -> Self {
        Self {
            schema: default_schema(),
            table: default_table(),
            side,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.table.trim().is_empty() {
            return Err(ValidationError::EmptyChangeLogTable);
        }

        Ok(())
    }
}

fn default_schema() -> String {
    DEFAULT_CHANGE_LOG_SCHEMA.to_owned()
}

fn default_table() -> String {
    DEFAULT_CHANGE_LOG_TABLE.to_owned()
}
