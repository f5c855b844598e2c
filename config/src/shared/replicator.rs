use serde::Deserialize;

use crate::shared::{ChangeLogConfig, PgConnectionConfig, TablesConfig, ValidationError};

/// Complete configuration of the replicator binary for one replication side.
///
/// Not `Serialize` since [`PgConnectionConfig`] carries a password.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplicatorConfig {
    /// Database holding the change log.
    pub source: PgConnectionConfig,
    pub change_log: ChangeLogConfig,
    /// Replicated tables and their primary keys.
    pub tables: TablesConfig,
}

impl ReplicatorConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.source.tls.validate()?;
        self.change_log.validate()?;
        self.tables.validate()
    }
}
