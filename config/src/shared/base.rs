use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// TLS is enabled but no trusted root certificates are provided.
    #[error("invalid TLS config: `trusted_root_certs` must be set when `enabled` is true")]
    MissingTrustedRootCerts,
    /// The change log table name is empty.
    #[error("`change_log.table` cannot be empty")]
    EmptyChangeLogTable,
    /// The same table is configured more than once.
    #[error("table `{0}` is configured more than once")]
    DuplicateTable(String),
    /// A table has no primary key columns.
    #[error("table `{0}` must declare at least one primary key column")]
    MissingPrimaryKey(String),
    /// A primary key column is listed more than once for a table.
    #[error("table `{table}` lists primary key column `{column}` more than once")]
    DuplicatePrimaryKeyColumn { table: String, column: String },
}
