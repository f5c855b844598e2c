use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use config::shared::{ChangeLogConfig, IntoConnectOptions, PgConnectionConfig};
use postgres::change_log::{self, ChangeLogTable};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;

use crate::error::ConsolidatorResult;
use crate::store::base::{ChangeLogStore, ChangeLogTransaction};
use crate::types::{ChangeId, ChangeLocator, NewChange, RawChangeRow};

/// Maximum number of connections in the pool.
///
/// Walks on disjoint keys may run concurrently, each holding one connection for the length of
/// its transaction.
const MAX_POOL_CONNECTIONS: u32 = 4;

/// Duration after which idle connections are closed.
const IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Change log stored in a Postgres table maintained by capture triggers.
#[derive(Debug, Clone)]
pub struct PostgresChangeLogStore {
    pool: PgPool,
    table: ChangeLogTable,
}

impl PostgresChangeLogStore {
    /// Creates a store with a lazily connected pool.
    ///
    /// No connection is opened until the first operation.
    pub fn new(connection: &PgConnectionConfig, change_log: &ChangeLogConfig) -> Self {
        let pool = PgPoolOptions::new()
            .min_connections(0)
            .max_connections(MAX_POOL_CONNECTIONS)
            .idle_timeout(Some(IDLE_TIMEOUT))
            .connect_lazy_with(connection.with_db());

        Self::with_pool(pool, ChangeLogTable::from(change_log))
    }

    pub fn with_pool(pool: PgPool, table: ChangeLogTable) -> Self {
        Self { pool, table }
    }

    /// Creates the change log table if it is missing.
    pub async fn create_change_log_table(&self) -> ConsolidatorResult<()> {
        change_log::create_change_log_table(&self.pool, &self.table).await?;

        Ok(())
    }

    /// Returns the number of changes recorded for `table`.
    pub async fn count_changes(&self, table: &str) -> ConsolidatorResult<u64> {
        let count = change_log::count_changes(&self.pool, &self.table, table).await?;

        Ok(count.max(0) as u64)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl ChangeLogStore for PostgresChangeLogStore {
    type Transaction = PostgresChangeLogTransaction;

    async fn begin(&self) -> ConsolidatorResult<PostgresChangeLogTransaction> {
        let transaction = self.pool.begin().await?;
        debug!(table = self.table.qualified_name(), "began change log transaction");

        Ok(PostgresChangeLogTransaction {
            transaction,
            table: self.table.clone(),
        })
    }

    async fn oldest_change_time(&self) -> ConsolidatorResult<Option<DateTime<Utc>>> {
        let time = change_log::oldest_change_time(&self.pool, &self.table).await?;

        Ok(time)
    }

    async fn insert_change(&self, change: NewChange) -> ConsolidatorResult<ChangeId> {
        let id = change_log::insert_change(
            &self.pool,
            &self.table,
            &change.table,
            &change.key,
            change.new_key.as_deref(),
            change.change_type.as_code(),
            change.change_time,
        )
        .await?;

        Ok(ChangeId(id))
    }
}

/// Transaction of a [`PostgresChangeLogStore`].
///
/// Rolled back by sqlx when dropped without commit.
#[derive(Debug)]
pub struct PostgresChangeLogTransaction {
    transaction: Transaction<'static, Postgres>,
    table: ChangeLogTable,
}

impl ChangeLogTransaction for PostgresChangeLogTransaction {
    async fn next_change(
        &mut self,
        table: &str,
        key: &str,
        skip: &[ChangeId],
    ) -> ConsolidatorResult<Option<RawChangeRow>> {
        let skip: Vec<i64> = skip.iter().map(|id| id.into_inner()).collect();
        let row =
            change_log::next_change(&mut *self.transaction, &self.table, table, key, &skip).await?;

        row.map(RawChangeRow::try_from).transpose()
    }

    async fn oldest_change(
        &mut self,
        excluding: &HashSet<ChangeLocator>,
    ) -> ConsolidatorResult<Option<RawChangeRow>> {
        let excluding: Vec<(String, String)> = excluding
            .iter()
            .map(|locator| (locator.table.clone(), locator.key.clone()))
            .collect();
        let row = change_log::oldest_change(&mut *self.transaction, &self.table, &excluding).await?;

        row.map(RawChangeRow::try_from).transpose()
    }

    async fn delete_changes(&mut self, ids: &[ChangeId]) -> ConsolidatorResult<u64> {
        let ids: Vec<i64> = ids.iter().map(|id| id.into_inner()).collect();
        let deleted = change_log::delete_changes(&mut *self.transaction, &self.table, &ids).await?;

        Ok(deleted)
    }

    async fn commit(self) -> ConsolidatorResult<()> {
        self.transaction.commit().await?;

        Ok(())
    }

    async fn rollback(self) -> ConsolidatorResult<()> {
        self.transaction.rollback().await?;

        Ok(())
    }
}
