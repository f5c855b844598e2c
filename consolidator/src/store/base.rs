use std::collections::HashSet;
use std::future::Future;

use chrono::{DateTime, Utc};

use crate::error::ConsolidatorResult;
use crate::types::{ChangeId, ChangeLocator, NewChange, RawChangeRow};

/// Access to the change log of one replication side.
///
/// Every read that leads to a deletion goes through a [`ChangeLogTransaction`], so that the
/// rows folded into a consolidated change and their removal commit or roll back together.
pub trait ChangeLogStore {
    type Transaction: ChangeLogTransaction + Send;

    /// Starts a transaction against the change log.
    fn begin(&self) -> impl Future<Output = ConsolidatorResult<Self::Transaction>> + Send;

    /// Returns the time of the earliest change in the log without modifying it.
    fn oldest_change_time(
        &self,
    ) -> impl Future<Output = ConsolidatorResult<Option<DateTime<Utc>>>> + Send;

    /// Appends a raw change to the log, as the capture triggers do, and returns its id.
    fn insert_change(
        &self,
        change: NewChange,
    ) -> impl Future<Output = ConsolidatorResult<ChangeId>> + Send;
}

/// A transaction over the change log.
///
/// Changes are always ordered by `(change_time, id)`. Rows deleted through
/// [`ChangeLogTransaction::delete_changes`] are no longer visible to the same transaction.
/// Dropping a transaction without committing it rolls it back.
pub trait ChangeLogTransaction {
    /// Returns the earliest change recorded for `key` of `table` whose id is not in `skip`.
    fn next_change(
        &mut self,
        table: &str,
        key: &str,
        skip: &[ChangeId],
    ) -> impl Future<Output = ConsolidatorResult<Option<RawChangeRow>>> + Send;

    /// Returns the earliest change of any table whose locator is not in `excluding`.
    fn oldest_change(
        &mut self,
        excluding: &HashSet<ChangeLocator>,
    ) -> impl Future<Output = ConsolidatorResult<Option<RawChangeRow>>> + Send;

    /// Deletes the given changes and returns how many were removed.
    fn delete_changes(
        &mut self,
        ids: &[ChangeId],
    ) -> impl Future<Output = ConsolidatorResult<u64>> + Send;

    fn commit(self) -> impl Future<Output = ConsolidatorResult<()>> + Send;

    fn rollback(self) -> impl Future<Output = ConsolidatorResult<()>> + Send;
}
