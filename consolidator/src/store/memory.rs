use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::error::ConsolidatorResult;
use crate::store::base::{ChangeLogStore, ChangeLogTransaction};
use crate::types::{ChangeId, ChangeLocator, NewChange, RawChangeRow};

/// Inner state of [`MemoryChangeLogStore`].
#[derive(Debug, Default)]
struct Inner {
    /// Committed changes indexed by id.
    changes: BTreeMap<ChangeId, RawChangeRow>,
    /// Id handed out to the next inserted change.
    next_id: i64,
}

impl Inner {
    fn visible<'a>(
        &'a self,
        deleted: &'a BTreeSet<ChangeId>,
    ) -> impl Iterator<Item = &'a RawChangeRow> + 'a {
        self.changes
            .values()
            .filter(move |change| !deleted.contains(&change.id))
    }
}

/// In-memory change log.
///
/// Transactions stage their deletions and apply them on commit. Transactions are not
/// isolated from each other, so concurrent walks over the same key must be serialized by the
/// caller just like against a real database.
#[derive(Debug, Clone, Default)]
pub struct MemoryChangeLogStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryChangeLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all committed changes in change log order.
    pub async fn changes(&self) -> Vec<RawChangeRow> {
        let inner = self.inner.lock().await;

        let mut changes: Vec<_> = inner.changes.values().cloned().collect();
        changes.sort_by_key(RawChangeRow::order_key);
        changes
    }

    /// Returns the committed changes recorded for `key` of `table`.
    pub async fn changes_for(&self, table: &str, key: &str) -> Vec<RawChangeRow> {
        self.changes()
            .await
            .into_iter()
            .filter(|change| change.table == table && change.key == key)
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.changes.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl ChangeLogStore for MemoryChangeLogStore {
    type Transaction = MemoryChangeLogTransaction;

    async fn begin(&self) -> ConsolidatorResult<MemoryChangeLogTransaction> {
        Ok(MemoryChangeLogTransaction {
            inner: self.inner.clone(),
            deleted: BTreeSet::new(),
        })
    }

    async fn oldest_change_time(&self) -> ConsolidatorResult<Option<DateTime<Utc>>> {
        let inner = self.inner.lock().await;

        Ok(inner
            .changes
            .values()
            .map(|change| change.change_time)
            .min())
    }

    async fn insert_change(&self, change: NewChange) -> ConsolidatorResult<ChangeId> {
        let mut inner = self.inner.lock().await;

        inner.next_id += 1;
        let id = ChangeId(inner.next_id);
        inner.changes.insert(id, change.with_id(id));

        Ok(id)
    }
}

/// Transaction of a [`MemoryChangeLogStore`].
#[derive(Debug)]
pub struct MemoryChangeLogTransaction {
    inner: Arc<Mutex<Inner>>,
    /// Deletions staged by this transaction.
    deleted: BTreeSet<ChangeId>,
}

impl ChangeLogTransaction for MemoryChangeLogTransaction {
    async fn next_change(
        &mut self,
        table: &str,
        key: &str,
        skip: &[ChangeId],
    ) -> ConsolidatorResult<Option<RawChangeRow>> {
        let inner = self.inner.lock().await;

        Ok(inner
            .visible(&self.deleted)
            .filter(|change| change.table == table && change.key == key)
            .filter(|change| !skip.contains(&change.id))
            .min_by_key(|change| change.order_key())
            .cloned())
    }

    async fn oldest_change(
        &mut self,
        excluding: &HashSet<ChangeLocator>,
    ) -> ConsolidatorResult<Option<RawChangeRow>> {
        let inner = self.inner.lock().await;

        Ok(inner
            .visible(&self.deleted)
            .filter(|change| !excluding.contains(&ChangeLocator::from(*change)))
            .min_by_key(|change| change.order_key())
            .cloned())
    }

    async fn delete_changes(&mut self, ids: &[ChangeId]) -> ConsolidatorResult<u64> {
        let inner = self.inner.lock().await;

        let mut deleted = 0;
        for id in ids {
            if inner.changes.contains_key(id) && self.deleted.insert(*id) {
                deleted += 1;
            }
        }

        Ok(deleted)
    }

    async fn commit(self) -> ConsolidatorResult<()> {
        let mut inner = self.inner.lock().await;
        for id in &self.deleted {
            inner.changes.remove(id);
        }

        Ok(())
    }

    async fn rollback(self) -> ConsolidatorResult<()> {
        Ok(())
    }
}
