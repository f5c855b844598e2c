use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::consolidator_error;
use crate::error::{ConsolidatorResult, ErrorKind};
use crate::store::{ChangeLogStore, ChangeLogTransaction};
use crate::types::{ChangeId, ChangeLocator, NewChange, RawChangeRow};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeLogMethod {
    Begin,
    OldestChangeTime,
    InsertChange,
    NextChange,
    OldestChange,
    DeleteChanges,
    Commit,
    Rollback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultType {
    Panic,
    Error,
}

/// Faults to inject, per method. Methods without a fault are forwarded untouched.
#[derive(Debug, Clone, Default)]
pub struct FaultConfig {
    pub begin: Option<FaultType>,
    pub oldest_change_time: Option<FaultType>,
    pub insert_change: Option<FaultType>,
    pub next_change: Option<FaultType>,
    pub oldest_change: Option<FaultType>,
    pub delete_changes: Option<FaultType>,
    pub commit: Option<FaultType>,
}

type CallCounts = Arc<Mutex<HashMap<ChangeLogMethod, usize>>>;

async fn observe(
    calls: &CallCounts,
    method: ChangeLogMethod,
    fault: Option<FaultType>,
) -> ConsolidatorResult<()> {
    *calls.lock().await.entry(method).or_default() += 1;

    match fault {
        None => Ok(()),
        Some(FaultType::Panic) => panic!("injected panic in {method:?}"),
        Some(FaultType::Error) => Err(consolidator_error!(
            ErrorKind::ChangeLogQueryFailed,
            "Injected change log failure",
            format!("{method:?} was configured to fail")
        )),
    }
}

/// A change log store failing the methods selected in its [`FaultConfig`].
///
/// Every call is counted, including calls on transactions begun through the wrapper.
#[derive(Debug, Clone)]
pub struct FaultInjectingChangeLogStore<S> {
    inner: S,
    config: Arc<FaultConfig>,
    calls: CallCounts,
}

impl<S> FaultInjectingChangeLogStore<S> {
    pub fn wrap(inner: S, config: FaultConfig) -> Self {
        Self {
            inner,
            config: Arc::new(config),
            calls: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn get_inner(&self) -> &S {
        &self.inner
    }

    /// Returns how often `method` was called.
    pub async fn calls(&self, method: ChangeLogMethod) -> usize {
        self.calls
            .lock()
            .await
            .get(&method)
            .copied()
            .unwrap_or_default()
    }
}

impl<S> ChangeLogStore for FaultInjectingChangeLogStore<S>
where
    S: ChangeLogStore + Send + Sync,
{
    type Transaction = FaultInjectingTransaction<S::Transaction>;

    async fn begin(&self) -> ConsolidatorResult<Self::Transaction> {
        observe(&self.calls, ChangeLogMethod::Begin, self.config.begin).await?;

        Ok(FaultInjectingTransaction {
            inner: self.inner.begin().await?,
            config: self.config.clone(),
            calls: self.calls.clone(),
        })
    }

    async fn oldest_change_time(&self) -> ConsolidatorResult<Option<DateTime<Utc>>> {
        observe(
            &self.calls,
            ChangeLogMethod::OldestChangeTime,
            self.config.oldest_change_time,
        )
        .await?;

        self.inner.oldest_change_time().await
    }

    async fn insert_change(&self, change: NewChange) -> ConsolidatorResult<ChangeId> {
        observe(
            &self.calls,
            ChangeLogMethod::InsertChange,
            self.config.insert_change,
        )
        .await?;

        self.inner.insert_change(change).await
    }
}

#[derive(Debug)]
pub struct FaultInjectingTransaction<T> {
    inner: T,
    config: Arc<FaultConfig>,
    calls: CallCounts,
}

impl<T> ChangeLogTransaction for FaultInjectingTransaction<T>
where
    T: ChangeLogTransaction + Send,
{
    async fn next_change(
        &mut self,
        table: &str,
        key: &str,
        skip: &[ChangeId],
    ) -> ConsolidatorResult<Option<RawChangeRow>> {
        observe(&self.calls, ChangeLogMethod::NextChange, self.config.next_change).await?;

        self.inner.next_change(table, key, skip).await
    }

    async fn oldest_change(
        &mut self,
        excluding: &HashSet<ChangeLocator>,
    ) -> ConsolidatorResult<Option<RawChangeRow>> {
        observe(
            &self.calls,
            ChangeLogMethod::OldestChange,
            self.config.oldest_change,
        )
        .await?;

        self.inner.oldest_change(excluding).await
    }

    async fn delete_changes(&mut self, ids: &[ChangeId]) -> ConsolidatorResult<u64> {
        observe(
            &self.calls,
            ChangeLogMethod::DeleteChanges,
            self.config.delete_changes,
        )
        .await?;

        self.inner.delete_changes(ids).await
    }

    async fn commit(self) -> ConsolidatorResult<()> {
        if let Err(err) = observe(&self.calls, ChangeLogMethod::Commit, self.config.commit).await {
            self.inner.rollback().await?;
            return Err(err);
        }

        self.inner.commit().await
    }

    async fn rollback(self) -> ConsolidatorResult<()> {
        observe(&self.calls, ChangeLogMethod::Rollback, None).await?;

        self.inner.rollback().await
    }
}
