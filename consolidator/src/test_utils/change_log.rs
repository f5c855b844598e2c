use chrono::{DateTime, Duration, TimeZone, Utc};
use config::shared::{TableConfig, TablesConfig};

use crate::store::ChangeLogStore;
use crate::types::{ChangeId, NewChange};

/// Returns the tables used throughout the tests, all keyed by a single `id` column.
pub fn test_tables() -> TablesConfig {
    TablesConfig::new(vec![
        TableConfig::new("dummy_table", ["id"]),
        TableConfig::new("left_table", ["id"]),
        TableConfig::new("scanner_records", ["id"]),
        TableConfig::new("wrong_table", ["id"]),
    ])
}

/// Returns a configuration where `scanner_records` has a two column primary key.
pub fn composite_key_tables() -> TablesConfig {
    let mut tables = test_tables();
    tables.include_table(TableConfig::new("scanner_records", ["id1", "id2"]));
    tables
}

/// Records raw changes into a store the way capture triggers would.
///
/// Every change is recorded one second after the previous one unless written with
/// [`ChangeLogWriter::record_at`].
#[derive(Debug, Clone)]
pub struct ChangeLogWriter<S> {
    store: S,
    now: DateTime<Utc>,
}

impl<S> ChangeLogWriter<S>
where
    S: ChangeLogStore,
{
    pub fn new(store: S) -> Self {
        Self::starting_at(store, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
    }

    pub fn starting_at(store: S, now: DateTime<Utc>) -> Self {
        Self { store, now }
    }

    /// Returns the time the next change will be recorded at.
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn insert(&mut self, table: &str, key: &str) -> ChangeId {
        let change = NewChange::insert(table, key, self.now);
        self.record(change).await
    }

    pub async fn update(&mut self, table: &str, key: &str, new_key: &str) -> ChangeId {
        let change = NewChange::update(table, key, new_key, self.now);
        self.record(change).await
    }

    pub async fn delete(&mut self, table: &str, key: &str) -> ChangeId {
        let change = NewChange::delete(table, key, self.now);
        self.record(change).await
    }

    /// Records `change` and advances the clock.
    pub async fn record(&mut self, change: NewChange) -> ChangeId {
        let id = self.record_at(change).await;
        self.now += Duration::seconds(1);
        id
    }

    /// Records `change` with its own time, leaving the clock untouched.
    pub async fn record_at(&self, change: NewChange) -> ChangeId {
        self.store
            .insert_change(change)
            .await
            .expect("failed to record change")
    }
}
