use chrono::{DateTime, Utc};
use metrics::counter;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use tracing::{debug, info, warn};

use crate::bail;
use crate::consolidation::{Classification, ConsolidationState, NetChange, consolidate};
use crate::error::{ConsolidatorResult, ErrorKind};
#[cfg(feature = "failpoints")]
use crate::failpoints::{
    LOAD_CHANGE_BEFORE_COMMIT, LOAD_CHANGE_BEFORE_DELETE, consolidator_fail_point,
};
use crate::key::{CompositeKey, KeyInput, PrimaryKeyLookup};
use crate::metrics::{
    CHANGE_TYPE_LABEL, CONSOLIDATOR_CANCELLED_TOTAL, CONSOLIDATOR_CHANGES_TOTAL,
    CONSOLIDATOR_CONSUMED_ROWS_TOTAL, SIDE_LABEL,
};
use crate::oldest::OldestChangeFinder;
use crate::store::{ChangeLogStore, ChangeLogTransaction};
use crate::types::{ChangeLocator, ChangeType, ReplicationSide};

/// Net effect of a set of raw changes on one row of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsolidatedChange {
    pub table: String,
    #[serde(rename = "type")]
    pub change_type: ChangeType,
    /// Key locating the row: the final key for inserts, the original key otherwise.
    pub key: CompositeKey,
    /// Final key of the row, only set for updates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_key: Option<CompositeKey>,
    pub first_changed_at: DateTime<Utc>,
    pub last_changed_at: DateTime<Utc>,
}

impl ConsolidatedChange {
    /// Returns the key the row is known by after the change.
    pub fn current_key(&self) -> &CompositeKey {
        match (self.change_type, &self.new_key) {
            (ChangeType::Update, Some(new_key)) => new_key,
            _ => &self.key,
        }
    }

    /// Returns the state from which a walk picks up changes recorded after this one.
    fn seed(&self) -> ConsolidationState {
        ConsolidationState::seeded(
            self.key.serialize(),
            self.current_key().serialize(),
            self.change_type != ChangeType::Insert,
            self.change_type != ChangeType::Delete,
            self.first_changed_at,
            self.last_changed_at,
        )
    }

    fn from_net_change<L>(table: &str, net: NetChange, tables: &L) -> ConsolidatorResult<Self>
    where
        L: PrimaryKeyLookup,
    {
        let key = KeyInput::Serialized(net.key).resolve(table, tables)?;
        let new_key = net
            .new_key
            .map(|new_key| KeyInput::Serialized(new_key).resolve(table, tables))
            .transpose()?;

        Ok(Self {
            table: table.to_owned(),
            change_type: net.change_type,
            key,
            new_key,
            first_changed_at: net.first_changed_at,
            last_changed_at: net.last_changed_at,
        })
    }
}

/// Outcome of one walk whose folded rows were deleted in the walk's transaction.
#[derive(Debug)]
enum Outcome {
    Unchanged,
    Cancelled,
    Changed(ConsolidatedChange),
}

#[derive(Debug)]
struct Walk {
    outcome: Outcome,
    consumed: usize,
}

/// The consolidated change of one row, read from the change log of one replication side.
///
/// A new value holds no change. Loading walks the change log inside a transaction, deletes every
/// row it folded and commits, so that each raw change is accounted for exactly once. When a load
/// fails the transaction is rolled back and the value is left as it was.
#[derive(Debug)]
pub struct LoggedChange<S, L> {
    store: S,
    tables: L,
    side: ReplicationSide,
    change: Option<ConsolidatedChange>,
    consumed: usize,
}

impl<S, L> LoggedChange<S, L> {
    pub fn new(store: S, tables: L, side: ReplicationSide) -> Self {
        Self {
            store,
            tables,
            side,
            change: None,
            consumed: 0,
        }
    }

    /// Parses a serialized key such as `a|1|b|2` into its columns.
    pub fn key_to_hash(serialized: &str) -> ConsolidatorResult<CompositeKey> {
        CompositeKey::parse(serialized)
    }

    pub fn side(&self) -> ReplicationSide {
        self.side
    }

    pub fn is_loaded(&self) -> bool {
        self.change.is_some()
    }

    pub fn change(&self) -> Option<&ConsolidatedChange> {
        self.change.as_ref()
    }

    pub fn into_change(self) -> Option<ConsolidatedChange> {
        self.change
    }

    pub fn table(&self) -> Option<&str> {
        self.change.as_ref().map(|change| change.table.as_str())
    }

    pub fn change_type(&self) -> Option<ChangeType> {
        self.change.as_ref().map(|change| change.change_type)
    }

    pub fn key(&self) -> Option<&CompositeKey> {
        self.change.as_ref().map(|change| &change.key)
    }

    pub fn new_key(&self) -> Option<&CompositeKey> {
        self.change
            .as_ref()
            .and_then(|change| change.new_key.as_ref())
    }

    /// Returns the key the row is known by after the change.
    pub fn current_key(&self) -> Option<&CompositeKey> {
        self.change.as_ref().map(ConsolidatedChange::current_key)
    }

    pub fn first_changed_at(&self) -> Option<DateTime<Utc>> {
        self.change.as_ref().map(|change| change.first_changed_at)
    }

    pub fn last_changed_at(&self) -> Option<DateTime<Utc>> {
        self.change.as_ref().map(|change| change.last_changed_at)
    }

    /// Returns how many raw changes were folded into the loaded change.
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S, L> LoggedChange<S, L>
where
    S: ChangeLogStore,
    L: PrimaryKeyLookup,
{
    /// Loads the consolidated change of the row identified by `key` in `table`.
    ///
    /// Any previously loaded change is replaced. Returns whether a net change exists: rows that
    /// cancel out are still consumed but leave the value unloaded.
    pub async fn load_specified(
        &mut self,
        table: &str,
        key: impl Into<KeyInput>,
    ) -> ConsolidatorResult<bool> {
        let key = key.into().resolve(table, &self.tables)?;

        let mut transaction = self.store.begin().await?;
        let result = self
            .walk(
                &mut transaction,
                table,
                ConsolidationState::fresh(key.serialize()),
            )
            .await;
        let walk = finish(transaction, result).await?;

        match walk.outcome {
            Outcome::Changed(change) => self.replace(Some(change), walk.consumed),
            Outcome::Unchanged | Outcome::Cancelled => self.replace(None, 0),
        }

        Ok(self.is_loaded())
    }

    /// Loads the earliest change of the change log that does not cancel out.
    ///
    /// Keys whose changes cancel out are consumed and skipped. Returns `false` once the change
    /// log holds no further change.
    pub async fn load_oldest(&mut self) -> ConsolidatorResult<bool> {
        let mut transaction = self.store.begin().await?;
        let result = self.walk_oldest(&mut transaction).await;
        let walk = finish(transaction, result).await?;

        match walk.outcome {
            Outcome::Changed(change) => self.replace(Some(change), walk.consumed),
            Outcome::Unchanged | Outcome::Cancelled => self.replace(None, 0),
        }

        Ok(self.is_loaded())
    }

    /// Folds changes recorded after the loaded change into it.
    ///
    /// Only changes at the key the row is currently known by are read; changes folded before
    /// are never read again. If the extended fold cancels out the value becomes unloaded.
    /// Returns whether a change is still loaded.
    pub async fn amend(&mut self) -> ConsolidatorResult<bool> {
        let Some(change) = &self.change else {
            bail!(
                ErrorKind::InvalidState,
                "Cannot amend a change that is not loaded",
                "call load_specified or load_oldest before amending"
            );
        };
        let table = change.table.clone();
        let seed = change.seed();

        let mut transaction = self.store.begin().await?;
        let result = self.walk(&mut transaction, &table, seed).await;
        let walk = finish(transaction, result).await?;

        if walk.consumed == 0 {
            debug!(side = %self.side, table = %table, "no changes to amend");
            return Ok(true);
        }

        let consumed = self.consumed + walk.consumed;
        match walk.outcome {
            Outcome::Changed(change) => self.replace(Some(change), consumed),
            Outcome::Cancelled => self.replace(None, 0),
            Outcome::Unchanged => {}
        }

        Ok(self.is_loaded())
    }

    /// Returns the time of the earliest change in the change log without consuming anything.
    pub async fn oldest_change_time(&self) -> ConsolidatorResult<Option<DateTime<Utc>>> {
        self.store.oldest_change_time().await
    }

    async fn walk_oldest<T>(&self, transaction: &mut T) -> ConsolidatorResult<Walk>
    where
        T: ChangeLogTransaction,
    {
        let mut finder = OldestChangeFinder::new();

        while let Some(oldest) = finder.find(transaction).await? {
            let key = KeyInput::from(oldest.key.as_str()).resolve(&oldest.table, &self.tables)?;
            let walk = self
                .walk(
                    transaction,
                    &oldest.table,
                    ConsolidationState::fresh(key.serialize()),
                )
                .await?;

            if let Outcome::Changed(_) = walk.outcome {
                return Ok(walk);
            }

            // A cancelled walk deleted the oldest row, so the next search moves on by itself.
            // Rows still pending at the same key are visited again in time order.
            if walk.consumed == 0 {
                finder.exclude(ChangeLocator::from(&oldest));
            }
        }

        Ok(Walk {
            outcome: Outcome::Unchanged,
            consumed: 0,
        })
    }

    /// Walks the change log from `state`, classifies the folded rows and deletes them.
    async fn walk<T>(
        &self,
        transaction: &mut T,
        table: &str,
        state: ConsolidationState,
    ) -> ConsolidatorResult<Walk>
    where
        T: ChangeLogTransaction,
    {
        let consolidation = consolidate(transaction, table, state).await?;

        let outcome = match consolidation.classification {
            Classification::Unchanged => Outcome::Unchanged,
            Classification::Cancelled => Outcome::Cancelled,
            Classification::Changed(net) => {
                Outcome::Changed(ConsolidatedChange::from_net_change(table, net, &self.tables)?)
            }
        };

        let consumed = consolidation.consumed.len();
        if consumed > 0 {
            #[cfg(feature = "failpoints")]
            consolidator_fail_point(LOAD_CHANGE_BEFORE_DELETE)?;

            let deleted = transaction.delete_changes(&consolidation.consumed).await?;
            if deleted != consumed as u64 {
                bail!(
                    ErrorKind::InvalidState,
                    "Folded changes were consumed concurrently",
                    format!(
                        "deleted {deleted} of {consumed} changes of table `{table}` starting at key `{}`",
                        consolidation.state.current_key()
                    )
                );
            }
        }

        self.record(table, &outcome, consumed);

        Ok(Walk { outcome, consumed })
    }

    fn record(&self, table: &str, outcome: &Outcome, consumed: usize) {
        let side = self.side.as_static_str();
        counter!(CONSOLIDATOR_CONSUMED_ROWS_TOTAL, SIDE_LABEL => side).increment(consumed as u64);

        match outcome {
            Outcome::Unchanged => {}
            Outcome::Cancelled => {
                debug!(side, table, consumed, "changes cancelled out");
                counter!(CONSOLIDATOR_CANCELLED_TOTAL, SIDE_LABEL => side).increment(1);
            }
            Outcome::Changed(change) => {
                info!(
                    side,
                    table,
                    key = %change.key,
                    change_type = %change.change_type,
                    consumed,
                    "consolidated change"
                );
                counter!(
                    CONSOLIDATOR_CHANGES_TOTAL,
                    SIDE_LABEL => side,
                    CHANGE_TYPE_LABEL => change.change_type.as_static_str(),
                )
                .increment(1);
            }
        }
    }

    fn replace(&mut self, change: Option<ConsolidatedChange>, consumed: usize) {
        self.change = change;
        self.consumed = consumed;
    }
}

impl<S, L> Serialize for LoggedChange<S, L> {
    fn serialize<Ser: Serializer>(&self, serializer: Ser) -> Result<Ser::Ok, Ser::Error> {
        let mut state = serializer.serialize_struct("LoggedChange", 4)?;
        state.serialize_field("side", &self.side)?;
        state.serialize_field("loaded", &self.is_loaded())?;
        state.serialize_field("consumed", &self.consumed)?;
        state.serialize_field("change", &self.change)?;
        state.end()
    }
}

/// Commits `transaction` if `result` is a success and rolls it back otherwise.
async fn finish<T, R>(transaction: T, result: ConsolidatorResult<R>) -> ConsolidatorResult<R>
where
    T: ChangeLogTransaction,
{
    #[cfg(feature = "failpoints")]
    let result = result.and_then(|value| {
        consolidator_fail_point(LOAD_CHANGE_BEFORE_COMMIT)?;
        Ok(value)
    });

    match result {
        Ok(value) => {
            transaction.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = transaction.rollback().await {
                warn!(error = %rollback_err, "failed to roll back change log transaction");
            }
            Err(err)
        }
    }
}
