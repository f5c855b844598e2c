//! Folding of raw change rows into a single net change.
//!
//! A walk starts at a key of a table and repeatedly pulls the earliest row recorded for the key
//! the row is currently known by. Updates that rename the primary key move the walk to the new
//! key, so a chain of renames folds into one change. The walk stops once no row is left at the
//! current key.

use chrono::{DateTime, Utc};
use tracing::trace;

use crate::error::ConsolidatorResult;
use crate::store::ChangeLogTransaction;
use crate::types::{ChangeId, ChangeType, RawChangeRow};

/// What is known about the rows folded so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FoldedHistory {
    /// Whether the row existed before the first folded change.
    existed_before: bool,
    first_changed_at: DateTime<Utc>,
    last_changed_at: DateTime<Utc>,
}

/// Running state of a consolidation walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsolidationState {
    /// Key the walk started from, reported for updates and deletes.
    origin_key: String,
    /// Key the row is known by after the last folded change.
    current_key: String,
    exists_now: bool,
    history: Option<FoldedHistory>,
    folded: usize,
}

impl ConsolidationState {
    /// Creates the state of a walk that has not folded any row yet.
    pub fn fresh(start_key: impl Into<String>) -> Self {
        let start_key = start_key.into();

        Self {
            origin_key: start_key.clone(),
            current_key: start_key,
            exists_now: false,
            history: None,
            folded: 0,
        }
    }

    /// Creates the state of a walk continuing an earlier one.
    ///
    /// Only rows arriving at `current_key` are pulled; the rows folded before are represented by
    /// the remaining arguments and are never read again.
    pub fn seeded(
        origin_key: impl Into<String>,
        current_key: impl Into<String>,
        existed_before: bool,
        exists_now: bool,
        first_changed_at: DateTime<Utc>,
        last_changed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            origin_key: origin_key.into(),
            current_key: current_key.into(),
            exists_now,
            history: Some(FoldedHistory {
                existed_before,
                first_changed_at,
                last_changed_at,
            }),
            folded: 0,
        }
    }

    pub fn current_key(&self) -> &str {
        &self.current_key
    }

    /// Returns the number of rows folded into this state since it was created.
    pub fn folded(&self) -> usize {
        self.folded
    }

    /// Folds the next row of the walk into the state.
    ///
    /// Rows must be folded in change log order.
    pub fn fold(&mut self, row: &RawChangeRow) {
        let history = self.history.get_or_insert(FoldedHistory {
            existed_before: row.change_type != ChangeType::Insert,
            first_changed_at: row.change_time,
            last_changed_at: row.change_time,
        });
        history.last_changed_at = row.change_time;

        match row.change_type {
            ChangeType::Insert => self.exists_now = true,
            ChangeType::Delete => self.exists_now = false,
            ChangeType::Update => {
                self.exists_now = true;
                self.current_key = row.resulting_key().to_owned();
            }
        }

        self.folded += 1;
    }

    /// Classifies the rows folded so far.
    pub fn classify(&self) -> Classification {
        let Some(history) = self.history else {
            return Classification::Unchanged;
        };

        let (change_type, key, new_key) = match (history.existed_before, self.exists_now) {
            (false, false) => return Classification::Cancelled,
            (false, true) => (ChangeType::Insert, self.current_key.clone(), None),
            (true, false) => (ChangeType::Delete, self.origin_key.clone(), None),
            (true, true) => (
                ChangeType::Update,
                self.origin_key.clone(),
                Some(self.current_key.clone()),
            ),
        };

        Classification::Changed(NetChange {
            change_type,
            key,
            new_key,
            first_changed_at: history.first_changed_at,
            last_changed_at: history.last_changed_at,
        })
    }
}

/// Net effect of a sequence of folded rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// No row was folded.
    Unchanged,
    /// Rows were folded but their effects cancel out.
    Cancelled,
    Changed(NetChange),
}

/// A net change with keys still in serialized form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetChange {
    pub change_type: ChangeType,
    /// Key locating the row: the final key for inserts, the original key otherwise.
    pub key: String,
    /// Final key of the row, only set for updates.
    pub new_key: Option<String>,
    pub first_changed_at: DateTime<Utc>,
    pub last_changed_at: DateTime<Utc>,
}

/// Result of a walk over the change log.
#[derive(Debug, Clone)]
pub struct Consolidation {
    pub state: ConsolidationState,
    /// Ids of the rows folded by this walk, in folding order.
    pub consumed: Vec<ChangeId>,
    pub classification: Classification,
}

/// Walks the change log of `table` starting at the current key of `state`.
///
/// The folded rows are not deleted; the caller removes them within the same transaction.
pub async fn consolidate<T>(
    transaction: &mut T,
    table: &str,
    mut state: ConsolidationState,
) -> ConsolidatorResult<Consolidation>
where
    T: ChangeLogTransaction,
{
    let mut consumed = Vec::new();
    while let Some(row) = transaction
        .next_change(table, state.current_key(), &consumed)
        .await?
    {
        trace!(
            table,
            key = %row.key,
            change_type = %row.change_type,
            id = %row.id,
            "folding change"
        );

        state.fold(&row);
        consumed.push(row.id);
    }

    let classification = state.classify();

    Ok(Consolidation {
        state,
        consumed,
        classification,
    })
}
