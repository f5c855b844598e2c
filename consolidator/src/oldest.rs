use std::collections::HashSet;

use tracing::debug;

use crate::error::ConsolidatorResult;
use crate::store::ChangeLogTransaction;
use crate::types::{ChangeLocator, RawChangeRow};

/// Finds the globally earliest change of a change log, across all tables.
///
/// Keys whose walk could not consume the selected change are excluded so that a retry loop
/// moves on to the next candidate instead of selecting the same change again.
#[derive(Debug, Default, Clone)]
pub struct OldestChangeFinder {
    excluded: HashSet<ChangeLocator>,
}

impl OldestChangeFinder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Excludes the changes recorded for `locator` from later searches.
    ///
    /// Returns `false` if the locator was already excluded.
    pub fn exclude(&mut self, locator: ChangeLocator) -> bool {
        self.excluded.insert(locator)
    }

    pub fn is_excluded(&self, locator: &ChangeLocator) -> bool {
        self.excluded.contains(locator)
    }

    pub fn excluded(&self) -> &HashSet<ChangeLocator> {
        &self.excluded
    }

    /// Returns the earliest change by `(change_time, id)` whose table and key were not excluded.
    pub async fn find<T>(&self, transaction: &mut T) -> ConsolidatorResult<Option<RawChangeRow>>
    where
        T: ChangeLogTransaction,
    {
        let change = transaction.oldest_change(&self.excluded).await?;

        if let Some(change) = &change {
            debug!(
                table = %change.table,
                key = %change.key,
                excluded = self.excluded.len(),
                "found oldest change"
            );
        }

        Ok(change)
    }
}
