//! Consolidation of trigger-captured row changes into net changes.
//!
//! Raw insert, update and delete events recorded in a change log are folded per row, following
//! primary key renames, into a single [`change::ConsolidatedChange`]. The folded rows are
//! deleted in the same transaction that read them.

pub mod change;
pub mod consolidation;
pub mod error;
#[cfg(feature = "failpoints")]
pub mod failpoints;
pub mod key;
mod macros;
pub mod metrics;
pub mod oldest;
pub mod store;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;
