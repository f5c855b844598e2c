//! Postgres access to the trigger maintained change log.

pub mod change_log;
#[cfg(feature = "test-utils")]
pub mod test_utils;
