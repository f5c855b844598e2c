//! Utilities for testing change consolidation.
//!
//! - [`change_log`] writes raw changes at controlled times and provides table configurations.
//! - [`fault_store`] wraps a change log store and injects failures into chosen methods.
//! - [`failpoints`] configures fail points for the duration of a test.

pub mod change_log;
pub mod fault_store;
#[cfg(feature = "failpoints")]
pub mod failpoints;
