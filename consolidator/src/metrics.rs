//! Metric names and labels emitted while consolidating changes.

/// Label for the replication side in metrics.
pub const SIDE_LABEL: &str = "side";

/// Label for the change type in metrics.
pub const CHANGE_TYPE_LABEL: &str = "change_type";

/// Counter of raw change log rows folded and deleted.
pub const CONSOLIDATOR_CONSUMED_ROWS_TOTAL: &str = "consolidator_consumed_rows_total";

/// Counter of consolidated changes handed out, labelled by change type.
pub const CONSOLIDATOR_CHANGES_TOTAL: &str = "consolidator_changes_total";

/// Counter of walks whose rows cancelled each other out.
pub const CONSOLIDATOR_CANCELLED_TOTAL: &str = "consolidator_cancelled_total";
