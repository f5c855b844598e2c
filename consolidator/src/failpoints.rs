use fail::fail_point;

use crate::bail;
use crate::error::{ConsolidatorResult, ErrorKind};

/// Fires after a walk folded its rows and before they are deleted from the change log.
pub const LOAD_CHANGE_BEFORE_DELETE: &str = "load_change.before_delete";

/// Fires after the consumed rows were deleted and before the transaction commits.
pub const LOAD_CHANGE_BEFORE_COMMIT: &str = "load_change.before_commit";

pub fn consolidator_fail_point(name: &str) -> ConsolidatorResult<()> {
    fail_point!(name, |_| {
        bail!(
            ErrorKind::WithNoRetry,
            "An error occurred in a fail point",
            format!("The failpoint '{name}' returned an error")
        );
    });

    Ok(())
}
