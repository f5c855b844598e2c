//! Macros for building and returning [`crate::error::ConsolidatorError`] values.

/// Creates a [`crate::error::ConsolidatorError`] from an error kind and description, with
/// optional dynamic detail and source.
#[macro_export]
macro_rules! consolidator_error {
    ($kind:expr, $desc:expr) => {
        $crate::error::ConsolidatorError::from(($kind, $desc))
    };
    ($kind:expr, $desc:expr, source: $source:expr) => {
        $crate::error::ConsolidatorError::from(($kind, $desc)).with_source($source)
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        $crate::error::ConsolidatorError::from(($kind, $desc, $detail.to_string()))
    };
    ($kind:expr, $desc:expr, $detail:expr, source: $source:expr) => {
        $crate::error::ConsolidatorError::from(($kind, $desc, $detail.to_string()))
            .with_source($source)
    };
}

/// Returns a [`crate::error::ConsolidatorError`] from the current function.
///
/// Accepts the same arguments as [`consolidator_error!`].
#[macro_export]
macro_rules! bail {
    ($kind:expr, $desc:expr) => {
        return ::core::result::Result::Err($crate::consolidator_error!($kind, $desc))
    };
    ($kind:expr, $desc:expr, source: $source:expr) => {
        return ::core::result::Result::Err($crate::consolidator_error!(
            $kind,
            $desc,
            source: $source
        ))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        return ::core::result::Result::Err($crate::consolidator_error!($kind, $desc, $detail))
    };
    ($kind:expr, $desc:expr, $detail:expr, source: $source:expr) => {
        return ::core::result::Result::Err($crate::consolidator_error!(
            $kind,
            $desc,
            $detail,
            source: $source
        ))
    };
}
