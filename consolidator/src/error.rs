//! Error type and result alias for change consolidation.
//!
//! Every fallible operation of the crate returns [`ConsolidatorResult`]. A
//! [`ConsolidatorError`] carries an [`ErrorKind`] for programmatic handling, a static
//! description, optional dynamic detail, the originating error and the callsite at which it
//! was created.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

/// Convenient result type using [`ConsolidatorError`] as the error type.
pub type ConsolidatorResult<T> = Result<T, ConsolidatorError>;

/// Main error type of the crate.
#[derive(Debug, Clone)]
pub struct ConsolidatorError {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Categories of failures surfaced by the crate.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Configuration errors
    ConfigError,

    // Change log access errors
    ChangeLogConnectionFailed,
    ChangeLogQueryFailed,

    // Data errors
    InvalidKeyFormat,
    InvalidChangeType,
    InvalidData,

    // Workflow errors
    InvalidState,

    Unknown,

    // Injected through fail points in tests.
    #[cfg(feature = "failpoints")]
    WithNoRetry,
}

impl ConsolidatorError {
    /// Returns the [`ErrorKind`] of this error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the static description of this error.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the dynamic detail attached to this error, if any.
    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    /// Returns the captured backtrace.
    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    /// Returns the callsite at which this error was created.
    pub fn location(&self) -> &'static Location<'static> {
        self.location
    }

    /// Attaches an originating error, exposed through [`error::Error::source`].
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        self.source = Some(Arc::new(source));
        self
    }

    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        ConsolidatorError {
            kind,
            description,
            detail,
            source,
            location: Location::caller(),
            backtrace: Arc::new(Backtrace::capture()),
        }
    }
}

/// Two errors are equal when they have the same kind.
impl PartialEq for ConsolidatorError {
    fn eq(&self, other: &ConsolidatorError) -> bool {
        self.kind == other.kind
    }
}

impl fmt::Display for ConsolidatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:?}] {} @ {}:{}:{}",
            self.kind,
            self.description,
            self.location.file(),
            self.location.line(),
            self.location.column()
        )?;

        if let Some(detail) = &self.detail {
            write!(f, "\n  Detail:")?;
            for line in detail.lines() {
                write!(f, "\n    {line}")?;
            }
        }

        let backtrace = self.backtrace.to_string();
        if !backtrace.trim().is_empty() {
            write!(f, "\n  Backtrace:")?;
            for line in backtrace.lines() {
                write!(f, "\n    {line}")?;
            }
        }

        Ok(())
    }
}

impl error::Error for ConsolidatorError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn error::Error + 'static))
    }
}

/// Creates a [`ConsolidatorError`] from an error kind and static description.
impl From<(ErrorKind, &'static str)> for ConsolidatorError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> ConsolidatorError {
        ConsolidatorError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

/// Creates a [`ConsolidatorError`] from an error kind, static description and dynamic detail.
impl<D> From<(ErrorKind, &'static str, D)> for ConsolidatorError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> ConsolidatorError {
        ConsolidatorError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

/// Converts [`sqlx::Error`] into a change log access error.
///
/// Pool and I/O failures map to [`ErrorKind::ChangeLogConnectionFailed`], everything else to
/// [`ErrorKind::ChangeLogQueryFailed`].
impl From<sqlx::Error> for ConsolidatorError {
    #[track_caller]
    fn from(err: sqlx::Error) -> ConsolidatorError {
        let kind = match &err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolClosed
            | sqlx::Error::PoolTimedOut => ErrorKind::ChangeLogConnectionFailed,
            _ => ErrorKind::ChangeLogQueryFailed,
        };

        let detail = err.to_string();
        ConsolidatorError::from_components(
            kind,
            Cow::Borrowed("Change log operation failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}
