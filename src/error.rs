//! Error types for channel pipelines.
//!
//! Misusing a transport (zero clones, zero-sized windows, building a stage
//! outside a runtime) is a programmer error and panics. Failures produced by
//! user functions travel as data on error transports and only become an
//! [`Error`] when they are aggregated, see [`crate::sinks::join_errs`].

use std::fmt;
use std::sync::Arc;

/// The main error type for channel pipelines.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// A user-supplied function failed
    #[error("{0}")]
    Stage(Arc<dyn std::error::Error + Send + Sync>),

    /// Several failures, kept in arrival order
    #[error("{}", JoinedMessages(.0))]
    Joined(Vec<Error>),

    /// A stage task unwound before closing its output
    #[error("stage `{stage}` aborted before closing its output")]
    StageAborted { stage: &'static str },

    /// A transport was closed while a value was still expected
    #[error("transport was closed")]
    Closed,

    /// A custom error with a message
    #[error("{0}")]
    Custom(String),
}

struct JoinedMessages<'a>(&'a [Error]);

impl fmt::Display for JoinedMessages<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", error)?;
        }
        Ok(())
    }
}

impl Error {
    /// Wrap a failure produced by a user function
    pub fn stage<E: std::error::Error + Send + Sync + 'static>(error: E) -> Self {
        Error::Stage(Arc::new(error))
    }

    /// Create a custom error with a message
    pub fn custom<S: Into<String>>(message: S) -> Self {
        Error::Custom(message.into())
    }

    /// Combine two errors, flattening nested joins so every leaf message
    /// appears once, in order.
    pub fn join(self, other: Error) -> Self {
        let mut errors = match self {
            Error::Joined(errors) => errors,
            single => vec![single],
        };
        match other {
            Error::Joined(more) => errors.extend(more),
            single => errors.push(single),
        }
        Error::Joined(errors)
    }

    /// The individual failures behind this error.
    pub fn errors(&self) -> &[Error] {
        match self {
            Error::Joined(errors) => errors,
            single => std::slice::from_ref(single),
        }
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Custom(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Custom(s.to_string())
    }
}

impl From<tokio::sync::watch::error::RecvError> for Error {
    fn from(_: tokio::sync::watch::error::RecvError) -> Self {
        Error::Closed
    }
}

/// Convenience type alias for Results in this crate
pub type Result<T> = std::result::Result<T, Error>;

/// Helper trait for lifting foreign errors into [`Error`].
pub trait IntoError<T> {
    fn into_stage_error(self) -> Result<T>;
}

impl<T, E> IntoError<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn into_stage_error(self) -> Result<T> {
        self.map_err(Error::stage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_joined_errors_display_one_per_line() {
        let err = Error::custom("first")
            .join(Error::custom("second"))
            .join(Error::custom("third"));
        assert_eq!(err.to_string(), "first\nsecond\nthird");
        assert_eq!(err.errors().len(), 3);
    }

    #[test]
    fn test_single_error_lists_itself() {
        let err = Error::custom("alone");
        assert_eq!(err.errors().len(), 1);
        assert_eq!(err.to_string(), "alone");
    }

    #[test]
    fn test_into_stage_error_wraps_source() {
        let parsed: std::result::Result<i32, _> = "x".parse::<i32>();
        let err = parsed.into_stage_error().unwrap_err();
        assert!(matches!(err, Error::Stage(_)));
        assert_eq!(err.to_string(), "invalid digit found in string");
    }
}
