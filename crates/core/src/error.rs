//! Error types for query fetching and the presentation adapter

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use freshet_common::{CommonError, ErrorClassification, ErrorSeverity};
use thiserror::Error;

/// Result alias used across the crate
pub type QueryResult<T> = Result<T, QueryError>;

/// Errors recorded into the cache or raised by configuration and decoding
///
/// Cloneable so one failure can be stored in a record, broadcast to every
/// subscriber and returned to every deduplicated waiter.
#[derive(Debug, Clone, Error)]
pub enum QueryError {
    /// The fetch function failed (after exhausting retries, if any)
    #[error("{message}")]
    Fetch {
        message: String,
        #[source]
        source: Arc<dyn StdError + Send + Sync>,
    },

    /// The stored payload is not of the type the reader expected
    #[error("Type mismatch for query data (expected {expected})")]
    TypeMismatch { expected: &'static str },

    /// A record in error status carried no error value
    #[error("Unknown query error")]
    MissingError,

    /// Invalid configuration or configuration source
    #[error("Invalid query configuration: {0}")]
    Config(CommonError),

    /// Embedded common error
    #[error(transparent)]
    Common(#[from] CommonError),
}

/// Plain-message failure used when a fetch error has no richer source
#[derive(Debug)]
struct FetchFailure(String);

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl StdError for FetchFailure {}

impl QueryError {
    /// Wrap an arbitrary fetch failure
    pub fn fetch<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Fetch { message: err.to_string(), source: Arc::new(err) }
    }

    /// Fetch failure described only by a message
    pub fn fetch_message<S: Into<String>>(message: S) -> Self {
        let message = message.into();
        Self::Fetch { source: Arc::new(FetchFailure(message.clone())), message }
    }

    /// Type mismatch while decoding a payload as `U`
    pub fn type_mismatch<U>() -> Self {
        Self::TypeMismatch { expected: std::any::type_name::<U>() }
    }

    /// Configuration error wrapping the underlying common error
    pub fn config(err: CommonError) -> Self {
        Self::Config(err)
    }

    /// Downcast the fetch failure's source to a concrete error type
    pub fn fetch_source<E: StdError + 'static>(&self) -> Option<&E> {
        match self {
            Self::Fetch { source, .. } => source.downcast_ref::<E>(),
            _ => None,
        }
    }
}

impl ErrorClassification for QueryError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Fetch { .. } => true,
            Self::Common(err) => err.is_retryable(),
            Self::TypeMismatch { .. } | Self::MissingError | Self::Config(_) => false,
        }
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Fetch { .. } => ErrorSeverity::Warning,
            Self::TypeMismatch { .. } | Self::MissingError | Self::Config(_) => {
                ErrorSeverity::Error
            }
            Self::Common(err) => err.severity(),
        }
    }

    fn is_critical(&self) -> bool {
        matches!(self, Self::Common(err) if err.is_critical())
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }
}
