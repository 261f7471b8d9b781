//! Error taxonomy for the session host.
//!
//! Three failure classes reach callers: [`HostError::Configuration`]
//! (pool cannot be opened, or is used after close),
//! [`HostError::Invocation`] (the interpreter reported errors or its
//! execution machinery failed), and [`HostError::Cancelled`] (the
//! request's cancellation signal fired). None are retried automatically.

use std::fmt;

use crate::record::ErrorRecord;

/// Opaque error type for session machinery failures.
///
/// Concrete [`InterpreterSession`](crate::session::InterpreterSession)
/// implementations surface spawn/transport/runtime faults through this
/// alias rather than a crate-specific error type.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// The pool could not be opened, or was used after being closed.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The interpreter reported one or more errors, or its execution
    /// machinery failed. Carries every original error record.
    #[error(transparent)]
    Invocation(#[from] InvocationFailure),

    /// The request's cancellation signal fired. The payload names the
    /// phase the invocation was in when it was abandoned.
    #[error("Invocation cancelled: {0}")]
    Cancelled(String),
}

/// Aggregated failure for a single invocation.
///
/// When a session's error stream is non-empty, the whole stream collapses
/// into one of these: `message` is the newline-joined textual form of
/// every [`ErrorRecord`] in emission order, and [`records`] carries the
/// originals as structured detail. When the session's own execution
/// machinery failed instead (no error stream was produced), `records` is
/// empty and [`source`] carries the underlying fault.
///
/// [`records`]: InvocationFailure::records
/// [`source`]: std::error::Error::source
#[derive(Debug)]
pub struct InvocationFailure {
    message: String,
    records: Vec<ErrorRecord>,
    source: Option<BoxError>,
}

impl InvocationFailure {
    /// Aggregate a non-empty error stream, preserving emission order.
    pub fn from_records(records: Vec<ErrorRecord>) -> Self {
        let message = records
            .iter()
            .map(|r| r.message.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        Self {
            message,
            records,
            source: None,
        }
    }

    /// Wrap a machinery fault (the session's execute itself failed).
    pub fn from_machinery(source: BoxError) -> Self {
        Self {
            message: format!("interpreter invocation failed: {source}"),
            records: Vec::new(),
            source: Some(source),
        }
    }

    /// The original error records, in emission order. Empty for
    /// machinery faults.
    pub fn records(&self) -> &[ErrorRecord] {
        &self.records
    }
}

impl fmt::Display for InvocationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for InvocationFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
