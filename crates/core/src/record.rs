//! Records emitted by interpreter sessions.
//!
//! A session execution produces two ordered streams: result records and
//! error records. [`SessionOutput`] carries both, raw and unjudged; the
//! host's normalizer decides which of the two becomes the invocation
//! outcome.

use std::fmt;

use serde::Serialize;
use serde_json::Value;

/// One unit of output produced by a session during an invocation.
///
/// Exposes both a textual rendering and the untyped underlying value, so
/// callers that only want display output never have to interpret the
/// payload and callers that want structure never have to re-parse text.
#[derive(Debug, Clone, Serialize)]
pub struct ResultRecord {
    /// Textual rendering of the value. Strings render without JSON
    /// quoting; everything else renders as compact JSON.
    pub text: String,
    /// The untyped underlying value.
    pub value: Value,
}

impl ResultRecord {
    pub fn new(value: Value) -> Self {
        let text = match &value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        Self { text, value }
    }
}

impl fmt::Display for ResultRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// One structured error unit emitted by a session's error stream.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    /// Human-readable description of the error.
    pub message: String,
    /// Name of the command that produced the error, when known.
    pub command: Option<String>,
}

impl ErrorRecord {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            command: None,
        }
    }

    /// Attach the name of the command the error originated from.
    pub fn for_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Raw output of one session execution: the result and error streams,
/// each in the order the interpreter emitted them.
#[derive(Debug, Default)]
pub struct SessionOutput {
    pub results: Vec<ResultRecord>,
    pub errors: Vec<ErrorRecord>,
}

impl SessionOutput {
    /// Output with only result records.
    pub fn results(results: Vec<ResultRecord>) -> Self {
        Self {
            results,
            errors: Vec::new(),
        }
    }

    /// Output with only error records.
    pub fn errors(errors: Vec<ErrorRecord>) -> Self {
        Self {
            results: Vec::new(),
            errors,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
