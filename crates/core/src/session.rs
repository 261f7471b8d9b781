//! The opaque interpreter-session capability.
//!
//! The host never depends on a concrete interpreter. It speaks to
//! sessions only through [`InterpreterSession`] and obtains them only
//! through [`SessionFactory`], which lets tests substitute an in-memory
//! stub (see [`crate::testing`]) and production wire in whatever
//! interpreter runtime it hosts.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::BoxError;
use crate::record::SessionOutput;

/// What an invocation runs: a named command or raw script text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationTarget {
    /// A command registered with the interpreter, invoked by name.
    Command(String),
    /// An ad-hoc script body handed to the interpreter verbatim.
    Script(String),
}

impl InvocationTarget {
    /// Short label for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Command(_) => "command",
            Self::Script(_) => "script",
        }
    }
}

/// Keyword parameters bound to an invocation. Keys are unique; binding
/// order is irrelevant.
pub type Parameters = HashMap<String, Value>;

/// An opaque, stateful execution context able to run one command or
/// script at a time and report its result and error streams.
///
/// Implementations must be safe to move across tasks (executions are
/// spawned onto the runtime), but are never executed concurrently: the
/// pool hands a session to at most one invocation at a time.
#[async_trait]
pub trait InterpreterSession: Send {
    /// Execute `target` with `parameters` bound, returning the raw
    /// result and error streams in emission order.
    ///
    /// An `Err` means the execution machinery itself failed (process
    /// death, transport fault); interpreter-level problems such as an
    /// unknown command or a bad parameter name belong in the error
    /// stream of the returned [`SessionOutput`] instead.
    async fn execute(
        &mut self,
        target: &InvocationTarget,
        parameters: &Parameters,
    ) -> Result<SessionOutput, BoxError>;
}

/// Creates interpreter sessions for the pool.
///
/// `module_imports` is the ordered list of modules each fresh session
/// must pre-load before it is considered ready.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn create(
        &self,
        module_imports: &[String],
    ) -> Result<Box<dyn InterpreterSession>, BoxError>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_kind_labels() {
        assert_eq!(InvocationTarget::Command("get-date".into()).kind(), "command");
        assert_eq!(InvocationTarget::Script("get-date".into()).kind(), "script");
    }
}
