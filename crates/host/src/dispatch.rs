//! Invocation dispatcher.
//!
//! Binds one request (command name or script body, plus keyword
//! parameters) to a leased session and runs it without blocking the
//! calling task. The execution itself is spawned as a detached task that
//! owns the lease, which is what gives cancellation its documented weak
//! semantics: abandoning the wait does not stop an interpreter that has
//! already started, and the session only returns to the pool when the
//! execution actually finishes.

use serde_json::Value;
use shellhost_core::{HostError, InvocationFailure, InvocationTarget, Parameters, SessionOutput};
use tokio_util::sync::CancellationToken;

use crate::pool::SessionLease;

/// One invocation: what to run, with which parameters, until when.
///
/// Created per call and discarded after it returns.
#[derive(Debug, Clone)]
pub struct InvocationRequest {
    pub target: InvocationTarget,
    pub parameters: Parameters,
    pub cancellation: CancellationToken,
}

impl InvocationRequest {
    /// Request invoking the named command with no parameters and no
    /// cancellation.
    pub fn command(name: impl Into<String>) -> Self {
        Self {
            target: InvocationTarget::Command(name.into()),
            parameters: Parameters::new(),
            cancellation: CancellationToken::new(),
        }
    }

    /// Request invoking the given script body with no parameters and no
    /// cancellation.
    pub fn script(body: impl Into<String>) -> Self {
        Self {
            target: InvocationTarget::Script(body.into()),
            parameters: Parameters::new(),
            cancellation: CancellationToken::new(),
        }
    }

    /// Bind one keyword parameter. Keys are unique; binding order is
    /// irrelevant. Unknown parameter names are not validated here — if
    /// the interpreter rejects one, that surfaces as an error record.
    pub fn with_parameter(mut self, key: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    /// Replace the whole parameter map.
    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    /// Attach a cancellation token.
    ///
    /// Cancellation is only prompt while the request waits for a session
    /// or before execution starts. Once the interpreter is running,
    /// cancelling abandons the wait but the session keeps running to
    /// completion in the background — a known limitation of hosting an
    /// opaque interpreter, not hidden here.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }
}

/// Execute `target` on the leased session, honoring `cancel`.
///
/// Returns the session's raw result and error streams; stream judgement
/// is [`crate::outcome::normalize`]'s job. A panic or machinery fault
/// inside the session's execute is re-wrapped as an invocation failure
/// with the original fault as its cause.
pub(crate) async fn run(
    mut lease: SessionLease,
    target: InvocationTarget,
    parameters: Parameters,
    cancel: CancellationToken,
) -> Result<SessionOutput, HostError> {
    if cancel.is_cancelled() {
        // Not started; the lease drops here and the session goes
        // straight back to the pool.
        return Err(HostError::Cancelled("before execution started".to_string()));
    }

    let session_id = lease.session_id();
    tracing::debug!(session_id = %session_id, kind = target.kind(), "Execution started");

    // The spawned task owns the lease, so the session returns to the
    // pool only when the execution actually finishes, even if the
    // caller below abandons the wait.
    let execution = tokio::spawn(async move {
        let result = lease.session_mut().execute(&target, &parameters).await;
        drop(lease);
        result
    });

    tokio::select! {
        joined = execution => match joined {
            Ok(Ok(output)) => {
                tracing::debug!(
                    session_id = %session_id,
                    results = output.results.len(),
                    errors = output.errors.len(),
                    "Execution finished",
                );
                Ok(output)
            }
            Ok(Err(e)) => {
                tracing::debug!(session_id = %session_id, error = %e, "Execution machinery failed");
                Err(InvocationFailure::from_machinery(e).into())
            }
            Err(join_error) => Err(InvocationFailure::from_machinery(Box::new(join_error)).into()),
        },
        _ = cancel.cancelled() => {
            tracing::warn!(
                session_id = %session_id,
                "Cancellation requested mid-execution; the interpreter keeps running and the \
                 session returns to the pool when it finishes",
            );
            Err(HostError::Cancelled("while awaiting execution".to_string()))
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
