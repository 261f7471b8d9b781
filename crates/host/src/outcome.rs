//! Result normalizer / error aggregator.
//!
//! Turns a completed execution's raw streams into the invocation
//! outcome. Exactly one of two forms per request: an ordered result
//! sequence, or a single aggregated failure — never both, never neither.

use shellhost_core::{HostError, InvocationFailure, ResultRecord, SessionOutput};

/// Judge a completed execution.
///
/// Empty error stream: the result records, in emission order (an empty
/// sequence is a valid success). Non-empty error stream: partial results
/// are discarded and the whole stream collapses into one
/// [`HostError::Invocation`] whose message is the newline-joined textual
/// form of every error record, carrying the originals as structured
/// detail. Errors win and partial results are dropped — kept exactly for
/// compatibility with the source system.
pub fn normalize(output: SessionOutput) -> Result<Vec<ResultRecord>, HostError> {
    if output.errors.is_empty() {
        Ok(output.results)
    } else {
        Err(InvocationFailure::from_records(output.errors).into())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
