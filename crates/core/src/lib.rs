//! Domain types for the interpreter-session host.
//!
//! This crate defines the seam between the pooling/dispatch machinery in
//! the `shellhost` crate and whatever interpreter actually runs commands:
//! the [`InterpreterSession`](session::InterpreterSession) capability
//! trait, the record types its executions emit, and the error taxonomy
//! surfaced to callers. It has no knowledge of any concrete interpreter.

pub mod error;
pub mod record;
pub mod session;
pub mod testing;

pub use error::{BoxError, HostError, InvocationFailure};
pub use record::{ErrorRecord, ResultRecord, SessionOutput};
pub use session::{InterpreterSession, InvocationTarget, Parameters, SessionFactory};
