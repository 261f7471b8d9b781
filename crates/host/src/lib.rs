//! Interpreter-session pool and command-invocation service.
//!
//! Hosts a bounded set of reusable scripting-interpreter sessions and
//! exposes two operations over them: invoke a named command, or invoke an
//! ad-hoc script body, each with keyword parameters. Requests are
//! scheduled onto an available session (suspending when all
//! `max_sessions` are busy), executed asynchronously, and post-processed
//! into either an ordered result sequence or a single aggregated failure
//! wrapping every error record the interpreter reported.
//!
//! The interpreter itself is an injected capability
//! ([`shellhost_core::InterpreterSession`]); this crate owns only the
//! pooling, dispatch, and error-aggregation contract around it.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use shellhost::{PoolConfig, ScriptHost};
//! use shellhost_core::testing::{StubFactory, StubSession};
//!
//! # async fn demo() -> Result<(), shellhost_core::HostError> {
//! let factory = Arc::new(StubFactory::new(|| StubSession::new().with_echo("echo")));
//! let host = ScriptHost::open(PoolConfig::default(), factory).await?;
//!
//! let records = host
//!     .invoke_command("echo", [("value".to_string(), 1.into())].into())
//!     .await?;
//! assert_eq!(records.len(), 1);
//!
//! host.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dispatch;
pub mod outcome;
pub mod pool;
pub mod service;

pub use config::PoolConfig;
pub use dispatch::InvocationRequest;
pub use pool::{PoolStats, SessionLease, SessionPool};
pub use service::ScriptHost;
