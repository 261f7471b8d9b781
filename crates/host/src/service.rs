//! Composition root for the invocation service.
//!
//! [`ScriptHost`] owns the session pool and exposes the two public
//! operations. Every invocation follows the same lifecycle:
//! 1. Acquire a session (suspending while the pool is saturated).
//! 2. Dispatch the bound execution onto it.
//! 3. Normalize the raw streams into the outcome.
//! 4. Release the session — guaranteed by the RAII lease on every exit
//!    path, success, failure, or cancellation.

use std::sync::Arc;

use shellhost_core::{HostError, Parameters, ResultRecord, SessionFactory};

use crate::config::PoolConfig;
use crate::dispatch::{self, InvocationRequest};
use crate::outcome;
use crate::pool::{PoolStats, SessionPool};

/// Hosts a bounded pool of interpreter sessions and invokes commands and
/// scripts against it.
pub struct ScriptHost {
    pool: SessionPool,
}

impl ScriptHost {
    /// Open the host: validates the configuration and builds the session
    /// pool (eager `min_sessions` creation, module pre-loading, one-shot
    /// init script).
    pub async fn open(
        config: PoolConfig,
        factory: Arc<dyn SessionFactory>,
    ) -> Result<Self, HostError> {
        let pool = SessionPool::open(config, factory).await?;
        Ok(Self { pool })
    }

    /// Invoke a named command with the given keyword parameters.
    pub async fn invoke_command(
        &self,
        name: &str,
        parameters: Parameters,
    ) -> Result<Vec<ResultRecord>, HostError> {
        self.invoke(InvocationRequest::command(name).with_parameters(parameters))
            .await
    }

    /// Invoke an ad-hoc script body with the given keyword parameters.
    pub async fn invoke_script(
        &self,
        body: &str,
        parameters: Parameters,
    ) -> Result<Vec<ResultRecord>, HostError> {
        self.invoke(InvocationRequest::script(body).with_parameters(parameters))
            .await
    }

    /// Invoke an arbitrary request (the general form both wrappers
    /// delegate to, and the one to use for cancellable invocations).
    pub async fn invoke(
        &self,
        request: InvocationRequest,
    ) -> Result<Vec<ResultRecord>, HostError> {
        let InvocationRequest {
            target,
            parameters,
            cancellation,
        } = request;
        tracing::debug!(kind = target.kind(), "Invocation accepted");

        let lease = self.pool.acquire(&cancellation).await?;
        let output = dispatch::run(lease, target, parameters, cancellation).await?;
        outcome::normalize(output)
    }

    /// Tear the host down: close the pool, disposing idle sessions
    /// immediately and in-use sessions once their current invocation
    /// finishes. Idempotent and safe to call with invocations in flight.
    pub async fn shutdown(&self) {
        self.pool.close().await;
    }

    /// Current pool accounting.
    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }
}
