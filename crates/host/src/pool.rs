//! Session pool manager.
//!
//! Owns every interpreter session it creates and is the only shared
//! mutable state in the service. Slot accounting is an explicit idle
//! vector plus counters behind a `std::sync::Mutex` (never held across an
//! await), with a [`tokio::sync::Notify`] waking suspended acquirers when
//! a lease returns. Sessions are handed out as RAII [`SessionLease`]s, so
//! every successful acquire is matched by exactly one release on every
//! exit path, including panics in the holder.

use std::sync::{Arc, Mutex};

use shellhost_core::{
    HostError, InterpreterSession, InvocationTarget, Parameters, SessionFactory,
};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::PoolConfig;

/// Snapshot of pool accounting, for observability and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Sessions sitting idle, ready for assignment.
    pub idle: usize,
    /// Sessions currently leased to invocations.
    pub leased: usize,
    /// Total sessions alive (`idle + leased`).
    pub created: usize,
    /// Hard cap on `created`.
    pub max_sessions: usize,
}

struct PooledSession {
    id: Uuid,
    session: Box<dyn InterpreterSession>,
}

struct PoolState {
    idle: Vec<PooledSession>,
    /// Sessions alive plus creation slots reserved mid-`acquire`.
    created: usize,
    leased: usize,
    closed: bool,
}

struct PoolShared {
    state: Mutex<PoolState>,
    /// Signalled whenever a lease returns, a creation reservation is
    /// given back, or the pool closes.
    returned: Notify,
    max_sessions: usize,
}

impl PoolShared {
    fn lock(&self) -> std::sync::MutexGuard<'_, PoolState> {
        self.state.lock().expect("pool state lock poisoned")
    }
}

/// Bounded pool of interpreter sessions.
pub struct SessionPool {
    shared: Arc<PoolShared>,
    factory: Arc<dyn SessionFactory>,
    module_imports: Vec<String>,
}

impl std::fmt::Debug for SessionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionPool")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl SessionPool {
    /// Open the pool: validate `config`, eagerly create `min_sessions`
    /// sessions (each pre-loading the configured module imports), and run
    /// the init script, if any, once on one session.
    ///
    /// Init-script failures are swallowed: init scripts are best-effort
    /// environment priming, so both machinery faults and error records
    /// are logged at `warn` and otherwise ignored. Session *creation*
    /// failure, in contrast, fails the open with
    /// [`HostError::Configuration`].
    pub async fn open(
        config: PoolConfig,
        factory: Arc<dyn SessionFactory>,
    ) -> Result<Self, HostError> {
        config.validate()?;

        let pool = Self {
            shared: Arc::new(PoolShared {
                state: Mutex::new(PoolState {
                    idle: Vec::with_capacity(config.max_sessions),
                    created: 0,
                    leased: 0,
                    closed: false,
                }),
                returned: Notify::new(),
                max_sessions: config.max_sessions,
            }),
            factory,
            module_imports: config.deduped_imports(),
        };

        for _ in 0..config.min_sessions {
            let slot = pool.create_session().await?;
            let mut state = pool.shared.lock();
            state.created += 1;
            state.idle.push(slot);
        }

        if let Some(script) = &config.init_script {
            pool.run_init_script(script).await;
        }

        tracing::info!(
            min_sessions = config.min_sessions,
            max_sessions = config.max_sessions,
            module_imports = pool.module_imports.len(),
            "Session pool opened",
        );
        Ok(pool)
    }

    /// Borrow one idle session, marking it in use.
    ///
    /// If no session is idle and fewer than `max_sessions` exist, a new
    /// one is created. If the pool is saturated, the caller suspends
    /// until a lease returns. Wake-up is first-available: there is **no
    /// FIFO ordering guarantee** among concurrent waiters.
    ///
    /// Fails with [`HostError::Cancelled`] if `cancel` fires before a
    /// session was obtained, and [`HostError::Configuration`] if the pool
    /// is (or becomes) closed.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<SessionLease, HostError> {
        loop {
            if cancel.is_cancelled() {
                return Err(HostError::Cancelled(
                    "while waiting for a session".to_string(),
                ));
            }

            // Register for wake-ups before inspecting state, so a release
            // that lands between the check and the await is not missed.
            let returned = self.shared.returned.notified();

            let mut reserved_creation = false;
            {
                let mut state = self.shared.lock();
                if state.closed {
                    return Err(HostError::Configuration(
                        "session pool is closed".to_string(),
                    ));
                }
                if let Some(slot) = state.idle.pop() {
                    state.leased += 1;
                    tracing::debug!(session_id = %slot.id, "Session acquired");
                    return Ok(SessionLease {
                        slot: Some(slot),
                        shared: Arc::clone(&self.shared),
                    });
                }
                if state.created < self.shared.max_sessions {
                    // Reserve the creation slot before awaiting the factory.
                    state.created += 1;
                    reserved_creation = true;
                }
            }

            if reserved_creation {
                return self.acquire_fresh().await;
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(HostError::Cancelled(
                        "while waiting for a session".to_string(),
                    ));
                }
                _ = returned => {}
            }
        }
    }

    /// Grow the pool by one session and lease it directly. The creation
    /// slot has already been reserved in `created`.
    async fn acquire_fresh(&self) -> Result<SessionLease, HostError> {
        match self.create_session().await {
            Ok(slot) => {
                let mut state = self.shared.lock();
                if state.closed {
                    // Closed while the factory ran. Dispose immediately.
                    state.created -= 1;
                    drop(state);
                    drop(slot);
                    self.shared.returned.notify_waiters();
                    return Err(HostError::Configuration(
                        "session pool is closed".to_string(),
                    ));
                }
                state.leased += 1;
                tracing::debug!(session_id = %slot.id, "Session acquired");
                Ok(SessionLease {
                    slot: Some(slot),
                    shared: Arc::clone(&self.shared),
                })
            }
            Err(e) => {
                // Give the reservation back so a waiter can retry it.
                self.shared.lock().created -= 1;
                self.shared.returned.notify_waiters();
                Err(e)
            }
        }
    }

    async fn create_session(&self) -> Result<PooledSession, HostError> {
        let session = self
            .factory
            .create(&self.module_imports)
            .await
            .map_err(|e| {
                HostError::Configuration(format!("failed to create interpreter session: {e}"))
            })?;
        let slot = PooledSession {
            id: Uuid::now_v7(),
            session,
        };
        tracing::debug!(session_id = %slot.id, "Interpreter session created");
        Ok(slot)
    }

    async fn run_init_script(&self, script: &str) {
        let Some(mut slot) = self.shared.lock().idle.pop() else {
            return;
        };
        let target = InvocationTarget::Script(script.to_string());
        match slot.session.execute(&target, &Parameters::new()).await {
            Ok(output) if output.errors.is_empty() => {
                tracing::debug!(session_id = %slot.id, "Init script completed");
            }
            Ok(output) => {
                tracing::warn!(
                    session_id = %slot.id,
                    errors = output.errors.len(),
                    first = %output.errors[0],
                    "Init script reported errors; ignoring",
                );
            }
            Err(e) => {
                tracing::warn!(session_id = %slot.id, error = %e, "Init script failed; ignoring");
            }
        }
        self.shared.lock().idle.push(slot);
    }

    /// Close the pool: dispose every idle session immediately, then wait
    /// for outstanding leases to return (in-flight executions finish)
    /// and dispose those sessions too. Idempotent; concurrent callers all
    /// wait for the drain. After closing, [`acquire`](Self::acquire)
    /// fails with [`HostError::Configuration`].
    pub async fn close(&self) {
        let drained = {
            let mut state = self.shared.lock();
            let was_closed = state.closed;
            state.closed = true;
            let drained: Vec<PooledSession> = state.idle.drain(..).collect();
            state.created -= drained.len();
            if !was_closed {
                tracing::info!(
                    disposed = drained.len(),
                    in_flight = state.leased,
                    "Session pool closing",
                );
            }
            drained
        };
        drop(drained);
        // Wake waiters so they observe the closed state instead of
        // suspending forever.
        self.shared.returned.notify_waiters();

        loop {
            let returned = self.shared.returned.notified();
            if self.shared.lock().leased == 0 {
                break;
            }
            returned.await;
        }
        tracing::info!("Session pool closed");
    }

    /// Current slot accounting.
    pub fn stats(&self) -> PoolStats {
        let state = self.shared.lock();
        PoolStats {
            idle: state.idle.len(),
            leased: state.leased,
            created: state.created,
            max_sessions: self.shared.max_sessions,
        }
    }
}

/// Exclusive borrow of one pooled session.
///
/// Dropping the lease returns the session to the pool (or disposes it if
/// the pool has closed in the meantime) and wakes one of the waiters.
pub struct SessionLease {
    slot: Option<PooledSession>,
    shared: Arc<PoolShared>,
}

impl std::fmt::Debug for SessionLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLease")
            .field("session_id", &self.slot.as_ref().map(|s| s.id))
            .finish_non_exhaustive()
    }
}

impl SessionLease {
    /// Id of the leased session, for log correlation.
    pub fn session_id(&self) -> Uuid {
        self.slot.as_ref().expect("lease holds a session").id
    }

    /// Mutable access to the leased session.
    pub fn session_mut(&mut self) -> &mut dyn InterpreterSession {
        self.slot
            .as_mut()
            .expect("lease holds a session")
            .session
            .as_mut()
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        let Some(slot) = self.slot.take() else { return };
        let disposed = {
            let mut state = self.shared.lock();
            state.leased -= 1;
            if state.closed {
                state.created -= 1;
                true
            } else {
                state.idle.push(slot);
                false
            }
        };
        if disposed {
            tracing::debug!("Session disposed on release (pool closed)");
        }
        self.shared.returned.notify_waiters();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use assert_matches::assert_matches;
    use shellhost_core::testing::{StubFactory, StubSession};
    use shellhost_core::HostError;

    use super::*;

    fn config(min: usize, max: usize) -> PoolConfig {
        PoolConfig {
            min_sessions: min,
            max_sessions: max,
            ..PoolConfig::default()
        }
    }

    #[tokio::test]
    async fn open_creates_min_sessions_eagerly() {
        let factory = Arc::new(StubFactory::empty());
        let pool = SessionPool::open(config(3, 5), Arc::clone(&factory) as Arc<dyn SessionFactory>)
            .await
            .expect("open");
        assert_eq!(factory.created(), 3);
        assert_eq!(
            pool.stats(),
            PoolStats {
                idle: 3,
                leased: 0,
                created: 3,
                max_sessions: 5
            }
        );
    }

    #[tokio::test]
    async fn open_passes_module_imports_to_every_session() {
        let factory = Arc::new(StubFactory::empty());
        let cfg = PoolConfig {
            min_sessions: 2,
            module_imports: vec!["mod-a".to_string(), "mod-a".to_string(), "mod-b".to_string()],
            ..PoolConfig::default()
        };
        SessionPool::open(cfg, Arc::clone(&factory) as Arc<dyn SessionFactory>)
            .await
            .expect("open");
        let expected = vec!["mod-a".to_string(), "mod-b".to_string()];
        assert_eq!(factory.imports_seen(), vec![expected.clone(), expected]);
    }

    #[tokio::test]
    async fn open_fails_when_session_creation_fails() {
        let factory = Arc::new(StubFactory::empty());
        factory.set_failing(true);
        let result = SessionPool::open(config(1, 1), factory).await;
        assert_matches!(result, Err(HostError::Configuration(_)));
    }

    #[tokio::test]
    async fn open_rejects_invalid_config() {
        let factory = Arc::new(StubFactory::empty());
        let result = SessionPool::open(config(0, 5), factory).await;
        assert_matches!(result, Err(HostError::Configuration(_)));
    }

    #[tokio::test]
    async fn init_script_runs_once_and_failure_is_swallowed() {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let log_for_build = Arc::clone(&log);
        // Sessions recognize no commands, so the init script produces an
        // error record. The open must still succeed.
        let factory = Arc::new(StubFactory::new(move || {
            StubSession::new().with_log(Arc::clone(&log_for_build))
        }));
        let cfg = PoolConfig {
            min_sessions: 2,
            init_script: Some("prime-environment".to_string()),
            ..PoolConfig::default()
        };
        let pool = SessionPool::open(cfg, factory).await.expect("open");

        let executed = log.lock().expect("log lock").clone();
        assert_eq!(
            executed,
            vec![InvocationTarget::Script("prime-environment".to_string())],
            "init script runs exactly once, on one session"
        );
        assert_eq!(pool.stats().idle, 2, "the primed session is idle again");
    }

    #[tokio::test]
    async fn init_script_machinery_failure_is_swallowed() {
        let factory = Arc::new(StubFactory::new(|| {
            StubSession::new().with_machinery_failure("interpreter died")
        }));
        let cfg = PoolConfig {
            init_script: Some("prime".to_string()),
            ..PoolConfig::default()
        };
        let pool = SessionPool::open(cfg, factory).await.expect("open");
        assert_eq!(pool.stats().idle, 1);
    }

    #[tokio::test]
    async fn released_session_is_reused_not_recreated() {
        let factory = Arc::new(StubFactory::empty());
        let pool = SessionPool::open(config(1, 5), Arc::clone(&factory) as Arc<dyn SessionFactory>)
            .await
            .expect("open");
        let cancel = CancellationToken::new();

        let lease = pool.acquire(&cancel).await.expect("acquire");
        drop(lease);
        let lease = pool.acquire(&cancel).await.expect("acquire");
        drop(lease);

        assert_eq!(factory.created(), 1, "idle session should be reused");
    }

    #[tokio::test]
    async fn pool_grows_lazily_up_to_max() {
        let factory = Arc::new(StubFactory::empty());
        let pool = SessionPool::open(config(1, 3), Arc::clone(&factory) as Arc<dyn SessionFactory>)
            .await
            .expect("open");
        let cancel = CancellationToken::new();

        let a = pool.acquire(&cancel).await.expect("acquire");
        let b = pool.acquire(&cancel).await.expect("acquire");
        let c = pool.acquire(&cancel).await.expect("acquire");
        assert_eq!(factory.created(), 3);
        assert_eq!(pool.stats().leased, 3);

        // A fourth concurrent acquire must suspend.
        let wait = tokio::time::timeout(Duration::from_millis(50), pool.acquire(&cancel)).await;
        assert!(wait.is_err(), "acquire beyond max_sessions must suspend");

        drop(a);
        drop(b);
        drop(c);
    }

    #[tokio::test]
    async fn waiter_resumes_when_a_lease_returns() {
        let factory = Arc::new(StubFactory::empty());
        let pool = Arc::new(
            SessionPool::open(config(1, 1), factory)
                .await
                .expect("open"),
        );
        let cancel = CancellationToken::new();

        let lease = pool.acquire(&cancel).await.expect("acquire");

        let waiter_pool = Arc::clone(&pool);
        let waiter = tokio::spawn(async move {
            let cancel = CancellationToken::new();
            waiter_pool.acquire(&cancel).await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished(), "waiter must suspend while saturated");

        drop(lease);
        let lease = tokio::time::timeout(Duration::from_millis(200), waiter)
            .await
            .expect("waiter should resume")
            .expect("join")
            .expect("acquire");
        assert_eq!(pool.stats().leased, 1);
        drop(lease);
    }

    #[tokio::test]
    async fn cancellation_aborts_the_wait() {
        let factory = Arc::new(StubFactory::empty());
        let pool = Arc::new(
            SessionPool::open(config(1, 1), factory)
                .await
                .expect("open"),
        );
        let lease = pool
            .acquire(&CancellationToken::new())
            .await
            .expect("acquire");

        let cancel = CancellationToken::new();
        let waiter_pool = Arc::clone(&pool);
        let waiter_cancel = cancel.clone();
        let waiter = tokio::spawn(async move { waiter_pool.acquire(&waiter_cancel).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_millis(200), waiter)
            .await
            .expect("cancelled waiter should return")
            .expect("join");
        assert_matches!(result, Err(HostError::Cancelled(_)));
        drop(lease);
    }

    #[tokio::test]
    async fn already_cancelled_token_fails_before_taking_a_session() {
        let factory = Arc::new(StubFactory::empty());
        let pool = SessionPool::open(config(1, 1), factory).await.expect("open");

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = pool.acquire(&cancel).await;
        assert_matches!(result, Err(HostError::Cancelled(_)));
        assert_eq!(pool.stats().idle, 1, "no session may be consumed");
    }

    #[tokio::test]
    async fn failed_growth_returns_the_reservation() {
        let factory = Arc::new(StubFactory::empty());
        let pool = SessionPool::open(config(1, 2), Arc::clone(&factory) as Arc<dyn SessionFactory>)
            .await
            .expect("open");
        let cancel = CancellationToken::new();

        let lease = pool.acquire(&cancel).await.expect("acquire");
        factory.set_failing(true);
        let result = pool.acquire(&cancel).await;
        assert_matches!(result, Err(HostError::Configuration(_)));
        assert_eq!(pool.stats().created, 1, "reservation must be given back");

        // With the factory healthy again the pool can still grow.
        factory.set_failing(false);
        let second = pool.acquire(&cancel).await.expect("acquire");
        assert_eq!(pool.stats().created, 2);
        drop(lease);
        drop(second);
    }

    #[tokio::test]
    async fn acquire_after_close_fails() {
        let factory = Arc::new(StubFactory::empty());
        let pool = SessionPool::open(config(2, 2), factory).await.expect("open");
        pool.close().await;

        let result = pool.acquire(&CancellationToken::new()).await;
        assert_matches!(result, Err(HostError::Configuration(_)));
        assert_eq!(
            pool.stats(),
            PoolStats {
                idle: 0,
                leased: 0,
                created: 0,
                max_sessions: 2
            }
        );
    }

    #[tokio::test]
    async fn close_waits_for_outstanding_leases() {
        let factory = Arc::new(StubFactory::empty());
        let pool = Arc::new(
            SessionPool::open(config(2, 2), factory)
                .await
                .expect("open"),
        );
        let lease = pool
            .acquire(&CancellationToken::new())
            .await
            .expect("acquire");

        let closer_pool = Arc::clone(&pool);
        let closer = tokio::spawn(async move { closer_pool.close().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!closer.is_finished(), "close must wait for the lease");
        // The idle session was already disposed.
        assert_eq!(pool.stats().idle, 0);
        assert_eq!(pool.stats().leased, 1);

        drop(lease);
        tokio::time::timeout(Duration::from_millis(200), closer)
            .await
            .expect("close should finish once the lease returns")
            .expect("join");
        assert_eq!(pool.stats().created, 0, "every session disposed");
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let factory = Arc::new(StubFactory::empty());
        let pool = SessionPool::open(config(1, 1), factory).await.expect("open");
        pool.close().await;
        pool.close().await;
        assert_eq!(pool.stats().created, 0);
    }
}
