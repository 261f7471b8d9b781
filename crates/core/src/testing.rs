//! In-memory session doubles for the host's tests.
//!
//! [`StubSession`] is a programmable stand-in for the opaque interpreter
//! capability: a table of command handlers, an optional per-execution
//! delay (to keep sessions observably busy), a concurrency gauge, and an
//! execution log. [`StubFactory`] produces them for the pool and records
//! what it was asked to build. Exported from the library (rather than
//! hidden behind `cfg(test)`) because the `shellhost` crate's unit and
//! integration tests both consume it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::BoxError;
use crate::record::{ErrorRecord, ResultRecord, SessionOutput};
use crate::session::{InterpreterSession, InvocationTarget, Parameters, SessionFactory};

/// Handler for one stubbed command.
pub type CommandHandler = Arc<dyn Fn(&Parameters) -> SessionOutput + Send + Sync>;

/// Tracks how many stub executions run at once, and the high-water mark.
#[derive(Debug, Default)]
pub struct ConcurrencyGauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl ConcurrencyGauge {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    /// Highest number of executions observed running simultaneously.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Number of executions running right now.
    pub fn current(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }
}

/// Programmable in-memory interpreter session.
pub struct StubSession {
    commands: HashMap<String, CommandHandler>,
    delay: Option<Duration>,
    gauge: Option<Arc<ConcurrencyGauge>>,
    log: Option<Arc<Mutex<Vec<InvocationTarget>>>>,
    machinery_failure: Option<String>,
}

impl StubSession {
    pub fn new() -> Self {
        Self {
            commands: HashMap::new(),
            delay: None,
            gauge: None,
            log: None,
            machinery_failure: None,
        }
    }

    /// Register a command handler under `name`.
    pub fn with_command(
        mut self,
        name: impl Into<String>,
        handler: impl Fn(&Parameters) -> SessionOutput + Send + Sync + 'static,
    ) -> Self {
        self.commands.insert(name.into(), Arc::new(handler));
        self
    }

    /// Register an echo command: returns one result record carrying the
    /// `value` parameter (null if absent).
    pub fn with_echo(self, name: impl Into<String>) -> Self {
        self.with_command(name, |params: &Parameters| {
            let value = params.get("value").cloned().unwrap_or(Value::Null);
            SessionOutput::results(vec![ResultRecord::new(value)])
        })
    }

    /// Sleep this long inside every execution, keeping the session
    /// observably busy.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Report executions to a shared concurrency gauge.
    pub fn with_gauge(mut self, gauge: Arc<ConcurrencyGauge>) -> Self {
        self.gauge = Some(gauge);
        self
    }

    /// Record every executed target into a shared log.
    pub fn with_log(mut self, log: Arc<Mutex<Vec<InvocationTarget>>>) -> Self {
        self.log = Some(log);
        self
    }

    /// Make every execution fail at the machinery level (execute returns
    /// `Err` instead of producing streams).
    pub fn with_machinery_failure(mut self, message: impl Into<String>) -> Self {
        self.machinery_failure = Some(message.into());
        self
    }

    fn run_command(&self, name: &str, parameters: &Parameters) -> SessionOutput {
        match self.commands.get(name) {
            Some(handler) => handler(parameters),
            None => SessionOutput::errors(vec![ErrorRecord::new(format!(
                "The term '{name}' is not recognized as the name of a command"
            ))
            .for_command(name)]),
        }
    }
}

impl Default for StubSession {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InterpreterSession for StubSession {
    async fn execute(
        &mut self,
        target: &InvocationTarget,
        parameters: &Parameters,
    ) -> Result<SessionOutput, BoxError> {
        if let Some(log) = &self.log {
            log.lock().expect("log lock").push(target.clone());
        }
        if let Some(gauge) = &self.gauge {
            gauge.enter();
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let outcome = if let Some(message) = &self.machinery_failure {
            Err(message.clone().into())
        } else {
            // A script body is interpreted as a call to its first token,
            // with the request parameters bound. That is all the stub
            // language the tests need.
            Ok(match target {
                InvocationTarget::Command(name) => self.run_command(name, parameters),
                InvocationTarget::Script(body) => match body.split_whitespace().next() {
                    Some(name) => self.run_command(name, parameters),
                    None => SessionOutput::default(),
                },
            })
        };
        if let Some(gauge) = &self.gauge {
            gauge.exit();
        }
        outcome
    }
}

/// Factory producing [`StubSession`]s from a template closure.
pub struct StubFactory {
    build: Box<dyn Fn() -> StubSession + Send + Sync>,
    created: AtomicUsize,
    failing: AtomicBool,
    imports_seen: Mutex<Vec<Vec<String>>>,
}

impl StubFactory {
    pub fn new(build: impl Fn() -> StubSession + Send + Sync + 'static) -> Self {
        Self {
            build: Box::new(build),
            created: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
            imports_seen: Mutex::new(Vec::new()),
        }
    }

    /// Factory whose sessions recognize no commands at all.
    pub fn empty() -> Self {
        Self::new(StubSession::new)
    }

    /// Make subsequent `create` calls fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// How many sessions have been created.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// The module-import list passed to each `create` call, in order.
    pub fn imports_seen(&self) -> Vec<Vec<String>> {
        self.imports_seen.lock().expect("imports lock").clone()
    }
}

#[async_trait]
impl SessionFactory for StubFactory {
    async fn create(
        &self,
        module_imports: &[String],
    ) -> Result<Box<dyn InterpreterSession>, BoxError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err("stub factory refused to create a session".into());
        }
        self.imports_seen
            .lock()
            .expect("imports lock")
            .push(module_imports.to_vec());
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new((self.build)()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
