//! Pool configuration.
//!
//! Immutable after the pool opens. No ambient state: the caller builds a
//! [`PoolConfig`] (directly or via [`PoolConfig::from_env`]) and passes
//! it into [`ScriptHost::open`](crate::service::ScriptHost::open).

use shellhost_core::HostError;

/// Configuration for the interpreter-session pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Sessions created eagerly when the pool opens (default: `1`).
    pub min_sessions: usize,
    /// Hard cap on simultaneously existing sessions (default: `5`).
    /// The pool grows lazily from `min_sessions` up to this bound.
    pub max_sessions: usize,
    /// Modules each fresh session pre-loads, in order. Duplicates are
    /// dropped, keeping the first occurrence.
    pub module_imports: Vec<String>,
    /// Optional script run once on one session after the pool opens.
    /// Best-effort environment priming: any failure is logged and
    /// swallowed, never propagated.
    pub init_script: Option<String>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_sessions: 1,
            max_sessions: 5,
            module_imports: Vec::new(),
            init_script: None,
        }
    }
}

impl PoolConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                    | Default |
    /// |----------------------------|---------|
    /// | `SHELLHOST_MIN_SESSIONS`   | `1`     |
    /// | `SHELLHOST_MAX_SESSIONS`   | `5`     |
    /// | `SHELLHOST_MODULE_IMPORTS` | empty (comma-separated list) |
    /// | `SHELLHOST_INIT_SCRIPT`    | unset   |
    pub fn from_env() -> Self {
        let min_sessions: usize = std::env::var("SHELLHOST_MIN_SESSIONS")
            .unwrap_or_else(|_| "1".into())
            .parse()
            .expect("SHELLHOST_MIN_SESSIONS must be a valid usize");

        let max_sessions: usize = std::env::var("SHELLHOST_MAX_SESSIONS")
            .unwrap_or_else(|_| "5".into())
            .parse()
            .expect("SHELLHOST_MAX_SESSIONS must be a valid usize");

        let module_imports: Vec<String> = std::env::var("SHELLHOST_MODULE_IMPORTS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let init_script = std::env::var("SHELLHOST_INIT_SCRIPT").ok();

        Self {
            min_sessions,
            max_sessions,
            module_imports,
            init_script,
        }
    }

    /// Check the `1 ≤ min_sessions ≤ max_sessions` invariant.
    pub fn validate(&self) -> Result<(), HostError> {
        if self.min_sessions < 1 {
            return Err(HostError::Configuration(
                "min_sessions must be at least 1".to_string(),
            ));
        }
        if self.max_sessions < self.min_sessions {
            return Err(HostError::Configuration(format!(
                "max_sessions ({}) must not be less than min_sessions ({})",
                self.max_sessions, self.min_sessions
            )));
        }
        Ok(())
    }

    /// Module imports with duplicates removed, first occurrence kept.
    pub(crate) fn deduped_imports(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.module_imports
            .iter()
            .filter(|m| seen.insert(m.as_str()))
            .cloned()
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
