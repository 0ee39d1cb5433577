//! Configuration management for write-forget
//!
//! Settings come from the process environment, falling back to defaults when
//! a variable is missing or cannot be parsed.

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Fixed retry delay applied to pending jobs, in milliseconds.
pub const DEFAULT_DEBOUNCE_MS: u64 = 100;

/// What happens when a background write fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultMode {
    /// Log the fault and abort the process.
    #[default]
    Abort,
    /// Log the fault and keep running.
    Log,
}

impl FaultMode {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "abort" | "fatal" | "crash" => Some(Self::Abort),
            "log" | "warn" | "ignore" => Some(Self::Log),
            _ => None,
        }
    }
}

/// Coordinator configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriterConfig {
    /// Quiet period a pending job waits after the latest merged request.
    pub debounce_ms: u64,
    pub fault_mode: FaultMode,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            fault_mode: FaultMode::default(),
        }
    }
}

impl WriterConfig {
    /// Load configuration from environment variables
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.debounce_ms = env_u64("WRITE_FORGET_DEBOUNCE_MS", config.debounce_ms);
        if let Some(mode) = env_value("WRITE_FORGET_FAULT_POLICY").and_then(|v| FaultMode::parse(&v))
        {
            config.fault_mode = mode;
        }
        config
    }

    #[must_use]
    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn with_debounce(mut self, debounce: Duration) -> Self {
        // Sub-millisecond delays round down; zero means "next timer pass".
        self.debounce_ms = debounce.as_millis() as u64;
        self
    }

    #[must_use]
    pub const fn with_fault_mode(mut self, fault_mode: FaultMode) -> Self {
        self.fault_mode = fault_mode;
        self
    }
}

#[cfg(test)]
thread_local! {
    static TEST_ENV_OVERRIDES: std::cell::RefCell<std::collections::HashMap<String, String>> =
        std::cell::RefCell::new(std::collections::HashMap::new());
}

#[cfg(test)]
fn test_env_override_value(key: &str) -> Option<String> {
    TEST_ENV_OVERRIDES.with(|cell| cell.borrow().get(key).cloned())
}

/// Read a value from the process environment.
#[must_use]
pub fn env_value(key: &str) -> Option<String> {
    #[cfg(test)]
    if let Some(v) = test_env_override_value(key) {
        return Some(v);
    }
    env::var(key).ok()
}

fn env_u64(key: &str, default: u64) -> u64 {
    env_value(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
