//! Process-level fault channel for detached writes.
//!
//! A failed physical write has nobody to return to: the submitting call
//! finished long ago. The failure is escalated here instead.

use std::fmt;
use std::sync::Arc;

use write_forget_core::{FaultMode, WriteError};

/// Supervisor callback invoked with every background write failure.
pub type FaultHook = Arc<dyn Fn(&WriteError) + Send + Sync>;

/// Where background write failures go.
#[derive(Clone, Default)]
pub enum FaultPolicy {
    /// Log and abort the process, the way an unhandled error would.
    #[default]
    Abort,
    /// Log and keep running.
    Log,
    /// Hand the failure to a supervisor.
    Hook(FaultHook),
}

impl FaultPolicy {
    pub fn hook<F>(f: F) -> Self
    where
        F: Fn(&WriteError) + Send + Sync + 'static,
    {
        Self::Hook(Arc::new(f))
    }

    pub(crate) fn report(&self, err: &WriteError) {
        match self {
            Self::Abort => {
                tracing::error!("[write-forget] unrecoverable write fault, aborting: {err}");
                std::process::abort();
            }
            Self::Log => {
                tracing::error!(path = err.path(), "[write-forget] write fault: {err}");
            }
            Self::Hook(hook) => hook(err),
        }
    }
}

impl From<FaultMode> for FaultPolicy {
    fn from(mode: FaultMode) -> Self {
        match mode {
            FaultMode::Abort => Self::Abort,
            FaultMode::Log => Self::Log,
        }
    }
}

impl fmt::Debug for FaultPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Abort => f.write_str("Abort"),
            Self::Log => f.write_str("Log"),
            Self::Hook(_) => f.write_str("Hook(..)"),
        }
    }
}

pub(crate) fn panic_payload_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        return (*msg).to_string();
    }
    if let Some(msg) = payload.downcast_ref::<String>() {
        return msg.clone();
    }
    "sink panicked".to_string()
}
