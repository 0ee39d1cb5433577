#![forbid(unsafe_code)]
//! Fire-and-forget file writes for write-forget.
//!
//! Provides:
//! - [`WriteCoordinator`]: per-path serialization of overwrite/append requests
//! - Debounced coalescing of requests that arrive while a path is busy
//! - A pluggable [`WriteSink`] for the byte-level I/O ([`FsSink`] by default)
//! - A [`FaultPolicy`] channel for background write failures
//! - A lazily created process-wide coordinator behind [`write_and_forget`]
//!   and [`append_and_forget`]
//!
//! ```no_run
//! use write_forget::{append_and_forget, write_and_forget};
//!
//! write_and_forget("/tmp/status.txt", "Hello");
//! append_and_forget("/tmp/status.txt", "A");
//! append_and_forget("/tmp/status.txt", "B");
//! ```

pub mod coordinator;
pub mod fault;
mod job;
pub mod sink;

use std::sync::LazyLock;

pub use coordinator::{CoordinatorBuilder, WriteCoordinator, WriterStats};
pub use fault::{FaultHook, FaultPolicy};
pub use sink::{FsSink, WriteSink};
pub use write_forget_core::{FaultMode, WriteError, WriteMode, WriterConfig};

static GLOBAL_COORDINATOR: LazyLock<WriteCoordinator> =
    LazyLock::new(|| WriteCoordinator::new(WriterConfig::from_env()));

/// Process-wide coordinator, built from [`WriterConfig::from_env`] on first use.
#[must_use]
pub fn global_coordinator() -> &'static WriteCoordinator {
    &GLOBAL_COORDINATOR
}

/// Append `content` to `path` through the process-wide coordinator.
pub fn append_and_forget(path: impl Into<String>, content: impl Into<String>) {
    global_coordinator().append_and_forget(path, content);
}

/// Overwrite `path` with `content` through the process-wide coordinator.
pub fn write_and_forget(path: impl Into<String>, content: impl Into<String>) {
    global_coordinator().write_and_forget(path, content);
}
