//! Shared test helpers for write-forget.
//!
//! [`RecordingSink`] is an in-memory [`WriteSink`] that:
//! - keeps file contents in a map (optionally seeded with prior contents)
//! - records every completed physical operation with start/finish instants
//! - flags any overlap of two operations on the same path
//! - injects latency, I/O failures, panics, or holds a path until released

#![forbid(unsafe_code)]

use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use write_forget::WriteSink;
use write_forget_core::WriteMode;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One physical operation as the sink saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedOp {
    pub path: String,
    pub mode: WriteMode,
    pub content: String,
    pub started: Instant,
    pub finished: Instant,
}

#[derive(Default)]
pub struct RecordingSink {
    latency: Duration,
    files: Mutex<HashMap<String, String>>,
    ops: Mutex<Vec<RecordedOp>>,
    active: Mutex<HashMap<String, usize>>,
    overlap: AtomicBool,
    peak_active_paths: AtomicUsize,
    failing: Mutex<HashMap<String, io::ErrorKind>>,
    panicking: Mutex<HashSet<String>>,
    held: Mutex<HashSet<String>>,
    released: Condvar,
}

/// Decrements the per-path in-flight count even if the operation panics.
struct ActiveGuard<'a> {
    sink: &'a RecordingSink,
    path: &'a str,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        let mut active = lock(&self.sink.active);
        if let Some(n) = active.get_mut(self.path) {
            *n -= 1;
            if *n == 0 {
                active.remove(self.path);
            }
        }
    }
}

impl RecordingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every operation sleeps this long before touching the map.
    #[must_use]
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    /// Pretend `path` already holds `content`.
    pub fn seed(&self, path: &str, content: &str) {
        lock(&self.files).insert(path.to_string(), content.to_string());
    }

    #[must_use]
    pub fn contents(&self, path: &str) -> Option<String> {
        lock(&self.files).get(path).cloned()
    }

    #[must_use]
    pub fn ops(&self) -> Vec<RecordedOp> {
        lock(&self.ops).clone()
    }

    #[must_use]
    pub fn ops_for(&self, path: &str) -> Vec<RecordedOp> {
        lock(&self.ops)
            .iter()
            .filter(|op| op.path == path)
            .cloned()
            .collect()
    }

    /// `true` if two operations on the same path were ever in flight together.
    #[must_use]
    pub fn overlap_detected(&self) -> bool {
        self.overlap.load(Ordering::SeqCst)
    }

    /// Highest number of distinct paths with an operation in flight at once.
    #[must_use]
    pub fn peak_active_paths(&self) -> usize {
        self.peak_active_paths.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn in_flight(&self, path: &str) -> usize {
        lock(&self.active).get(path).copied().unwrap_or(0)
    }

    /// Make every operation on `path` fail with `kind`.
    pub fn fail_path(&self, path: &str, kind: io::ErrorKind) {
        lock(&self.failing).insert(path.to_string(), kind);
    }

    pub fn clear_failure(&self, path: &str) {
        lock(&self.failing).remove(path);
    }

    /// Make the next operations on `path` panic.
    pub fn panic_on(&self, path: &str) {
        lock(&self.panicking).insert(path.to_string());
    }

    pub fn clear_panic(&self, path: &str) {
        lock(&self.panicking).remove(path);
    }

    /// Block operations on `path` until [`release`](Self::release) is called.
    pub fn hold(&self, path: &str) {
        lock(&self.held).insert(path.to_string());
    }

    pub fn release(&self, path: &str) {
        lock(&self.held).remove(path);
        self.released.notify_all();
    }

    fn enter(&self, path: &str) {
        let mut active = lock(&self.active);
        let n = active.entry(path.to_string()).or_insert(0);
        *n += 1;
        if *n > 1 {
            self.overlap.store(true, Ordering::SeqCst);
        }
        self.peak_active_paths
            .fetch_max(active.len(), Ordering::SeqCst);
    }

    fn wait_until_released(&self, path: &str) {
        let held = lock(&self.held);
        let _held = self
            .released
            .wait_while(held, |held| held.contains(path))
            .unwrap_or_else(PoisonError::into_inner);
    }

    fn perform(&self, mode: WriteMode, path: &str, content: &str) -> io::Result<()> {
        let started = Instant::now();
        self.enter(path);
        let _active = ActiveGuard { sink: self, path };

        self.wait_until_released(path);
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }

        if lock(&self.panicking).contains(path) {
            panic!("injected panic writing {path}");
        }
        if let Some(kind) = lock(&self.failing).get(path).copied() {
            return Err(io::Error::new(kind, format!("injected failure writing {path}")));
        }

        {
            let mut files = lock(&self.files);
            match mode {
                WriteMode::Overwrite => {
                    files.insert(path.to_string(), content.to_string());
                }
                WriteMode::Append => files.entry(path.to_string()).or_default().push_str(content),
            }
        }

        lock(&self.ops).push(RecordedOp {
            path: path.to_string(),
            mode,
            content: content.to_string(),
            started,
            finished: Instant::now(),
        });
        Ok(())
    }
}

impl WriteSink for RecordingSink {
    fn write_all(&self, path: &str, content: &str) -> io::Result<()> {
        self.perform(WriteMode::Overwrite, path, content)
    }

    fn append(&self, path: &str, content: &str) -> io::Result<()> {
        self.perform(WriteMode::Append, path, content)
    }
}
