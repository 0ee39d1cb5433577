//! The write coordinator: per-path serialization with debounced coalescing.
//!
//! Architecture:
//!
//!   submit:   lock state → idle path? mark busy, spawn physical write, return
//!                        → busy path? merge into pending job, rearm deadline, return
//!   timer:    one thread sleeps until the earliest pending deadline, then hands
//!             due jobs to the sink (or rearms them if their path is still busy)
//!   worker:   one detached thread per physical write; on completion it clears
//!             the busy marker, then escalates any failure to the fault channel
//!
//! A path appears in the state map only while it is busy or has a pending job.
//! Different paths never wait on each other; the state lock is held only for
//! map updates, never across I/O.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use write_forget_core::{WriteError, WriteMode, WriterConfig};

use crate::fault::{FaultPolicy, panic_payload_message};
use crate::job::PendingJob;
use crate::sink::{FsSink, WriteSink};

/// Floor for re-arming a due job whose path is still busy, so a zero debounce
/// does not spin the timer thread.
const MIN_REARM: Duration = Duration::from_millis(1);

#[derive(Debug)]
struct PathSlot {
    /// Busy marker: a physical write for this path is outstanding.
    in_flight: bool,
    pending: Option<PendingJob>,
}

impl PathSlot {
    const fn busy() -> Self {
        Self {
            in_flight: true,
            pending: None,
        }
    }

    const fn is_idle(&self) -> bool {
        !self.in_flight && self.pending.is_none()
    }
}

#[derive(Debug, Default)]
struct State {
    paths: HashMap<String, PathSlot>,
    shutdown: bool,
}

#[derive(Default)]
struct CoordinatorMetrics {
    submitted: AtomicU64,
    deferred: AtomicU64,
    coalesced: AtomicU64,
    physical_ops: AtomicU64,
    rearmed: AtomicU64,
    faults: AtomicU64,
}

/// Snapshot of coordinator counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriterStats {
    /// Requests accepted through any entry point.
    pub submitted: u64,
    /// Requests that found their path busy and created a pending job.
    pub deferred: u64,
    /// Requests merged into an existing pending job.
    pub coalesced: u64,
    /// Physical writes handed to the sink.
    pub physical_ops: u64,
    /// Due retries pushed back because the path was still busy.
    pub rearmed: u64,
    /// Background failures escalated to the fault channel.
    pub faults: u64,
    /// Paths currently busy or holding a pending job.
    pub tracked_paths: usize,
}

struct Shared {
    state: Mutex<State>,
    /// Signalled on every state change: new or merged job, completion, shutdown.
    changed: Condvar,
    sink: Arc<dyn WriteSink>,
    faults: FaultPolicy,
    debounce: Duration,
    metrics: CoordinatorMetrics,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn dispatch(self: &Arc<Self>, mode: WriteMode, path: String, content: String) {
        self.metrics.submitted.fetch_add(1, Ordering::Relaxed);

        let start = {
            let mut state = self.lock();
            match state.paths.entry(path) {
                Entry::Vacant(entry) => {
                    let path = entry.key().clone();
                    entry.insert(PathSlot::busy());
                    Some((path, content))
                }
                Entry::Occupied(mut entry) => {
                    let deadline = Instant::now() + self.debounce;
                    let slot = entry.get_mut();
                    let merged = if let Some(job) = slot.pending.as_mut() {
                        job.merge(mode, &content, deadline);
                        true
                    } else {
                        slot.pending = Some(PendingJob::new(mode, content, deadline));
                        false
                    };
                    if merged {
                        self.metrics.coalesced.fetch_add(1, Ordering::Relaxed);
                        tracing::debug!(
                            path = %entry.key(),
                            %mode,
                            "[write-forget] merged request into pending job"
                        );
                    } else {
                        self.metrics.deferred.fetch_add(1, Ordering::Relaxed);
                        tracing::debug!(
                            path = %entry.key(),
                            %mode,
                            "[write-forget] path busy, deferred request"
                        );
                    }
                    None
                }
            }
        };

        match start {
            Some((path, content)) => self.start_physical(mode, path, content),
            // Deadline moved: let the timer recompute its sleep.
            None => self.changed.notify_all(),
        }
    }

    /// Hand one physical write to a detached worker. The path's busy marker
    /// must already be set.
    fn start_physical(self: &Arc<Self>, mode: WriteMode, path: String, content: String) {
        self.metrics.physical_ops.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            path = %path,
            %mode,
            bytes = content.len(),
            "[write-forget] starting physical write"
        );

        let shared = Arc::clone(self);
        let worker_path = path.clone();
        let spawned = thread::Builder::new()
            .name("write-forget-io".to_string())
            .spawn(move || shared.run_physical(mode, &worker_path, &content));

        if let Err(source) = spawned {
            let err = WriteError::WorkerSpawn {
                path: path.clone(),
                source,
            };
            self.complete(&path, Some(err));
        }
    }

    fn run_physical(&self, mode: WriteMode, path: &str, content: &str) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.sink.apply(mode, path, content)));
        let fault = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(source)) => Some(WriteError::Io {
                path: path.to_string(),
                mode,
                source,
            }),
            Err(payload) => Some(WriteError::SinkPanicked {
                path: path.to_string(),
                mode,
                message: panic_payload_message(payload.as_ref()),
            }),
        };
        self.complete(path, fault);
    }

    /// Clear the busy marker unconditionally, then escalate the failure if any.
    fn complete(&self, path: &str, fault: Option<WriteError>) {
        {
            let mut state = self.lock();
            let idle = match state.paths.get_mut(path) {
                Some(slot) => {
                    slot.in_flight = false;
                    slot.is_idle()
                }
                None => false,
            };
            if idle {
                state.paths.remove(path);
            }
        }
        self.changed.notify_all();

        if let Some(err) = fault {
            self.metrics.faults.fetch_add(1, Ordering::Relaxed);
            self.faults.report(&err);
        }
    }

    /// Debounce timer loop.
    ///
    /// Each pass collects every due job whose path is free, marks those paths
    /// busy and issues the writes outside the lock. Due jobs whose path is
    /// still busy get one more debounce period.
    fn run_timer(self: &Arc<Self>) {
        let mut state = self.lock();
        loop {
            if state.shutdown {
                break;
            }

            let now = Instant::now();
            let mut due: Vec<(String, PendingJob)> = Vec::new();
            let mut next_deadline: Option<Instant> = None;

            for (path, slot) in &mut state.paths {
                let Some(deadline) = slot.pending.as_ref().map(|job| job.deadline) else {
                    continue;
                };
                if deadline > now {
                    next_deadline = Some(next_deadline.map_or(deadline, |d| d.min(deadline)));
                    continue;
                }
                if slot.in_flight {
                    let rearmed = now + self.debounce.max(MIN_REARM);
                    if let Some(job) = slot.pending.as_mut() {
                        job.deadline = rearmed;
                    }
                    self.metrics.rearmed.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(path = %path, "[write-forget] retry due but path busy, rearmed");
                    next_deadline = Some(next_deadline.map_or(rearmed, |d| d.min(rearmed)));
                    continue;
                }
                if let Some(job) = slot.pending.take() {
                    slot.in_flight = true;
                    due.push((path.clone(), job));
                }
            }

            if !due.is_empty() {
                drop(state);
                for (path, job) in due {
                    self.start_physical(job.mode, path, job.content);
                }
                state = self.lock();
                continue;
            }

            state = match next_deadline {
                Some(deadline) => {
                    self.changed
                        .wait_timeout(state, deadline.saturating_duration_since(now))
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => self
                    .changed
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
            };
        }

        let discarded = state
            .paths
            .values()
            .filter(|slot| slot.pending.is_some())
            .count();
        drop(state);
        if discarded > 0 {
            tracing::warn!(
                "[write-forget] coordinator stopped with {discarded} pending job(s) not written"
            );
        }
    }
}

/// Serializes fire-and-forget writes per path and coalesces the overflow.
///
/// Both entry points return immediately. For a given path at most one
/// physical write is in flight; requests arriving meanwhile collapse into a
/// single follow-up write issued once no new request has arrived for the
/// debounce period. Different paths proceed independently.
///
/// Dropping the coordinator stops its timer; pending jobs that have not fired
/// yet are discarded. Use [`shutdown`](Self::shutdown) to drain first.
pub struct WriteCoordinator {
    shared: Arc<Shared>,
    timer: Option<JoinHandle<()>>,
}

impl WriteCoordinator {
    /// Coordinator writing to the local filesystem.
    #[must_use]
    pub fn new(config: WriterConfig) -> Self {
        Self::builder().config(config).build()
    }

    #[must_use]
    pub fn builder() -> CoordinatorBuilder {
        CoordinatorBuilder::default()
    }

    /// Request that `path` end up containing exactly `content`.
    pub fn write_and_forget(&self, path: impl Into<String>, content: impl Into<String>) {
        self.submit(WriteMode::Overwrite, path, content);
    }

    /// Request that `content` be appended to `path`.
    pub fn append_and_forget(&self, path: impl Into<String>, content: impl Into<String>) {
        self.submit(WriteMode::Append, path, content);
    }

    pub fn submit(&self, mode: WriteMode, path: impl Into<String>, content: impl Into<String>) {
        self.shared.dispatch(mode, path.into(), content.into());
    }

    /// Block until no path is busy or pending, or until `timeout` elapses.
    ///
    /// Returns `true` when the coordinator went quiet. This says nothing about
    /// which individual request landed; it is meant for shutdown and tests.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let guard = self.shared.lock();
        let (guard, _) = self
            .shared
            .changed
            .wait_timeout_while(guard, timeout, |state| !state.paths.is_empty())
            .unwrap_or_else(PoisonError::into_inner);
        let idle = guard.paths.is_empty();
        let remaining = guard.paths.len();
        drop(guard);
        if !idle {
            tracing::warn!(
                "[write-forget] wait_idle timed out after {timeout:?} with {remaining} path(s) still active"
            );
        }
        idle
    }

    /// Drain outstanding work (bounded by `timeout`), then stop the timer.
    pub fn shutdown(self, timeout: Duration) -> bool {
        self.wait_idle(timeout)
    }

    #[must_use]
    pub fn stats(&self) -> WriterStats {
        let m = &self.shared.metrics;
        let tracked_paths = self.shared.lock().paths.len();
        WriterStats {
            submitted: m.submitted.load(Ordering::Relaxed),
            deferred: m.deferred.load(Ordering::Relaxed),
            coalesced: m.coalesced.load(Ordering::Relaxed),
            physical_ops: m.physical_ops.load(Ordering::Relaxed),
            rearmed: m.rearmed.load(Ordering::Relaxed),
            faults: m.faults.load(Ordering::Relaxed),
            tracked_paths,
        }
    }

    #[must_use]
    pub fn debounce(&self) -> Duration {
        self.shared.debounce
    }
}

impl Drop for WriteCoordinator {
    fn drop(&mut self) {
        self.shared.lock().shutdown = true;
        self.shared.changed.notify_all();
        if let Some(handle) = self.timer.take() {
            let _ = handle.join();
        }
    }
}

/// Builder for [`WriteCoordinator`].
///
/// Defaults: [`WriterConfig::default`], [`FsSink`], and the fault policy named
/// by the config's `fault_mode`.
#[derive(Default)]
pub struct CoordinatorBuilder {
    config: WriterConfig,
    sink: Option<Arc<dyn WriteSink>>,
    fault_policy: Option<FaultPolicy>,
}

impl CoordinatorBuilder {
    #[must_use]
    pub fn config(mut self, config: WriterConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn sink<S: WriteSink>(self, sink: S) -> Self {
        self.shared_sink(Arc::new(sink))
    }

    /// Use a sink the caller keeps a handle to (e.g. to inspect it in tests).
    #[must_use]
    pub fn shared_sink(mut self, sink: Arc<dyn WriteSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    #[must_use]
    pub fn fault_policy(mut self, policy: FaultPolicy) -> Self {
        self.fault_policy = Some(policy);
        self
    }

    /// Build the coordinator and start its timer thread.
    #[must_use]
    pub fn build(self) -> WriteCoordinator {
        let faults = self
            .fault_policy
            .unwrap_or_else(|| FaultPolicy::from(self.config.fault_mode));
        let shared = Arc::new(Shared {
            state: Mutex::new(State::default()),
            changed: Condvar::new(),
            sink: self.sink.unwrap_or_else(|| Arc::new(FsSink)),
            faults,
            debounce: self.config.debounce(),
            metrics: CoordinatorMetrics::default(),
        });

        let timer_shared = Arc::clone(&shared);
        let timer = thread::Builder::new()
            .name("write-forget-timer".to_string())
            .spawn(move || timer_shared.run_timer())
            .expect("failed to spawn write-forget timer thread");

        WriteCoordinator {
            shared,
            timer: Some(timer),
        }
    }
}
