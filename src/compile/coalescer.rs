//! At-most-one-in-flight recomputation with a single pending re-run.
//!
//! [`Coalescer::trigger`] never blocks: it either starts a rebuild on a
//! spawned Tokio task or, when one is already running, sets the pending
//! flag. Any number of triggers during one run collapse into exactly one
//! follow-up run. State is an idle/running phase plus one bit, never a
//! queue.
//!
//! A failed rebuild is reported to the observer and is not retried. The
//! rebuild closure is responsible for publishing only on success, so the
//! previously published snapshot stays live after a failure.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::GatehouseError;

pub type RebuildFuture = Pin<Box<dyn Future<Output = Result<(), GatehouseError>> + Send>>;

type RebuildFn = dyn Fn() -> RebuildFuture + Send + Sync;
type FailureObserver = dyn Fn(&'static str, &GatehouseError) + Send + Sync;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Running,
}

#[derive(Debug)]
struct State {
    phase: Phase,
    pending: bool,
}

struct Inner {
    name: &'static str,
    state: Mutex<State>,
    rebuild: Box<RebuildFn>,
    on_failure: Box<FailureObserver>,
    runs: AtomicU64,
    failures: AtomicU64,
    // Bumped after every finished run; `settled` waits on it.
    completed: watch::Sender<u64>,
}

/// Counters exposed through the health endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoalescerStats {
    pub name: String,
    pub runs: u64,
    pub failures: u64,
    pub running: bool,
    pub pending: bool,
}

#[derive(Clone)]
pub struct Coalescer {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Coalescer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coalescer")
            .field("name", &self.inner.name)
            .finish_non_exhaustive()
    }
}

fn log_failure(name: &'static str, error: &GatehouseError) {
    tracing::error!(provider = name, error = %error, "compile failed, keeping previous snapshot");
}

impl Coalescer {
    /// Create a coalescer whose failures are logged with `tracing`.
    pub fn new<F, Fut>(name: &'static str, rebuild: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), GatehouseError>> + Send + 'static,
    {
        Self::with_observer(name, rebuild, log_failure)
    }

    pub fn with_observer<F, Fut, O>(name: &'static str, rebuild: F, on_failure: O) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), GatehouseError>> + Send + 'static,
        O: Fn(&'static str, &GatehouseError) + Send + Sync + 'static,
    {
        let (completed, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                name,
                state: Mutex::new(State {
                    phase: Phase::Idle,
                    pending: false,
                }),
                rebuild: Box::new(move || Box::pin(rebuild()) as RebuildFuture),
                on_failure: Box::new(on_failure),
                runs: AtomicU64::new(0),
                failures: AtomicU64::new(0),
                completed,
            }),
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    /// Request a rebuild. Must be called from within a Tokio runtime.
    pub fn trigger(&self) {
        {
            let mut state = self.inner.lock_state();
            if state.phase == Phase::Running {
                state.pending = true;
                tracing::trace!(provider = self.inner.name, "rebuild already running, coalesced");
                return;
            }
            state.phase = Phase::Running;
        }

        let inner = Arc::clone(&self.inner);
        tokio::spawn(inner.run_loop());
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.inner.lock_state().phase == Phase::Idle
    }

    /// Wait until no rebuild is running or pending.
    pub async fn settled(&self) {
        let mut completed = self.inner.completed.subscribe();
        while !self.is_idle() {
            if completed.changed().await.is_err() {
                return;
            }
        }
    }

    #[must_use]
    pub fn stats(&self) -> CoalescerStats {
        let (running, pending) = {
            let state = self.inner.lock_state();
            (state.phase == Phase::Running, state.pending)
        };
        CoalescerStats {
            name: self.inner.name.to_string(),
            runs: self.inner.runs.load(Ordering::Relaxed),
            failures: self.inner.failures.load(Ordering::Relaxed),
            running,
            pending,
        }
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, State> {
        // The critical sections never panic, but a poisoned flag pair is
        // still meaningful, so recover it rather than propagate.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn run_loop(self: Arc<Self>) {
        loop {
            let started = Instant::now();

            // A panicking rebuild must not leave the phase stuck at Running.
            let result = match tokio::spawn((self.rebuild)()).await {
                Ok(result) => result,
                Err(join_err) => Err(GatehouseError::Io(std::io::Error::other(format!(
                    "rebuild task aborted: {join_err}"
                )))),
            };

            match result {
                Ok(()) => tracing::debug!(
                    provider = self.name,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "rebuild finished"
                ),
                Err(e) => {
                    self.failures.fetch_add(1, Ordering::Relaxed);
                    (self.on_failure)(self.name, &e);
                }
            }
            self.runs.fetch_add(1, Ordering::Relaxed);

            let again = {
                let mut state = self.lock_state();
                if state.pending {
                    state.pending = false;
                    true
                } else {
                    state.phase = Phase::Idle;
                    false
                }
            };
            self.completed.send_modify(|n| *n += 1);

            if !again {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    fn counting(delay_ms: u64) -> (Coalescer, Arc<AtomicU64>) {
        let count = Arc::new(AtomicU64::new(0));
        let c = Arc::clone(&count);
        let coalescer = Coalescer::new("test", move || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                Ok(())
            }
        });
        (coalescer, count)
    }

    #[tokio::test]
    async fn single_trigger_runs_once() {
        let (coalescer, count) = counting(1);
        coalescer.trigger();
        coalescer.settled().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(coalescer.is_idle());
    }

    #[tokio::test]
    async fn burst_of_triggers_coalesces() {
        let (coalescer, count) = counting(20);
        for _ in 0..50 {
            coalescer.trigger();
        }
        coalescer.settled().await;
        let runs = count.load(Ordering::SeqCst);
        assert!((1..=2).contains(&runs), "expected 1 or 2 runs, got {runs}");
        assert_eq!(coalescer.stats().runs, runs);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_triggers_from_many_tasks_coalesce() {
        let (coalescer, count) = counting(50);
        let mut handles = Vec::new();
        for _ in 0..16 {
            let c = coalescer.clone();
            handles.push(tokio::spawn(async move { c.trigger() }));
        }
        for h in handles {
            h.await.unwrap();
        }
        coalescer.settled().await;
        let runs = count.load(Ordering::SeqCst);
        assert!((1..=2).contains(&runs), "expected 1 or 2 runs, got {runs}");
    }

    #[tokio::test]
    async fn trigger_during_follow_up_is_coalesced_independently() {
        let (coalescer, count) = counting(20);
        coalescer.trigger();
        coalescer.trigger(); // pending
        tokio::time::sleep(Duration::from_millis(30)).await; // follow-up started
        coalescer.trigger(); // pending again
        coalescer.settled().await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn published_value_reflects_last_trigger() {
        let source = Arc::new(AtomicU64::new(0));
        let published = Arc::new(AtomicU64::new(0));
        let (s, p) = (Arc::clone(&source), Arc::clone(&published));
        let coalescer = Coalescer::new("test", move || {
            let (s, p) = (Arc::clone(&s), Arc::clone(&p));
            async move {
                let read = s.load(Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                p.store(read, Ordering::SeqCst);
                Ok(())
            }
        });

        for i in 1..=20 {
            source.store(i, Ordering::SeqCst);
            coalescer.trigger();
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        coalescer.settled().await;
        assert_eq!(published.load(Ordering::SeqCst), 20);
    }

    #[tokio::test]
    async fn failure_is_observed_and_not_retried() {
        let observed = Arc::new(AtomicBool::new(false));
        let count = Arc::new(AtomicU64::new(0));
        let (o, c) = (Arc::clone(&observed), Arc::clone(&count));
        let coalescer = Coalescer::with_observer(
            "failing",
            move || {
                let c = Arc::clone(&c);
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(GatehouseError::Transcode("boom".into()))
                }
            },
            move |name, _| {
                assert_eq!(name, "failing");
                o.store(true, Ordering::SeqCst);
            },
        );

        coalescer.trigger();
        coalescer.settled().await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(observed.load(Ordering::SeqCst));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        let stats = coalescer.stats();
        assert_eq!(stats.failures, 1);
        assert!(!stats.running);
    }

    #[tokio::test]
    async fn panicking_rebuild_returns_to_idle() {
        let count = Arc::new(AtomicU64::new(0));
        let c = Arc::clone(&count);
        let coalescer = Coalescer::with_observer(
            "panics",
            move || {
                let n = c.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        panic!("first rebuild panics");
                    }
                    Ok(())
                }
            },
            |_, _| {},
        );

        coalescer.trigger();
        coalescer.settled().await;
        assert!(coalescer.is_idle());
        assert_eq!(coalescer.stats().failures, 1);

        coalescer.trigger();
        coalescer.settled().await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(coalescer.stats().failures, 1);
    }
}
