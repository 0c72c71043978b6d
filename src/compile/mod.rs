//! The compilable-provider contract and its building blocks.
//!
//! Every dynamic provider (routes, domains, certificates, favicons, error
//! pages) owns a [`Snapshot`] and a [`Coalescer`]. A rebuild reads storage,
//! builds a complete new value off to the side, then [`Snapshot::publish`]es
//! it. Readers take the lock only long enough to clone the `Arc`.
//!
//! [`MultiCompilable`] fans a single reload trigger out to all providers.

pub mod coalescer;

use std::sync::Arc;

use tokio::sync::RwLock;

pub use coalescer::{Coalescer, CoalescerStats};

/// A provider whose in-memory state can be recomputed from storage.
pub trait Compilable: Send + Sync {
    fn coalescer(&self) -> &Coalescer;

    fn name(&self) -> &'static str {
        self.coalescer().name()
    }

    /// Schedule a rebuild and return immediately.
    fn compile(&self) {
        self.coalescer().trigger();
    }
}

/// The single swappable reference a provider publishes through.
#[derive(Debug)]
pub struct Snapshot<T> {
    current: RwLock<Arc<T>>,
}

impl<T> Snapshot<T> {
    pub fn new(initial: T) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
        }
    }

    /// Clone out the current snapshot; the read lock is released on return.
    pub async fn load(&self) -> Arc<T> {
        Arc::clone(&*self.current.read().await)
    }

    /// Replace the current snapshot. The previous one is dropped once
    /// in-flight readers release it.
    pub async fn publish(&self, next: T) {
        let next = Arc::new(next);
        let previous = {
            let mut current = self.current.write().await;
            std::mem::replace(&mut *current, next)
        };
        drop(previous);
    }
}

impl<T: Default> Default for Snapshot<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// Fan-out of one reload trigger to every registered provider.
#[derive(Clone, Default)]
pub struct MultiCompilable {
    providers: Vec<Arc<dyn Compilable>>,
}

impl MultiCompilable {
    #[must_use]
    pub fn new(providers: Vec<Arc<dyn Compilable>>) -> Self {
        Self { providers }
    }

    pub fn compile(&self) {
        for provider in &self.providers {
            tracing::debug!(provider = provider.name(), "compile triggered");
            provider.compile();
        }
    }

    /// Wait for every provider to finish its current and pending rebuilds.
    pub async fn settled(&self) {
        for provider in &self.providers {
            provider.coalescer().settled().await;
        }
    }

    #[must_use]
    pub fn stats(&self) -> Vec<CoalescerStats> {
        self.providers
            .iter()
            .map(|p| p.coalescer().stats())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct Counter {
        coalescer: Coalescer,
        runs: Arc<AtomicU64>,
    }

    impl Counter {
        fn new(name: &'static str) -> Self {
            let runs = Arc::new(AtomicU64::new(0));
            let r = Arc::clone(&runs);
            let coalescer = Coalescer::new(name, move || {
                let r = Arc::clone(&r);
                async move {
                    r.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            });
            Self { coalescer, runs }
        }
    }

    impl Compilable for Counter {
        fn coalescer(&self) -> &Coalescer {
            &self.coalescer
        }
    }

    #[tokio::test]
    async fn fan_out_reaches_every_provider() {
        let a = Arc::new(Counter::new("a"));
        let b = Arc::new(Counter::new("b"));
        let all = MultiCompilable::new(vec![a.clone() as Arc<dyn Compilable>, b.clone()]);

        all.compile();
        all.settled().await;

        assert_eq!(a.runs.load(Ordering::SeqCst), 1);
        assert_eq!(b.runs.load(Ordering::SeqCst), 1);
        let names: Vec<_> = all.stats().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn snapshot_readers_keep_old_value_after_publish() {
        let snapshot = Snapshot::new(vec![1]);
        let before = snapshot.load().await;
        snapshot.publish(vec![2, 3]).await;
        assert_eq!(*before, vec![1]);
        assert_eq!(*snapshot.load().await, vec![2, 3]);
    }
}
