//! Walking policies and the single walk primitive they share.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::dag::{Dag, NodeId};

/// How visits are dispatched and how many may be inside their critical
/// section at once.
#[derive(Debug, Clone)]
pub enum Walker {
    /// One visit at a time, in dependency order.
    Sequential,
    /// Every ready node is dispatched immediately with no cap.
    Unbounded,
    /// Every ready node is dispatched, but at most `limit` of them may hold a
    /// [`Slot`] at the same time.
    Bounded {
        limit: usize,
        semaphore: Arc<Semaphore>,
    },
}

impl Default for Walker {
    fn default() -> Self {
        Walker::Unbounded
    }
}

/// A held concurrency slot. Dropping it releases the slot.
#[derive(Debug)]
pub struct Slot {
    _permit: Option<OwnedSemaphorePermit>,
}

impl Walker {
    pub fn sequential() -> Self {
        Walker::Sequential
    }

    pub fn unbounded() -> Self {
        Walker::Unbounded
    }

    /// A bounded walker; a limit of `0` means unbounded.
    pub fn bounded(limit: usize) -> Self {
        if limit == 0 {
            return Walker::Unbounded;
        }
        Walker::Bounded {
            limit,
            semaphore: Arc::new(Semaphore::new(limit)),
        }
    }

    /// The concurrency cap, if any.
    pub fn limit(&self) -> Option<usize> {
        match self {
            Walker::Sequential => Some(1),
            Walker::Unbounded => None,
            Walker::Bounded { limit, .. } => Some(*limit),
        }
    }

    /// Wait for a free slot. Unbounded and sequential walkers never wait.
    pub async fn acquire(&self) -> Slot {
        let permit = match self {
            Walker::Bounded { semaphore, .. } => semaphore.clone().acquire_owned().await.ok(),
            Walker::Sequential | Walker::Unbounded => None,
        };
        Slot { _permit: permit }
    }

    fn max_in_flight(&self) -> Option<usize> {
        match self {
            Walker::Sequential => Some(1),
            Walker::Unbounded | Walker::Bounded { .. } => None,
        }
    }
}

/// What happened to every node during a walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkReport<N> {
    /// Nodes whose visit returned `true`, in completion order.
    pub completed: Vec<N>,
    /// Nodes whose visit returned `false` or panicked.
    pub failed: Vec<N>,
    /// Nodes never visited because something they depend on failed.
    pub blocked: Vec<N>,
}

impl<N> Default for WalkReport<N> {
    fn default() -> Self {
        Self {
            completed: Vec::new(),
            failed: Vec::new(),
            blocked: Vec::new(),
        }
    }
}

impl<N> WalkReport<N> {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.blocked.is_empty()
    }
}

/// Aborts the spawned visit when dropped, so dropping a walk part way
/// through stops its visits instead of leaving them polling unobserved.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl<N: NodeId> Dag<N> {
    /// Visit every node once all of its dependencies have been visited
    /// successfully.
    ///
    /// Each visit runs on its own tokio task. Readiness is recomputed every
    /// time a visit finishes. A visit returning `false` (or panicking) stops
    /// its branch: everything depending on it, directly or transitively, is
    /// reported as blocked and never visited. Unrelated branches carry on.
    pub async fn walk<F, Fut>(&self, walker: &Walker, visit: F) -> WalkReport<N>
    where
        F: Fn(N) -> Fut,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let mut report = WalkReport::default();
        let mut succeeded: HashSet<N> = HashSet::new();
        let mut settled: HashSet<N> = HashSet::new();
        let mut dispatched: HashSet<N> = HashSet::new();
        let mut in_flight = FuturesUnordered::new();
        let max_in_flight = walker.max_in_flight();

        loop {
            for node in self.nodes() {
                if max_in_flight.is_some_and(|max| in_flight.len() >= max) {
                    break;
                }
                if dispatched.contains(node) || settled.contains(node) {
                    continue;
                }
                let deps = match self.downstream(node) {
                    Ok(deps) => deps,
                    Err(_) => continue,
                };
                if !deps.iter().all(|d| succeeded.contains(d)) {
                    continue;
                }

                debug!(node = %node, in_flight = in_flight.len(), "dispatching node");
                dispatched.insert(node.clone());
                let visit_task = AbortOnDrop(tokio::spawn(visit(node.clone())));
                let node = node.clone();
                in_flight.push(async move {
                    let mut visit_task = visit_task;
                    (node, (&mut visit_task.0).await)
                });
            }

            let Some((node, result)) = in_flight.next().await else {
                break;
            };
            settled.insert(node.clone());

            let ok = match result {
                Ok(ok) => ok,
                Err(join_error) => {
                    error!(node = %node, error = %join_error, "visit panicked");
                    false
                }
            };

            if ok {
                succeeded.insert(node.clone());
                report.completed.push(node);
                continue;
            }

            report.failed.push(node.clone());
            for upstream in self.all_upstreams(&node).unwrap_or_default() {
                if settled.insert(upstream.clone()) {
                    warn!(node = %upstream, failed = %node, "dependency failed; node will not run");
                    report.blocked.push(upstream);
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn s(v: &str) -> String {
        v.to_string()
    }

    fn chain() -> Dag<String> {
        Dag::from_dependencies(vec![
            (s("a"), vec![s("b")]),
            (s("b"), vec![s("c")]),
            (s("c"), vec![]),
        ])
        .unwrap()
    }

    #[tokio::test]
    async fn test_walk_visits_dependencies_first() {
        let dag = chain();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let report = dag
            .walk(&Walker::unbounded(), |node| {
                let seen = seen.clone();
                async move {
                    seen.lock().push(node);
                    true
                }
            })
            .await;

        assert!(report.is_success());
        assert_eq!(*seen.lock(), vec![s("c"), s("b"), s("a")]);
    }

    #[tokio::test]
    async fn test_walk_blocks_dependents_of_failures() {
        let dag = chain();
        let report = dag
            .walk(&Walker::unbounded(), |node| async move { node != "c" })
            .await;

        assert_eq!(report.failed, vec![s("c")]);
        assert_eq!(report.blocked, vec![s("b"), s("a")]);
        assert!(report.completed.is_empty());
    }

    #[tokio::test]
    async fn test_walk_survives_panicking_visit() {
        let dag = Dag::from_dependencies(vec![
            (s("boom"), Vec::<String>::new()),
            (s("fine"), vec![]),
        ])
        .unwrap();

        let report = dag
            .walk(&Walker::unbounded(), |node| async move {
                if node == "boom" {
                    panic!("visit exploded");
                }
                true
            })
            .await;

        assert_eq!(report.failed, vec![s("boom")]);
        assert_eq!(report.completed, vec![s("fine")]);
    }

    #[tokio::test]
    async fn test_dropping_walk_aborts_visits() {
        let dag = Dag::from_dependencies(vec![(s("forever"), Vec::<String>::new())]).unwrap();
        let ticks = Arc::new(AtomicUsize::new(0));

        let walker = Walker::unbounded();
        let walk = dag.walk(&walker, |_| {
            let ticks = ticks.clone();
            async move {
                while ticks.fetch_add(1, Ordering::SeqCst) < usize::MAX {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
                true
            }
        });
        assert!(tokio::time::timeout(Duration::from_millis(30), walk).await.is_err());

        let after_drop = ticks.load(Ordering::SeqCst);
        assert!(after_drop > 0);
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), after_drop);
    }

    #[tokio::test]
    async fn test_sequential_walker_runs_one_at_a_time() {
        let dag = Dag::from_dependencies(
            (0..6).map(|i| (format!("n{i}"), Vec::<String>::new())),
        )
        .unwrap();
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        dag.walk(&Walker::sequential(), |_| {
            let active = active.clone();
            let peak = peak.clone();
            async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                true
            }
        })
        .await;

        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_bounded_walker_caps_slots() {
        let walker = Walker::bounded(2);
        assert_eq!(walker.limit(), Some(2));
        assert!(matches!(Walker::bounded(0), Walker::Unbounded));

        let dag = Dag::from_dependencies(
            (0..8).map(|i| (format!("n{i}"), Vec::<String>::new())),
        )
        .unwrap();
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let report = dag
            .walk(&walker, |_| {
                let walker = walker.clone();
                let active = active.clone();
                let peak = peak.clone();
                async move {
                    let _slot = walker.acquire().await;
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    true
                }
            })
            .await;

        assert_eq!(report.completed.len(), 8);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }
}
