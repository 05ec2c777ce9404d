use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};
use vigil_domain::CheckId;

use crate::error::CronError;

/// The per-tick callback invoked for one check.
pub type FiringCallback = Arc<dyn Fn(CheckId) -> BoxFuture<'static, ()> + Send + Sync>;

struct FiringHandle {
    task: JoinHandle<()>,
}

impl Drop for FiringHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Time source firing per-check callbacks with sub-second precision.
///
/// The registry is the only process-wide mutable state of the scheduler; its
/// lifecycle is bounded by the owning scheduler's `start()`/`stop()`. Each
/// registration owns one timer task which awaits its callback, so a single
/// check never has two concurrent firings inside one process.
pub struct CronFabric {
    registry: Mutex<HashMap<CheckId, FiringHandle>>,
    shut_down: AtomicBool,
}

impl Default for CronFabric {
    fn default() -> Self {
        Self::new()
    }
}

impl CronFabric {
    pub fn new() -> Self {
        CronFabric {
            registry: Mutex::new(HashMap::new()),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Register (or replace) the firing for `check_id`.
    ///
    /// The first firing happens after `initial_delay`; callers map a past-due
    /// `next_run_at` to a zero delay, which coalesces any backlog into a
    /// single catch-up. Subsequent firings follow every `interval`.
    ///
    /// Replacement is atomic from an observer's standpoint: the stale handle
    /// is aborted under the registry lock before the new one is inserted, so
    /// no window exists in which a stale firing could run.
    pub fn register(
        &self,
        check_id: CheckId,
        initial_delay: Duration,
        interval: Duration,
        callback: FiringCallback,
    ) -> Result<(), CronError> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(CronError::ShutDown);
        }
        if interval.is_zero() {
            return Err(CronError::ZeroInterval(check_id.to_string()));
        }

        let id = check_id.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(initial_delay).await;
            trace!(check_id = %id, "initial firing");
            callback(id.clone()).await;

            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await; // first tick completes immediately
            loop {
                ticker.tick().await;
                trace!(check_id = %id, "firing");
                callback(id.clone()).await;
            }
        });

        let mut registry = self.registry.lock().expect("cron registry poisoned");
        if let Some(stale) = registry.remove(&check_id) {
            debug!(check_id = %check_id, "replacing registered firing");
            drop(stale); // aborts before the new handle becomes visible
        }
        registry.insert(check_id, FiringHandle { task });
        Ok(())
    }

    /// Remove the firing for `check_id`. Returns whether one was registered.
    pub fn deregister(&self, check_id: &CheckId) -> bool {
        let mut registry = self.registry.lock().expect("cron registry poisoned");
        registry.remove(check_id).is_some()
    }

    pub fn contains(&self, check_id: &CheckId) -> bool {
        let registry = self.registry.lock().expect("cron registry poisoned");
        registry.contains_key(check_id)
    }

    pub fn len(&self) -> usize {
        let registry = self.registry.lock().expect("cron registry poisoned");
        registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Abort every timer and refuse further registrations. Idempotent.
    pub fn shutdown(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
        let mut registry = self.registry.lock().expect("cron registry poisoned");
        registry.clear();
    }
}

impl std::fmt::Debug for CronFabric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CronFabric")
            .field("registered", &self.len())
            .field("shut_down", &self.shut_down.load(Ordering::SeqCst))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::AtomicUsize;

    fn counting_callback(counter: Arc<AtomicUsize>) -> FiringCallback {
        Arc::new(move |_id| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
            .boxed()
        })
    }

    #[tokio::test(start_paused = true)]
    async fn fires_every_interval() {
        let fabric = CronFabric::new();
        let counter = Arc::new(AtomicUsize::new(0));
        fabric
            .register(
                CheckId::new("c1"),
                Duration::ZERO,
                Duration::from_secs(60),
                counting_callback(counter.clone()),
            )
            .unwrap();

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1, "immediate first firing");

        tokio::time::sleep(Duration::from_secs(185)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_first_firing() {
        let fabric = CronFabric::new();
        let counter = Arc::new(AtomicUsize::new(0));
        fabric
            .register(
                CheckId::new("c1"),
                Duration::from_secs(30),
                Duration::from_secs(60),
                counting_callback(counter.clone()),
            )
            .unwrap();

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sub_second_intervals_are_accepted() {
        let fabric = CronFabric::new();
        let counter = Arc::new(AtomicUsize::new(0));
        fabric
            .register(
                CheckId::new("c1"),
                Duration::ZERO,
                Duration::from_millis(250),
                counting_callback(counter.clone()),
            )
            .unwrap();

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(counter.load(Ordering::SeqCst) >= 5);
    }

    #[tokio::test(start_paused = true)]
    async fn deregister_stops_firing() {
        let fabric = CronFabric::new();
        let counter = Arc::new(AtomicUsize::new(0));
        fabric
            .register(
                CheckId::new("c1"),
                Duration::ZERO,
                Duration::from_secs(60),
                counting_callback(counter.clone()),
            )
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(fabric.deregister(&CheckId::new("c1")));
        let before = counter.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(counter.load(Ordering::SeqCst), before);
    }

    #[tokio::test(start_paused = true)]
    async fn register_replaces_stale_firing() {
        let fabric = CronFabric::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let id = CheckId::new("c1");

        fabric
            .register(id.clone(), Duration::ZERO, Duration::from_secs(60), counting_callback(first.clone()))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        fabric
            .register(id.clone(), Duration::ZERO, Duration::from_secs(60), counting_callback(second.clone()))
            .unwrap();
        assert_eq!(fabric.len(), 1);

        let first_before = first.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(185)).await;
        assert_eq!(first.load(Ordering::SeqCst), first_before, "stale firing must not run");
        assert!(second.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_callbacks_do_not_overlap() {
        let fabric = CronFabric::new();
        let running = Arc::new(AtomicUsize::new(0));
        let overlapped = Arc::new(AtomicBool::new(false));
        let (running2, overlapped2) = (running.clone(), overlapped.clone());
        let callback: FiringCallback = Arc::new(move |_id| {
            let running = running2.clone();
            let overlapped = overlapped2.clone();
            async move {
                if running.fetch_add(1, Ordering::SeqCst) > 0 {
                    overlapped.store(true, Ordering::SeqCst);
                }
                // Longer than the interval: ticks are delayed, not stacked.
                tokio::time::sleep(Duration::from_secs(3)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            }
            .boxed()
        });
        fabric
            .register(CheckId::new("c1"), Duration::ZERO, Duration::from_secs(1), callback)
            .unwrap();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(!overlapped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn zero_interval_is_rejected() {
        let fabric = CronFabric::new();
        let err = fabric
            .register(
                CheckId::new("c1"),
                Duration::ZERO,
                Duration::ZERO,
                counting_callback(Arc::new(AtomicUsize::new(0))),
            )
            .unwrap_err();
        assert!(matches!(err, CronError::ZeroInterval(_)));
    }

    #[tokio::test]
    async fn shutdown_refuses_new_registrations() {
        let fabric = CronFabric::new();
        fabric.shutdown();
        let err = fabric
            .register(
                CheckId::new("c1"),
                Duration::ZERO,
                Duration::from_secs(1),
                counting_callback(Arc::new(AtomicUsize::new(0))),
            )
            .unwrap_err();
        assert!(matches!(err, CronError::ShutDown));
        assert!(fabric.is_empty());
    }
}
