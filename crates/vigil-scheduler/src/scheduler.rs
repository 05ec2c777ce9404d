use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::Notify;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;
use vigil_config::SchedulerSettings;
use vigil_cron::{CronFabric, FiringCallback};
use vigil_domain::{Check, CheckId, Clock, SystemClock, Task};
use vigil_queue::TaskQueue;
use vigil_store::{
    probe_budget_ttl, CheckRepository, LeaseRepository, SchedulerRepository, TaskRepository,
};

use crate::error::SchedulerError;

/// Distributed check scheduler.
///
/// On each cron tick the firing procedure takes a per-check lease, re-reads
/// the check, emits a task descriptor onto the work queue, advances the run
/// times, and releases the lease. Across processes, the lease store is the
/// only mutual exclusion; inside a process, the cron fabric never fires the
/// same check concurrently.
pub struct Scheduler {
    // Handed to firing callbacks; upgrades fail once the scheduler is gone.
    self_ref: Weak<Scheduler>,
    worker_id: String,
    settings: SchedulerSettings,
    clock: Arc<dyn Clock>,
    checks: Arc<dyn CheckRepository>,
    tasks: Arc<dyn TaskRepository>,
    scheduled: Arc<dyn SchedulerRepository>,
    leases: Arc<dyn LeaseRepository>,
    queue: Arc<dyn TaskQueue>,
    cron: CronFabric,
    in_flight: InFlightGauge,
    stopping: AtomicBool,
}

enum FiringOutcome {
    Emitted(Uuid),
    Skipped(&'static str),
}

impl Scheduler {
    pub fn new(
        settings: SchedulerSettings,
        checks: Arc<dyn CheckRepository>,
        tasks: Arc<dyn TaskRepository>,
        scheduled: Arc<dyn SchedulerRepository>,
        leases: Arc<dyn LeaseRepository>,
        queue: Arc<dyn TaskQueue>,
    ) -> Arc<Self> {
        Self::with_clock(settings, checks, tasks, scheduled, leases, queue, Arc::new(SystemClock))
    }

    pub fn with_clock(
        settings: SchedulerSettings,
        checks: Arc<dyn CheckRepository>,
        tasks: Arc<dyn TaskRepository>,
        scheduled: Arc<dyn SchedulerRepository>,
        leases: Arc<dyn LeaseRepository>,
        queue: Arc<dyn TaskQueue>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Scheduler {
            self_ref: self_ref.clone(),
            worker_id: settings.worker_id(),
            settings,
            clock,
            checks,
            tasks,
            scheduled,
            leases,
            queue,
            cron: CronFabric::new(),
            in_flight: InFlightGauge::new(),
            stopping: AtomicBool::new(false),
        })
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Load all active checks and register their firings. Firings whose
    /// persisted `next_run_at` is in the past fire immediately, coalesced to
    /// one catch-up per check. Returns after the initial load completes.
    pub async fn start(&self) -> Result<(), SchedulerError> {
        let active = self.checks.get_active().await?;
        let mut registered = 0usize;
        for check in &active {
            match self.register_check(check).await {
                Ok(()) => registered += 1,
                Err(e) => {
                    warn!(check_id = %check.id, error = %e, "skipping check at startup");
                }
            }
        }
        info!(worker_id = %self.worker_id, registered, "scheduler started");
        Ok(())
    }

    /// Stop accepting new firings, wait out in-flight ones up to the
    /// configured grace period, then tear the timer fabric down. Idempotent.
    /// Firings still running when the grace expires lose their leases to TTL.
    pub async fn stop(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        let grace = self.settings.shutdown_grace();
        if !self.in_flight.wait_idle(grace).await {
            warn!(
                worker_id = %self.worker_id,
                grace_secs = grace.as_secs(),
                "shutdown grace expired; leaving remaining leases to their TTL"
            );
        }
        self.cron.shutdown();
        info!(worker_id = %self.worker_id, "scheduler stopped");
    }

    /// Register a firing for a newly created check.
    pub async fn add(&self, check: &Check) -> Result<(), SchedulerError> {
        self.register_check(check).await
    }

    /// Replace the firing for a changed check. The stale firing is removed
    /// before the new one is registered, so no stale tick can run in between.
    pub async fn update(&self, check: &Check) -> Result<(), SchedulerError> {
        if !check.is_active() {
            debug!(check_id = %check.id, status = %check.status, "check no longer active, removing firing");
            self.remove(&check.id).await?;
            return Ok(());
        }
        self.register_check(check).await
    }

    /// Drop the firing for a removed check.
    pub async fn remove(&self, check_id: &CheckId) -> Result<(), SchedulerError> {
        self.cron.deregister(check_id);
        self.scheduled.remove_check(check_id).await?;
        Ok(())
    }

    pub fn registered_count(&self) -> usize {
        self.cron.len()
    }

    async fn register_check(&self, check: &Check) -> Result<(), SchedulerError> {
        check.validate()?;
        if !check.is_active() {
            return Ok(());
        }

        let now = self.clock.now();
        let next_run = check.next_run_at.unwrap_or(now);

        // Uphold the invariant that active checks carry a next_run_at once
        // they have passed through a scheduling pass.
        let mut persisted = check.clone();
        persisted.next_run_at = Some(next_run);
        if check.next_run_at.is_none() {
            if let Err(e) = self.checks.update(&persisted).await {
                warn!(check_id = %check.id, error = %e, "failed to persist initial next_run_at");
            }
        }
        self.scheduled.add_check(&persisted).await?;

        let initial_delay = (next_run - now).to_std().unwrap_or(Duration::ZERO);
        let ttl = probe_budget_ttl(
            check.timeout(),
            self.settings.lease_ttl_multiplier,
            self.settings.lease_ttl_floor(),
        );
        self.cron
            .register(check.id.clone(), initial_delay, check.interval(), self.firing_callback(ttl))?;
        debug!(
            check_id = %check.id,
            next_run = %next_run,
            interval_secs = check.interval_seconds,
            "registered firing"
        );
        Ok(())
    }

    fn firing_callback(&self, lease_ttl: Duration) -> FiringCallback {
        let scheduler = self.self_ref.clone();
        Arc::new(move |check_id| {
            let scheduler = scheduler.clone();
            async move {
                if let Some(scheduler) = scheduler.upgrade() {
                    scheduler.fire(check_id, lease_ttl).await;
                }
            }
            .boxed()
        })
    }

    /// One firing. Errors never bubble out of the cron callback; everything
    /// is logged with the check id and the lease state.
    async fn fire(&self, check_id: CheckId, lease_ttl: Duration) {
        if self.stopping.load(Ordering::SeqCst) {
            trace!(check_id = %check_id, "stopping, firing suppressed");
            return;
        }
        let _guard = self.in_flight.enter();

        match self.try_fire(&check_id, lease_ttl).await {
            Ok(FiringOutcome::Emitted(task_id)) => {
                debug!(check_id = %check_id, task_id = %task_id, "task enqueued");
            }
            Ok(FiringOutcome::Skipped(reason)) => {
                trace!(check_id = %check_id, reason, "firing skipped");
            }
            Err(e) => {
                let lease_held = self.leases.is_locked(check_id.as_str()).await.unwrap_or(false);
                warn!(check_id = %check_id, lease_held, error = %e, "firing failed; next tick retries");
            }
        }
    }

    async fn try_fire(
        &self,
        check_id: &CheckId,
        lease_ttl: Duration,
    ) -> Result<FiringOutcome, SchedulerError> {
        let key = check_id.as_str();
        let lease = match self.leases.try_lock(key, &self.worker_id, lease_ttl).await? {
            Some(lease) => lease,
            None => return Ok(FiringOutcome::Skipped("lease held by another node")),
        };

        let outcome = self.fire_locked(check_id).await;

        if let Err(e) = self.leases.release(key, &self.worker_id).await {
            warn!(
                check_id = %check_id,
                expires_at = %lease.expires_at,
                error = %e,
                "lease release failed; lease falls back to TTL expiry"
            );
        }
        outcome
    }

    async fn fire_locked(&self, check_id: &CheckId) -> Result<FiringOutcome, SchedulerError> {
        let check = match self.checks.get_by_id(check_id).await? {
            Some(check) => check,
            None => return Ok(FiringOutcome::Skipped("check no longer exists")),
        };
        if !check.is_active() {
            return Ok(FiringOutcome::Skipped("check not active"));
        }

        let now = self.clock.now();
        if let Some(next_run) = check.next_run_at {
            // A peer already serviced this tick and advanced the run time.
            if next_run > now {
                return Ok(FiringOutcome::Skipped("tick already serviced"));
            }
        }

        let task = Task::for_check(&check, now);

        // The enqueue is the serialization point: once it succeeds, this
        // firing has happened and must not be retried for the tick.
        self.queue.publish(&task).await?;

        let mut updated = check;
        updated.last_run_at = Some(now);
        updated.next_run_at = Some(now + chrono_interval(updated.interval()));
        if let Err(e) = self.checks.update(&updated).await {
            warn!(check_id = %check_id, error = %e, "failed to persist run times");
        }
        if let Err(e) = self.scheduled.update_check(&updated).await {
            warn!(check_id = %check_id, error = %e, "failed to update scheduled view");
        }
        if let Err(e) = self.tasks.create_task(&task).await {
            warn!(check_id = %check_id, task_id = %task.id, error = %e, "failed to record task");
        }

        Ok(FiringOutcome::Emitted(task.id))
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("worker_id", &self.worker_id)
            .field("registered", &self.cron.len())
            .field("stopping", &self.stopping.load(Ordering::SeqCst))
            .finish()
    }
}

fn chrono_interval(interval: Duration) -> chrono::Duration {
    chrono::Duration::from_std(interval).unwrap_or_else(|_| chrono::Duration::seconds(i64::MAX / 4))
}

/// Counter of in-flight firings, so `stop()` can wait them out.
struct InFlightGauge {
    count: AtomicUsize,
    notify: Notify,
}

struct InFlightGuard<'a> {
    gauge: &'a InFlightGauge,
}

impl InFlightGauge {
    fn new() -> Self {
        InFlightGauge {
            count: AtomicUsize::new(0),
            notify: Notify::new(),
        }
    }

    fn enter(&self) -> InFlightGuard<'_> {
        self.count.fetch_add(1, Ordering::SeqCst);
        InFlightGuard { gauge: self }
    }

    async fn wait_idle(&self, timeout: Duration) -> bool {
        let wait = async {
            loop {
                let notified = self.notify.notified();
                if self.count.load(Ordering::SeqCst) == 0 {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if self.gauge.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.gauge.notify.notify_waiters();
        }
    }
}
