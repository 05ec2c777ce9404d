use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::net::TcpStream;
use tracing::{debug, error, info, warn};
use vigil_domain::{Check, CheckId, ProbeResult, TaskStatus};
use vigil_incident::IncidentEngine;
use vigil_queue::{TaskDelivery, TaskQueue};
use vigil_store::{CheckRepository, TaskRepository};

/// Probe worker: claims task deliveries, executes the probe, records the
/// outcome, and feeds the result into the incident engine.
///
/// Failures in handling nack the delivery so the queue redelivers; everything
/// else acks. Workers tolerate duplicate deliveries because task ids are
/// fresh per firing and incident processing deduplicates by fingerprint.
pub struct Worker {
    checks: Arc<dyn CheckRepository>,
    tasks: Arc<dyn TaskRepository>,
    queue: Arc<dyn TaskQueue>,
    engine: Arc<IncidentEngine>,
}

impl Worker {
    pub fn new(
        checks: Arc<dyn CheckRepository>,
        tasks: Arc<dyn TaskRepository>,
        queue: Arc<dyn TaskQueue>,
        engine: Arc<IncidentEngine>,
    ) -> Self {
        Worker { checks, tasks, queue, engine }
    }

    /// Consume deliveries until the queue closes and drains.
    pub async fn run(self) {
        loop {
            let delivery = match self.queue.next().await {
                Ok(Some(delivery)) => delivery,
                Ok(None) => break,
                Err(e) => {
                    error!(error = %e, "task queue receive failed");
                    break;
                }
            };
            match self.handle(&delivery).await {
                Ok(()) => {
                    if let Err(e) = self.queue.ack(delivery.tag).await {
                        warn!(task_id = %delivery.payload.id, error = %e, "ack failed");
                    }
                }
                Err(e) => {
                    warn!(task_id = %delivery.payload.id, error = %e, "task handling failed, requeueing");
                    if let Err(e) = self.queue.nack(delivery.tag, true).await {
                        warn!(task_id = %delivery.payload.id, error = %e, "nack failed");
                    }
                }
            }
        }
        info!("worker drained");
    }

    async fn handle(&self, delivery: &TaskDelivery) -> anyhow::Result<()> {
        let task_id = delivery.payload.id;
        let check_id = CheckId::new(delivery.payload.check_id.clone());
        let Some(check) = self.checks.get_by_id(&check_id).await? else {
            debug!(check_id = %check_id, "check vanished before execution, dropping task");
            return Ok(());
        };
        if !check.is_active() {
            debug!(check_id = %check_id, status = %check.status, "check no longer active, dropping task");
            return Ok(());
        }

        if let Err(e) = self.tasks.update_status(task_id, TaskStatus::Running).await {
            debug!(task_id = %task_id, error = %e, "failed to mark task running");
        }

        let Some(result) = self.probe(&check).await else {
            if let Err(e) = self.tasks.update_status(task_id, TaskStatus::Failed).await {
                debug!(task_id = %task_id, error = %e, "failed to mark task failed");
            }
            return Ok(());
        };

        let status = if result.is_success { TaskStatus::Succeeded } else { TaskStatus::Failed };
        if let Err(e) = self.tasks.update_status(task_id, status).await {
            debug!(task_id = %task_id, error = %e, "failed to record task status");
        }
        if let Err(e) = self.tasks.save_result(task_id, &result).await {
            debug!(task_id = %task_id, error = %e, "failed to record probe result");
        }

        // Incident processing errors propagate so the delivery is redelivered.
        self.engine.process(&result).await?;
        Ok(())
    }

    async fn probe(&self, check: &Check) -> Option<ProbeResult> {
        match check.check_type.as_str() {
            "tcp" => Some(self.tcp_probe(check).await),
            other => {
                debug!(check_id = %check.id, check_type = other, "unsupported check type");
                None
            }
        }
    }

    async fn tcp_probe(&self, check: &Check) -> ProbeResult {
        let started = Instant::now();
        let attempt = tokio::time::timeout(check.timeout(), TcpStream::connect(&check.target)).await;
        let duration_ms = started.elapsed().as_millis() as i64;

        let (is_success, error_message) = match attempt {
            Ok(Ok(_stream)) => (true, None),
            Ok(Err(e)) => (false, Some(e.to_string())),
            Err(_) => (
                false,
                Some(format!(
                    "timeout connecting to {} after {}s",
                    check.target, check.timeout_seconds
                )),
            ),
        };

        ProbeResult {
            check_id: check.id.clone(),
            tenant_id: check.tenant_id.clone(),
            is_success,
            error_message,
            duration_ms,
            timestamp: Utc::now(),
        }
    }
}
