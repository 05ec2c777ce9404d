use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;
use vigil_domain::{CheckId, Priority, Task, TaskStatus, TenantId};

use crate::error::QueueError;

/// Routing key the scheduler publishes task descriptors under.
pub const TASK_ROUTING_KEY: &str = "check_tasks";

/// Wire shape of one task descriptor.
///
/// Unknown fields are captured in `extra` and round-trip untouched, so
/// intermediaries can annotate payloads without breaking consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskPayload {
    pub id: Uuid,
    pub check_id: String,
    pub tenant_id: String,
    pub scheduled_at: DateTime<Utc>,
    pub priority: Priority,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl From<&Task> for TaskPayload {
    fn from(task: &Task) -> Self {
        TaskPayload {
            id: task.id,
            check_id: task.check_id.to_string(),
            tenant_id: task.tenant_id.to_string(),
            scheduled_at: task.scheduled_at,
            priority: task.priority,
            extra: HashMap::new(),
        }
    }
}

impl TaskPayload {
    pub fn into_task(self) -> Task {
        Task {
            id: self.id,
            check_id: CheckId::new(self.check_id),
            tenant_id: TenantId::new(self.tenant_id),
            scheduled_at: self.scheduled_at,
            priority: self.priority,
            status: TaskStatus::Pending,
        }
    }
}

/// One claimed delivery. The consumer must settle it with
/// [`TaskQueue::ack`] or [`TaskQueue::nack`].
#[derive(Debug, Clone)]
pub struct TaskDelivery {
    pub tag: u64,
    pub payload: TaskPayload,
    /// 1-based delivery attempt. First delivery is 1, first redelivery is 2.
    pub attempt: u32,
}

/// Durable at-least-once work queue for task descriptors.
///
/// Per-check ordering is not required. Unsettled deliveries are redelivered;
/// deliveries nacked past the redelivery cap move to a dead-letter
/// destination with a TTL.
#[async_trait]
pub trait TaskQueue: Send + Sync + 'static {
    /// Publish one task under [`TASK_ROUTING_KEY`]. A successful publish is
    /// the scheduler's serialization point for a firing.
    async fn publish(&self, task: &Task) -> Result<(), QueueError>;

    /// Wait for the next delivery. Returns `None` once the queue is closed
    /// and drained.
    async fn next(&self) -> Result<Option<TaskDelivery>, QueueError>;

    async fn ack(&self, tag: u64) -> Result<(), QueueError>;

    /// Settle negatively. With `requeue` the delivery is retried until the
    /// redelivery cap, after which it is dead-lettered.
    async fn nack(&self, tag: u64, requeue: bool) -> Result<(), QueueError>;
}
