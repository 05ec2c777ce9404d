use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, Notify};
use tracing::debug;
use vigil_domain::Task;

use crate::bus::{EventBus, EventEnvelope};
use crate::error::QueueError;
use crate::task_queue::{TaskDelivery, TaskPayload, TaskQueue};

const DEFAULT_MAX_DELIVERIES: u32 = 3;
const DEFAULT_DEAD_LETTER_TTL: Duration = Duration::from_secs(24 * 60 * 60);
const DEFAULT_BUS_CAPACITY: usize = 1024;

#[derive(Debug)]
struct DeadLetter {
    payload: TaskPayload,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct QueueInner {
    pending: VecDeque<(TaskPayload, u32)>,
    in_flight: HashMap<u64, (TaskPayload, u32)>,
    dead: Vec<DeadLetter>,
    next_tag: u64,
    closed: bool,
}

/// In-memory implementation of [`TaskQueue`].
///
/// Deliveries live until settled; a nack with requeue pushes the payload back
/// with an incremented attempt counter, and attempts past the cap are moved
/// to the dead-letter buffer where they expire after a TTL.
#[derive(Debug)]
pub struct InMemoryTaskQueue {
    inner: Mutex<QueueInner>,
    notify: Notify,
    max_deliveries: u32,
    dead_letter_ttl: Duration,
}

impl Default for InMemoryTaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryTaskQueue {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_MAX_DELIVERIES, DEFAULT_DEAD_LETTER_TTL)
    }

    pub fn with_limits(max_deliveries: u32, dead_letter_ttl: Duration) -> Self {
        InMemoryTaskQueue {
            inner: Mutex::new(QueueInner::default()),
            notify: Notify::new(),
            max_deliveries,
            dead_letter_ttl,
        }
    }

    /// Stop accepting publishes. Pending deliveries drain; `next` then
    /// returns `None`.
    pub fn close(&self) {
        let mut guard = self.inner.lock().expect("queue mutex poisoned");
        guard.closed = true;
        drop(guard);
        self.notify.notify_waiters();
    }

    /// Unexpired dead letters, pruning expired entries on the way.
    pub fn dead_letters(&self) -> Vec<TaskPayload> {
        let now = Utc::now();
        let mut guard = self.inner.lock().expect("queue mutex poisoned");
        guard.dead.retain(|d| d.expires_at > now);
        guard.dead.iter().map(|d| d.payload.clone()).collect()
    }

    pub fn depth(&self) -> usize {
        let guard = self.inner.lock().expect("queue mutex poisoned");
        guard.pending.len()
    }
}

#[async_trait]
impl TaskQueue for InMemoryTaskQueue {
    async fn publish(&self, task: &Task) -> Result<(), QueueError> {
        let mut guard = self.inner.lock().expect("queue mutex poisoned");
        if guard.closed {
            return Err(QueueError::Closed);
        }
        guard.pending.push_back((TaskPayload::from(task), 1));
        drop(guard);
        self.notify.notify_one();
        Ok(())
    }

    async fn next(&self) -> Result<Option<TaskDelivery>, QueueError> {
        loop {
            let notified = self.notify.notified();
            {
                let mut guard = self.inner.lock().expect("queue mutex poisoned");
                if let Some((payload, attempt)) = guard.pending.pop_front() {
                    guard.next_tag += 1;
                    let tag = guard.next_tag;
                    guard.in_flight.insert(tag, (payload.clone(), attempt));
                    return Ok(Some(TaskDelivery { tag, payload, attempt }));
                }
                if guard.closed {
                    return Ok(None);
                }
            }
            notified.await;
        }
    }

    async fn ack(&self, tag: u64) -> Result<(), QueueError> {
        let mut guard = self.inner.lock().expect("queue mutex poisoned");
        guard
            .in_flight
            .remove(&tag)
            .map(|_| ())
            .ok_or(QueueError::UnknownTag(tag))
    }

    async fn nack(&self, tag: u64, requeue: bool) -> Result<(), QueueError> {
        let mut guard = self.inner.lock().expect("queue mutex poisoned");
        let (payload, attempt) = guard
            .in_flight
            .remove(&tag)
            .ok_or(QueueError::UnknownTag(tag))?;

        if requeue && attempt < self.max_deliveries {
            guard.pending.push_back((payload, attempt + 1));
            drop(guard);
            self.notify.notify_one();
        } else {
            let reason = if requeue { "redelivery cap exceeded" } else { "rejected" };
            debug!(task_id = %payload.id, attempt, reason, "dead-lettering task delivery");
            let expires_at = Utc::now()
                + chrono::Duration::from_std(self.dead_letter_ttl)
                    .unwrap_or_else(|_| chrono::Duration::hours(24));
            guard.dead.push(DeadLetter { payload, expires_at });
        }
        Ok(())
    }
}

/// In-memory implementation of [`EventBus`] on a broadcast channel.
///
/// Publishing with no subscribers succeeds; the bus is a notification
/// channel, not the source of truth.
#[derive(Clone)]
pub struct InMemoryEventBus {
    sender: broadcast::Sender<EventEnvelope>,
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUS_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        InMemoryEventBus { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl std::fmt::Debug for InMemoryEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryEventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, envelope: &EventEnvelope) -> Result<(), QueueError> {
        // send only fails when there is no receiver, which is fine here.
        let _ = self.sender.send(envelope.clone());
        Ok(())
    }
}
