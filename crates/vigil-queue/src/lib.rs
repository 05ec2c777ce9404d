pub mod bus;
pub mod error;
pub mod memory;
pub mod task_queue;

pub use bus::{EventBus, EventEnvelope};
pub use error::QueueError;
pub use memory::{InMemoryEventBus, InMemoryTaskQueue};
pub use task_queue::{TaskDelivery, TaskPayload, TaskQueue, TASK_ROUTING_KEY};
