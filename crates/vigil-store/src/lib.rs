pub mod error;
pub mod memory;
pub mod store;

pub use error::StoreError;
pub use memory::{InMemoryLeaseStore, InMemoryStore};
pub use store::{
    probe_budget_ttl, CheckRepository, IncidentFilter, IncidentRepository, IncidentStats,
    LeaseRepository, SchedulerRepository, TaskRepository,
};
